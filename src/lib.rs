//! DriveHub
//!
//! Wiring of the service crates into one running application, shared by
//! the `drivehub-server` binary and the integration tests.

pub mod state;

pub use state::{Repositories, Services};
