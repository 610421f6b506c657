//! Share link entities.

pub mod archive;
pub mod link;
pub mod membership;
pub mod resolution;

pub use archive::ArchiveEntry;
pub use link::ShareLink;
pub use membership::{MembershipRef, ShareMembership};
pub use resolution::ShareResolution;
