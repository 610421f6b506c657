//! Share links: the owner-side registry and token-based public access.

pub mod access;
pub mod service;
pub mod token;

pub use access::AccessService;
pub use service::ShareService;
pub use token::TokenGenerator;
