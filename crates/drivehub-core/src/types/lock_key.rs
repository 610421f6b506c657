//! Keys for the in-process operation serializer.

use std::fmt;

use uuid::Uuid;

/// Scope of an exclusive operation lock.
///
/// Keys are independent: holding `User(a)` never blocks `User(b)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockKey {
    /// All tree and share mutations of one owner.
    User(Uuid),
    /// The system settings aggregate.
    Settings,
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Settings => write!(f, "settings"),
        }
    }
}
