//! Sorting types for folder listings.

use serde::{Deserialize, Serialize};

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Ascending order.
    Asc,
    /// Descending order.
    Desc,
}

impl Default for SortDirection {
    fn default() -> Self {
        Self::Desc
    }
}

impl SortDirection {
    /// Return the SQL keyword for this direction.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Attribute a folder listing is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    /// Node name.
    Name,
    /// Byte size; folders sort as zero.
    Size,
    /// Last modification time.
    #[default]
    ModifiedAt,
    /// Creation time.
    CreatedAt,
    /// Node kind (file or folder).
    Kind,
}

impl SortBy {
    /// Return the column expression for this attribute.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Size => "COALESCE(size, 0)",
            Self::ModifiedAt => "modified_at",
            Self::CreatedAt => "created_at",
            Self::Kind => "kind",
        }
    }
}

/// A complete listing order: attribute plus direction.
///
/// Ties are always broken by creation time then id, ascending, so repeated
/// listings are deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SortOrder {
    /// Attribute to sort by.
    #[serde(default)]
    pub by: SortBy,
    /// Sort direction.
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortOrder {
    /// Create a new sort order.
    pub fn new(by: SortBy, direction: SortDirection) -> Self {
        Self { by, direction }
    }

    /// Render the `ORDER BY` body including the tie-breakers.
    pub fn to_sql(&self) -> String {
        format!(
            "{} {}, created_at ASC, id ASC",
            self.by.as_sql(),
            self.direction.as_sql()
        )
    }
}
