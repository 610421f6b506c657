//! Clock helpers.

use chrono::{DateTime, SubsecRound, Utc};

/// The current time at the store's precision (microseconds), so a value
/// written and read back compares equal.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
