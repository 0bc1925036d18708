//! Transaction propagation modes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a transactional call relates to a transaction already active in the
/// caller's context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Propagation {
    /// Reuse the active transaction, or start one.
    #[default]
    Required,
    /// Always start a new, independent transaction.
    RequiresNew,
    /// Open a save point in the active transaction, or start one.
    Nested,
    /// Run in the active transaction if there is one, otherwise without.
    Supports,
    /// Fail unless a transaction is active.
    Mandatory,
    /// Fail if a transaction is active.
    Never,
    /// Run without a transaction even if one is active.
    NotSupported,
}

impl fmt::Display for Propagation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Required => "required",
            Self::RequiresNew => "requires_new",
            Self::Nested => "nested",
            Self::Supports => "supports",
            Self::Mandatory => "mandatory",
            Self::Never => "never",
            Self::NotSupported => "not_supported",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_required() {
        assert_eq!(Propagation::default(), Propagation::Required);
    }

    #[test]
    fn test_serde_names_match_display() {
        let json = serde_json::to_string(&Propagation::RequiresNew).unwrap();
        assert_eq!(json, "\"requires_new\"");
        let parsed: Propagation = serde_json::from_str("\"not_supported\"").unwrap();
        assert_eq!(parsed.to_string(), "not_supported");
    }
}
