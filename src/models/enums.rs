use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }
    };
}

str_enum!(RunStatus {
    NotStarted => "not_started",
    Processing => "processing",
    Paused => "paused",
    AwaitingCheckpoint => "awaiting_checkpoint",
    Completed => "completed",
    Failed => "failed",
    Cancelled => "cancelled",
});

impl RunStatus {
    /// Terminal states accept no further control commands.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

str_enum!(StagePhase {
    PreProcessing => "pre_processing",
    Processing => "processing",
    PostProcessing => "post_processing",
});

str_enum!(EntityRelationship {
    Parent => "parent",
    HoldingCompany => "holding_company",
    Subsidiary => "subsidiary",
    Shareholder => "shareholder",
    Counterparty => "counterparty",
    Financier => "financier",
    Lender => "lender",
    Supplier => "supplier",
    Customer => "customer",
    RelatedParty => "related_party",
    KeyIndividual => "key_individual",
    Unknown => "unknown",
});

str_enum!(ReadabilityStatus {
    Pending => "pending",
    Checking => "checking",
    Ready => "ready",
    Failed => "failed",
});

str_enum!(FindingSeverity {
    Low => "low",
    Medium => "medium",
    High => "high",
    Critical => "critical",
});

str_enum!(ReportJobStatus {
    Queued => "queued",
    Rendering => "rendering",
    Completed => "completed",
    Failed => "failed",
});

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn run_status_round_trip() {
        for (variant, s) in [
            (RunStatus::NotStarted, "not_started"),
            (RunStatus::Processing, "processing"),
            (RunStatus::Paused, "paused"),
            (RunStatus::AwaitingCheckpoint, "awaiting_checkpoint"),
            (RunStatus::Completed, "completed"),
            (RunStatus::Failed, "failed"),
            (RunStatus::Cancelled, "cancelled"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(RunStatus::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn terminal_statuses() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(!RunStatus::Failed.is_terminal());
        assert!(!RunStatus::AwaitingCheckpoint.is_terminal());
        assert!(!RunStatus::Paused.is_terminal());
    }

    #[test]
    fn relationship_round_trip() {
        for (variant, s) in [
            (EntityRelationship::Parent, "parent"),
            (EntityRelationship::HoldingCompany, "holding_company"),
            (EntityRelationship::Subsidiary, "subsidiary"),
            (EntityRelationship::Shareholder, "shareholder"),
            (EntityRelationship::Counterparty, "counterparty"),
            (EntityRelationship::Financier, "financier"),
            (EntityRelationship::Lender, "lender"),
            (EntityRelationship::Supplier, "supplier"),
            (EntityRelationship::Customer, "customer"),
            (EntityRelationship::RelatedParty, "related_party"),
            (EntityRelationship::KeyIndividual, "key_individual"),
            (EntityRelationship::Unknown, "unknown"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(EntityRelationship::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn phase_serde_snake_case() {
        let json = serde_json::to_string(&StagePhase::PreProcessing).unwrap();
        assert_eq!(json, "\"pre_processing\"");
    }

    #[test]
    fn invalid_enum_returns_error() {
        assert!(RunStatus::from_str("invalid").is_err());
        assert!(EntityRelationship::from_str("owner").is_err());
        assert!(ReadabilityStatus::from_str("").is_err());
    }
}
