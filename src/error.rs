use thiserror::Error;

#[derive(Error, Debug)]
pub enum KpiError {
    #[error("No KPI selected: select at least one KPI")]
    EmptySelection,

    #[error("None of the selected KPIs is recognised: {submitted:?}")]
    NoValidKpi { submitted: Vec<String> },

    #[error("Invalid number '{raw}': expected a value such as 1234,56")]
    Parse { raw: String },

    #[error("Invalid expression '{raw}': {reason}")]
    InvalidExpression { raw: String, reason: String },

    #[error("Position schema error: {0}")]
    Schema(String),

    #[error("Account mapping error: {0}")]
    Mapping(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl KpiError {
    /// Selection-level failures: the request goes back to the KPI selection step.
    pub fn is_invalid_selection(&self) -> bool {
        matches!(self, Self::EmptySelection | Self::NoValidKpi { .. })
    }

    /// The raw user text behind a field-level failure, kept for redisplay.
    pub fn raw_input(&self) -> Option<&str> {
        match self {
            Self::Parse { raw } | Self::InvalidExpression { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, KpiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_errors_are_classified() {
        assert!(KpiError::EmptySelection.is_invalid_selection());
        assert!(KpiError::NoValidKpi {
            submitted: vec!["bogus".to_string()]
        }
        .is_invalid_selection());
        assert!(!KpiError::Parse {
            raw: "abc".to_string()
        }
        .is_invalid_selection());
    }

    #[test]
    fn test_parse_error_keeps_raw_text() {
        let err = KpiError::Parse {
            raw: "12,3x".to_string(),
        };
        assert_eq!(err.raw_input(), Some("12,3x"));
        assert!(err.to_string().contains("12,3x"));
        assert_eq!(KpiError::EmptySelection.raw_input(), None);
    }
}
