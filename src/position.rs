use crate::error::{KpiError, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Suffix marking the non-current (beyond 12 months) half of a split receivable.
pub const NON_CURRENT_SUFFIX: &str = "NCA";

/// Identifier of one balance-sheet line.
///
/// Recognised codes are a base number with an optional maturity suffix
/// (`"39"`, `"39.NCA"`). Any other text is kept verbatim and ordered after
/// every recognised code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct PositionCode(String);

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum SortKey<'a> {
    Recognised { base: u64, suffix: Option<&'a str> },
    Unrecognised,
}

impl PositionCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Builds a suffixed code such as `39.NCA`.
    pub fn with_suffix(base: u32, suffix: &str) -> Self {
        Self(format!("{}.{}", base, suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_recognised(&self) -> bool {
        matches!(self.sort_key(), SortKey::Recognised { .. })
    }

    pub fn base(&self) -> Option<u64> {
        match self.sort_key() {
            SortKey::Recognised { base, .. } => Some(base),
            SortKey::Unrecognised => None,
        }
    }

    pub fn suffix(&self) -> Option<&str> {
        match self.sort_key() {
            SortKey::Recognised { suffix, .. } => suffix,
            SortKey::Unrecognised => None,
        }
    }

    pub fn is_non_current(&self) -> bool {
        self.suffix() == Some(NON_CURRENT_SUFFIX)
    }

    /// Form field name used by the presentation layer (`pos_39.NCA`).
    pub fn field_name(&self) -> String {
        format!("pos_{}", self.0)
    }

    fn sort_key(&self) -> SortKey<'_> {
        let (number, suffix) = match self.0.split_once('.') {
            Some((number, suffix)) => (number, Some(suffix)),
            None => (self.0.as_str(), None),
        };

        if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
            return SortKey::Unrecognised;
        }

        if let Some(suffix) = suffix {
            if suffix.is_empty() || !suffix.chars().all(|c| c.is_alphanumeric() || c == '_') {
                return SortKey::Unrecognised;
            }
        }

        match number.parse::<u64>() {
            Ok(base) => SortKey::Recognised { base, suffix },
            Err(_) => SortKey::Unrecognised,
        }
    }
}

impl Ord for PositionCode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key()
            .cmp(&other.sort_key())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for PositionCode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PositionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Strict parsing: only codes matching `\d+(\.\w+)?` are accepted.
impl FromStr for PositionCode {
    type Err = KpiError;

    fn from_str(s: &str) -> Result<Self> {
        let code = Self::new(s.trim());
        if code.is_recognised() {
            Ok(code)
        } else {
            Err(KpiError::Schema(format!(
                "'{}' is not a valid position code (expected e.g. 39 or 39.NCA)",
                s
            )))
        }
    }
}

impl From<&str> for PositionCode {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

impl From<String> for PositionCode {
    fn from(code: String) -> Self {
        Self(code)
    }
}

impl From<u32> for PositionCode {
    fn from(code: u32) -> Self {
        Self(code.to_string())
    }
}

/// Deduplicates and orders codes for display.
pub fn sorted_positions<I>(codes: I) -> Vec<PositionCode>
where
    I: IntoIterator<Item = PositionCode>,
{
    codes
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Convenience for building code lists from integer ranges.
pub fn codes(range: impl IntoIterator<Item = u32>) -> Vec<PositionCode> {
    range.into_iter().map(PositionCode::from).collect()
}
