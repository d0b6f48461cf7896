use super::FilterError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Categorical columns of the sales relation that can be filtered on.
///
/// Variants are declared in alphabetical order so that the derived `Ord`
/// sorts dimensions by name, which keeps fingerprints and predicates stable.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Category,
    Region,
    Segment,
    State,
}

impl Dimension {
    pub const ALL: [Dimension; 4] = [
        Dimension::Category,
        Dimension::Region,
        Dimension::Segment,
        Dimension::State,
    ];

    /// Column name in the base relation.
    pub fn column(&self) -> &'static str {
        match self {
            Dimension::Category => "category",
            Dimension::Region => "region",
            Dimension::Segment => "segment",
            Dimension::State => "state",
        }
    }

    /// Prefix for the named parameters bound for this dimension.
    ///
    /// No prefix may be a prefix of another one, and none may start with
    /// `d` (reserved for the date bounds).
    pub fn param_prefix(&self) -> &'static str {
        match self {
            Dimension::Category => "cat",
            Dimension::Region => "reg",
            Dimension::Segment => "seg",
            Dimension::State => "st",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for Dimension {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dimension::ALL
            .into_iter()
            .find(|dimension| dimension.column().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| FilterError::UnknownDimension(s.to_string()))
    }
}
