mod dimension;

pub use dimension::Dimension;

use crate::utils::hash::compute_hash;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Invalid date range: {from} is after {to}")]
    InvalidRange { from: NaiveDate, to: NaiveDate },

    #[error("Unknown dimension: {0}")]
    UnknownDimension(String),

    #[error("Failed to fingerprint filter set: {0}")]
    Fingerprint(#[from] serde_json::Error),
}

/// Filter selections as a UI collects them, before normalization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawSelection {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    #[serde(default)]
    pub selections: HashMap<Dimension, Vec<String>>,
}

/// Values a filter can take: the order-date span and the distinct values of
/// every dimension.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilterDomain {
    pub date_min: Option<NaiveDate>,
    pub date_max: Option<NaiveDate>,
    pub values: BTreeMap<Dimension, BTreeSet<String>>,
}

impl FilterDomain {
    /// Whether `selected` covers every known value of `dimension`.
    fn covers(&self, dimension: Dimension, selected: &BTreeSet<String>) -> bool {
        match self.values.get(&dimension) {
            Some(all) if !all.is_empty() => all.is_subset(selected),
            _ => false,
        }
    }
}

/// Normalized, immutable set of active filters.
///
/// A dimension without an entry is unrestricted. Entries are never empty,
/// so "nothing selected" and "everything selected" share one representation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterSet {
    date_from: Option<NaiveDate>,
    date_to: Option<NaiveDate>,
    selections: BTreeMap<Dimension, BTreeSet<String>>,
}

impl FilterSet {
    /// A filter set that restricts nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new<I, V, S>(
        date_from: Option<NaiveDate>,
        date_to: Option<NaiveDate>,
        selections: I,
    ) -> Result<Self, FilterError>
    where
        I: IntoIterator<Item = (Dimension, V)>,
        V: IntoIterator<Item = S>,
        S: Into<String>,
    {
        check_range(date_from, date_to)?;

        let mut normalized: BTreeMap<Dimension, BTreeSet<String>> = BTreeMap::new();
        for (dimension, values) in selections {
            normalized
                .entry(dimension)
                .or_default()
                .extend(values.into_iter().map(Into::into));
        }
        normalized.retain(|_, values| !values.is_empty());

        Ok(Self {
            date_from,
            date_to,
            selections: normalized,
        })
    }

    pub fn date_from(&self) -> Option<NaiveDate> {
        self.date_from
    }

    pub fn date_to(&self) -> Option<NaiveDate> {
        self.date_to
    }

    pub fn selections(&self) -> &BTreeMap<Dimension, BTreeSet<String>> {
        &self.selections
    }

    pub fn selection(&self, dimension: Dimension) -> Option<&BTreeSet<String>> {
        self.selections.get(&dimension)
    }

    /// True when no filter is active at all.
    pub fn is_unrestricted(&self) -> bool {
        self.date_from.is_none() && self.date_to.is_none() && self.selections.is_empty()
    }

    /// Canonical, order-independent identity of this filter set.
    ///
    /// Dimensions and values live in ordered collections, so the JSON form
    /// does not depend on the order the UI supplied them in.
    pub fn fingerprint(&self) -> Result<String, FilterError> {
        Ok(compute_hash(self)?)
    }
}

/// Builds a [`FilterSet`] from raw UI selections.
///
/// Selections that cover the whole known domain of their dimension collapse
/// to "no restriction", the same as an empty selection.
pub fn normalize(raw: &RawSelection, domain: &FilterDomain) -> Result<FilterSet, FilterError> {
    check_range(raw.date_from, raw.date_to)?;

    let mut selections = BTreeMap::new();
    for (dimension, values) in &raw.selections {
        let selected: BTreeSet<String> = values.iter().cloned().collect();
        if selected.is_empty() || domain.covers(*dimension, &selected) {
            continue;
        }
        selections.insert(*dimension, selected);
    }

    Ok(FilterSet {
        date_from: raw.date_from,
        date_to: raw.date_to,
        selections,
    })
}

fn check_range(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<(), FilterError> {
    match (from, to) {
        (Some(from), Some(to)) if from > to => Err(FilterError::InvalidRange { from, to }),
        _ => Ok(()),
    }
}
