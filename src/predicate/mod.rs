//! Turns a [`FilterSet`] into a conjunctive WHERE predicate.
//!
//! Filter values never appear in the generated SQL text. Each value gets its
//! own named parameter (`:d0`, `:seg0`, ...) and travels in the binding map.

use crate::filter::{Dimension, FilterSet};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Named parameter values, keyed by name without the leading `:`.
pub type Bindings = BTreeMap<String, String>;

pub const DATE_FROM_PARAM: &str = "d0";
pub const DATE_TO_PARAM: &str = "d1";

#[derive(Error, Debug)]
pub enum PredicateError {
    #[error("Binding collision: parameter :{0} is bound twice")]
    BindingCollision(String),
}

/// A predicate clause (without the `WHERE` keyword) and its bindings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PredicateFragment {
    pub clause: String,
    pub bindings: Bindings,
}

impl PredicateFragment {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.clause.is_empty()
    }

    /// `WHERE <clause>`, or an empty string when nothing is filtered.
    pub fn where_clause(&self) -> String {
        if self.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.clause)
        }
    }

    /// Conjoins two fragments. Sharing a parameter name is an internal
    /// consistency fault and is reported, never merged over.
    pub fn and(mut self, other: PredicateFragment) -> Result<Self, PredicateError> {
        if other.is_empty() {
            return Ok(self);
        }
        for (name, value) in other.bindings {
            if self.bindings.contains_key(&name) {
                return Err(PredicateError::BindingCollision(name));
            }
            self.bindings.insert(name, value);
        }
        self.clause = if self.clause.is_empty() {
            other.clause
        } else {
            format!("{} AND {}", self.clause, other.clause)
        };
        Ok(self)
    }
}

/// Builds predicates against the columns of the base relation.
#[derive(Debug, Clone)]
pub struct PredicateBuilder {
    date_column: String,
}

impl PredicateBuilder {
    /// `date_column` must be a plain identifier; it is written into SQL as is.
    pub fn new(date_column: impl Into<String>) -> Self {
        Self {
            date_column: date_column.into(),
        }
    }

    pub fn build(&self, filters: &FilterSet) -> Result<PredicateFragment, PredicateError> {
        let mut fragment = self.date_range(filters);
        for (dimension, values) in filters.selections() {
            fragment = fragment.and(in_list(*dimension, values))?;
        }
        Ok(fragment)
    }

    /// Date-only comparison, so a time-of-day stored with the order date
    /// does not push the last day out of the range.
    fn date_range(&self, filters: &FilterSet) -> PredicateFragment {
        let column = &self.date_column;
        let mut bindings = Bindings::new();
        let clause = match (filters.date_from(), filters.date_to()) {
            (Some(from), Some(to)) => {
                bindings.insert(DATE_FROM_PARAM.to_string(), from.to_string());
                bindings.insert(DATE_TO_PARAM.to_string(), to.to_string());
                format!(
                    "date({}) BETWEEN date(:{}) AND date(:{})",
                    column, DATE_FROM_PARAM, DATE_TO_PARAM
                )
            }
            (Some(from), None) => {
                bindings.insert(DATE_FROM_PARAM.to_string(), from.to_string());
                format!("date({}) >= date(:{})", column, DATE_FROM_PARAM)
            }
            (None, Some(to)) => {
                bindings.insert(DATE_TO_PARAM.to_string(), to.to_string());
                format!("date({}) <= date(:{})", column, DATE_TO_PARAM)
            }
            (None, None) => return PredicateFragment::empty(),
        };
        PredicateFragment { clause, bindings }
    }
}

fn in_list(dimension: Dimension, values: &BTreeSet<String>) -> PredicateFragment {
    let prefix = dimension.param_prefix();
    let mut bindings = Bindings::new();
    let mut placeholders = Vec::with_capacity(values.len());
    for (i, value) in values.iter().enumerate() {
        let name = format!("{}{}", prefix, i);
        placeholders.push(format!(":{}", name));
        bindings.insert(name, value.clone());
    }
    PredicateFragment {
        clause: format!("{} IN ({})", dimension.column(), placeholders.join(", ")),
        bindings,
    }
}
