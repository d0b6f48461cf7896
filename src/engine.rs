use crate::cache::{CacheKey, ResultCache};
use crate::composer::{ensure_read_only, ComposeError, ComposedQuery, Composer};
use crate::config::Config;
use crate::data_store::{DataStore, DataStoreError, Table, Value};
use crate::filter::{Dimension, FilterDomain, FilterError, FilterSet};
use crate::predicate::{PredicateBuilder, PredicateError};
use crate::template::{TemplateError, TemplateId, TemplateStore};
use crate::utils::hash::sha256_hex;
use chrono::NaiveDate;
use futures::future::try_join_all;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Fingerprint for results that no filter was applied to.
const UNFILTERED: &str = "unfiltered";

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Composition(ComposeError),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Internal error: parameter :{0} is bound twice")]
    BindingCollision(String),

    #[error(transparent)]
    DataStore(#[from] DataStoreError),
}

impl From<ComposeError> for EngineError {
    fn from(e: ComposeError) -> Self {
        match e {
            ComposeError::PermissionDenied(reason) => EngineError::PermissionDenied(reason),
            other => EngineError::Composition(other),
        }
    }
}

impl From<PredicateError> for EngineError {
    fn from(e: PredicateError) -> Self {
        match e {
            PredicateError::BindingCollision(name) => EngineError::BindingCollision(name),
        }
    }
}

/// How the filters relate to the rows that came back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scope {
    /// The filters were applied.
    Filtered,
    /// The caller asked for unfiltered rows.
    Unfiltered,
    /// The statement does not read the base relation.
    NotApplicable,
    /// Filtering was requested but the statement could not be composed
    /// safely, so the rows are unfiltered.
    Degraded { reason: String },
}

#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub table: Arc<Table>,
    pub scope: Scope,
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub relation: String,
    pub date_column: String,
    pub query_timeout: Option<Duration>,
    /// Report ambiguous compositions as errors instead of running the
    /// statement unfiltered.
    pub strict_composition: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            relation: "sales".to_string(),
            date_column: "order_date".to_string(),
            query_timeout: None,
            strict_composition: false,
        }
    }
}

impl From<&Config> for EngineOptions {
    fn from(config: &Config) -> Self {
        EngineOptions {
            relation: config.relation.clone(),
            date_column: config.date_column.clone(),
            query_timeout: config.query_timeout(),
            strict_composition: config.strict_composition,
        }
    }
}

pub struct QueryEngine<D> {
    templates: TemplateStore,
    data_store: D,
    cache: Arc<ResultCache<Table, DataStoreError>>,
    composer: Composer,
    predicates: PredicateBuilder,
    options: EngineOptions,
}

impl<D: DataStore> QueryEngine<D> {
    pub fn new(
        templates: TemplateStore,
        data_store: D,
        cache: Arc<ResultCache<Table, DataStoreError>>,
        options: EngineOptions,
    ) -> Self {
        QueryEngine {
            templates,
            data_store,
            cache,
            composer: Composer::new(options.relation.clone()),
            predicates: PredicateBuilder::new(options.date_column.clone()),
            options,
        }
    }

    pub fn templates(&self) -> &TemplateStore {
        &self.templates
    }

    /// Runs a saved template, scoped to `filters` when `apply_filters` is set.
    pub async fn run(
        &self,
        id: TemplateId,
        filters: &FilterSet,
        apply_filters: bool,
    ) -> Result<QueryOutcome, EngineError> {
        info!("Running template {}", id);
        let template = self.templates.lookup(id)?;
        self.execute(&template.sql, &template.hash, filters, apply_filters)
            .await
    }

    /// Runs caller-supplied SQL. Only single read-only statements are
    /// accepted.
    pub async fn run_ad_hoc(
        &self,
        sql: &str,
        filters: &FilterSet,
        apply_filters: bool,
    ) -> Result<QueryOutcome, EngineError> {
        info!("Running ad-hoc query");
        ensure_read_only(sql).map_err(|e| {
            warn!("Rejected ad-hoc query: {}", e);
            e
        })?;
        let hash = sha256_hex(format!("ad_hoc\0{}", sql).as_bytes());
        self.execute(sql, &hash, filters, apply_filters).await
    }

    /// Runs several templates concurrently; fails as soon as one fails.
    pub async fn run_many(
        &self,
        ids: &[TemplateId],
        filters: &FilterSet,
        apply_filters: bool,
    ) -> Result<Vec<(TemplateId, QueryOutcome)>, EngineError> {
        try_join_all(ids.iter().map(|id| async move {
            let outcome = self.run(*id, filters, apply_filters).await?;
            Ok::<_, EngineError>((*id, outcome))
        }))
        .await
    }

    /// Order-date span and the distinct values of every dimension.
    pub async fn filter_domain(&self) -> Result<FilterDomain, EngineError> {
        let relation = &self.options.relation;
        let date_column = &self.options.date_column;

        let span = self
            .run_internal(&format!(
                "SELECT MIN(date({col})) AS date_min, MAX(date({col})) AS date_max FROM {relation}",
                col = date_column,
                relation = relation
            ))
            .await?;
        let date_at = |column: &str| {
            span.get(0, column)
                .and_then(Value::as_str)
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
        };

        let mut values = BTreeMap::new();
        for dimension in Dimension::ALL {
            let column = dimension.column();
            let table = self
                .run_internal(&format!(
                    "SELECT DISTINCT {column} FROM {relation} WHERE {column} IS NOT NULL ORDER BY {column}",
                    column = column,
                    relation = relation
                ))
                .await?;
            let distinct = table
                .rows
                .iter()
                .filter_map(|row| row.first().and_then(Value::as_str).map(str::to_string))
                .collect();
            values.insert(dimension, distinct);
        }

        Ok(FilterDomain {
            date_min: date_at("date_min"),
            date_max: date_at("date_max"),
            values,
        })
    }

    /// Composes `sql` for `filters` without executing it.
    pub fn prepare(
        &self,
        sql: &str,
        filters: &FilterSet,
        apply_filters: bool,
    ) -> Result<(ComposedQuery, Scope), EngineError> {
        if !apply_filters {
            return Ok((ComposedQuery::passthrough(sql), Scope::Unfiltered));
        }

        let predicate = self.predicates.build(filters).map_err(|e| {
            error!("Predicate construction failed: {}", e);
            e
        })?;

        match self.composer.compose(sql, &predicate) {
            Ok(query) if query.is_filtered() => Ok((query, Scope::Filtered)),
            Ok(query) => Ok((query, Scope::NotApplicable)),
            Err(ComposeError::Ambiguous(reason)) if !self.options.strict_composition => {
                warn!("Composition ambiguous, running unfiltered: {}", reason);
                Ok((ComposedQuery::passthrough(sql), Scope::Degraded { reason }))
            }
            Err(e) => {
                warn!("Composition failed: {}", e);
                Err(e.into())
            }
        }
    }

    async fn execute(
        &self,
        sql: &str,
        template_hash: &str,
        filters: &FilterSet,
        apply_filters: bool,
    ) -> Result<QueryOutcome, EngineError> {
        let (query, scope) = self.prepare(sql, filters, apply_filters)?;
        let fingerprint = match scope {
            Scope::Filtered => filters.fingerprint()?,
            _ => UNFILTERED.to_string(),
        };

        let key = CacheKey::new(template_hash, fingerprint);
        let table = self
            .cache
            .get_or_compute(key, || self.execute_query(&query))
            .await?;
        debug!("{} rows ({:?})", table.len(), scope);

        Ok(QueryOutcome { table, scope })
    }

    /// Unfiltered, cached execution of engine-generated SQL.
    async fn run_internal(&self, sql: &str) -> Result<Arc<Table>, EngineError> {
        let hash = sha256_hex(format!("internal\0{}", sql).as_bytes());
        let outcome = self.execute(sql, &hash, &FilterSet::empty(), false).await?;
        Ok(outcome.table)
    }

    async fn execute_query(&self, query: &ComposedQuery) -> Result<Table, DataStoreError> {
        let result = match self.options.query_timeout {
            Some(limit) => tokio::time::timeout(limit, self.data_store.execute(query))
                .await
                .map_err(|_| DataStoreError::Timeout(limit))?,
            None => self.data_store.execute(query).await,
        };
        if let Err(e) = &result {
            error!("Query execution failed: {}", e);
        }
        result
    }
}
