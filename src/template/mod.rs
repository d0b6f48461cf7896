mod catalog;

use crate::utils::hash::sha256_hex;
use log::debug;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Unknown template: {0}")]
    UnknownTemplate(String),

    #[error("Failed to read template file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid template file: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Numeric columns with a min/max/avg summary template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NumericColumn {
    Sales,
    Quantity,
    Discount,
    Profit,
}

impl NumericColumn {
    pub const ALL: [NumericColumn; 4] = [
        NumericColumn::Sales,
        NumericColumn::Quantity,
        NumericColumn::Discount,
        NumericColumn::Profit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NumericColumn::Sales => "sales",
            NumericColumn::Quantity => "quantity",
            NumericColumn::Discount => "discount",
            NumericColumn::Profit => "profit",
        }
    }
}

/// Identifier of a saved query.
///
/// The set is closed: template files may override the SQL of an id but
/// cannot introduce new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TemplateId {
    Schema,
    Head10,
    CountRows,
    SpanDates,
    NullCounts,
    DistinctCategoricals,
    NumericSummarySales,
    NumericSummary(NumericColumn),
    SegmentDistribution,
    CategoryDistribution,
    RegionPerformance,
    ShipModePerformance,
    StateSales,
    StateTop5,
    StateLoss,
    ShipDaysByRegion,
    MonthlySalesProfit,
    MomRevenue,
    MonthlyAvgDiscount,
    TopProductsByRevenue,
    TopProductsByQty,
    HighSalesLowProfit,
    Bottom10ByProfit,
    AvgDiscountByCategory,
    AvgDiscountBySubcategory,
    AvgDiscountBySegment,
    SegmentRpm,
    TopCustomers,
    NegativeProfitCustomers,
    CustomerLifetime,
    Kpis,
    MonthlyTrend,
    CategorySales,
    TopStates,
    DiscountVsProfit,
}

const NUMERIC_SUMMARY_PREFIX: &str = "numeric_summary:";

impl TemplateId {
    pub const ALL: &'static [TemplateId] = &[
        TemplateId::Schema,
        TemplateId::Head10,
        TemplateId::CountRows,
        TemplateId::SpanDates,
        TemplateId::NullCounts,
        TemplateId::DistinctCategoricals,
        TemplateId::NumericSummarySales,
        TemplateId::NumericSummary(NumericColumn::Sales),
        TemplateId::NumericSummary(NumericColumn::Quantity),
        TemplateId::NumericSummary(NumericColumn::Discount),
        TemplateId::NumericSummary(NumericColumn::Profit),
        TemplateId::SegmentDistribution,
        TemplateId::CategoryDistribution,
        TemplateId::RegionPerformance,
        TemplateId::ShipModePerformance,
        TemplateId::StateSales,
        TemplateId::StateTop5,
        TemplateId::StateLoss,
        TemplateId::ShipDaysByRegion,
        TemplateId::MonthlySalesProfit,
        TemplateId::MomRevenue,
        TemplateId::MonthlyAvgDiscount,
        TemplateId::TopProductsByRevenue,
        TemplateId::TopProductsByQty,
        TemplateId::HighSalesLowProfit,
        TemplateId::Bottom10ByProfit,
        TemplateId::AvgDiscountByCategory,
        TemplateId::AvgDiscountBySubcategory,
        TemplateId::AvgDiscountBySegment,
        TemplateId::SegmentRpm,
        TemplateId::TopCustomers,
        TemplateId::NegativeProfitCustomers,
        TemplateId::CustomerLifetime,
        TemplateId::Kpis,
        TemplateId::MonthlyTrend,
        TemplateId::CategorySales,
        TemplateId::TopStates,
        TemplateId::DiscountVsProfit,
    ];

    /// Panels rendered together on the dashboard page.
    pub const DASHBOARD: &'static [TemplateId] = &[
        TemplateId::Kpis,
        TemplateId::MonthlyTrend,
        TemplateId::CategorySales,
        TemplateId::TopStates,
        TemplateId::DiscountVsProfit,
    ];

    fn name(&self) -> &'static str {
        match self {
            TemplateId::Schema => "schema",
            TemplateId::Head10 => "head_10",
            TemplateId::CountRows => "count_rows",
            TemplateId::SpanDates => "span_dates",
            TemplateId::NullCounts => "null_counts",
            TemplateId::DistinctCategoricals => "distinct_categoricals",
            TemplateId::NumericSummarySales => "numeric_summary_sales",
            TemplateId::NumericSummary(_) => "numeric_summary",
            TemplateId::SegmentDistribution => "segment_distribution",
            TemplateId::CategoryDistribution => "category_distribution",
            TemplateId::RegionPerformance => "region_performance",
            TemplateId::ShipModePerformance => "ship_mode_performance",
            TemplateId::StateSales => "state_sales",
            TemplateId::StateTop5 => "state_top5",
            TemplateId::StateLoss => "state_loss",
            TemplateId::ShipDaysByRegion => "ship_days_by_region",
            TemplateId::MonthlySalesProfit => "monthly_sales_profit",
            TemplateId::MomRevenue => "mom_revenue",
            TemplateId::MonthlyAvgDiscount => "monthly_avg_discount",
            TemplateId::TopProductsByRevenue => "top_products_by_revenue",
            TemplateId::TopProductsByQty => "top_products_by_qty",
            TemplateId::HighSalesLowProfit => "high_sales_low_profit",
            TemplateId::Bottom10ByProfit => "bottom10_by_profit",
            TemplateId::AvgDiscountByCategory => "avg_discount_by_category",
            TemplateId::AvgDiscountBySubcategory => "avg_discount_by_subcategory",
            TemplateId::AvgDiscountBySegment => "avg_discount_by_segment",
            TemplateId::SegmentRpm => "segment_rpm",
            TemplateId::TopCustomers => "top_customers",
            TemplateId::NegativeProfitCustomers => "negative_profit_customers",
            TemplateId::CustomerLifetime => "customer_lifetime",
            TemplateId::Kpis => "kpis",
            TemplateId::MonthlyTrend => "monthly_trend",
            TemplateId::CategorySales => "category_sales",
            TemplateId::TopStates => "top_states",
            TemplateId::DiscountVsProfit => "discount_vs_profit",
        }
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateId::NumericSummary(column) => {
                write!(f, "{}{}", NUMERIC_SUMMARY_PREFIX, column.as_str())
            }
            _ => f.write_str(self.name()),
        }
    }
}

impl FromStr for TemplateId {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(column) = s.strip_prefix(NUMERIC_SUMMARY_PREFIX) {
            return NumericColumn::ALL
                .into_iter()
                .find(|c| c.as_str() == column)
                .map(TemplateId::NumericSummary)
                .ok_or_else(|| TemplateError::UnknownTemplate(s.to_string()));
        }
        TemplateId::ALL
            .iter()
            .copied()
            .find(|id| !matches!(id, TemplateId::NumericSummary(_)) && id.name() == s)
            .ok_or_else(|| TemplateError::UnknownTemplate(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplate {
    pub id: TemplateId,
    pub sql: String,
    /// Content hash of the id and SQL text; identifies the template in the
    /// result cache.
    pub hash: String,
}

impl QueryTemplate {
    pub fn new(id: TemplateId, sql: impl Into<String>) -> Self {
        let sql = sql.into();
        let hash = sha256_hex(format!("{}\0{}", id, sql).as_bytes());
        Self { id, sql, hash }
    }
}

/// Read-only registry of templates, fixed at start-up.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    templates: BTreeMap<TemplateId, QueryTemplate>,
}

impl TemplateStore {
    /// The built-in catalog.
    pub fn builtin() -> Self {
        let templates = TemplateId::ALL
            .iter()
            .map(|id| (*id, QueryTemplate::new(*id, catalog::sql(*id))))
            .collect();
        TemplateStore { templates }
    }

    /// Parses a JSON object mapping template names to SQL.
    pub fn from_json_str(json: &str) -> Result<Self, TemplateError> {
        let raw: BTreeMap<String, String> = serde_json::from_str(json)?;
        let mut templates = BTreeMap::new();
        for (name, sql) in raw {
            let id: TemplateId = name.parse()?;
            templates.insert(id, QueryTemplate::new(id, sql));
        }
        Ok(TemplateStore { templates })
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, TemplateError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| TemplateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Self::from_json_str(&json)?;
        debug!(
            "Loaded {} templates from {}",
            store.templates.len(),
            path.display()
        );
        Ok(store)
    }

    pub fn lookup(&self, id: TemplateId) -> Result<&QueryTemplate, TemplateError> {
        self.templates
            .get(&id)
            .ok_or_else(|| TemplateError::UnknownTemplate(id.to_string()))
    }

    pub fn ids(&self) -> impl Iterator<Item = TemplateId> + '_ {
        self.templates.keys().copied()
    }
}

impl Default for TemplateStore {
    fn default() -> Self {
        Self::builtin()
    }
}
