//! SQL text of the built-in templates.
//!
//! Every template reads the `sales` relation with snake_case columns.

use super::{NumericColumn, TemplateId};

pub(super) fn sql(id: TemplateId) -> String {
    let text = match id {
        TemplateId::NumericSummary(column) => return numeric_summary(column),
        TemplateId::Schema => SCHEMA,
        TemplateId::Head10 => HEAD_10,
        TemplateId::CountRows => COUNT_ROWS,
        TemplateId::SpanDates => SPAN_DATES,
        TemplateId::NullCounts => NULL_COUNTS,
        TemplateId::DistinctCategoricals => DISTINCT_CATEGORICALS,
        TemplateId::NumericSummarySales => NUMERIC_SUMMARY_SALES,
        TemplateId::SegmentDistribution => SEGMENT_DISTRIBUTION,
        TemplateId::CategoryDistribution => CATEGORY_DISTRIBUTION,
        TemplateId::RegionPerformance => REGION_PERFORMANCE,
        TemplateId::ShipModePerformance => SHIP_MODE_PERFORMANCE,
        TemplateId::StateSales => STATE_SALES,
        TemplateId::StateTop5 => STATE_TOP5,
        TemplateId::StateLoss => STATE_LOSS,
        TemplateId::ShipDaysByRegion => SHIP_DAYS_BY_REGION,
        TemplateId::MonthlySalesProfit => MONTHLY_SALES_PROFIT,
        TemplateId::MomRevenue => MOM_REVENUE,
        TemplateId::MonthlyAvgDiscount => MONTHLY_AVG_DISCOUNT,
        TemplateId::TopProductsByRevenue => TOP_PRODUCTS_BY_REVENUE,
        TemplateId::TopProductsByQty => TOP_PRODUCTS_BY_QTY,
        TemplateId::HighSalesLowProfit => HIGH_SALES_LOW_PROFIT,
        TemplateId::Bottom10ByProfit => BOTTOM10_BY_PROFIT,
        TemplateId::AvgDiscountByCategory => AVG_DISCOUNT_BY_CATEGORY,
        TemplateId::AvgDiscountBySubcategory => AVG_DISCOUNT_BY_SUBCATEGORY,
        TemplateId::AvgDiscountBySegment => AVG_DISCOUNT_BY_SEGMENT,
        TemplateId::SegmentRpm => SEGMENT_RPM,
        TemplateId::TopCustomers => TOP_CUSTOMERS,
        TemplateId::NegativeProfitCustomers => NEGATIVE_PROFIT_CUSTOMERS,
        TemplateId::CustomerLifetime => CUSTOMER_LIFETIME,
        TemplateId::Kpis => KPIS,
        TemplateId::MonthlyTrend => MONTHLY_TREND,
        TemplateId::CategorySales => CATEGORY_SALES,
        TemplateId::TopStates => TOP_STATES,
        TemplateId::DiscountVsProfit => DISCOUNT_VS_PROFIT,
    };
    text.to_string()
}

fn numeric_summary(column: NumericColumn) -> String {
    let col = column.as_str();
    format!(
        "
SELECT MIN({col}) AS min_{col}, MAX({col}) AS max_{col},
       AVG({col}) AS avg_{col}
FROM sales;
"
    )
}

const SCHEMA: &str = "PRAGMA table_info(sales);";

const HEAD_10: &str = "SELECT * FROM sales LIMIT 10;";

const COUNT_ROWS: &str = "SELECT COUNT(*) AS total_rows FROM sales;";

const SPAN_DATES: &str = "
SELECT MIN(order_date) AS start_date,
       MAX(order_date) AS end_date
FROM sales;
";

const NULL_COUNTS: &str = "
SELECT
  SUM(CASE WHEN row_id IS NULL THEN 1 ELSE 0 END) AS null_row_id,
  SUM(CASE WHEN order_id IS NULL THEN 1 ELSE 0 END) AS null_order_id,
  SUM(CASE WHEN order_date IS NULL THEN 1 ELSE 0 END) AS null_order_date,
  SUM(CASE WHEN ship_date IS NULL THEN 1 ELSE 0 END) AS null_ship_date,
  SUM(CASE WHEN ship_mode IS NULL THEN 1 ELSE 0 END) AS null_ship_mode,
  SUM(CASE WHEN customer_id IS NULL THEN 1 ELSE 0 END) AS null_customer_id,
  SUM(CASE WHEN customer_name IS NULL THEN 1 ELSE 0 END) AS null_customer_name,
  SUM(CASE WHEN segment IS NULL THEN 1 ELSE 0 END) AS null_segment,
  SUM(CASE WHEN country IS NULL THEN 1 ELSE 0 END) AS null_country,
  SUM(CASE WHEN city IS NULL THEN 1 ELSE 0 END) AS null_city,
  SUM(CASE WHEN state IS NULL THEN 1 ELSE 0 END) AS null_state,
  SUM(CASE WHEN postal_code IS NULL THEN 1 ELSE 0 END) AS null_postal_code,
  SUM(CASE WHEN region IS NULL THEN 1 ELSE 0 END) AS null_region,
  SUM(CASE WHEN product_id IS NULL THEN 1 ELSE 0 END) AS null_product_id,
  SUM(CASE WHEN category IS NULL THEN 1 ELSE 0 END) AS null_category,
  SUM(CASE WHEN sub_category IS NULL THEN 1 ELSE 0 END) AS null_sub_category,
  SUM(CASE WHEN product_name IS NULL THEN 1 ELSE 0 END) AS null_product_name,
  SUM(CASE WHEN sales IS NULL THEN 1 ELSE 0 END) AS null_sales,
  SUM(CASE WHEN quantity IS NULL THEN 1 ELSE 0 END) AS null_quantity,
  SUM(CASE WHEN discount IS NULL THEN 1 ELSE 0 END) AS null_discount,
  SUM(CASE WHEN profit IS NULL THEN 1 ELSE 0 END) AS null_profit
FROM sales;
";

const DISTINCT_CATEGORICALS: &str = "
SELECT
  COUNT(DISTINCT order_id)       AS unique_order_ids,
  COUNT(DISTINCT ship_mode)      AS unique_ship_modes,
  COUNT(DISTINCT customer_id)    AS unique_customer_ids,
  COUNT(DISTINCT customer_name)  AS unique_customer_names,
  COUNT(DISTINCT segment)        AS unique_segments,
  COUNT(DISTINCT country)        AS unique_countries,
  COUNT(DISTINCT city)           AS unique_cities,
  COUNT(DISTINCT state)          AS unique_states,
  COUNT(DISTINCT postal_code)    AS unique_postal_codes,
  COUNT(DISTINCT region)         AS unique_regions,
  COUNT(DISTINCT product_id)     AS unique_product_ids,
  COUNT(DISTINCT product_name)   AS unique_product_names,
  COUNT(DISTINCT category)       AS unique_categories,
  COUNT(DISTINCT sub_category)   AS unique_subcategories
FROM sales;
";

// SQLite has no STDDEV; the column is kept so the result shape is stable.
const NUMERIC_SUMMARY_SALES: &str = "
SELECT MIN(sales) AS min_sales, MAX(sales) AS max_sales,
       AVG(sales) AS avg_sales,  printf('%.6f', stdev) AS stddev_sales
FROM (
  SELECT sales,
         0.0 as stdev
  FROM sales
) t;
";

const SEGMENT_DISTRIBUTION: &str = "
SELECT
  segment,
  COUNT(*)                      AS orders,
  ROUND(SUM(sales), 2)          AS sales,
  ROUND(100.0 * COUNT(*) /(SELECT COUNT(*) FROM sales), 2)  AS pct_orders,
  ROUND(100.0 * SUM(sales)/(SELECT SUM(sales) FROM sales), 2) AS pct_sales
FROM sales
GROUP BY segment
ORDER BY sales DESC;
";

const CATEGORY_DISTRIBUTION: &str = "
SELECT
  category,
  COUNT(*)                                    AS orders,
  ROUND(SUM(sales), 2)                        AS sales,
  ROUND(SUM(profit), 2)                       AS profit,
  ROUND(100.0 * SUM(sales) /(SELECT SUM(sales)  FROM sales), 2) AS pct_sales,
  ROUND(100.0 * SUM(profit)/(SELECT SUM(profit) FROM sales), 2) AS pct_profit,
  ROUND(100.0 * SUM(profit) / NULLIF(SUM(sales), 0), 2)         AS margin_pct,
  ROUND(AVG(discount), 2)                      AS avg_discount
FROM sales
GROUP BY category
ORDER BY sales DESC;
";

const REGION_PERFORMANCE: &str = "
SELECT
  region,
  COUNT(*)                                   AS orders,
  ROUND(SUM(sales), 2)                       AS sales,
  ROUND(SUM(profit), 2)                      AS profit,
  ROUND(100.0 * SUM(sales)/(SELECT SUM(sales) FROM sales), 2)   AS pct_sales,
  ROUND(100.0 * SUM(profit)/(SELECT SUM(profit) FROM sales), 2) AS pct_profit,
  ROUND(100.0 * SUM(profit)/NULLIF(SUM(sales),0), 2)            AS margin_pct,
  ROUND(AVG(discount), 2)                    AS avg_discount
FROM sales
GROUP BY region
ORDER BY sales DESC;
";

const SHIP_MODE_PERFORMANCE: &str = "
SELECT
  ship_mode,
  COUNT(*)                                   AS orders,
  ROUND(SUM(sales), 2)                       AS sales,
  ROUND(SUM(profit), 2)                      AS profit,
  ROUND(100.0 * SUM(sales)/(SELECT SUM(sales) FROM sales), 2)   AS pct_sales,
  ROUND(100.0 * SUM(profit)/(SELECT SUM(profit) FROM sales), 2) AS pct_profit,
  ROUND(100.0 * SUM(profit)/NULLIF(SUM(sales),0), 2)            AS margin_pct,
  ROUND(AVG(discount), 2)                    AS avg_discount
FROM sales
GROUP BY ship_mode
ORDER BY sales DESC;
";

const STATE_SALES: &str = "
SELECT
  state,
  COUNT(*)                      AS orders,
  ROUND(SUM(sales), 2)          AS sales,
  ROUND(SUM(profit), 2)         AS profit,
  ROUND(100.0 * SUM(profit)/NULLIF(SUM(sales),0), 2) AS margin_pct,
  ROUND(AVG(discount), 2)       AS avg_discount
FROM sales
GROUP BY state
ORDER BY sales DESC;
";

const STATE_TOP5: &str = "
SELECT
  state,
  COUNT(*) AS orders,
  ROUND(SUM(sales), 2)  AS sales,
  ROUND(SUM(profit), 2) AS profit,
  ROUND(100.0 * SUM(profit)/NULLIF(SUM(sales),0), 2) AS margin_pct
FROM sales
GROUP BY state
ORDER BY sales DESC
LIMIT 5;
";

const STATE_LOSS: &str = "
SELECT
  state,
  ROUND(SUM(profit), 2) AS profit,
  ROUND(SUM(sales), 2)  AS sales,
  ROUND(100.0 * SUM(profit)/NULLIF(SUM(sales),0), 2) AS margin_pct
FROM sales
GROUP BY state
HAVING SUM(profit) < 0
ORDER BY profit ASC;
";

const SHIP_DAYS_BY_REGION: &str = "
SELECT
  region,
  ROUND(AVG(julianday(ship_date) - julianday(order_date)), 2) AS avg_ship_days,
  COUNT(*)           AS orders,
  ROUND(SUM(sales),2)  AS sales,
  ROUND(SUM(profit),2) AS profit,
  ROUND(100.0 * SUM(profit)/NULLIF(SUM(sales),0), 2) AS margin_pct
FROM sales
GROUP BY region
ORDER BY avg_ship_days;
";

const MONTHLY_SALES_PROFIT: &str = "
SELECT
  strftime('%Y-%m', order_date) AS month,
  ROUND(SUM(sales), 2)  AS sales,
  ROUND(SUM(profit), 2) AS profit
FROM sales
GROUP BY month
ORDER BY month;
";

const MOM_REVENUE: &str = "
WITH m AS (
  SELECT strftime('%Y-%m', order_date) AS month,
         SUM(sales) AS sales
  FROM sales
  GROUP BY month
)
SELECT
  month,
  ROUND(sales, 2) AS sales,
  ROUND((sales - LAG(sales) OVER (ORDER BY month))
        / NULLIF(LAG(sales) OVER (ORDER BY month), 0) * 100.0, 2) AS mom_pct
FROM m
ORDER BY month;
";

const MONTHLY_AVG_DISCOUNT: &str = "
SELECT
  strftime('%Y-%m', order_date) AS month,
  ROUND(AVG(discount), 3) AS avg_discount
FROM sales
GROUP BY month
ORDER BY month;
";

const TOP_PRODUCTS_BY_REVENUE: &str = "
SELECT
  product_name,
  COUNT(*)                 AS order_lines,
  ROUND(SUM(sales), 2)     AS sales,
  ROUND(SUM(profit), 2)    AS profit,
  ROUND(100.0 * SUM(profit)/NULLIF(SUM(sales),0), 2) AS margin_pct,
  ROUND(AVG(discount), 3)  AS avg_discount
FROM sales
GROUP BY product_name
ORDER BY sales DESC
LIMIT 10;
";

const TOP_PRODUCTS_BY_QTY: &str = "
SELECT
  product_name,
  SUM(quantity)            AS qty,
  ROUND(SUM(sales), 2)     AS sales,
  ROUND(SUM(profit), 2)    AS profit,
  ROUND(100.0 * SUM(profit)/NULLIF(SUM(sales),0), 2) AS margin_pct,
  ROUND(AVG(discount), 3)  AS avg_discount
FROM sales
GROUP BY product_name
ORDER BY qty DESC
LIMIT 10;
";

const HIGH_SALES_LOW_PROFIT: &str = "
SELECT
  product_name,
  ROUND(SUM(sales), 2)   AS sales,
  ROUND(SUM(profit), 2)  AS profit,
  ROUND(AVG(discount),3) AS avg_discount
FROM sales
GROUP BY product_name
HAVING SUM(sales) > 10000 AND SUM(profit) <= 0
ORDER BY sales DESC;
";

const BOTTOM10_BY_PROFIT: &str = "
SELECT
  product_name,
  ROUND(SUM(sales), 2)  AS sales,
  ROUND(SUM(profit), 2) AS profit,
  ROUND(AVG(discount),3) AS avg_discount
FROM sales
GROUP BY product_name
ORDER BY profit ASC
LIMIT 10;
";

const AVG_DISCOUNT_BY_CATEGORY: &str = "
SELECT
  category,
  ROUND(AVG(discount), 3) AS avg_discount,
  ROUND(SUM(sales), 2)    AS sales,
  ROUND(SUM(profit), 2)   AS profit,
  ROUND(100.0 * SUM(profit)/NULLIF(SUM(sales),0), 2) AS margin_pct
FROM sales
GROUP BY category
ORDER BY avg_discount DESC;
";

const AVG_DISCOUNT_BY_SUBCATEGORY: &str = "
SELECT
  sub_category,
  ROUND(AVG(discount), 3) AS avg_discount,
  ROUND(SUM(sales), 2)    AS sales,
  ROUND(SUM(profit), 2)   AS profit,
  ROUND(100.0 * SUM(profit)/NULLIF(SUM(sales),0), 2) AS margin_pct
FROM sales
GROUP BY sub_category
ORDER BY avg_discount DESC;
";

const AVG_DISCOUNT_BY_SEGMENT: &str = "
SELECT
  segment,
  ROUND(AVG(discount), 3) AS avg_discount,
  ROUND(SUM(sales), 2)    AS sales,
  ROUND(SUM(profit), 2)   AS profit,
  ROUND(100.0 * SUM(profit)/NULLIF(SUM(sales),0), 2) AS margin_pct
FROM sales
GROUP BY segment
ORDER BY avg_discount DESC;
";

const SEGMENT_RPM: &str = "
SELECT
  segment,
  COUNT(*)                  AS orders,
  ROUND(SUM(sales), 2)      AS sales,
  ROUND(SUM(profit), 2)     AS profit,
  ROUND(100.0 * SUM(profit)/NULLIF(SUM(sales),0), 2) AS margin_pct,
  ROUND(100.0 * SUM(sales) /(SELECT SUM(sales)  FROM sales), 2) AS pct_sales,
  ROUND(100.0 * SUM(profit)/(SELECT SUM(profit) FROM sales), 2) AS pct_profit,
  ROUND(AVG(discount), 3)   AS avg_discount
FROM sales
GROUP BY segment
ORDER BY sales DESC;
";

const TOP_CUSTOMERS: &str = "
SELECT
  customer_id,
  customer_name,
  ROUND(SUM(sales), 2)   AS lifetime_sales,
  ROUND(SUM(profit), 2)  AS lifetime_profit,
  ROUND(100.0 * SUM(profit)/NULLIF(SUM(sales),0), 2) AS margin_pct,
  COUNT(*)               AS order_lines
FROM sales
GROUP BY customer_id, customer_name
ORDER BY lifetime_sales DESC
LIMIT 10;
";

const NEGATIVE_PROFIT_CUSTOMERS: &str = "
SELECT
  customer_id,
  customer_name,
  ROUND(SUM(sales), 2)  AS sales,
  ROUND(SUM(profit), 2) AS profit,
  ROUND(AVG(discount),3) AS avg_discount,
  COUNT(*)              AS order_lines
FROM sales
GROUP BY customer_id, customer_name
HAVING SUM(profit) < 0
ORDER BY profit ASC;
";

const CUSTOMER_LIFETIME: &str = "
SELECT
  customer_id,
  customer_name,
  MIN(order_date) AS first_order_date,
  MAX(order_date) AS last_order_date,
  CAST(julianday(MAX(order_date)) - julianday(MIN(order_date)) AS INT) AS tenure_days,
  ROUND(SUM(sales), 2)   AS lifetime_sales,
  ROUND(SUM(profit), 2)  AS lifetime_profit
FROM sales
GROUP BY customer_id, customer_name
ORDER BY lifetime_sales DESC;
";

const KPIS: &str = "
SELECT
  SUM(sales)     AS total_sales,
  SUM(profit)    AS total_profit,
  COUNT(*)       AS total_orders,
  AVG(discount)  AS avg_discount
FROM sales
";

const MONTHLY_TREND: &str = "
SELECT strftime('%Y-%m-01', order_date) AS ym,
       SUM(sales)  AS sales,
       SUM(profit) AS profit
FROM sales
GROUP BY ym
ORDER BY ym
";

const CATEGORY_SALES: &str = "
SELECT category, ROUND(SUM(sales),2) AS sales, ROUND(SUM(profit),2) AS profit
FROM sales
GROUP BY category
ORDER BY sales DESC
";

const TOP_STATES: &str = "
SELECT state, ROUND(SUM(sales),2) AS sales
FROM sales
GROUP BY state
ORDER BY sales DESC
LIMIT 10
";

const DISCOUNT_VS_PROFIT: &str = "SELECT discount, profit FROM sales";
