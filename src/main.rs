use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use log::error;
use serde_json::json;
use std::error::Error;
use std::process;
use std::sync::Arc;

use superstore_sql::{
    cache::ResultCache,
    config::Config,
    data_store::SqliteDataStore,
    engine::{EngineOptions, QueryOutcome},
    filter::{normalize, Dimension, FilterDomain, FilterSet, RawSelection},
    template::{TemplateId, TemplateStore},
    QueryEngine,
};

#[derive(Parser)]
#[command(name = "superstore-sql")]
#[command(about = "Filter-scoped analytics queries over the Superstore sales table")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the available templates
    Templates,

    /// Run a saved template
    Run {
        /// Template name, e.g. region_performance or numeric_summary:profit
        template: TemplateId,

        #[command(flatten)]
        filters: FilterArgs,
    },

    /// Run a single read-only SQL statement
    Sql {
        sql: String,

        #[command(flatten)]
        filters: FilterArgs,
    },

    /// Run every dashboard panel
    Dashboard {
        #[command(flatten)]
        filters: FilterArgs,
    },

    /// Print the order-date span and the values each filter can take
    Domain,
}

#[derive(Args)]
struct FilterArgs {
    /// First order date to include (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Last order date to include (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,

    /// Customer segment to include; repeat for several
    #[arg(long)]
    segment: Vec<String>,

    /// Region to include; repeat for several
    #[arg(long)]
    region: Vec<String>,

    /// Product category to include; repeat for several
    #[arg(long)]
    category: Vec<String>,

    /// State to include; repeat for several
    #[arg(long)]
    state: Vec<String>,

    /// Query the whole table
    #[arg(long, conflicts_with_all = ["from", "to", "segment", "region", "category", "state"])]
    no_filters: bool,
}

impl FilterArgs {
    /// The normalized filter set and whether to apply it.
    async fn resolve(
        self,
        engine: &QueryEngine<SqliteDataStore>,
    ) -> Result<(FilterSet, bool), Box<dyn Error>> {
        if self.no_filters {
            return Ok((FilterSet::empty(), false));
        }

        let raw = RawSelection {
            date_from: self.from,
            date_to: self.to,
            selections: [
                (Dimension::Segment, self.segment),
                (Dimension::Region, self.region),
                (Dimension::Category, self.category),
                (Dimension::State, self.state),
            ]
            .into_iter()
            .filter(|(_, values)| !values.is_empty())
            .collect(),
        };
        // The domain is only needed to collapse full selections.
        let domain = if raw.selections.is_empty() {
            FilterDomain::default()
        } else {
            engine.filter_domain().await?
        };
        Ok((normalize(&raw, &domain)?, true))
    }
}

fn outcome_json(outcome: &QueryOutcome) -> serde_json::Value {
    json!({
        "scope": outcome.scope,
        "columns": outcome.table.columns,
        "rows": outcome.table.rows,
    })
}

async fn execute(
    command: Commands,
    engine: &QueryEngine<SqliteDataStore>,
) -> Result<serde_json::Value, Box<dyn Error>> {
    let output = match command {
        Commands::Templates => json!(engine
            .templates()
            .ids()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()),
        Commands::Run { template, filters } => {
            let (filters, apply) = filters.resolve(engine).await?;
            outcome_json(&engine.run(template, &filters, apply).await?)
        }
        Commands::Sql { sql, filters } => {
            let (filters, apply) = filters.resolve(engine).await?;
            outcome_json(&engine.run_ad_hoc(&sql, &filters, apply).await?)
        }
        Commands::Dashboard { filters } => {
            let (filters, apply) = filters.resolve(engine).await?;
            let panels = engine
                .run_many(TemplateId::DASHBOARD, &filters, apply)
                .await?;
            serde_json::Value::Object(
                panels
                    .iter()
                    .map(|(id, outcome)| (id.to_string(), outcome_json(outcome)))
                    .collect(),
            )
        }
        Commands::Domain => serde_json::to_value(engine.filter_domain().await?)?,
    };
    Ok(output)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let cli = Cli::parse();

    let config = Config::new().map_err(|e| {
        error!("Failed to initialize config: {}", e);
        e
    })?;

    let templates = match &config.templates_json_path {
        Some(path) => TemplateStore::from_json_file(path).map_err(|e| {
            error!("Failed to load templates: {}", e);
            e
        })?,
        None => TemplateStore::builtin(),
    };

    let data_store = SqliteDataStore::open(&config.db_path).map_err(|e| {
        error!("Failed to open SqliteDataStore: {}", e);
        e
    })?;

    let cache = Arc::new(ResultCache::new(config.cache_ttl()));
    let engine = QueryEngine::new(templates, data_store, cache, EngineOptions::from(&config));

    match execute(cli.command, &engine).await {
        Ok(output) => println!("{}", serde_json::to_string_pretty(&output)?),
        Err(e) => {
            error!("Command failed: {}", e);
            eprintln!("error: {}", e);
            process::exit(1);
        }
    }

    Ok(())
}
