//! kpi-ledger operator CLI
//!
//! Writes single cells, reads series and rolling totals, and compacts
//! Parquet partitions.

use kpi_ledger::config::ComponentFactory;
use kpi_ledger::period::{normalize_start, DateRange, PeriodType};
use kpi_ledger::schema::{FieldChanges, MetricKey, Scope, ValueKind};
use kpi_ledger::store::{ObservationStore, PartitionKey};
use kpi_ledger::telemetry::Telemetry;
use kpi_ledger::{Ledger, StorageBackend, StorageConfig};

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{Args as ClapArgs, Parser, Subcommand};
use serde_json::json;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// kpi-ledger
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Storage backend (memory, local, s3)
    #[arg(long, env = "STORAGE_BACKEND", default_value = "memory")]
    storage_backend: StorageBackend,

    /// Root directory (local) or bucket (s3)
    #[arg(long, env = "STORAGE_LOCATION")]
    storage_location: Option<String>,

    /// Key prefix inside the storage location
    #[arg(long, env = "STORAGE_PREFIX", default_value = "kpi-ledger")]
    storage_prefix: String,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Set the plan or fact value of one cell
    Write {
        #[command(flatten)]
        scope: ScopeArgs,
        /// Metric id
        #[arg(long)]
        metric: String,
        #[arg(long, default_value = "month")]
        period: PeriodType,
        /// Any date inside the period (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,
        /// plan or fact
        #[arg(long)]
        kind: ValueKind,
        #[arg(long, allow_negative_numbers = true)]
        value: f64,
        /// Extra payload entries as name=<json>, repeatable
        #[arg(long = "extra")]
        extra: Vec<String>,
    },
    /// Read series for one or more metrics
    Read {
        #[command(flatten)]
        scope: ScopeArgs,
        /// Metric id, repeatable
        #[arg(long = "metric", required = true)]
        metrics: Vec<String>,
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
        /// Granularity the values were recorded at
        #[arg(long, default_value = "month")]
        native: PeriodType,
        /// Granularity to display
        #[arg(long, default_value = "month")]
        display: PeriodType,
    },
    /// Trailing-year totals compressed to 12 points
    Rolling {
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long)]
        metric: String,
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
        #[arg(long, default_value = "month")]
        native: PeriodType,
    },
    /// Fold partitions into single files with deletes applied
    Compact {
        /// Only compact this period
        #[arg(long)]
        period: Option<PeriodType>,
        /// Only compact this month (any date inside it)
        #[arg(long, requires = "period")]
        month: Option<NaiveDate>,
    },
}

#[derive(ClapArgs, Debug)]
struct ScopeArgs {
    /// Owning company id
    #[arg(long)]
    company: String,
    /// Narrow to one employee
    #[arg(long)]
    employee: Option<String>,
    /// Narrow to one department
    #[arg(long)]
    department: Option<String>,
}

impl ScopeArgs {
    fn key(&self, metric: &str) -> MetricKey {
        let mut scope = Scope::company(&self.company);
        scope.employee_id = self.employee.clone();
        scope.department_id = self.department.clone();
        MetricKey::new(metric, scope)
    }
}

fn parse_extra(raw: &[String]) -> anyhow::Result<FieldChanges> {
    let mut changes = FieldChanges::default();
    for entry in raw {
        let Some((name, value)) = entry.split_once('=') else {
            bail!("extra entry '{}' must look like name=<json>", entry);
        };
        // Bare words are taken as strings
        let value = serde_json::from_str(value)
            .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
        changes = changes.with_extra(name.trim(), value);
    }
    Ok(changes)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let _telemetry = Telemetry::init_for_component("kpi-ledger", &args.log_level)?;

    let storage_config = StorageConfig {
        backend: args.storage_backend,
        location: args.storage_location.clone(),
        prefix: args.storage_prefix.clone(),
    };
    let store = ComponentFactory::create_parquet_store(&storage_config)
        .await
        .context("opening observation store")?;

    let shutdown = CancellationToken::new();
    let ledger = Ledger::with_shutdown(
        store.clone() as Arc<dyn ObservationStore>,
        shutdown.clone(),
    );
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling");
            shutdown.cancel();
        }
    });

    match args.command {
        Command::Write {
            scope,
            metric,
            period,
            date,
            kind,
            value,
            extra,
        } => {
            let key = scope.key(&metric);
            let changes = parse_extra(&extra)?.with_value(kind, value);
            let row = ledger.upsert(&key, period, date, &changes).await?;
            println!("{}", serde_json::to_string_pretty(&row)?);
        }
        Command::Read {
            scope,
            metrics,
            from,
            to,
            native,
            display,
        } => {
            let keys: Vec<MetricKey> = metrics.iter().map(|m| scope.key(m)).collect();
            let range = DateRange::new(from, to);
            let series = ledger.read_series(&keys, range, native, display).await?;
            let layout = kpi_ledger::period::BucketLayout::new(range, display);
            let labels: Vec<String> = layout.labels().map(|d| d.to_string()).collect();

            let mut out = serde_json::Map::new();
            for key in &keys {
                if let Some(s) = series.get(key) {
                    out.insert(
                        key.metric_id.clone(),
                        json!({ "plan": s.plan, "fact": s.fact }),
                    );
                }
            }
            let body = json!({ "buckets": labels, "series": out });
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Command::Rolling {
            scope,
            metric,
            from,
            to,
            native,
        } => {
            let key = scope.key(&metric);
            let totals = ledger
                .read_rolling_totals(&key, DateRange::new(from, to), native)
                .await?;
            let body = json!({ "plan": totals.plan, "fact": totals.fact });
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Command::Compact { period, month } => {
            if storage_config.backend == StorageBackend::Memory {
                info!("Memory backend holds no persisted partitions");
            }
            let partitions: Vec<PartitionKey> = match (period, month) {
                (Some(period), Some(month)) => {
                    vec![PartitionKey::new(period, normalize_start(month, PeriodType::Month))]
                }
                (Some(period), None) => store
                    .partitions()
                    .await?
                    .into_iter()
                    .filter(|p| p.period == period)
                    .collect(),
                _ => store.partitions().await?,
            };

            for partition in partitions {
                let report = store.compact_partition(partition).await?;
                println!(
                    "{}\tfiles={}\ttombstones={}\tkept={}\tdropped={}",
                    partition,
                    report.files_merged,
                    report.tombstones_applied,
                    report.rows_kept,
                    report.rows_dropped
                );
            }
        }
    }

    Ok(())
}
