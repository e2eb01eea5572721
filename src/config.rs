//! Command-line and environment configuration.
//!
//! Every option can also come from the environment (or a `.env` file loaded
//! before parsing). The database location is treated as a secret: it is only
//! read from here and never logged in full.
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::filters::{FilterParams, Selection};
use crate::kpi::CostMetric;
use crate::loader::SheetNames;
use crate::normalize::normalize_fuel_type;
use crate::pipeline::PipelineOptions;
use crate::provider::DataSource;

#[derive(Parser, Debug, Clone)]
#[command(name = "fleet_report")]
#[command(about = "Fleet maintenance and fuel cost reports", long_about = None)]
pub struct Args {
    /// Source workbook (.xlsx, .xlsb, .xls or .ods)
    #[arg(long, env = "FLEET_WORKBOOK", default_value = "data/raw/Evolução.xlsb")]
    pub workbook: PathBuf,

    /// SQLite database; takes precedence over the workbook when set
    #[arg(long, env = "FLEET_DATABASE", hide_env_values = true)]
    pub database: Option<PathBuf>,

    /// Custom transaction query for the database source
    #[arg(long, env = "FLEET_QUERY")]
    pub query: Option<String>,

    #[arg(long, env = "FLEET_TRANSACTIONS_SHEET", default_value = "BD 2023")]
    pub transactions_sheet: String,

    #[arg(long, env = "FLEET_FLEET_SHEET", default_value = "FROTA")]
    pub fleet_sheet: String,

    #[arg(long, env = "FLEET_BRANCHES_SHEET", default_value = "Filiais")]
    pub branches_sheet: String,

    /// How long a loaded table stays valid
    #[arg(long, env = "FLEET_CACHE_TTL_SECS", default_value_t = 3600)]
    pub cache_ttl_secs: u64,

    /// Keep only transactions from this year
    #[arg(long, env = "FLEET_RESTRICT_YEAR")]
    pub restrict_year: Option<i32>,

    /// Year used to compute vehicle age (defaults to the current year)
    #[arg(long, env = "FLEET_REFERENCE_YEAR")]
    pub reference_year: Option<i32>,

    /// Directory for CSV/JSON exports
    #[arg(short, long, env = "FLEET_OUTPUT_DIR", default_value = "reports")]
    pub output_dir: PathBuf,

    #[arg(long)]
    pub year: Option<i32>,

    /// Month as YYYY-MM; requires --year
    #[arg(long)]
    pub month: Option<String>,

    #[arg(long)]
    pub region: Option<String>,

    #[arg(long)]
    pub branch: Option<String>,

    #[arg(long)]
    pub fuel_type: Option<String>,

    /// Cost column for the performance cards: total, maintenance or fuel
    #[arg(long, default_value = "total")]
    pub metric: String,

    /// Rows shown per table preview
    #[arg(long, default_value_t = 5)]
    pub preview_rows: usize,

    /// Generate the reports once and exit instead of showing the menu
    #[arg(long)]
    pub batch: bool,
}

impl Args {
    pub fn source(&self) -> DataSource {
        match &self.database {
            Some(path) => DataSource::Database {
                path: path.clone(),
                query: self.query.clone(),
            },
            None => DataSource::Workbook {
                path: self.workbook.clone(),
                sheets: SheetNames {
                    transactions: self.transactions_sheet.clone(),
                    fleet: self.fleet_sheet.clone(),
                    branches: self.branches_sheet.clone(),
                },
            },
        }
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        let defaults = PipelineOptions::default();
        PipelineOptions {
            restrict_year: self.restrict_year,
            reference_year: self.reference_year.unwrap_or(defaults.reference_year),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn metric(&self) -> Result<CostMetric> {
        self.metric.parse()
    }

    /// Filters from the command line. A month without a year is rejected,
    /// matching the menu where months are only offered once a year is picked.
    pub fn filters(&self) -> Result<FilterParams> {
        let upper = |v: &Option<String>| v.as_ref().map(|s| s.trim().to_uppercase());
        if self.month.is_some() && self.year.is_none() {
            return Err(Error::Config("--month requires --year".to_string()));
        }
        if let Some(m) = &self.month {
            if crate::util::parse_month_key(m).is_none() {
                return Err(Error::Config(format!("invalid month '{}', expected YYYY-MM", m)));
            }
        }
        Ok(FilterParams {
            year: Selection::from(self.year),
            month: Selection::from(self.month.as_ref().map(|m| m.trim().to_string())),
            region: Selection::from(upper(&self.region)),
            branch: Selection::from(upper(&self.branch)),
            fuel_type: Selection::from(self.fuel_type.as_deref().map(normalize_fuel_type)),
        })
    }
}
