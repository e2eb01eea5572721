//! Cached access to the clean fleet table.
//!
//! A cache hit returns the previously built table untouched. A miss (first
//! call, expired entry or after `clear`) re-reads the source and re-runs the
//! whole pipeline. Failures are never cached and surface as an empty table.
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{error, info};

use crate::database::read_database;
use crate::error::Result;
use crate::loader::{read_workbook, SheetNames};
use crate::pipeline::{build_records, PipelineOptions};
use crate::types::{FleetRecord, LoadReport};

pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
pub enum DataSource {
    Workbook { path: PathBuf, sheets: SheetNames },
    Database { path: PathBuf, query: Option<String> },
}

impl DataSource {
    pub fn describe(&self) -> String {
        match self {
            DataSource::Workbook { path, .. } => format!("workbook {}", path.display()),
            DataSource::Database { path, .. } => format!("database {}", path.display()),
        }
    }
}

struct CacheEntry {
    loaded_at: Instant,
    data: Arc<Vec<FleetRecord>>,
    report: LoadReport,
}

pub struct DataProvider {
    source: DataSource,
    options: PipelineOptions,
    ttl: Duration,
    cache: Mutex<Option<CacheEntry>>,
}

impl DataProvider {
    pub fn new(source: DataSource, options: PipelineOptions, ttl: Duration) -> Self {
        Self {
            source,
            options,
            ttl,
            cache: Mutex::new(None),
        }
    }

    pub fn source(&self) -> &DataSource {
        &self.source
    }

    fn lock(&self) -> MutexGuard<'_, Option<CacheEntry>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn load(&self) -> Result<(Vec<FleetRecord>, LoadReport)> {
        let tables = match &self.source {
            DataSource::Workbook { path, sheets } => read_workbook(path, sheets)?,
            DataSource::Database { path, query } => read_database(path, query.as_deref())?,
        };
        build_records(&tables, &self.options)
    }

    /// Cached table or a fresh build; errors propagate and are not cached.
    pub fn try_get_data(&self) -> Result<Arc<Vec<FleetRecord>>> {
        let mut cache = self.lock();
        if let Some(entry) = cache.as_ref() {
            if entry.loaded_at.elapsed() < self.ttl {
                return Ok(Arc::clone(&entry.data));
            }
        }
        let (records, report) = self.load()?;
        let data = Arc::new(records);
        info!(source = %self.source.describe(), rows = data.len(), "Cache refreshed");
        *cache = Some(CacheEntry {
            loaded_at: Instant::now(),
            data: Arc::clone(&data),
            report,
        });
        Ok(data)
    }

    /// Never fails: an error is reported and an empty table returned, which
    /// callers must read as "no data available".
    pub fn get_data(&self) -> Arc<Vec<FleetRecord>> {
        match self.try_get_data() {
            Ok(data) => data,
            Err(e) => {
                error!(source = %self.source.describe(), error = %e, "Failed to build fleet table");
                eprintln!("A critical error occurred while processing the data source: {}", e);
                Arc::new(Vec::new())
            }
        }
    }

    pub fn last_report(&self) -> Option<LoadReport> {
        self.lock().as_ref().map(|e| e.report.clone())
    }

    pub fn clear(&self) {
        *self.lock() = None;
        info!("Cache cleared");
    }
}
