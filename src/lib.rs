//! Fleet cost analytics: load a fleet workbook or database, clean and
//! classify every transaction, and compute the KPI cards and report tables
//! rendered by the CLI.

pub mod config;
pub mod database;
pub mod efficiency;
pub mod error;
pub mod filters;
pub mod kpi;
pub mod loader;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod provider;
pub mod reports;
pub mod types;
pub mod util;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{Error, Result};
