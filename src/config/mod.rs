pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
use crate::core::catalog;
#[cfg(feature = "cli")]
use crate::core::export::ExportFormat;
#[cfg(feature = "cli")]
use crate::core::features::FieldMap;
#[cfg(feature = "cli")]
use crate::core::retry::RetryPolicy;
#[cfg(feature = "cli")]
use crate::domain::model::Scope;
#[cfg(feature = "cli")]
use crate::domain::ports::ConfigProvider;
#[cfg(feature = "cli")]
use crate::utils::error::{ParcelError, Result};
#[cfg(feature = "cli")]
use crate::utils::validation::{self, Validate};
#[cfg(feature = "cli")]
use clap::{ArgGroup, Parser};
#[cfg(feature = "cli")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "cli")]
use std::time::Duration;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(name = "parcel-etl")]
#[command(about = "Fetch, cache and export Greene County tax parcels")]
#[command(group(ArgGroup::new("scope").args(["all", "zip", "municipality"]).multiple(false)))]
pub struct CliConfig {
    /// Every parcel in the county (default scope)
    #[arg(long)]
    pub all: bool,

    /// Predefined ZIP code area, e.g. 12450
    #[arg(long)]
    pub zip: Option<String>,

    /// Municipality name, e.g. Hunter
    #[arg(short, long)]
    pub municipality: Option<String>,

    /// List municipalities and predefined areas, then exit
    #[arg(long)]
    pub list: bool,

    /// Print the service's record count for the scope, then exit
    #[arg(long)]
    pub count: bool,

    #[arg(long)]
    pub max_records: Option<usize>,

    /// Ignore cached data and fetch again
    #[arg(long)]
    pub refresh: bool,

    /// Delete the cached entry for the scope, then exit
    #[arg(long)]
    pub invalidate: bool,

    /// Show cached entries, then exit
    #[arg(long)]
    pub cache_info: bool,

    #[arg(long, value_enum)]
    pub export: Option<ExportFormat>,

    /// Export destination (defaults to <output>/<scope>.<ext>)
    #[arg(long)]
    pub export_path: Option<String>,

    /// Filter exported records by owner name or parcel id
    #[arg(long)]
    pub search: Option<String>,

    /// Print the N largest owners by acreage
    #[arg(long)]
    pub top_owners: Option<usize>,

    /// TOML file with service, fetch and cache settings (replaces the flags below)
    #[arg(short, long)]
    pub config: Option<String>,

    #[arg(long, default_value = catalog::DEFAULT_ENDPOINT)]
    pub api_endpoint: String,

    /// Data directory for cached parcels
    #[arg(short = 'o', long = "output", default_value = "data")]
    pub output_path: String,

    #[arg(long, default_value = catalog::DEFAULT_COUNTY)]
    pub county: String,

    #[arg(long, default_value = "1000")]
    pub page_size: usize,

    #[arg(long, default_value = "60")]
    pub timeout_seconds: u64,

    #[arg(long, default_value = "3")]
    pub retry_attempts: u32,

    #[arg(long, default_value = "500")]
    pub retry_delay_ms: u64,

    /// 0 disables request pacing
    #[arg(long, default_value_t = catalog::DEFAULT_REQUESTS_PER_MINUTE)]
    pub requests_per_minute: u32,

    /// Cached data older than this is fetched again; 0 keeps it forever
    #[arg(long, default_value_t = catalog::DEFAULT_MAX_AGE_HOURS)]
    pub max_age_hours: u64,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub json_logs: bool,

    #[arg(long, help = "Log CPU and memory usage per phase")]
    pub monitor: bool,
}

#[cfg(feature = "cli")]
impl CliConfig {
    pub fn scope(&self) -> Result<Scope> {
        if let Some(zip) = &self.zip {
            return Scope::area(zip.trim());
        }
        if let Some(name) = &self.municipality {
            return Ok(Scope::municipality(name.as_str()));
        }
        Ok(Scope::County)
    }
}

#[cfg(feature = "cli")]
impl ConfigProvider for CliConfig {
    fn api_endpoint(&self) -> &str {
        &self.api_endpoint
    }

    fn data_dir(&self) -> &str {
        &self.output_path
    }

    fn county(&self) -> &str {
        &self.county
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(self.retry_attempts, Duration::from_millis(self.retry_delay_ms))
    }

    fn requests_per_minute(&self) -> Option<u32> {
        Some(self.requests_per_minute).filter(|rpm| *rpm > 0)
    }

    fn field_map(&self) -> FieldMap {
        FieldMap::default()
    }

    fn cache_max_age(&self) -> Option<Duration> {
        Some(self.max_age_hours)
            .filter(|h| *h > 0)
            .map(|h| Duration::from_secs(h * 3600))
    }
}

#[cfg(feature = "cli")]
impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_url("api_endpoint", &self.api_endpoint)?;
        validation::validate_path("output", &self.output_path)?;
        validation::validate_non_empty_string("county", &self.county)?;
        validation::validate_range("page_size", self.page_size, 1, 5000)?;
        validation::validate_range("timeout_seconds", self.timeout_seconds, 1, 600)?;
        validation::validate_range("retry_attempts", self.retry_attempts, 0, 10)?;

        if let Some(zip) = &self.zip {
            validation::validate_zip("zip", zip.trim())?;
        }
        if let Some(name) = &self.municipality {
            validation::validate_non_empty_string("municipality", name)?;
        }
        if self.max_records == Some(0) {
            return Err(ParcelError::InvalidConfigValueError {
                field: "max_records".to_string(),
                value: "0".to_string(),
                reason: "Value must be at least 1".to_string(),
            });
        }
        if let Some(path) = &self.export_path {
            validation::validate_path("export_path", path)?;
        }

        Ok(())
    }
}

#[cfg(all(test, feature = "cli"))]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> std::result::Result<CliConfig, clap::Error> {
        CliConfig::try_parse_from(std::iter::once("parcel-etl").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.scope().unwrap(), Scope::County);
        assert_eq!(config.data_dir(), "data");
        assert_eq!(config.page_size(), 1000);
        assert_eq!(config.retry_policy().max_attempts(), 4);
        assert_eq!(config.requests_per_minute(), Some(30));
        assert_eq!(config.cache_max_age(), Some(Duration::from_secs(168 * 3600)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_scope_flags() {
        let config = parse(&["--municipality", "Hunter"]).unwrap();
        assert_eq!(config.scope().unwrap(), Scope::municipality("Hunter"));

        let config = parse(&["--zip", "12450"]).unwrap();
        assert_eq!(config.scope().unwrap().cache_key(), "zip_12450");
    }

    #[test]
    fn test_scope_flags_are_exclusive() {
        assert!(parse(&["--all", "--municipality", "Hunter"]).is_err());
        assert!(parse(&["--zip", "12450", "-m", "Hunter"]).is_err());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(parse(&["--zip", "90210"]).unwrap().validate().is_err());
        assert!(parse(&["--page-size", "0"]).unwrap().validate().is_err());
        assert!(parse(&["--max-records", "0"]).unwrap().validate().is_err());
        assert!(parse(&["--api-endpoint", "ftp://x"]).unwrap().validate().is_err());
    }

    #[test]
    fn test_zero_disables_pacing_and_expiry() {
        let config = parse(&["--requests-per-minute", "0", "--max-age-hours", "0"]).unwrap();
        assert_eq!(config.requests_per_minute(), None);
        assert_eq!(config.cache_max_age(), None);
    }
}
