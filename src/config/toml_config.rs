use crate::core::catalog;
use crate::core::features::FieldMap;
use crate::core::retry::{self, RetryPolicy};
use crate::domain::model::FetchQuery;
use crate::domain::ports::ConfigProvider;
use crate::utils::error::{ParcelError, Result};
use crate::utils::validation::Validate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub service: ServiceConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    /// 欄位對應：parcel 欄位名稱 -> 服務端屬性名稱
    #[serde(default)]
    pub fields: HashMap<String, String>,
    pub monitoring: Option<MonitoringConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub endpoint: String,
    pub county: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub requests_per_minute: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchConfig {
    pub page_size: Option<usize>,
    pub retry_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub max_retry_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    pub data_dir: Option<String>,
    pub max_age_hours: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(ParcelError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| ParcelError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${PARCEL_API_URL})；未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ParcelError::ConfigError {
            message: format!("invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        crate::utils::validation::validate_url("service.endpoint", &self.service.endpoint)?;
        crate::utils::validation::validate_path("cache.data_dir", self.data_dir())?;

        if let Some(county) = &self.service.county {
            crate::utils::validation::validate_non_empty_string("service.county", county)?;
        }
        if let Some(timeout) = self.service.timeout_seconds {
            crate::utils::validation::validate_range("service.timeout_seconds", timeout, 1, 600)?;
        }
        if let Some(page_size) = self.fetch.page_size {
            crate::utils::validation::validate_range("fetch.page_size", page_size, 1, 5000)?;
        }
        if let Some(attempts) = self.fetch.retry_attempts {
            crate::utils::validation::validate_range("fetch.retry_attempts", attempts, 0, 10)?;
        }

        // 未知欄位名稱在此回報，field_map() 之後可直接使用
        FieldMap::from_overrides(&self.fields)?;

        Ok(())
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }
}

impl ConfigProvider for TomlConfig {
    fn api_endpoint(&self) -> &str {
        &self.service.endpoint
    }

    fn data_dir(&self) -> &str {
        self.cache.data_dir.as_deref().unwrap_or("data")
    }

    fn county(&self) -> &str {
        self.service.county.as_deref().unwrap_or(catalog::DEFAULT_COUNTY)
    }

    fn page_size(&self) -> usize {
        self.fetch.page_size.unwrap_or(FetchQuery::DEFAULT_PAGE_SIZE)
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.service.timeout_seconds.unwrap_or(60))
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.fetch.retry_attempts.unwrap_or(retry::DEFAULT_MAX_RETRIES),
            initial_delay: Duration::from_millis(
                self.fetch.retry_delay_ms.unwrap_or(retry::DEFAULT_INITIAL_DELAY_MS),
            ),
            max_delay: Duration::from_millis(
                self.fetch.max_retry_delay_ms.unwrap_or(retry::DEFAULT_MAX_DELAY_MS),
            ),
            multiplier: retry::DEFAULT_BACKOFF_MULTIPLIER,
        }
    }

    fn requests_per_minute(&self) -> Option<u32> {
        Some(
            self.service
                .requests_per_minute
                .unwrap_or(catalog::DEFAULT_REQUESTS_PER_MINUTE),
        )
        .filter(|rpm| *rpm > 0)
    }

    fn field_map(&self) -> FieldMap {
        FieldMap::from_overrides(&self.fields).unwrap_or_default()
    }

    fn cache_max_age(&self) -> Option<Duration> {
        Some(self.cache.max_age_hours.unwrap_or(catalog::DEFAULT_MAX_AGE_HOURS))
            .filter(|h| *h > 0)
            .map(|h| Duration::from_secs(h * 3600))
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
