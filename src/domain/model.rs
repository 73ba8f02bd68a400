use crate::core::catalog;
use crate::utils::error::{ParcelError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 單一地籍 (parcel) 的扁平記錄
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParcelRecord {
    pub parcel_id: String,
    #[serde(default)]
    pub sbl: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub mailing_address: String,
    #[serde(default)]
    pub mailing_city: String,
    #[serde(default)]
    pub mailing_state: String,
    #[serde(default)]
    pub mailing_zip: String,
    #[serde(default)]
    pub property_class: String,
    #[serde(default)]
    pub property_class_desc: String,
    #[serde(default)]
    pub acreage: f64,
    #[serde(default)]
    pub assessed_value: f64,
    #[serde(default)]
    pub land_value: f64,
    #[serde(default)]
    pub improvement_value: f64,
    #[serde(default)]
    pub municipality: String,
    #[serde(default)]
    pub county: String,
    #[serde(default)]
    pub school_district: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    /// Outer boundary ring as `[lat, lon]` pairs
    #[serde(default)]
    pub coordinates: Vec<[f64; 2]>,
}

/// 查詢範圍：全郡、單一鄉鎮或預定義的郵遞區
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scope {
    County,
    Municipality { name: String },
    Area { zip: String, town: String },
}

impl Scope {
    pub fn municipality(name: impl Into<String>) -> Self {
        Self::Municipality {
            name: name.into().trim().to_string(),
        }
    }

    pub fn area(zip: &str) -> Result<Self> {
        let area = catalog::find_area(zip).ok_or_else(|| ParcelError::InvalidConfigValueError {
            field: "zip".to_string(),
            value: zip.to_string(),
            reason: "not a predefined area".to_string(),
        })?;

        Ok(Self::Area {
            zip: area.zip.to_string(),
            town: area.town.to_string(),
        })
    }

    /// Stable, filesystem-safe key used to name the cache entry. Two scopes
    /// share a key only when they select the same parcels.
    pub fn cache_key(&self) -> String {
        match self {
            Self::County => "county".to_string(),
            Self::Municipality { name } => format!("muni_{}", slug(name)),
            Self::Area { zip, .. } => format!("zip_{}", zip),
        }
    }

    /// ArcGIS `where` clause for this scope, matching the municipality
    /// field case-insensitively.
    pub fn where_clause(&self, municipality_field: &str) -> String {
        let town = match self {
            Self::County => return "1=1".to_string(),
            Self::Municipality { name } => name,
            Self::Area { town, .. } => town,
        };

        format!(
            "UPPER({})='{}'",
            municipality_field,
            town.to_uppercase().replace('\'', "''")
        )
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::County => write!(f, "all parcels"),
            Self::Municipality { name } => write!(f, "municipality {}", name),
            Self::Area { zip, town } => write!(f, "ZIP {} ({})", zip, town),
        }
    }
}

/// Lowercases ASCII letters and digits, maps spaces to `_` and hex-escapes
/// every other byte as `-xx`, so distinct (case-folded) names never share a key.
fn slug(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.trim().to_uppercase().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if c == ' ' {
            out.push('_');
        } else {
            let mut buf = [0u8; 4];
            for b in c.encode_utf8(&mut buf).bytes() {
                out.push_str(&format!("-{:02x}", b));
            }
        }
    }
    out
}

/// 單次抓取的參數，不會被保存
#[derive(Debug, Clone, PartialEq)]
pub struct FetchQuery {
    pub scope: Scope,
    pub page_size: usize,
    pub max_records: Option<usize>,
    /// Total reported by the service's count query; an upper bound for the fetch
    pub expected_total: Option<usize>,
}

impl FetchQuery {
    pub const DEFAULT_PAGE_SIZE: usize = 1000;

    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            page_size: Self::DEFAULT_PAGE_SIZE,
            max_records: None,
            expected_total: None,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_max_records(mut self, max_records: Option<usize>) -> Self {
        self.max_records = max_records;
        self
    }

    pub fn with_expected_total(mut self, total: Option<usize>) -> Self {
        self.expected_total = total;
        self
    }

    /// The smaller of `max_records` and `expected_total`, when either is set.
    pub fn record_limit(&self) -> Option<usize> {
        match (self.max_records, self.expected_total) {
            (Some(max), Some(total)) => Some(max.min(total)),
            (max, total) => max.or(total),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchProgress {
    pub page: usize,
    pub fetched: usize,
    pub expected_total: Option<usize>,
}

pub type ProgressFn = dyn Fn(&FetchProgress) + Send + Sync;

/// 某個範圍的快取內容；同範圍的新抓取會整個覆蓋
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub scope: Scope,
    pub fetched_at: Option<DateTime<Utc>>,
    pub total_reported: Option<usize>,
    /// `max_records` the entry was fetched with; `None` means the full scope
    #[serde(default)]
    pub limit: Option<usize>,
    pub records: Vec<ParcelRecord>,
}

impl CacheEntry {
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn is_complete(&self) -> bool {
        self.limit.is_none()
    }

    pub fn age(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.fetched_at.map(|at| now - at)
    }

    pub fn summary(&self) -> CacheSummary {
        CacheSummary {
            scope: self.scope.clone(),
            fetched_at: self.fetched_at,
            total_reported: self.total_reported,
            limit: self.limit,
            record_count: self.records.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSummary {
    pub scope: Scope,
    pub fetched_at: Option<DateTime<Utc>>,
    pub total_reported: Option<usize>,
    pub limit: Option<usize>,
    pub record_count: usize,
}
