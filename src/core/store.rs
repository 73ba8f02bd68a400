use crate::domain::model::{CacheEntry, CacheSummary, ParcelRecord, Scope};
use crate::domain::ports::Storage;
use crate::utils::error::{ParcelError, Result};
use chrono::Utc;

const FILE_SUFFIX: &str = "_parcels.json";

/// Scope-keyed JSON cache of parcel records. Freshness is left to callers;
/// the store never expires anything on its own.
#[derive(Debug, Clone)]
pub struct ParcelStore<S: Storage> {
    storage: S,
}

impl<S: Storage> ParcelStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn file_name(scope: &Scope) -> String {
        format!("{}{}", scope.cache_key(), FILE_SUFFIX)
    }

    /// Saves `records` for `scope`, replacing any previous entry.
    pub async fn save(
        &self,
        scope: &Scope,
        records: Vec<ParcelRecord>,
        total_reported: Option<usize>,
        limit: Option<usize>,
    ) -> Result<CacheEntry> {
        if let Some(pos) = records.iter().position(|r| r.parcel_id.trim().is_empty()) {
            return Err(ParcelError::ValidationError {
                message: format!("record {} for {} has an empty parcel identifier", pos, scope),
            });
        }

        if let Some(total) = total_reported {
            if records.len() > total {
                return Err(ParcelError::ValidationError {
                    message: format!(
                        "{} record(s) exceed the {} reported by the service for {}",
                        records.len(),
                        total,
                        scope
                    ),
                });
            }
        }

        let entry = CacheEntry {
            scope: scope.clone(),
            fetched_at: Some(Utc::now()),
            total_reported,
            limit,
            records,
        };

        let data = serde_json::to_vec(&StoredEntry::from(&entry))?;
        let name = Self::file_name(scope);
        self.storage.write_file(&name, &data).await?;

        tracing::info!(
            "💾 Saved {} record(s) for {} to {} ({} bytes)",
            entry.records.len(),
            scope,
            name,
            data.len()
        );
        Ok(entry)
    }

    /// The saved entry for `scope`, or `None` when nothing is cached.
    pub async fn load(&self, scope: &Scope) -> Result<Option<CacheEntry>> {
        let name = Self::file_name(scope);
        let data = match self.storage.read_file(&name).await {
            Ok(data) => data,
            Err(ParcelError::IoError(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Cache miss for {} ({})", scope, name);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let entry = parse_entry(scope, &data)?;
        if entry.scope.cache_key() != scope.cache_key() {
            tracing::warn!(
                "⚠️ {} holds data for {}, not {}; ignoring it",
                name,
                entry.scope,
                scope
            );
            return Ok(None);
        }
        tracing::debug!("Cache hit for {}: {} record(s)", scope, entry.records.len());
        Ok(Some(entry))
    }

    /// Deletes the entry for `scope`; `false` if there was none.
    pub async fn invalidate(&self, scope: &Scope) -> Result<bool> {
        let removed = self.storage.delete_file(&Self::file_name(scope)).await?;
        if removed {
            tracing::info!("🗑️ Invalidated cached data for {}", scope);
        }
        Ok(removed)
    }

    /// Summaries of all readable entries. Unreadable files are skipped.
    pub async fn entries(&self) -> Result<Vec<CacheSummary>> {
        let mut summaries = Vec::new();
        for name in self.cache_files().await? {
            let data = match self.storage.read_file(&name).await {
                Ok(data) => data,
                Err(e) => {
                    tracing::warn!("⚠️ Skipping unreadable cache file {}: {}", name, e);
                    continue;
                }
            };
            match serde_json::from_slice::<SummaryHeader>(&data) {
                Ok(header) => summaries.push(header.into()),
                Err(_) => match scope_from_file_name(&name).map(|s| parse_entry(&s, &data)) {
                    Some(Ok(entry)) => summaries.push(entry.summary()),
                    _ => tracing::warn!("⚠️ Skipping unreadable cache file {}", name),
                },
            }
        }
        summaries.sort_by_key(|s| s.scope.cache_key());
        Ok(summaries)
    }

    /// Deletes every cache entry, returning how many were removed.
    pub async fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for name in self.cache_files().await? {
            if self.storage.delete_file(&name).await? {
                removed += 1;
            }
        }
        tracing::info!("🗑️ Cleared {} cache entr{}", removed, if removed == 1 { "y" } else { "ies" });
        Ok(removed)
    }

    async fn cache_files(&self) -> Result<Vec<String>> {
        Ok(self
            .storage
            .list_files()
            .await?
            .into_iter()
            .filter(|name| name.ends_with(FILE_SUFFIX))
            .collect())
    }
}

/// On-disk layout; `record_count` lets listings skip the record bodies.
#[derive(serde::Serialize)]
struct StoredEntry<'a> {
    scope: &'a Scope,
    fetched_at: Option<chrono::DateTime<Utc>>,
    total_reported: Option<usize>,
    limit: Option<usize>,
    record_count: usize,
    records: &'a [ParcelRecord],
}

impl<'a> From<&'a CacheEntry> for StoredEntry<'a> {
    fn from(entry: &'a CacheEntry) -> Self {
        Self {
            scope: &entry.scope,
            fetched_at: entry.fetched_at,
            total_reported: entry.total_reported,
            limit: entry.limit,
            record_count: entry.records.len(),
            records: &entry.records,
        }
    }
}

// 未列出的 records 欄位由 serde 直接略過
#[derive(serde::Deserialize)]
struct SummaryHeader {
    scope: Scope,
    fetched_at: Option<chrono::DateTime<Utc>>,
    total_reported: Option<usize>,
    #[serde(default)]
    limit: Option<usize>,
    record_count: usize,
}

impl From<SummaryHeader> for CacheSummary {
    fn from(header: SummaryHeader) -> Self {
        CacheSummary {
            scope: header.scope,
            fetched_at: header.fetched_at,
            total_reported: header.total_reported,
            limit: header.limit,
            record_count: header.record_count,
        }
    }
}

/// Only area files can be mapped back to a scope without an envelope.
fn scope_from_file_name(name: &str) -> Option<Scope> {
    let key = name.strip_suffix(FILE_SUFFIX)?;
    match key {
        "county" => Some(Scope::County),
        _ => Scope::area(key.strip_prefix("zip_")?).ok(),
    }
}

/// Accepts the envelope format, or a bare array of records (the plain data
/// file layout) which carries no timestamp.
fn parse_entry(scope: &Scope, data: &[u8]) -> Result<CacheEntry> {
    let value: serde_json::Value = serde_json::from_slice(data)?;
    if value.is_array() {
        let records: Vec<ParcelRecord> = serde_json::from_value(value)?;
        return Ok(CacheEntry {
            scope: scope.clone(),
            fetched_at: None,
            total_reported: None,
            limit: None,
            records,
        });
    }
    Ok(serde_json::from_value(value)?)
}
