use crate::core::Pipeline;
use crate::domain::model::{CacheEntry, FetchQuery, ProgressFn};
use crate::utils::error::Result;
use crate::utils::monitor::ResourceMonitor;
use chrono::Utc;
use std::time::{Duration, Instant};

/// When a cached entry may stand in for a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub use_cache: bool,
    /// Entries older than this are fetched again; `None` never expires
    pub max_age: Option<Duration>,
}

impl CachePolicy {
    pub fn refresh() -> Self {
        Self {
            use_cache: false,
            max_age: None,
        }
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            use_cache: true,
            max_age: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataOrigin {
    Cache,
    Service,
}

pub struct EtlEngine<P: Pipeline> {
    pipeline: P,
    monitor: ResourceMonitor,
}

impl<P: Pipeline> EtlEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self {
            pipeline,
            monitor: ResourceMonitor::new(false),
        }
    }

    pub fn new_with_monitoring(pipeline: P, monitor: ResourceMonitor) -> Self {
        Self { pipeline, monitor }
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    /// Fetches the query's scope from the service and replaces its cache entry.
    /// Nothing is written when any page fails.
    pub async fn run(&self, query: &FetchQuery, progress: Option<&ProgressFn>) -> Result<CacheEntry> {
        tracing::info!("🚀 Starting parcel fetch for {}", query.scope);
        self.monitor.log_phase("start");
        let started = Instant::now();

        // Extract
        let phase = Instant::now();
        let (features, total) = self.pipeline.extract(query, progress).await?;
        tracing::info!("📥 Extracted {} feature(s) in {:?}", features.len(), phase.elapsed());
        self.monitor.log_phase("extract");

        // Transform
        let phase = Instant::now();
        let records = self.pipeline.transform(features).await?;
        tracing::info!("🔄 Transformed {} parcel record(s) in {:?}", records.len(), phase.elapsed());
        self.monitor.log_phase("transform");

        // Load
        let phase = Instant::now();
        let entry = self.pipeline.load(query, records, total).await?;
        tracing::info!("💾 Loaded {} record(s) in {:?}", entry.record_count(), phase.elapsed());
        self.monitor.log_phase("load");

        tracing::info!(
            "✅ Fetched {} record(s) for {} in {:?}",
            entry.record_count(),
            entry.scope,
            started.elapsed()
        );
        self.monitor.log_final();

        Ok(entry)
    }

    /// The cached entry when `policy` allows it, otherwise a fresh fetch.
    /// A failed fetch is returned as an error even if a stale entry exists.
    pub async fn load_or_fetch(
        &self,
        query: &FetchQuery,
        policy: CachePolicy,
        progress: Option<&ProgressFn>,
    ) -> Result<(CacheEntry, DataOrigin)> {
        if policy.use_cache {
            if let Some(entry) = self.pipeline.lookup(&query.scope).await? {
                if let Some(entry) = usable_entry(entry, query, policy) {
                    tracing::info!(
                        "📦 Using cached data for {} ({} record(s))",
                        query.scope,
                        entry.record_count()
                    );
                    return Ok((entry, DataOrigin::Cache));
                }
            }
        }

        let entry = self.run(query, progress).await?;
        Ok((entry, DataOrigin::Service))
    }
}

fn usable_entry(mut entry: CacheEntry, query: &FetchQuery, policy: CachePolicy) -> Option<CacheEntry> {
    if entry.scope.cache_key() != query.scope.cache_key() {
        tracing::warn!("⚠️ Cached data is for {}, not {}", entry.scope, query.scope);
        return None;
    }

    if let (Some(max_age), Some(age)) = (policy.max_age, entry.age(Utc::now())) {
        let expired = age
            .to_std()
            .map(|age| age > max_age)
            .unwrap_or(false);
        if expired {
            tracing::info!("⏰ Cached data for {} is older than {:?}", query.scope, max_age);
            return None;
        }
    }

    if entry.is_complete() {
        // 完整快取可以截斷後滿足有上限的查詢
        if let Some(max) = query.max_records {
            entry.records.truncate(max);
        }
        return Some(entry);
    }

    if entry.limit == query.max_records {
        Some(entry)
    } else {
        tracing::debug!(
            "Cached data for {} was limited to {:?} record(s), query wants {:?}",
            query.scope,
            entry.limit,
            query.max_records
        );
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::features::Feature;
    use crate::domain::model::{ParcelRecord, Scope};
    use crate::utils::error::ParcelError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakePipeline {
        cached: Mutex<Option<CacheEntry>>,
        fetch_ids: Vec<&'static str>,
        fail_extract: bool,
        extracts: AtomicUsize,
    }

    impl FakePipeline {
        fn new(cached: Option<CacheEntry>) -> Self {
            Self {
                cached: Mutex::new(cached),
                fetch_ids: vec!["1", "2", "3"],
                fail_extract: false,
                extracts: AtomicUsize::new(0),
            }
        }
    }

    fn record(id: &str) -> ParcelRecord {
        serde_json::from_value(serde_json::json!({"parcel_id": id})).unwrap()
    }

    fn entry(ids: &[&str], limit: Option<usize>, age_hours: i64) -> CacheEntry {
        CacheEntry {
            scope: Scope::County,
            fetched_at: Some(Utc::now() - chrono::Duration::hours(age_hours)),
            total_reported: Some(ids.len()),
            limit,
            records: ids.iter().map(|id| record(id)).collect(),
        }
    }

    #[async_trait::async_trait]
    impl Pipeline for FakePipeline {
        async fn extract(
            &self,
            _query: &FetchQuery,
            _progress: Option<&ProgressFn>,
        ) -> Result<(Vec<Feature>, Option<usize>)> {
            self.extracts.fetch_add(1, Ordering::SeqCst);
            if self.fail_extract {
                return Err(ParcelError::service(Some(503), "unavailable"));
            }
            let features = self
                .fetch_ids
                .iter()
                .map(|id| {
                    serde_json::from_value(serde_json::json!({"attributes": {"PRINT_KEY": id}}))
                        .unwrap()
                })
                .collect();
            Ok((features, Some(self.fetch_ids.len())))
        }

        async fn transform(&self, features: Vec<Feature>) -> Result<Vec<ParcelRecord>> {
            Ok(features
                .iter()
                .filter_map(|f| f.attributes.get("PRINT_KEY")?.as_str().map(record))
                .collect())
        }

        async fn load(
            &self,
            query: &FetchQuery,
            records: Vec<ParcelRecord>,
            total_reported: Option<usize>,
        ) -> Result<CacheEntry> {
            let entry = CacheEntry {
                scope: query.scope.clone(),
                fetched_at: Some(Utc::now()),
                total_reported,
                limit: query.max_records,
                records,
            };
            *self.cached.lock().unwrap() = Some(entry.clone());
            Ok(entry)
        }

        async fn lookup(&self, _scope: &Scope) -> Result<Option<CacheEntry>> {
            Ok(self.cached.lock().unwrap().clone())
        }
    }

    #[tokio::test]
    async fn test_run_extracts_transforms_and_loads() {
        let engine = EtlEngine::new(FakePipeline::new(None));
        let entry = engine.run(&FetchQuery::new(Scope::County), None).await.unwrap();

        assert_eq!(entry.record_count(), 3);
        assert_eq!(entry.total_reported, Some(3));
        assert!(engine.pipeline().cached.lock().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_fresh_cache_is_used_without_fetching() {
        let engine = EtlEngine::new(FakePipeline::new(Some(entry(&["a", "b"], None, 1))));
        let policy = CachePolicy {
            use_cache: true,
            max_age: Some(Duration::from_secs(24 * 3600)),
        };

        let (entry, origin) = engine
            .load_or_fetch(&FetchQuery::new(Scope::County), policy, None)
            .await
            .unwrap();

        assert_eq!(origin, DataOrigin::Cache);
        assert_eq!(entry.record_count(), 2);
        assert_eq!(engine.pipeline().extracts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_refresh_and_stale_cache_fetch_again() {
        let engine = EtlEngine::new(FakePipeline::new(Some(entry(&["a"], None, 1))));
        let (_, origin) = engine
            .load_or_fetch(&FetchQuery::new(Scope::County), CachePolicy::refresh(), None)
            .await
            .unwrap();
        assert_eq!(origin, DataOrigin::Service);

        let engine = EtlEngine::new(FakePipeline::new(Some(entry(&["a"], None, 48))));
        let policy = CachePolicy {
            use_cache: true,
            max_age: Some(Duration::from_secs(24 * 3600)),
        };
        let (entry, origin) = engine
            .load_or_fetch(&FetchQuery::new(Scope::County), policy, None)
            .await
            .unwrap();
        assert_eq!(origin, DataOrigin::Service);
        assert_eq!(entry.record_count(), 3);
    }

    #[tokio::test]
    async fn test_complete_cache_serves_limited_query() {
        let engine = EtlEngine::new(FakePipeline::new(Some(entry(&["a", "b", "c"], None, 0))));
        let query = FetchQuery::new(Scope::County).with_max_records(Some(2));

        let (entry, origin) = engine
            .load_or_fetch(&query, CachePolicy::default(), None)
            .await
            .unwrap();
        assert_eq!(origin, DataOrigin::Cache);
        assert_eq!(entry.record_count(), 2);
    }

    #[tokio::test]
    async fn test_limited_cache_does_not_serve_full_query() {
        let engine = EtlEngine::new(FakePipeline::new(Some(entry(&["a"], Some(1), 0))));

        let (entry, origin) = engine
            .load_or_fetch(&FetchQuery::new(Scope::County), CachePolicy::default(), None)
            .await
            .unwrap();
        assert_eq!(origin, DataOrigin::Service);
        assert_eq!(entry.record_count(), 3);
    }

    #[tokio::test]
    async fn test_cache_for_another_scope_is_not_used() {
        let engine = EtlEngine::new(FakePipeline::new(Some(entry(&["a"], None, 0))));
        let query = FetchQuery::new(Scope::municipality("New Baltimore"));

        let (entry, origin) = engine
            .load_or_fetch(&query, CachePolicy::default(), None)
            .await
            .unwrap();
        assert_eq!(origin, DataOrigin::Service);
        assert_eq!(entry.scope, Scope::municipality("New Baltimore"));
        assert_eq!(engine.pipeline().extracts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_does_not_fall_back_to_stale_cache() {
        let mut pipeline = FakePipeline::new(Some(entry(&["a"], None, 48)));
        pipeline.fail_extract = true;
        let engine = EtlEngine::new(pipeline);
        let policy = CachePolicy {
            use_cache: true,
            max_age: Some(Duration::from_secs(3600)),
        };

        let result = engine.load_or_fetch(&FetchQuery::new(Scope::County), policy, None).await;
        assert!(result.is_err());
        assert_eq!(
            engine.pipeline().cached.lock().unwrap().as_ref().unwrap().record_count(),
            1
        );
    }
}
