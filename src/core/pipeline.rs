use crate::core::features::Feature;
use crate::core::fetcher::ParcelFetcher;
use crate::core::store::ParcelStore;
use crate::core::{Pipeline, Storage};
use crate::domain::model::{CacheEntry, FetchQuery, ParcelRecord, ProgressFn, Scope};
use crate::utils::error::Result;

/// Feature service in, scope-keyed JSON cache out.
pub struct ParcelPipeline<S: Storage> {
    fetcher: ParcelFetcher,
    store: ParcelStore<S>,
}

impl<S: Storage> ParcelPipeline<S> {
    pub fn new(fetcher: ParcelFetcher, storage: S) -> Self {
        Self {
            fetcher,
            store: ParcelStore::new(storage),
        }
    }

    pub fn fetcher(&self) -> &ParcelFetcher {
        &self.fetcher
    }

    pub fn store(&self) -> &ParcelStore<S> {
        &self.store
    }
}

#[async_trait::async_trait]
impl<S: Storage> Pipeline for ParcelPipeline<S> {
    async fn extract(
        &self,
        query: &FetchQuery,
        progress: Option<&ProgressFn>,
    ) -> Result<(Vec<Feature>, Option<usize>)> {
        let total = self.fetcher.record_count(&query.scope).await?;
        tracing::info!("🔢 Service reports {} record(s) for {}", total, query.scope);

        if total == 0 {
            return Ok((Vec::new(), Some(0)));
        }

        let query = query.clone().with_expected_total(Some(total));
        let features = self.fetcher.fetch_features(&query, progress).await?;
        Ok((features, Some(total)))
    }

    async fn transform(&self, features: Vec<Feature>) -> Result<Vec<ParcelRecord>> {
        let raw = features.len();
        let records = self.fetcher.to_records(features);
        if records.len() < raw {
            tracing::debug!(
                "Dropped {} feature(s) without a usable parcel identifier",
                raw - records.len()
            );
        }
        Ok(records)
    }

    async fn load(
        &self,
        query: &FetchQuery,
        records: Vec<ParcelRecord>,
        total_reported: Option<usize>,
    ) -> Result<CacheEntry> {
        // 上限不小於服務回報的總數時，資料其實是完整的
        let limit = query
            .max_records
            .filter(|max| total_reported.map_or(true, |total| *max < total));
        self.store
            .save(&query.scope, records, total_reported, limit)
            .await
    }

    async fn lookup(&self, scope: &Scope) -> Result<Option<CacheEntry>> {
        self.store.load(scope).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fetcher::FetcherSettings;
    use crate::core::retry::RetryPolicy;
    use crate::utils::error::ParcelError;
    use httpmock::prelude::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Mutex;

    #[derive(Clone)]
    struct MockStorage {
        files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    }

    impl MockStorage {
        fn new() -> Self {
            Self {
                files: Arc::new(Mutex::new(HashMap::new())),
            }
        }

        async fn get_file(&self, path: &str) -> Option<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned()
        }
    }

    impl Storage for MockStorage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned().ok_or_else(|| {
                ParcelError::IoError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path),
                ))
            })
        }

        async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
            let mut files = self.files.lock().await;
            files.insert(path.to_string(), data.to_vec());
            Ok(())
        }

        async fn delete_file(&self, path: &str) -> Result<bool> {
            let mut files = self.files.lock().await;
            Ok(files.remove(path).is_some())
        }

        async fn list_files(&self) -> Result<Vec<String>> {
            let files = self.files.lock().await;
            let mut names: Vec<String> = files.keys().cloned().collect();
            names.sort();
            Ok(names)
        }
    }

    fn pipeline(server: &MockServer, storage: MockStorage) -> ParcelPipeline<MockStorage> {
        let mut settings = FetcherSettings::new(server.url("/FeatureServer/0"));
        settings.page_size = 2;
        settings.retry = RetryPolicy::exponential(3, Duration::from_millis(1));
        ParcelPipeline::new(ParcelFetcher::new(settings).unwrap(), storage)
    }

    fn feature(id: &str) -> serde_json::Value {
        serde_json::json!({
            "attributes": {"PRINT_KEY": id, "PRIMARY_OWNER": "Smith, John", "MUNI_NAME": "Hunter"},
            "geometry": {"rings": [[[-74.0, 42.0], [-74.0, 42.1], [-74.1, 42.1], [-74.0, 42.0]]]}
        })
    }

    #[tokio::test]
    async fn test_extract_counts_then_fetches() {
        let server = MockServer::start();
        let count_mock = server.mock(|when, then| {
            when.method(GET)
                .path("/FeatureServer/0/query")
                .query_param("returnCountOnly", "true");
            then.status(200).json_body(serde_json::json!({"count": 3}));
        });
        let first = server.mock(|when, then| {
            when.method(GET)
                .path("/FeatureServer/0/query")
                .query_param("resultOffset", "0")
                .query_param("resultRecordCount", "2");
            then.status(200)
                .json_body(serde_json::json!({"features": [feature("1"), feature("2")]}));
        });
        let second = server.mock(|when, then| {
            when.method(GET)
                .path("/FeatureServer/0/query")
                .query_param("resultOffset", "2")
                .query_param("resultRecordCount", "1");
            then.status(200)
                .json_body(serde_json::json!({"features": [feature("3")]}));
        });

        let pipeline = pipeline(&server, MockStorage::new());
        let query = pipeline.fetcher().query(Scope::municipality("Hunter"));
        let (features, total) = pipeline.extract(&query, None).await.unwrap();

        count_mock.assert();
        first.assert();
        second.assert();
        assert_eq!(features.len(), 3);
        assert_eq!(total, Some(3));
    }

    #[tokio::test]
    async fn test_extract_skips_paging_when_count_is_zero() {
        let server = MockServer::start();
        let count_mock = server.mock(|when, then| {
            when.method(GET)
                .path("/FeatureServer/0/query")
                .query_param("returnCountOnly", "true");
            then.status(200).json_body(serde_json::json!({"count": 0}));
        });

        let pipeline = pipeline(&server, MockStorage::new());
        let query = pipeline.fetcher().query(Scope::municipality("Atlantis"));
        let (features, total) = pipeline.extract(&query, None).await.unwrap();

        count_mock.assert_hits(1);
        assert!(features.is_empty());
        assert_eq!(total, Some(0));
    }

    #[tokio::test]
    async fn test_load_then_lookup() {
        let server = MockServer::start();
        let storage = MockStorage::new();
        let pipeline = pipeline(&server, storage.clone());

        let features: Vec<Feature> =
            serde_json::from_value(serde_json::json!([feature("1"), feature("2")])).unwrap();
        let records = pipeline.transform(features).await.unwrap();
        assert_eq!(records.len(), 2);

        let query = FetchQuery::new(Scope::County).with_max_records(Some(2));
        let entry = pipeline.load(&query, records, Some(10)).await.unwrap();
        assert_eq!(entry.limit, Some(2));
        assert!(storage.get_file("county_parcels.json").await.is_some());

        let cached = pipeline.lookup(&Scope::County).await.unwrap().unwrap();
        assert_eq!(cached.records.len(), 2);
        assert_eq!(cached.total_reported, Some(10));
        assert!(pipeline.lookup(&Scope::municipality("Hunter")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_limit_above_reported_total_saves_complete_entry() {
        let server = MockServer::start();
        let pipeline = pipeline(&server, MockStorage::new());

        let features: Vec<Feature> =
            serde_json::from_value(serde_json::json!([feature("1")])).unwrap();
        let records = pipeline.transform(features).await.unwrap();

        let query = FetchQuery::new(Scope::County).with_max_records(Some(5000));
        let entry = pipeline.load(&query, records.clone(), Some(1)).await.unwrap();
        assert_eq!(entry.limit, None);
        assert!(entry.is_complete());

        let query = FetchQuery::new(Scope::County).with_max_records(Some(1));
        let entry = pipeline.load(&query, records, Some(1)).await.unwrap();
        assert_eq!(entry.limit, None);
    }
}
