use crate::core::features::{Feature, FieldMap};
use crate::core::retry::RetryPolicy;
use crate::domain::model::{CacheEntry, FetchQuery, ParcelRecord, ProgressFn, Scope};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::time::Duration;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    /// Returns `false` when there was nothing to delete.
    fn delete_file(&self, path: &str) -> impl std::future::Future<Output = Result<bool>> + Send;
    fn list_files(&self) -> impl std::future::Future<Output = Result<Vec<String>>> + Send;
}

pub trait ConfigProvider: Send + Sync {
    fn api_endpoint(&self) -> &str;
    fn data_dir(&self) -> &str;
    fn county(&self) -> &str;
    fn page_size(&self) -> usize;
    fn request_timeout(&self) -> Duration;
    fn retry_policy(&self) -> RetryPolicy;
    fn requests_per_minute(&self) -> Option<u32>;
    fn field_map(&self) -> FieldMap;
    fn cache_max_age(&self) -> Option<Duration>;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(
        &self,
        query: &FetchQuery,
        progress: Option<&ProgressFn>,
    ) -> Result<(Vec<Feature>, Option<usize>)>;
    async fn transform(&self, features: Vec<Feature>) -> Result<Vec<ParcelRecord>>;
    async fn load(
        &self,
        query: &FetchQuery,
        records: Vec<ParcelRecord>,
        total_reported: Option<usize>,
    ) -> Result<CacheEntry>;
    async fn lookup(&self, scope: &Scope) -> Result<Option<CacheEntry>>;
}
