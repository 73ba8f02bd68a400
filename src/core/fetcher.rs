use crate::core::catalog;
use crate::core::features::{process_features, CountResponse, Feature, FieldMap, QueryResponse};
use crate::core::retry::RetryPolicy;
use crate::domain::model::{FetchProgress, FetchQuery, ParcelRecord, ProgressFn, Scope};
use crate::domain::ports::ConfigProvider;
use crate::utils::error::{ParcelError, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::{Duration, Instant};

/// Connection settings for a feature service layer.
#[derive(Debug, Clone)]
pub struct FetcherSettings {
    /// Layer URL, e.g. `.../FeatureServer/0`; queries go to `<endpoint>/query`
    pub endpoint: String,
    pub county: String,
    pub page_size: usize,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub requests_per_minute: Option<u32>,
    pub fields: FieldMap,
}

impl FetcherSettings {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            county: catalog::DEFAULT_COUNTY.to_string(),
            page_size: FetchQuery::DEFAULT_PAGE_SIZE,
            timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            requests_per_minute: None,
            fields: FieldMap::default(),
        }
    }

    pub fn from_config<C: ConfigProvider>(config: &C) -> Self {
        Self {
            endpoint: config.api_endpoint().to_string(),
            county: config.county().to_string(),
            page_size: config.page_size(),
            timeout: config.request_timeout(),
            retry: config.retry_policy(),
            requests_per_minute: config.requests_per_minute(),
            fields: config.field_map(),
        }
    }

    fn page_interval(&self) -> Option<Duration> {
        self.requests_per_minute
            .filter(|rpm| *rpm > 0)
            .map(|rpm| Duration::from_secs_f64(60.0 / rpm as f64))
    }
}

pub struct ParcelFetcher {
    client: Client,
    settings: FetcherSettings,
}

impl ParcelFetcher {
    pub fn new(settings: FetcherSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .user_agent(concat!("parcel-etl/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ParcelError::ConfigError {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &FetcherSettings {
        &self.settings
    }

    /// A query for `scope` using the configured page size.
    pub fn query(&self, scope: Scope) -> FetchQuery {
        FetchQuery::new(scope).with_page_size(self.settings.page_size)
    }

    fn query_url(&self) -> String {
        format!("{}/query", self.settings.endpoint.trim_end_matches('/'))
    }

    fn where_clause(&self, scope: &Scope) -> String {
        scope.where_clause(self.settings.fields.municipality_attribute())
    }

    /// Number of records matching `scope`, without fetching any bodies.
    /// Unmatched or rejected scopes count as 0.
    pub async fn record_count(&self, scope: &Scope) -> Result<usize> {
        let params = vec![
            ("where", self.where_clause(scope)),
            ("returnCountOnly", "true".to_string()),
            ("f", "json".to_string()),
        ];

        let response: CountResponse = match self.get_json("count query", &params).await {
            Ok(response) => response,
            // 格式錯誤的回應也視為查無資料
            Err(ParcelError::ServiceError { status: None, message, .. }) => {
                tracing::warn!("⚠️ Count query for {} returned an unusable body: {}", scope, message);
                return Ok(0);
            }
            Err(e) => return Err(e),
        };

        if let Some(fault) = response.error {
            tracing::warn!(
                "⚠️ Service rejected count query for {}: {}",
                scope,
                ParcelError::from(fault)
            );
            return Ok(0);
        }

        let count = response.count.unwrap_or(0) as usize;
        tracing::debug!("Service reports {} record(s) for {}", count, scope);
        Ok(count)
    }

    /// Distinct municipality names known to the service, sorted.
    pub async fn list_municipalities(&self) -> Result<Vec<String>> {
        let field = self.settings.fields.municipality_attribute().to_string();
        let params = vec![
            ("where", "1=1".to_string()),
            ("outFields", field.clone()),
            ("returnDistinctValues", "true".to_string()),
            ("returnGeometry", "false".to_string()),
            ("orderByFields", field.clone()),
            ("f", "json".to_string()),
        ];

        let response: QueryResponse = self.get_json("municipality query", &params).await?;
        if let Some(fault) = response.error {
            return Err(fault.into());
        }

        let mut names: Vec<String> = response
            .features
            .iter()
            .filter_map(|f| f.attributes.get(&field))
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        names.sort_by_key(|n| n.to_lowercase());
        names.dedup_by(|a, b| a.eq_ignore_ascii_case(b));
        Ok(names)
    }

    /// Pages through the layer until the scope is exhausted or the query's
    /// record limit is reached. Any page failure discards what was fetched.
    pub async fn fetch_features(
        &self,
        query: &FetchQuery,
        progress: Option<&ProgressFn>,
    ) -> Result<Vec<Feature>> {
        let limit = query.record_limit();
        let where_clause = self.where_clause(&query.scope);
        let interval = self.settings.page_interval();

        let mut features: Vec<Feature> = Vec::new();
        let mut offset = 0usize;
        let mut page = 0usize;
        let mut last_request: Option<Instant> = None;

        tracing::info!(
            "📡 Fetching {} (page size {}, limit {})",
            query.scope,
            query.page_size,
            limit.map_or_else(|| "none".to_string(), |l| l.to_string())
        );

        loop {
            let remaining = limit.map(|l| l.saturating_sub(features.len()));
            if remaining == Some(0) {
                break;
            }
            let requested = remaining.map_or(query.page_size, |r| r.min(query.page_size));

            // 限制每分鐘請求數
            if let (Some(interval), Some(last)) = (interval, last_request) {
                let elapsed = last.elapsed();
                if elapsed < interval {
                    tokio::time::sleep(interval - elapsed).await;
                }
            }
            last_request = Some(Instant::now());

            let params = vec![
                ("where", where_clause.clone()),
                ("outFields", "*".to_string()),
                ("returnGeometry", "true".to_string()),
                ("outSR", "4326".to_string()),
                ("orderByFields", "OBJECTID".to_string()),
                ("resultOffset", offset.to_string()),
                ("resultRecordCount", requested.to_string()),
                ("f", "json".to_string()),
            ];

            let label = format!("page {} (offset {})", page + 1, offset);
            let response: QueryResponse = self.get_json(&label, &params).await?;
            if let Some(fault) = response.error {
                return Err(fault.into());
            }

            let received = response.features.len();
            page += 1;
            offset += received;
            features.extend(response.features);
            if let Some(l) = limit {
                features.truncate(l);
            }

            tracing::debug!(
                "Page {} returned {} feature(s), {} accumulated",
                page,
                received,
                features.len()
            );
            if let Some(report) = progress {
                report(&FetchProgress {
                    page,
                    fetched: features.len(),
                    expected_total: query.expected_total,
                });
            }

            // 服務端若設定較小的 maxRecordCount，會回傳較少筆數但標記 exceededTransferLimit
            let more = match response.exceeded_transfer_limit {
                Some(exceeded) => exceeded,
                None => received >= requested,
            };
            if received == 0 || !more {
                break;
            }
        }

        if let Some(total) = query.expected_total {
            if query.max_records.is_none() && features.len() < total {
                tracing::warn!(
                    "⚠️ Service reported {} record(s) for {} but only {} were returned",
                    total,
                    query.scope,
                    features.len()
                );
            }
        }

        tracing::info!("✅ Fetched {} feature(s) in {} page(s)", features.len(), page);
        Ok(features)
    }

    /// `fetch_features` followed by feature-to-record mapping.
    pub async fn fetch_parcels(
        &self,
        query: &FetchQuery,
        progress: Option<&ProgressFn>,
    ) -> Result<Vec<ParcelRecord>> {
        let features = self.fetch_features(query, progress).await?;
        Ok(self.to_records(features))
    }

    pub fn to_records(&self, features: Vec<Feature>) -> Vec<ParcelRecord> {
        process_features(features, &self.settings.fields, &self.settings.county)
    }

    async fn get_json<T: DeserializeOwned>(&self, label: &str, params: &[(&str, String)]) -> Result<T> {
        self.settings
            .retry
            .run(label, |attempt| async move {
                if attempt > 1 {
                    tracing::debug!("Retrying {} (attempt {})", label, attempt);
                }
                self.send_once(params).await
            })
            .await
    }

    async fn send_once<T: DeserializeOwned>(&self, params: &[(&str, String)]) -> Result<T> {
        let url = self.query_url();
        tracing::debug!("Making API request to: {}", url);

        let response = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(ParcelError::network)?;

        let status = response.status();
        tracing::debug!("API response status: {}", status);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ParcelError::service(Some(status.as_u16()), excerpt(&body)));
        }

        let body = response.text().await.map_err(ParcelError::network)?;
        serde_json::from_str(&body).map_err(ParcelError::malformed)
    }
}

fn excerpt(body: &str) -> String {
    #[derive(Deserialize)]
    struct Fault {
        error: crate::core::features::ServiceFault,
    }

    if let Ok(Fault { error }) = serde_json::from_str::<Fault>(body) {
        return error.message;
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    trimmed.chars().take(200).collect()
}
