use anyhow::Result;
use httpmock::prelude::*;
use parcel_etl::core::retry::RetryPolicy;
use parcel_etl::domain::model::FetchProgress;
use parcel_etl::{FetcherSettings, ParcelFetcher, Scope};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const QUERY_PATH: &str = "/FeatureServer/0/query";

fn features(start: usize, count: usize) -> Vec<serde_json::Value> {
    (start..start + count)
        .map(|i| {
            serde_json::json!({
                "attributes": {
                    "OBJECTID": i + 1,
                    "PRINT_KEY": format!("86.{}-1-{}", i / 100, i),
                    "PRIMARY_OWNER": format!("Owner {}", i % 37),
                    "MUNI_NAME": "Hunter",
                    "TOTAL_AV": 100000 + i,
                    "LAND_AV": 40000
                },
                "geometry": {"rings": [[[-74.2, 42.1], [-74.2, 42.2], [-74.3, 42.2], [-74.2, 42.1]]]}
            })
        })
        .collect()
}

fn fetcher(server: &MockServer, page_size: usize) -> ParcelFetcher {
    let mut settings = FetcherSettings::new(server.url("/FeatureServer/0"));
    settings.page_size = page_size;
    settings.retry = RetryPolicy::exponential(3, Duration::from_millis(1));
    ParcelFetcher::new(settings).unwrap()
}

/// 三頁 1000/1000/430，共 2430 筆、3 次請求
#[tokio::test]
async fn test_hunter_fetch_pages_until_short_page() -> Result<()> {
    let server = MockServer::start();
    let pages: Vec<_> = [(0, 1000), (1000, 1000), (2000, 430)]
        .into_iter()
        .map(|(offset, count)| {
            server.mock(|when, then| {
                when.method(GET)
                    .path(QUERY_PATH)
                    .query_param("where", "UPPER(MUNI_NAME)='HUNTER'")
                    .query_param("outSR", "4326")
                    .query_param("orderByFields", "OBJECTID")
                    .query_param("resultOffset", offset.to_string())
                    .query_param("resultRecordCount", "1000");
                then.status(200)
                    .json_body(serde_json::json!({"features": features(offset, count)}));
            })
        })
        .collect();

    let fetcher = fetcher(&server, 1000);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let progress = move |p: &FetchProgress| sink.lock().unwrap().push(p.fetched);

    let query = fetcher.query(Scope::municipality("Hunter"));
    let records = fetcher.fetch_parcels(&query, Some(&progress)).await?;

    for page in &pages {
        page.assert_hits(1);
    }
    assert_eq!(records.len(), 2430);
    let ids: HashSet<_> = records.iter().map(|r| r.parcel_id.as_str()).collect();
    assert_eq!(ids.len(), 2430);
    assert_eq!(*seen.lock().unwrap(), vec![1000, 2000, 2430]);
    assert_eq!(records[0].improvement_value, 60000.0);
    Ok(())
}

#[tokio::test]
async fn test_transfer_limit_flag_drives_paging() -> Result<()> {
    // 服務端上限 500，即使請求 1000 筆
    let server = MockServer::start();
    let first = server.mock(|when, then| {
        when.method(GET).path(QUERY_PATH).query_param("resultOffset", "0");
        then.status(200).json_body(serde_json::json!({
            "features": features(0, 500),
            "exceededTransferLimit": true
        }));
    });
    let second = server.mock(|when, then| {
        when.method(GET).path(QUERY_PATH).query_param("resultOffset", "500");
        then.status(200).json_body(serde_json::json!({
            "features": features(500, 500),
            "exceededTransferLimit": true
        }));
    });
    let third = server.mock(|when, then| {
        when.method(GET).path(QUERY_PATH).query_param("resultOffset", "1000");
        then.status(200).json_body(serde_json::json!({
            "features": features(1000, 200),
            "exceededTransferLimit": false
        }));
    });

    let fetcher = fetcher(&server, 1000);
    let features = fetcher.fetch_features(&fetcher.query(Scope::County), None).await?;

    first.assert_hits(1);
    second.assert_hits(1);
    third.assert_hits(1);
    assert_eq!(features.len(), 1200);
    Ok(())
}

#[tokio::test]
async fn test_expected_total_avoids_trailing_request() -> Result<()> {
    let server = MockServer::start();
    let first = server.mock(|when, then| {
        when.method(GET).path(QUERY_PATH).query_param("resultOffset", "0");
        then.status(200)
            .json_body(serde_json::json!({"features": features(0, 1000)}));
    });
    let second = server.mock(|when, then| {
        when.method(GET).path(QUERY_PATH).query_param("resultOffset", "1000");
        then.status(200)
            .json_body(serde_json::json!({"features": features(1000, 1000)}));
    });
    let trailing = server.mock(|when, then| {
        when.method(GET).path(QUERY_PATH).query_param("resultOffset", "2000");
        then.status(200).json_body(serde_json::json!({"features": []}));
    });

    let fetcher = fetcher(&server, 1000);
    let query = fetcher.query(Scope::County).with_expected_total(Some(2000));
    let features = fetcher.fetch_features(&query, None).await?;

    first.assert_hits(1);
    second.assert_hits(1);
    trailing.assert_hits(0);
    assert_eq!(features.len(), 2000);
    Ok(())
}

#[tokio::test]
async fn test_max_records_shrinks_final_page() -> Result<()> {
    let server = MockServer::start();
    let first = server.mock(|when, then| {
        when.method(GET)
            .path(QUERY_PATH)
            .query_param("resultOffset", "0")
            .query_param("resultRecordCount", "1000");
        then.status(200)
            .json_body(serde_json::json!({"features": features(0, 1000)}));
    });
    let last = server.mock(|when, then| {
        when.method(GET)
            .path(QUERY_PATH)
            .query_param("resultOffset", "1000")
            .query_param("resultRecordCount", "500");
        then.status(200)
            .json_body(serde_json::json!({"features": features(1000, 500)}));
    });

    let fetcher = fetcher(&server, 1000);
    let query = fetcher
        .query(Scope::County)
        .with_max_records(Some(1500))
        .with_expected_total(Some(2430));
    let records = fetcher.fetch_parcels(&query, None).await?;

    first.assert_hits(1);
    last.assert_hits(1);
    assert_eq!(records.len(), 1500);
    Ok(())
}

#[tokio::test]
async fn test_empty_scope_returns_no_records() -> Result<()> {
    let server = MockServer::start();
    let page = server.mock(|when, then| {
        when.method(GET).path(QUERY_PATH).query_param("resultOffset", "0");
        then.status(200).json_body(serde_json::json!({"features": []}));
    });

    let fetcher = fetcher(&server, 1000);
    let records = fetcher
        .fetch_parcels(&fetcher.query(Scope::municipality("Atlantis")), None)
        .await?;

    page.assert_hits(1);
    assert!(records.is_empty());
    Ok(())
}
