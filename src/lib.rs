pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use config::cli::LocalStorage;
pub use config::toml_config::TomlConfig;
#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use core::{
    etl::{CachePolicy, DataOrigin, EtlEngine},
    fetcher::{FetcherSettings, ParcelFetcher},
    pipeline::ParcelPipeline,
    store::ParcelStore,
};
pub use domain::model::{CacheEntry, FetchQuery, ParcelRecord, Scope};
pub use utils::error::{ParcelError, Result};
