pub mod catalog;
pub mod etl;
pub mod export;
pub mod features;
pub mod fetcher;
pub mod filter;
pub mod pipeline;
pub mod retry;
pub mod store;

pub use crate::domain::model::{CacheEntry, FetchQuery, ParcelRecord, Scope};
pub use crate::domain::ports::{ConfigProvider, Pipeline, Storage};
pub use crate::utils::error::Result;
