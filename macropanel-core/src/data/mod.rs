//! Data layer: provider adapters, collection, curation, assembly and the
//! on-disk store.

pub mod assemble;
pub mod bls;
pub mod catalog;
pub mod circuit_breaker;
pub mod collect;
pub mod curate;
pub mod dates;
pub mod file_drop;
pub mod fred;
pub mod http;
pub mod market;
pub mod nyfed;
pub mod provider;
pub mod rate_limit;
pub mod retry;
pub mod store;
pub mod table;

pub use assemble::assemble;
pub use bls::BlsProvider;
pub use catalog::{AdapterKind, Catalog, CatalogEntry, CatalogError, SourceCatalog};
pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use collect::{
    CollectError, CollectOptions, CollectProgress, CollectReport, Collector, LogProgress,
    ProviderSlot, SeriesReport, SeriesStatus, SnapshotMeta, DEFAULT_BATCH_SIZE,
};
pub use curate::{curate, CurationReport};
pub use dates::parse_date;
pub use file_drop::FileDropProvider;
pub use fred::FredProvider;
pub use http::{HttpClient, HttpSettings};
pub use market::MarketProvider;
pub use nyfed::NyFedProvider;
pub use provider::{FetchBatch, FetchError, FetchRange, SeriesMeta, SeriesProvider};
pub use rate_limit::{RateLimit, TokenBucket};
pub use retry::RetryPolicy;
pub use store::{
    run_stamp, DataStore, FileStatus, PublishedRaw, StorageError, StorageFormat, StoreStatus,
    TierStatus,
};
