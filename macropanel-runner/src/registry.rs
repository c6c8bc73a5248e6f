//! Adapter registry: one provider per configured source.
//!
//! Sources whose adapter cannot be built (missing credential, HTTP client
//! construction failure) are registered as unavailable with the reason, so
//! the collector can mark their series skipped.

use std::collections::BTreeMap;
use tracing::{debug, warn};

use macropanel_core::cancel::CancelToken;
use macropanel_core::data::{
    AdapterKind, BlsProvider, FileDropProvider, FredProvider, HttpClient, MarketProvider,
    NyFedProvider, ProviderSlot, SeriesProvider, SourceCatalog,
};
use macropanel_core::domain::SourceTag;

use crate::config::{Credentials, PipelineConfig, BLS_API_KEY_ENV, FRED_API_KEY_ENV};

enum Entry {
    Ready(Box<dyn SeriesProvider>),
    Unavailable(String),
}

#[derive(Default)]
pub struct AdapterRegistry {
    entries: BTreeMap<String, Entry>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an adapter for every source in the config.
    pub fn build(config: &PipelineConfig, credentials: &Credentials, cancel: &CancelToken) -> Self {
        let mut registry = Self::new();
        for source in &config.sources {
            let tag = source.source.as_str().to_string();
            match build_provider(source, config, credentials, cancel) {
                Ok(provider) => {
                    debug!(source = %tag, adapter = %source.adapter, "adapter ready");
                    registry.entries.insert(tag, Entry::Ready(provider));
                }
                Err(reason) => {
                    warn!(source = %tag, adapter = %source.adapter, %reason, "adapter unavailable");
                    registry.entries.insert(tag, Entry::Unavailable(reason));
                }
            }
        }
        registry
    }

    /// Register (or replace) the provider for a source.
    pub fn with_provider(mut self, source: &str, provider: Box<dyn SeriesProvider>) -> Self {
        self.entries.insert(source.to_string(), Entry::Ready(provider));
        self
    }

    pub fn with_unavailable(mut self, source: &str, reason: impl Into<String>) -> Self {
        self.entries
            .insert(source.to_string(), Entry::Unavailable(reason.into()));
        self
    }

    pub fn slot(&self, source: &str) -> ProviderSlot<'_> {
        match self.entries.get(source) {
            Some(Entry::Ready(provider)) => ProviderSlot::Ready(provider.as_ref()),
            Some(Entry::Unavailable(reason)) => ProviderSlot::Unavailable(reason.clone()),
            None => ProviderSlot::Unavailable(format!("no adapter registered for '{source}'")),
        }
    }

    pub fn is_ready(&self, source: &str) -> bool {
        matches!(self.entries.get(source), Some(Entry::Ready(_)))
    }
}

fn build_provider(
    source: &SourceCatalog,
    config: &PipelineConfig,
    credentials: &Credentials,
    cancel: &CancelToken,
) -> Result<Box<dyn SeriesProvider>, String> {
    if let Some(var) = source.adapter.required_credential() {
        if credentials.get(var).is_none() {
            return Err(format!("{var} not set"));
        }
    }

    let tag = source.source.clone();
    if source.adapter == AdapterKind::FileDrop {
        return Ok(Box::new(FileDropProvider::new(tag, config.resolved_drop_dir())));
    }

    let http = HttpClient::new(config.http_for(tag.as_str()), cancel.clone())
        .map_err(|e| format!("HTTP client: {e}"))?;
    let provider: Box<dyn SeriesProvider> = match source.adapter {
        AdapterKind::Fred => {
            let key = credentials.get(FRED_API_KEY_ENV).unwrap_or_default();
            Box::new(FredProvider::new(tag, key, http))
        }
        AdapterKind::NyFed => Box::new(nyfed_provider(config, tag, http)),
        AdapterKind::Market => Box::new(market_provider(config, tag, http)),
        AdapterKind::Bls => Box::new(BlsProvider::new(
            tag,
            credentials.get(BLS_API_KEY_ENV).map(str::to_string),
            http,
        )),
        AdapterKind::FileDrop => Box::new(FileDropProvider::new(tag, config.resolved_drop_dir())),
    };
    Ok(provider)
}

// Unbounded fetches start at the configured history start.
fn nyfed_provider(config: &PipelineConfig, tag: SourceTag, http: HttpClient) -> NyFedProvider {
    let provider = NyFedProvider::new(tag, http);
    match config.history_start {
        Some(start) => provider.with_history_start(start),
        None => provider,
    }
}

fn market_provider(config: &PipelineConfig, tag: SourceTag, http: HttpClient) -> MarketProvider {
    let provider = MarketProvider::new(tag, http);
    match config.history_start {
        Some(start) => provider.with_history_start(start),
        None => provider,
    }
}
