//! Series catalog: which upstream series each source collects, under which
//! logical (column) name.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

use crate::domain::{is_identifier, SourceTag};

/// Adapter implementation serving a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdapterKind {
    #[serde(rename = "fred")]
    Fred,
    #[serde(rename = "nyfed")]
    NyFed,
    #[serde(rename = "file_drop")]
    FileDrop,
    #[serde(rename = "market")]
    Market,
    #[serde(rename = "bls")]
    Bls,
}

impl AdapterKind {
    /// Environment variable holding a credential the adapter cannot work without.
    pub fn required_credential(&self) -> Option<&'static str> {
        match self {
            Self::Fred => Some("FRED_API_KEY"),
            _ => None,
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fred => "fred",
            Self::NyFed => "nyfed",
            Self::FileDrop => "file_drop",
            Self::Market => "market",
            Self::Bls => "bls",
        })
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Column name in the raw snapshot and downstream panels.
    pub name: String,
    pub upstream_id: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl CatalogEntry {
    pub fn new(name: &str, upstream_id: &str) -> Self {
        Self {
            name: name.to_string(),
            upstream_id: upstream_id.to_string(),
            required: false,
            enabled: true,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCatalog {
    pub source: SourceTag,
    pub adapter: AdapterKind,
    #[serde(default)]
    pub series: Vec<CatalogEntry>,
}

impl SourceCatalog {
    pub fn enabled(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.series.iter().filter(|e| e.enabled)
    }

    pub fn has_required(&self) -> bool {
        self.enabled().any(|e| e.required)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("source '{0}' is listed more than once")]
    DuplicateSource(String),

    #[error("source '{tag}': logical name '{name}' is listed more than once")]
    DuplicateName { tag: String, name: String },

    #[error("source '{tag}': logical name '{name}' is not an identifier")]
    InvalidName { tag: String, name: String },

    #[error("unknown source '{0}'")]
    UnknownSource(String),
}

/// Read-only after load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub sources: Vec<SourceCatalog>,
}

fn tag(s: &'static str) -> SourceTag {
    SourceTag::from_static(s)
}

impl Catalog {
    /// Built-in catalog covering every series the standard indicators need,
    /// plus cross-checks from the NY Fed, BLS and market data.
    pub fn standard() -> Self {
        let fred = SourceCatalog {
            source: tag("fred"),
            adapter: AdapterKind::Fred,
            series: vec![
                CatalogEntry::new("RRPONTSYD", "RRPONTSYD"),
                CatalogEntry::new("WRESBAL", "WRESBAL"),
                CatalogEntry::new("GDP", "GDP"),
                CatalogEntry::new("UEMP27OV", "UEMP27OV"),
                CatalogEntry::new("UNEMPLOY", "UNEMPLOY"),
                CatalogEntry::new("UNRATE", "UNRATE"),
                CatalogEntry::new("JTSQUR", "JTSQUR"),
                CatalogEntry::new("JTSHIL", "JTSHIL"),
                CatalogEntry::new("JTSQUL", "JTSQUL"),
                CatalogEntry::new("JTSLDL", "JTSLDL"),
                CatalogEntry::new("DGS10", "DGS10").required(),
                CatalogEntry::new("DGS2", "DGS2").required(),
                CatalogEntry::new("DGS3MO", "DGS3MO"),
                CatalogEntry::new("SOFR", "SOFR"),
                CatalogEntry::new("EFFR", "EFFR"),
                CatalogEntry::new("BAMLH0A0HYM2", "BAMLH0A0HYM2").required(),
                CatalogEntry::new("SP500", "SP500"),
            ],
        };
        let nyfed = SourceCatalog {
            source: tag("nyfed"),
            adapter: AdapterKind::NyFed,
            series: vec![
                CatalogEntry::new("effr_rate", "rates/unsecured/effr:percentRate"),
                CatalogEntry::new("effr_volume", "rates/unsecured/effr:volumeInBillions"),
                CatalogEntry::new("sofr_rate", "rates/secured/sofr:percentRate"),
                CatalogEntry::new("rrp_accepted", "rp/reverserepo/propositions:totalAmtAccepted"),
            ],
        };
        let bls = SourceCatalog {
            source: tag("bls"),
            adapter: AdapterKind::Bls,
            series: vec![
                CatalogEntry::new("UNRATE", "LNS14000000"),
                CatalogEntry::new("PAYEMS", "CES0000000001"),
                CatalogEntry::new("JOLTS_QUITS_RATE", "JTS000000000000000QUR"),
            ],
        };
        let market = SourceCatalog {
            source: tag("market"),
            adapter: AdapterKind::Market,
            series: vec![
                CatalogEntry::new("SPX", "^GSPC"),
                CatalogEntry::new("VIX", "^VIX"),
                CatalogEntry::new("BTC_USD", "BTC-USD"),
            ],
        };
        let ofr = SourceCatalog {
            source: tag("ofr"),
            adapter: AdapterKind::FileDrop,
            series: vec![
                CatalogEntry::new("OFR_FSI", "ofr/fsi.csv:OFR FSI").disabled(),
                CatalogEntry::new("OFR_FSI_CREDIT", "ofr/fsi.csv:Credit").disabled(),
            ],
        };
        Self {
            sources: vec![fred, nyfed, bls, market, ofr],
        }
    }

    pub fn source(&self, tag: &str) -> Option<&SourceCatalog> {
        self.sources.iter().find(|s| s.source.as_str() == tag)
    }

    /// Catalog restricted to one source.
    pub fn only(&self, tag: &str) -> Result<Catalog, CatalogError> {
        let source = self
            .source(tag)
            .ok_or_else(|| CatalogError::UnknownSource(tag.to_string()))?;
        Ok(Catalog {
            sources: vec![source.clone()],
        })
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut tags = HashSet::new();
        for src in &self.sources {
            if !tags.insert(src.source.as_str()) {
                return Err(CatalogError::DuplicateSource(src.source.to_string()));
            }
            let mut names = HashSet::new();
            for entry in &src.series {
                if !is_identifier(&entry.name) {
                    return Err(CatalogError::InvalidName {
                        tag: src.source.to_string(),
                        name: entry.name.clone(),
                    });
                }
                if !names.insert(entry.name.as_str()) {
                    return Err(CatalogError::DuplicateName {
                        tag: src.source.to_string(),
                        name: entry.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}
