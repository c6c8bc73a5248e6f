//! macropanel core: series and panel types, the transform library, provider
//! adapters, collection, curation, panel assembly, the three-tier store and
//! the composite indicator engine.
//!
//! - Domain types (`Series`, `Panel`, `RawSnapshot`) and their invariants
//! - Pure transforms over date-aligned `f64` columns
//! - Blocking provider adapters with retry, rate limiting and circuit breaking
//! - Collector, curator and assembler producing the master panel
//! - Indicator engine deriving LCI, LFI, LDI, YFS, CLG, SVI, EMD and MRI

pub mod cancel;
pub mod data;
pub mod domain;
pub mod indicators;
pub mod transforms;
