//! Domain types: series, panels, raw snapshots.

pub mod ident;
pub mod panel;
pub mod series;

pub use ident::is_identifier;
pub use panel::{daily_range, forward_fill, Panel, PanelColumn, RawSnapshot, SchemaError};
pub use series::{Frequency, InvalidSourceTag, Observation, Series, SourceTag};
