//! Master panel assembly: outer join of curated per-source panels on date.
//!
//! The first source (in input order) keeps bare column names; a later column
//! whose name is already taken becomes `<name>_<source>`. The joined panel
//! spans the earliest start to the latest end and is forward-filled.

use std::collections::HashSet;
use tracing::{debug, info};

use crate::domain::{daily_range, is_identifier, Panel, PanelColumn, SchemaError, SourceTag};

pub fn assemble(panels: &[(SourceTag, Panel)]) -> Result<Panel, SchemaError> {
    for (_, panel) in panels {
        panel.validate_daily()?;
    }
    let start = panels.iter().filter_map(|(_, p)| p.start()).min();
    let end = panels.iter().filter_map(|(_, p)| p.end()).max();
    let (Some(start), Some(end)) = (start, end) else {
        return Err(SchemaError::Empty("no curated panels to assemble".into()));
    };

    let mut names: HashSet<String> = HashSet::new();
    let mut columns: Vec<PanelColumn> = Vec::new();
    for (source, panel) in panels {
        let placed = panel.reindex_daily(start, end)?;
        for column in placed.columns() {
            let name = resolve_name(&column.name, source, &names)?;
            if name != column.name {
                debug!(column = %column.name, renamed = %name, source = %source, "column name collision");
            }
            names.insert(name.clone());
            columns.push(PanelColumn::new(name, column.values.clone()));
        }
    }

    let master = Panel::from_parts(daily_range(start, end), columns)?.forward_filled();
    master.validate_daily()?;
    info!(
        rows = master.height(),
        columns = master.width(),
        sources = panels.len(),
        "master panel assembled"
    );
    Ok(master)
}

fn resolve_name(name: &str, source: &SourceTag, taken: &HashSet<String>) -> Result<String, SchemaError> {
    if !is_identifier(name) {
        return Err(SchemaError::InvalidColumnName(name.to_string()));
    }
    if !taken.contains(name) {
        return Ok(name.to_string());
    }
    let suffixed = format!("{name}_{source}");
    if taken.contains(&suffixed) {
        return Err(SchemaError::DuplicateColumn(suffixed));
    }
    Ok(suffixed)
}
