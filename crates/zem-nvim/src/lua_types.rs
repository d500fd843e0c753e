//! Lua conversions for zem-core types

use crate::error::IntoLuaResult;
use mlua::prelude::*;
use zem_core::context::Completion;
use zem_core::{Entry, Location, MatchFormat, RebuildSummary};

/// Entry as handed to Lua, together with its rendered result line
pub struct EntryLua<'a> {
    pub entry: &'a Entry,
    pub format: MatchFormat,
}

impl IntoLua for EntryLua<'_> {
    fn into_lua(self, lua: &Lua) -> LuaResult<LuaValue> {
        let entry = self.entry;
        let table = lua.create_table()?;
        table.set("name", entry.name.as_str())?;
        table.set("kind", entry.kind.as_str())?;
        table.set("file", entry.file.as_str())?;
        table.set("extra", entry.extra())?;
        table.set("location", entry.location_string())?;
        if let Some(line) = entry.location.as_ref().and_then(Location::line) {
            table.set("line", line)?;
        }
        table.set("priority", entry.priority)?;
        table.set("subpriority", entry.subpriority)?;
        table.set("text", self.format.format(entry))?;
        Ok(LuaValue::Table(table))
    }
}

pub fn entries_into_lua(lua: &Lua, entries: &[Entry], format: MatchFormat) -> LuaResult<LuaValue> {
    let table = lua.create_table_with_capacity(entries.len(), 0)?;
    for (i, entry) in entries.iter().enumerate() {
        table.set(i + 1, EntryLua { entry, format })?;
    }
    Ok(LuaValue::Table(table))
}

/// Read back an entry table produced by [`EntryLua`] (or written by hand)
pub fn entry_from_lua(table: &LuaTable) -> LuaResult<Entry> {
    let extra: Option<String> = table.get("extra")?;
    let location: Option<String> = table.get("location")?;

    Entry::from_raw(
        table.get::<String>("name")?,
        table.get::<String>("kind")?,
        table.get::<String>("file")?,
        extra.as_deref(),
        location.as_deref(),
        table.get::<Option<i64>>("priority")?.unwrap_or_default(),
        table.get::<Option<i64>>("subpriority")?.unwrap_or_default(),
    )
    .into_lua_result()
}

pub fn completion_into_lua(lua: &Lua, completion: Completion) -> LuaResult<LuaTable> {
    let table = lua.create_table()?;
    table.set("word", completion.word)?;
    table.set("menu", completion.menu)?;
    table.set("info", completion.info)?;
    Ok(table)
}

/// Summary of a rebuild, with the status lines the prompt window shows
pub fn summary_into_lua(lua: &Lua, summary: RebuildSummary) -> LuaResult<LuaTable> {
    let mut lines = Vec::with_capacity(summary.kind_counts.len() + summary.failures.len() + 1);
    lines.push(format!(
        "Found {} elements in {:.3} seconds",
        summary.count,
        summary.elapsed.as_secs_f64()
    ));
    lines.extend(
        summary
            .kind_counts
            .iter()
            .map(|(kind, count)| format!(" {kind:20} {count:5}")),
    );
    lines.extend(
        summary
            .failures
            .iter()
            .map(|failure| format!("Source {} failed: {}", failure.source, failure.error)),
    );

    let failures = lua.create_table()?;
    for (i, failure) in summary.failures.into_iter().enumerate() {
        let row = lua.create_table()?;
        row.set("source", failure.source)?;
        row.set("error", failure.error)?;
        failures.set(i + 1, row)?;
    }

    let table = lua.create_table()?;
    table.set("count", summary.count)?;
    table.set("generation", summary.generation)?;
    table.set("elapsed", summary.elapsed.as_secs_f64())?;
    table.set("lines", lines)?;
    table.set("failures", failures)?;
    Ok(table)
}
