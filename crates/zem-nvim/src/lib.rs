use error::IntoLuaResult;
use lua_types::{completion_into_lua, entries_into_lua, entry_from_lua, summary_into_lua};
use mimalloc::MiMalloc;
use mlua::prelude::*;
use once_cell::sync::Lazy;
use registry::{FetchPoll, FetchSlots, IndexRegistry};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use zem_core::format::open_command;
use zem_core::{FullConfig, MatchFormat, QueryParser, clauses_to_string, option_values};

mod error;
mod lua_types;
mod registry;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

// lua functions are plain fn pointers, the session state has to be global
static INDEXES: Lazy<IndexRegistry> = Lazy::new(IndexRegistry::default);
static FETCHES: Lazy<FetchSlots> = Lazy::new(FetchSlots::default);
static NEXT_TICKET: AtomicU64 = AtomicU64::new(1);

fn match_format(name: Option<LuaValue>, fallback: MatchFormat) -> MatchFormat {
    match name {
        Some(LuaValue::String(ref s)) => s
            .to_str()
            .map(|s| MatchFormat::from_name(&s))
            .unwrap_or(fallback),
        _ => fallback,
    }
}

pub fn init_tracing(
    _: &Lua,
    (log_file_path, log_level): (String, Option<String>),
) -> LuaResult<String> {
    zem_core::log::init_tracing(&log_file_path, log_level.as_deref())
        .map_err(|e| LuaError::RuntimeError(format!("Failed to initialize tracing: {}", e)))
}

/// Returns true when the index was not open before
pub fn open_index(_: &Lua, path: String) -> LuaResult<bool> {
    let (index, opened) = INDEXES.open(Path::new(&path)).into_lua_result()?;
    if opened {
        ::tracing::info!(root = %index.root().display(), "Index ready");
    }
    Ok(opened)
}

pub fn close_index(_: &Lua, path: String) -> LuaResult<bool> {
    let path = PathBuf::from(path);
    if let Ok(index) = INDEXES.get(&path) {
        FETCHES.forget(index.root());
    }
    INDEXES.close(&path).into_lua_result()
}

/// Blocking query, the whole result when no limit is given
pub fn get_matches(
    lua: &Lua,
    (path, query, limit): (String, String, Option<usize>),
) -> LuaResult<LuaValue> {
    let index = INDEXES.get(Path::new(&path)).into_lua_result()?;
    let matches = index.search(&query, limit).into_lua_result()?;
    entries_into_lua(lua, &matches, index.match_format())
}

/// Queue a query for the prompt and return its ticket for [`poll_matches`].
///
/// Whatever is still running or queued for this index is interrupted first, the
/// user has typed past it.
pub fn fetch_matches(
    _: &Lua,
    (path, query, limit): (String, String, Option<usize>),
) -> LuaResult<u64> {
    let index = INDEXES.get(Path::new(&path)).into_lua_result()?;
    let limit = limit.unwrap_or(index.config().result_count);
    let root = index.root().to_path_buf();
    let ticket = NEXT_TICKET.fetch_add(1, Ordering::Relaxed);

    index.interrupt_pending();
    FETCHES.begin(&root, ticket);

    index
        .query_async(&query, Some(limit), move |result| {
            FETCHES.complete(&root, ticket, result)
        })
        .into_lua_result()?;

    ::tracing::debug!(ticket, query = %query, "Fetch queued");
    Ok(ticket)
}

/// `nil` while the fetch runs, `false` when a newer fetch replaced it, the
/// matches otherwise. A result is handed out once.
pub fn poll_matches(lua: &Lua, (path, ticket): (String, u64)) -> LuaResult<LuaValue> {
    let index = INDEXES.get(Path::new(&path)).into_lua_result()?;

    match FETCHES.poll(index.root(), ticket) {
        FetchPoll::Pending => Ok(LuaValue::Nil),
        FetchPoll::Superseded => Ok(LuaValue::Boolean(false)),
        FetchPoll::Ready(Ok(matches)) => entries_into_lua(lua, &matches, index.match_format()),
        FetchPoll::Ready(Err(e)) => Err(LuaError::RuntimeError(e)),
    }
}

pub fn interrupt(_: &Lua, path: String) -> LuaResult<bool> {
    let index = INDEXES.get(Path::new(&path)).into_lua_result()?;
    index.interrupt();
    Ok(true)
}

/// Rebuild from the configured sources, blocking until the new generation is live
pub fn update_index(lua: &Lua, path: String) -> LuaResult<LuaTable> {
    let index = INDEXES.get(Path::new(&path)).into_lua_result()?;
    let summary = index.rebuild().into_lua_result()?;
    summary_into_lua(lua, summary)
}

pub fn get_types(_: &Lua, path: String) -> LuaResult<Vec<String>> {
    let index = INDEXES.get(Path::new(&path)).into_lua_result()?;
    index.kinds().into_lua_result()
}

pub fn get_stats(lua: &Lua, path: String) -> LuaResult<LuaTable> {
    let index = INDEXES.get(Path::new(&path)).into_lua_result()?;
    let counts = index.kind_counts().into_lua_result()?;

    let table = lua.create_table_with_capacity(counts.len(), 0)?;
    for (i, (kind, count)) in counts.into_iter().enumerate() {
        let row = lua.create_table()?;
        row.set("kind", kind)?;
        row.set("count", count)?;
        table.set(i + 1, row)?;
    }
    Ok(table)
}

pub fn get_size(_: &Lua, path: String) -> LuaResult<u64> {
    let index = INDEXES.get(Path::new(&path)).into_lua_result()?;
    index.len().into_lua_result()
}

pub fn get_completions(
    lua: &Lua,
    (path, query, limit): (String, String, Option<usize>),
) -> LuaResult<LuaTable> {
    let index = INDEXES.get(Path::new(&path)).into_lua_result()?;
    let matches = index.search(&query, limit).into_lua_result()?;

    let table = lua.create_table_with_capacity(matches.len(), 0)?;
    for (i, completion) in index.completions(&matches).into_iter().enumerate() {
        table.set(i + 1, completion_into_lua(lua, completion)?)?;
    }
    Ok(table)
}

/// `-tab`, `-prev` and friends: option words of the query, in order
pub fn query_options(_: &Lua, query: String) -> LuaResult<Vec<String>> {
    let clauses = QueryParser::new(FullConfig).parse(&query);
    Ok(option_values(&clauses).map(str::to_string).collect())
}

/// Normalized query text, as shown while a fetch is running
pub fn render_query(_: &Lua, query: String) -> LuaResult<String> {
    let clauses = QueryParser::new(FullConfig).parse(&query);
    Ok(clauses_to_string(&clauses))
}

pub fn format_match(
    _: &Lua,
    (entry, format): (LuaTable, Option<LuaValue>),
) -> LuaResult<String> {
    let entry = entry_from_lua(&entry)?;
    Ok(match_format(format, MatchFormat::default()).format(&entry))
}

/// Ex command that opens `entry` at its location, e.g. `edit +12 src/main.c`
pub fn get_open_command(_: &Lua, (command, entry): (String, LuaTable)) -> LuaResult<String> {
    let entry = entry_from_lua(&entry)?;
    Ok(open_command(&command, &entry))
}

pub fn preview(_: &Lua, (path, entry): (String, LuaTable)) -> LuaResult<String> {
    let index = INDEXES.get(Path::new(&path)).into_lua_result()?;
    let entry = entry_from_lua(&entry)?;
    Ok(index.preview(&entry))
}

/// Version and per-index database health
pub fn health_check(lua: &Lua, _: ()) -> LuaResult<LuaValue> {
    let table = lua.create_table()?;
    table.set("version", env!("CARGO_PKG_VERSION"))?;

    let indexes_info = lua.create_table()?;
    for (i, index) in INDEXES.open_indexes().into_iter().enumerate() {
        let info = lua.create_table()?;
        info.set("root", index.root().to_string_lossy().to_string())?;

        let stats = index.serializer_stats();
        info.set("jobs_completed", stats.completed)?;
        info.set("jobs_failed", stats.failed)?;
        info.set("jobs_dropped", stats.dropped)?;

        match index.health() {
            Ok(health) => {
                let healthcheck_table = lua.create_table()?;
                healthcheck_table.set("path", health.path.to_string_lossy().to_string())?;
                healthcheck_table.set("disk_size", health.disk_size)?;
                for (name, count) in health.entry_counts {
                    healthcheck_table.set(name, count)?;
                }
                if let Some(generation) = health.generation {
                    healthcheck_table.set("generation", generation.generation)?;
                    healthcheck_table.set("built_at", generation.built_at.to_rfc3339())?;
                }
                info.set("db_healthcheck", healthcheck_table)?;
            }
            Err(e) => {
                info.set("db_healthcheck_error", e.to_string())?;
            }
        }

        indexes_info.set(i + 1, info)?;
    }
    table.set("indexes", indexes_info)?;

    Ok(LuaValue::Table(table))
}

pub fn cleanup(_: &Lua, _: ()) -> LuaResult<bool> {
    INDEXES.close_all();
    Ok(true)
}

fn create_exports(lua: &Lua) -> LuaResult<LuaTable> {
    let exports = lua.create_table()?;
    exports.set("init_tracing", lua.create_function(init_tracing)?)?;
    exports.set("open_index", lua.create_function(open_index)?)?;
    exports.set("close_index", lua.create_function(close_index)?)?;
    exports.set("get_matches", lua.create_function(get_matches)?)?;
    exports.set("fetch_matches", lua.create_function(fetch_matches)?)?;
    exports.set("poll_matches", lua.create_function(poll_matches)?)?;
    exports.set("interrupt", lua.create_function(interrupt)?)?;
    exports.set("update_index", lua.create_function(update_index)?)?;
    exports.set("get_types", lua.create_function(get_types)?)?;
    exports.set("get_stats", lua.create_function(get_stats)?)?;
    exports.set("get_size", lua.create_function(get_size)?)?;
    exports.set("get_completions", lua.create_function(get_completions)?)?;
    exports.set("query_options", lua.create_function(query_options)?)?;
    exports.set("render_query", lua.create_function(render_query)?)?;
    exports.set("format_match", lua.create_function(format_match)?)?;
    exports.set("open_command", lua.create_function(get_open_command)?)?;
    exports.set("preview", lua.create_function(preview)?)?;
    exports.set("health_check", lua.create_function(health_check)?)?;
    exports.set("cleanup", lua.create_function(cleanup)?)?;

    Ok(exports)
}

// https://github.com/mlua-rs/mlua/issues/318
#[mlua::lua_module(skip_memory_check)]
fn zem_nvim(lua: &Lua) -> LuaResult<LuaTable> {
    // panics must reach the log even if init_tracing is never called
    zem_core::log::install_panic_hook();

    create_exports(lua)
}
