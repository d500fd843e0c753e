//! zem_core errors at the Lua boundary

use zem_core::Error as CoreError;

/// Log `err` once and turn it into a Lua runtime error carrying its message.
/// Transient conditions (timeouts, interrupted or dropped queries) are only
/// worth a debug line.
pub fn to_lua_error(err: CoreError) -> mlua::Error {
    if err.is_transient() {
        ::tracing::debug!(error = %err, "Lua call gave up");
    } else {
        ::tracing::error!(error = %err, "Lua call failed");
    }
    mlua::Error::RuntimeError(err.to_string())
}

/// `?`-friendly conversion of `zem_core::Result` inside Lua callbacks
pub trait IntoLuaResult<T> {
    fn into_lua_result(self) -> mlua::Result<T>;
}

impl<T> IntoLuaResult<T> for zem_core::Result<T> {
    fn into_lua_result(self) -> mlua::Result<T> {
        self.map_err(to_lua_error)
    }
}
