//! Sandboxed Luau interpreter that turns component code into a render tree.
//!
//! Every render gets a fresh interpreter, so nothing one component does can
//! leak into the next.

use super::message::{Envelope, ErrorDetail, RenderOutput, RenderRequest, SandboxMessage};
use canvasforge_tree::{Value, ValueMap};
use mlua::{Lua, LuaSerdeExt, Table, VmState};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Lua heap limit per render: 1 MB.
pub const LUA_MEMORY_LIMIT_BYTES: usize = 1024 * 1024;

/// Wall-clock budget for one script. Below the channel deadline so a runaway
/// loop reports an error instead of a timeout.
pub const DEFAULT_SCRIPT_TIMEOUT: Duration = Duration::from_millis(4000);

/// Captured `print` lines kept per render.
pub const MAX_LOG_LINES: usize = 256;

/// Globals replaced with erroring stubs.
pub const BLOCKED_GLOBALS: [&str; 9] = [
    "io",
    "os",
    "require",
    "loadfile",
    "dofile",
    "debug",
    "getfenv",
    "setfenv",
    "loadstring",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SandboxLimits {
    pub memory_limit_bytes: usize,
    pub script_timeout: Duration,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            memory_limit_bytes: LUA_MEMORY_LIMIT_BYTES,
            script_timeout: DEFAULT_SCRIPT_TIMEOUT,
        }
    }
}

/// Handle one inbound envelope as an isolated context would.
///
/// Render requests always get a reply carrying the request's correlation id.
/// Unknown types get an error reply; anything else is not addressed to a
/// context and is dropped.
pub fn respond(envelope: &Envelope, limits: &SandboxLimits) -> Option<Envelope> {
    match &envelope.message {
        SandboxMessage::RenderRequest(request) => {
            let message = match render(request, limits) {
                Ok(output) => SandboxMessage::RenderResult(output),
                Err(detail) => SandboxMessage::Error(detail),
            };
            Some(envelope.reply(message))
        }
        SandboxMessage::Unknown { kind } => Some(envelope.reply(SandboxMessage::Error(
            ErrorDetail::new(format!("unsupported message type '{}'", kind)),
        ))),
        other => {
            tracing::debug!(kind = other.kind(), "context ignoring host-bound message");
            None
        }
    }
}

/// Run `request.code` in a fresh sandbox. The chunk's return value is the
/// rendered tree.
pub fn render(request: &RenderRequest, limits: &SandboxLimits) -> Result<RenderOutput, ErrorDetail> {
    let logs = Arc::new(Mutex::new(Vec::new()));
    let lua = create_render_state(logs.clone(), limits).map_err(|e| error_detail(&e))?;
    let tree = evaluate(&lua, request).map_err(|e| error_detail(&e))?;
    tree.check()
        .map_err(|reason| ErrorDetail::new(format!("render output cannot be stored: {}", reason)))?;
    let logs = std::mem::take(&mut *logs.lock().unwrap_or_else(PoisonError::into_inner));
    Ok(RenderOutput { tree, logs })
}

/// Sandbox, blocked globals, captured print, deadline, `h`, memory limit.
fn create_render_state(logs: Arc<Mutex<Vec<String>>>, limits: &SandboxLimits) -> mlua::Result<Lua> {
    let lua = Lua::new();
    lua.sandbox(true)?;
    let globals = lua.globals();

    for name in BLOCKED_GLOBALS {
        let msg = format!("'{}' is not available in component code", name);
        globals.set(
            name,
            lua.create_function(move |_, _: mlua::Variadic<mlua::Value>| {
                Err::<(), _>(mlua::Error::RuntimeError(msg.clone()))
            })?,
        )?;
    }

    let print = lua.create_function(move |lua, args: mlua::Variadic<mlua::Value>| {
        let tostring: mlua::Function = lua.globals().get("tostring")?;
        let mut parts = Vec::with_capacity(args.len());
        for arg in args {
            parts.push(tostring.call::<String>(arg)?);
        }
        let mut logs = logs.lock().unwrap_or_else(PoisonError::into_inner);
        if logs.len() < MAX_LOG_LINES {
            logs.push(parts.join("\t"));
        }
        Ok(())
    })?;
    globals.set("print", print)?;
    globals.set("h", lua.create_function(build_node)?)?;

    let deadline = Instant::now() + limits.script_timeout;
    let timeout_ms = limits.script_timeout.as_millis();
    lua.set_interrupt(move |_| {
        if Instant::now() >= deadline {
            return Err(mlua::Error::runtime(format!(
                "script deadline of {} ms exceeded",
                timeout_ms
            )));
        }
        Ok(VmState::Continue)
    });

    lua.set_memory_limit(limits.memory_limit_bytes)?;
    Ok(lua)
}

fn evaluate(lua: &Lua, request: &RenderRequest) -> mlua::Result<Value> {
    let globals = lua.globals();
    globals.set("props", frozen_table(lua, &request.props)?)?;
    globals.set("styles", frozen_table(lua, &request.styles)?)?;

    let result: mlua::Value = lua.load(request.code.as_str()).set_name("component").eval()?;
    lua.from_value(result)
}

/// Input map as a Lua table that scripts can read but not modify.
fn frozen_table(lua: &Lua, map: &ValueMap) -> mlua::Result<Table> {
    let table = lua.create_table()?;
    for (key, value) in map {
        table.set(key.as_str(), lua.to_value(value)?)?;
    }
    freeze(&table)?;
    Ok(table)
}

fn freeze(table: &Table) -> mlua::Result<()> {
    table.for_each::<mlua::Value, mlua::Value>(|_, value| match value {
        mlua::Value::Table(inner) => freeze(&inner),
        _ => Ok(()),
    })?;
    table.set_readonly(true);
    Ok(())
}

/// `h(type, props?, children?)`: build one render node.
///
/// `children` may be a list of nodes, a single node, or a scalar (text).
fn build_node(
    lua: &Lua,
    (kind, props, children): (String, Option<mlua::Value>, Option<mlua::Value>),
) -> mlua::Result<mlua::Value> {
    let props = match props {
        Some(v) => lua.from_value::<Value>(v)?,
        None => Value::Null,
    };
    let props = match props {
        Value::Map(map) => map,
        Value::Null => ValueMap::new(),
        Value::List(list) if list.is_empty() => ValueMap::new(),
        other => {
            return Err(mlua::Error::runtime(format!(
                "h: props must be a table, got {}",
                other.kind()
            )));
        }
    };

    let children = match children {
        Some(v) => lua.from_value::<Value>(v)?,
        None => Value::Null,
    };
    let children = match children {
        Value::Null => Vec::new(),
        Value::List(list) => list,
        Value::Map(map) if map.is_empty() => Vec::new(),
        single => vec![single],
    };

    let mut node = ValueMap::new();
    node.insert("type".to_string(), Value::String(kind));
    node.insert("props".to_string(), Value::Map(props));
    node.insert("children".to_string(), Value::List(children));
    lua.to_value(&Value::Map(node))
}

fn error_detail(err: &mlua::Error) -> ErrorDetail {
    match err {
        mlua::Error::CallbackError { traceback, cause } => ErrorDetail {
            error: error_detail(cause).error,
            stack: Some(traceback.clone()),
        },
        mlua::Error::RuntimeError(msg) => match msg.split_once("\nstack traceback:") {
            Some((message, stack)) => ErrorDetail {
                error: message.to_string(),
                stack: Some(format!("stack traceback:{}", stack)),
            },
            None => ErrorDetail::new(msg.clone()),
        },
        other => ErrorDetail::new(other.to_string()),
    }
}
