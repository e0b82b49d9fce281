//! One-shot script execution in a fresh, restricted Lua state

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mlua::{Function, HookTriggers, Lua, LuaOptions, MultiValue, StdLib, Value, VmState};
use tracing::debug;

use super::marshal::{format_error_payload, marshal_with_budget};
use super::SandboxLimits;
use crate::types::ExecutionMessage;

/// Chunk name used in Lua error positions (`main.lua:3: ...`)
const CHUNK_NAME: &str = "=main.lua";

/// Globals removed from the base library
const BLOCKED_GLOBALS: &[&str] = &["dofile", "loadfile"];

const OUTPUT_LIMIT_MESSAGE: &str = "output limit exceeded";

/// Printed lines, capped by line count and total bytes
struct OutputBuffer {
    lines: Vec<String>,
    bytes: usize,
    max_lines: usize,
    max_bytes: usize,
}

impl OutputBuffer {
    fn new(limits: &SandboxLimits) -> Self {
        Self {
            lines: Vec::new(),
            bytes: 0,
            max_lines: limits.max_output_lines,
            max_bytes: limits.max_output_bytes,
        }
    }

    fn push(&mut self, line: String) -> bool {
        if self.lines.len() >= self.max_lines || self.bytes + line.len() > self.max_bytes {
            return false;
        }
        self.bytes += line.len();
        self.lines.push(line);
        true
    }
}

/// Run `script` and classify how it ended.
///
/// Output is every printed line in order, followed by either the marshaled
/// top-level value (if not nil) or one error message. `abort` is polled by
/// the instruction hook; once set, the script fails at the next check.
pub fn execute_script(
    script: &str,
    limits: &SandboxLimits,
    abort: &Arc<AtomicBool>,
) -> Vec<ExecutionMessage> {
    let printed = Rc::new(RefCell::new(OutputBuffer::new(limits)));

    let lua = match create_state(limits, abort, &printed) {
        Ok(lua) => lua,
        Err(err) => return vec![ExecutionMessage::error(err.to_string())],
    };

    let chunk = match lua.load(script).set_name(CHUNK_NAME).into_function() {
        Ok(chunk) => chunk,
        Err(err) => {
            // Abnormal status: the raw payload, serialized
            let payload = err.to_string();
            let text = serde_json::to_string(&payload).unwrap_or(payload);
            return vec![ExecutionMessage::error(text)];
        }
    };

    let outcome = run_protected(&lua, chunk);

    let mut messages: Vec<ExecutionMessage> = printed
        .borrow_mut()
        .lines
        .drain(..)
        .map(ExecutionMessage::printed)
        .collect();

    match outcome {
        Ok((true, value)) => {
            let payload = marshal_with_budget(&value, limits.max_marshal_nodes);
            if !payload.is_nil() {
                messages.push(ExecutionMessage::Value { payload });
            }
        }
        Ok((false, error)) => messages.push(ExecutionMessage::error(format_error_payload(&error))),
        Err(err) => messages.push(ExecutionMessage::error(err.to_string())),
    }

    debug!(messages = messages.len(), "script finished");
    messages
}

fn create_state(
    limits: &SandboxLimits,
    abort: &Arc<AtomicBool>,
    printed: &Rc<RefCell<OutputBuffer>>,
) -> mlua::Result<Lua> {
    let libs = StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::UTF8 | StdLib::COROUTINE;
    let lua = Lua::new_with(libs, LuaOptions::default())?;

    let globals = lua.globals();
    for name in BLOCKED_GLOBALS {
        globals.set(*name, Value::Nil)?;
    }

    let sink = Rc::clone(printed);
    let print = lua.create_function(move |lua, args: MultiValue| {
        let tostring: Function = lua.globals().get("tostring")?;
        let mut parts = Vec::with_capacity(args.len());
        for arg in args {
            parts.push(tostring.call::<String>(arg)?);
        }
        if sink.borrow_mut().push(parts.join("\t")) {
            Ok(())
        } else {
            Err(mlua::Error::runtime(OUTPUT_LIMIT_MESSAGE))
        }
    })?;
    globals.set("print", print)?;

    if let Some(bytes) = limits.memory_limit_bytes {
        lua.set_memory_limit(bytes)?;
    }

    let abort = Arc::clone(abort);
    lua.set_hook(
        HookTriggers::new().every_nth_instruction(limits.instruction_interval.max(1)),
        move |_lua, _debug| {
            if abort.load(Ordering::Relaxed) {
                Err(mlua::Error::runtime("execution aborted"))
            } else {
                Ok(VmState::Continue)
            }
        },
    );

    Ok(lua)
}

/// Call `chunk` through the global `pcall` so error payloads keep their
/// original Lua value. Returns (succeeded, first result or error value).
fn run_protected(lua: &Lua, chunk: Function) -> mlua::Result<(bool, Value)> {
    let pcall: Function = lua.globals().get("pcall")?;
    let results: MultiValue = pcall.call(chunk)?;

    let mut results = results.into_iter();
    let ok = matches!(results.next(), Some(Value::Boolean(true)));
    let value = results.next().unwrap_or(Value::Nil);
    Ok((ok, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{compile_source, CompilerOptions};
    use crate::sandbox::MarshaledValue;

    fn run(script: &str) -> Vec<ExecutionMessage> {
        execute_script(script, &SandboxLimits::default(), &Arc::new(AtomicBool::new(false)))
    }

    fn run_flow(source: &str) -> Vec<ExecutionMessage> {
        let compiled = compile_source("inmemory://model/main.flow", source, &CompilerOptions::default());
        assert!(
            !compiled.diagnostics.iter().any(|d| d.is_error()),
            "{:?}",
            compiled.diagnostics
        );
        run(&compiled.script)
    }

    #[test]
    fn test_print_lines_are_tab_joined() {
        let messages = run("print('a', 1, nil, true)\nprint()");
        assert_eq!(
            messages,
            vec![
                ExecutionMessage::printed("a\t1\tnil\ttrue"),
                ExecutionMessage::printed(""),
            ]
        );
    }

    #[test]
    fn test_return_value_follows_printed_lines() {
        let messages = run("print('hi')\nreturn {1, 2, 3}");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], ExecutionMessage::printed("hi"));
        assert_eq!(
            messages[1],
            ExecutionMessage::Value {
                payload: MarshaledValue::Array(vec![
                    MarshaledValue::Integer(1),
                    MarshaledValue::Integer(2),
                    MarshaledValue::Integer(3),
                ])
            }
        );
    }

    #[test]
    fn test_runtime_error_has_no_value() {
        let messages = run("print('before')\nerror('boom', 0)\nreturn 1");
        assert_eq!(
            messages,
            vec![
                ExecutionMessage::printed("before"),
                ExecutionMessage::error("boom"),
            ]
        );
    }

    #[test]
    fn test_error_object_message() {
        let messages = run("error({message = 'bad input'})");
        assert_eq!(messages, vec![ExecutionMessage::error("bad input")]);
    }

    #[test]
    fn test_syntax_error_is_serialized() {
        let messages = run("local = 1");
        assert_eq!(messages.len(), 1);
        match &messages[0] {
            ExecutionMessage::Error { text } => {
                assert!(text.starts_with('"'), "{}", text);
                assert!(text.contains("main.lua:1"), "{}", text);
            }
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_restricted_standard_library() {
        let messages = run("return {type(io), type(os), type(dofile), type(string.format)}");
        assert_eq!(
            messages,
            vec![ExecutionMessage::Value {
                payload: MarshaledValue::Array(vec![
                    MarshaledValue::String("nil".into()),
                    MarshaledValue::String("nil".into()),
                    MarshaledValue::String("nil".into()),
                    MarshaledValue::String("function".into()),
                ])
            }]
        );
    }

    #[test]
    fn test_abort_flag_stops_script() {
        let abort = Arc::new(AtomicBool::new(true));
        let messages = execute_script("while true do end", &SandboxLimits::default(), &abort);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].is_failure());
    }

    #[test]
    fn test_memory_limit() {
        let limits = SandboxLimits {
            memory_limit_bytes: Some(2 * 1024 * 1024),
            ..SandboxLimits::default()
        };
        let script = "local t = {}\nfor i = 1, 1e7 do t[i] = string.rep('x', 64) .. i end";
        let messages = execute_script(script, &limits, &Arc::new(AtomicBool::new(false)));
        assert_eq!(messages.len(), 1);
        assert!(messages[0].is_failure());
    }

    #[test]
    fn test_output_line_cap() {
        let limits = SandboxLimits {
            max_output_lines: 3,
            ..SandboxLimits::default()
        };
        let abort = Arc::new(AtomicBool::new(false));
        let messages = execute_script("for i = 1, 10 do print(i) end", &limits, &abort);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[2], ExecutionMessage::printed("3"));
        match &messages[3] {
            ExecutionMessage::Error { text } => assert!(text.contains("output limit exceeded"), "{}", text),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_output_byte_cap_stops_unbounded_printing() {
        let limits = SandboxLimits {
            max_output_bytes: 64 * 1024,
            ..SandboxLimits::default()
        };
        let abort = Arc::new(AtomicBool::new(false));
        let script = "local s = string.rep('x', 4 * 1024 * 1024)\nwhile true do print(s) end";
        let messages = execute_script(script, &limits, &abort);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].is_failure());
    }

    #[test]
    fn test_returned_value_respects_node_budget() {
        let limits = SandboxLimits {
            max_marshal_nodes: 4,
            ..SandboxLimits::default()
        };
        let abort = Arc::new(AtomicBool::new(false));
        let messages = execute_script("return {1, 2, 3, 4, 5, 6}", &limits, &abort);
        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0].to_string(),
            "Module exports: [1, 2, 3, [Truncated], [Truncated], [Truncated]]"
        );
    }

    #[test]
    fn test_flow_array_push_many() {
        let messages = run_flow("const xs = [1]\nconsole.log(xs.push(2, 3, 4))\nconsole.log(xs.join(\"-\"))");
        assert_eq!(
            messages,
            vec![ExecutionMessage::printed("4"), ExecutionMessage::printed("1-2-3-4")]
        );
    }

    #[test]
    fn test_flow_program_end_to_end() {
        let messages = run_flow(
            "const xs = [1, 2, 3]\nxs.push(4)\nconsole.log(xs.length)\nexport const total = xs.reduce((a, b) => a + b, 0)",
        );
        assert_eq!(messages[0], ExecutionMessage::printed("4"));
        assert_eq!(messages[1].to_string(), "Module exports: { total: 10 }");
    }

    #[test]
    fn test_flow_try_catch_and_continue() {
        let messages = run_flow(
            r#"
function risky() {
    throw new Error("bad")
}
try {
    risky()
} catch (e) {
    console.log(e.message)
}
let out = ""
for (const x of [1, 2, 3, 4]) {
    if (x % 2 == 0) {
        continue
    }
    out = out + x
}
console.log(out)
"#,
        );
        assert_eq!(
            messages,
            vec![ExecutionMessage::printed("bad"), ExecutionMessage::printed("13")]
        );
    }

    #[test]
    fn test_flow_uncaught_error() {
        let messages = run_flow("throw new Error(\"boom\")");
        assert_eq!(messages, vec![ExecutionMessage::error("boom")]);
    }
}
