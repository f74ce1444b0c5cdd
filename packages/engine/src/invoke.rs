//! Per-request dispatch into a loaded module.
//!
//! # Guest ABI
//!
//! A loadable unit is a WebAssembly core module exporting:
//!
//! - `memory` - a linear memory;
//! - `alloc: (i32) -> i32` - reserve that many bytes of guest memory and
//!   return the region's address;
//! - the entry export (`handle` by default): `(i32, i32) -> i64` - take
//!   the request region as (address, length) and return the response
//!   region packed as `(address << 32) | length`.
//!
//! Request and response payloads cross the boundary as UTF-8 JSON. Each
//! invocation instantiates a fresh instance of the compiled module, so
//! guest memory and globals reset between requests; modules cannot carry
//! state from one invocation to the next.

use serde_json::Value;
use wasmtime::{Instance, Store};

use crate::error::InvocationError;
use crate::loader::ModuleHandle;

/// Calls a named entry export on a loaded module, one request at a time.
pub struct Invoker {
    entry: String,
}

impl Invoker {
    pub fn new(entry: impl Into<String>) -> Self {
        Self {
            entry: entry.into(),
        }
    }

    /// The entry export this invoker dispatches to.
    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Invoke the module once with `argument`, in a fresh execution context.
    pub fn invoke(
        &self,
        handle: &ModuleHandle,
        argument: &Value,
    ) -> Result<Value, InvocationError> {
        let payload = serde_json::to_vec(argument)
            .map_err(|e| InvocationError::ExecutionFailed(format!("unserializable argument: {e}")))?;
        let len = i32::try_from(payload.len()).map_err(|_| {
            InvocationError::ExecutionFailed("argument exceeds addressable guest memory".into())
        })?;

        let mut store = Store::new(handle.module.engine(), ());
        let instance = Instance::new(&mut store, &handle.module, &[])
            .map_err(|e| InvocationError::ConstructionFailed(e.to_string()))?;

        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| InvocationError::MissingCapability("memory export `memory`".into()))?;
        let alloc = instance
            .get_typed_func::<i32, i32>(&mut store, "alloc")
            .map_err(|_| {
                InvocationError::MissingCapability("allocator export `alloc: (i32) -> i32`".into())
            })?;
        let entry = instance
            .get_typed_func::<(i32, i32), i64>(&mut store, &self.entry)
            .map_err(|_| {
                InvocationError::MissingCapability(format!(
                    "entry export `{}: (i32, i32) -> i64`",
                    self.entry
                ))
            })?;

        let ptr = alloc
            .call(&mut store, len)
            .map_err(|e| InvocationError::ExecutionFailed(format!("allocator trapped: {e}")))?;
        memory
            .write(&mut store, ptr as u32 as usize, &payload)
            .map_err(|e| {
                InvocationError::ExecutionFailed(format!("argument did not fit guest memory: {e}"))
            })?;

        let packed = entry
            .call(&mut store, (ptr, len))
            .map_err(|e| InvocationError::ExecutionFailed(e.to_string()))?;

        let (out_ptr, out_len) = unpack_region(packed);
        tracing::debug!(out_ptr, out_len, "entry call returned");
        // Validate the returned region against the instance's memory
        // before touching it; the packed value is module output and may
        // claim any address or length.
        let data = memory.data(&store);
        let start = out_ptr as usize;
        let result = start
            .checked_add(out_len as usize)
            .and_then(|end| data.get(start..end))
            .ok_or_else(|| {
                InvocationError::InvalidResult(format!(
                    "returned region {out_ptr}+{out_len} is out of bounds"
                ))
            })?;
        serde_json::from_slice(result)
            .map_err(|e| InvocationError::InvalidResult(format!("result is not valid JSON: {e}")))
    }
}

/// Split a packed `(address << 32) | length` result into its parts.
fn unpack_region(packed: i64) -> (u32, u32) {
    let packed = packed as u64;
    ((packed >> 32) as u32, packed as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::Loader;
    use serde_json::json;

    /// Bump allocator plus an entry that returns its input region verbatim.
    const ECHO: &str = r#"
        (module
          (memory (export "memory") 1)
          (global $head (mut i32) (i32.const 16))
          (func (export "alloc") (param $len i32) (result i32)
            (local $ptr i32)
            global.get $head
            local.set $ptr
            global.get $head
            local.get $len
            i32.add
            global.set $head
            local.get $ptr)
          (func (export "handle") (param $ptr i32) (param $len i32) (result i64)
            (i64.or
              (i64.shl (i64.extend_i32_u (local.get $ptr)) (i64.const 32))
              (i64.extend_i32_u (local.get $len)))))
    "#;

    /// Ignores its input and returns a constant JSON document.
    const CONSTANT: &str = r#"
        (module
          (memory (export "memory") 1)
          (data (i32.const 64) "{\"ok\":true}")
          (func (export "alloc") (param i32) (result i32) (i32.const 1024))
          (func (export "handle") (param i32 i32) (result i64)
            (i64.or (i64.shl (i64.const 64) (i64.const 32)) (i64.const 11))))
    "#;

    /// Increments a global and reports how many calls this instance saw.
    const COUNTER: &str = r#"
        (module
          (memory (export "memory") 1)
          (global $calls (mut i32) (i32.const 0))
          (data (i32.const 64) "{\"calls\":1}")
          (data (i32.const 96) "{\"calls\":2}")
          (func (export "alloc") (param i32) (result i32) (i32.const 1024))
          (func (export "handle") (param i32 i32) (result i64)
            global.get $calls
            i32.const 1
            i32.add
            global.set $calls
            (if (result i64) (i32.eq (global.get $calls) (i32.const 1))
              (then (i64.or (i64.shl (i64.const 64) (i64.const 32)) (i64.const 11)))
              (else (i64.or (i64.shl (i64.const 96) (i64.const 32)) (i64.const 11))))))
    "#;

    const TRAPPING: &str = r#"
        (module
          (memory (export "memory") 1)
          (func (export "alloc") (param i32) (result i32) (i32.const 16))
          (func (export "handle") (param i32 i32) (result i64) unreachable))
    "#;

    /// Returns a region far past the end of the one-page memory.
    const WILD_POINTER: &str = r#"
        (module
          (memory (export "memory") 1)
          (func (export "alloc") (param i32) (result i32) (i32.const 16))
          (func (export "handle") (param i32 i32) (result i64)
            (i64.or (i64.shl (i64.const 1048576) (i64.const 32)) (i64.const 8))))
    "#;

    /// Claims a result region of u32::MAX bytes at u32::MAX.
    const HUGE_REGION: &str = r#"
        (module
          (memory (export "memory") 1)
          (func (export "alloc") (param i32) (result i32) (i32.const 16))
          (func (export "handle") (param i32 i32) (result i64) (i64.const -1)))
    "#;

    /// Returns a region of bytes that are not JSON.
    const NOT_JSON: &str = r#"
        (module
          (memory (export "memory") 1)
          (data (i32.const 64) "hello")
          (func (export "alloc") (param i32) (result i32) (i32.const 1024))
          (func (export "handle") (param i32 i32) (result i64)
            (i64.or (i64.shl (i64.const 64) (i64.const 32)) (i64.const 5))))
    "#;

    fn load(wat: &str) -> ModuleHandle {
        Loader::new().load(wat.as_bytes(), "Function").unwrap()
    }

    #[test]
    fn echo_returns_argument() {
        let handle = load(ECHO);
        let invoker = Invoker::new("handle");
        let argument = json!({"greatkey": "nicevalue"});
        let result = invoker.invoke(&handle, &argument).unwrap();
        assert_eq!(result, argument);
    }

    #[test]
    fn echo_is_idempotent() {
        let handle = load(ECHO);
        let invoker = Invoker::new("handle");
        let argument = json!({"x": [1, 2, 3]});
        let first = invoker.invoke(&handle, &argument).unwrap();
        let second = invoker.invoke(&handle, &argument).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn constant_module_ignores_argument() {
        let handle = load(CONSTANT);
        let invoker = Invoker::new("handle");
        let result = invoker.invoke(&handle, &json!({"anything": "at all"})).unwrap();
        assert_eq!(result, json!({"ok": true}));
    }

    #[test]
    fn each_invocation_gets_a_fresh_context() {
        // The counter module would report {"calls":2} on a second call
        // against the same instance. It never does.
        let handle = load(COUNTER);
        let invoker = Invoker::new("handle");
        for _ in 0..3 {
            let result = invoker.invoke(&handle, &json!({})).unwrap();
            assert_eq!(result, json!({"calls": 1}));
        }
    }

    #[test]
    fn missing_entry_export() {
        let handle = load(ECHO);
        let invoker = Invoker::new("main");
        let result = invoker.invoke(&handle, &json!({}));
        match result {
            Err(InvocationError::MissingCapability(what)) => assert!(what.contains("main")),
            other => panic!("expected MissingCapability, got {other:?}"),
        }
    }

    #[test]
    fn missing_allocator() {
        let handle = load(
            r#"(module
                 (memory (export "memory") 1)
                 (func (export "handle") (param i32 i32) (result i64) (i64.const 0)))"#,
        );
        let result = Invoker::new("handle").invoke(&handle, &json!({}));
        match result {
            Err(InvocationError::MissingCapability(what)) => assert!(what.contains("alloc")),
            other => panic!("expected MissingCapability, got {other:?}"),
        }
    }

    #[test]
    fn missing_memory() {
        let handle = load(
            r#"(module
                 (func (export "alloc") (param i32) (result i32) (i32.const 0))
                 (func (export "handle") (param i32 i32) (result i64) (i64.const 0)))"#,
        );
        let result = Invoker::new("handle").invoke(&handle, &json!({}));
        assert!(matches!(result, Err(InvocationError::MissingCapability(_))));
    }

    #[test]
    fn wrong_entry_signature_is_a_missing_capability() {
        let handle = load(
            r#"(module
                 (memory (export "memory") 1)
                 (func (export "alloc") (param i32) (result i32) (i32.const 0))
                 (func (export "handle") (result i32) (i32.const 0)))"#,
        );
        let result = Invoker::new("handle").invoke(&handle, &json!({}));
        assert!(matches!(result, Err(InvocationError::MissingCapability(_))));
    }

    #[test]
    fn unsatisfied_imports_fail_construction() {
        let handle = load(
            r#"(module
                 (import "env" "mystery" (func))
                 (memory (export "memory") 1)
                 (func (export "alloc") (param i32) (result i32) (i32.const 0))
                 (func (export "handle") (param i32 i32) (result i64) (i64.const 0)))"#,
        );
        let result = Invoker::new("handle").invoke(&handle, &json!({}));
        assert!(matches!(result, Err(InvocationError::ConstructionFailed(_))));
    }

    #[test]
    fn trapping_entry_is_an_execution_failure() {
        let handle = load(TRAPPING);
        let result = Invoker::new("handle").invoke(&handle, &json!({}));
        assert!(matches!(result, Err(InvocationError::ExecutionFailed(_))));
    }

    #[test]
    fn trap_does_not_poison_the_handle() {
        let handle = load(TRAPPING);
        let invoker = Invoker::new("handle");
        assert!(invoker.invoke(&handle, &json!({})).is_err());
        // The compiled module is still usable by a different invoker.
        let echo = load(ECHO);
        assert!(Invoker::new("handle").invoke(&echo, &json!(1)).is_ok());
    }

    #[test]
    fn out_of_bounds_result_region() {
        let handle = load(WILD_POINTER);
        let result = Invoker::new("handle").invoke(&handle, &json!({}));
        assert!(matches!(result, Err(InvocationError::InvalidResult(_))));
    }

    #[test]
    fn huge_declared_result_region_is_rejected() {
        // The packed return claims a 4 GiB region; the host must refuse
        // it outright rather than try to copy it out.
        let handle = load(HUGE_REGION);
        let result = Invoker::new("handle").invoke(&handle, &json!({}));
        assert!(matches!(result, Err(InvocationError::InvalidResult(_))));
    }

    #[test]
    fn non_json_result_bytes() {
        let handle = load(NOT_JSON);
        let result = Invoker::new("handle").invoke(&handle, &json!({}));
        assert!(matches!(result, Err(InvocationError::InvalidResult(_))));
    }

    #[test]
    fn unpack_region_splits_address_and_length() {
        assert_eq!(unpack_region(0), (0, 0));
        assert_eq!(unpack_region((64 << 32) | 11), (64, 11));
        assert_eq!(unpack_region(-1), (u32::MAX, u32::MAX));
    }
}
