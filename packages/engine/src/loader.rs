//! In-memory module materialization.

use std::collections::HashSet;

use wasmtime::{Engine, Module};

use crate::error::LoadError;

/// An invocable module, compiled in memory and bound to its unit name.
///
/// The handle is immutable once loaded. Invocations never mutate it; each
/// one instantiates a fresh execution context from the compiled module.
pub struct ModuleHandle {
    pub(crate) module: Module,
    unit_name: String,
}

impl ModuleHandle {
    /// The unit name this handle was loaded under.
    pub fn unit_name(&self) -> &str {
        &self.unit_name
    }
}

/// Compiles raw unit bytes into [`ModuleHandle`]s.
///
/// Compilation happens entirely in memory; the loader performs no disk or
/// network I/O. Each unit name may be materialized at most once per loader.
pub struct Loader {
    engine: Engine,
    materialized: HashSet<String>,
}

impl Loader {
    pub fn new() -> Self {
        Self {
            engine: Engine::default(),
            materialized: HashSet::new(),
        }
    }

    /// Materialize `bytes` as the unit named `unit_name`.
    ///
    /// Fails with [`LoadError::Malformed`] if the bytes are not a valid
    /// WebAssembly module, or [`LoadError::DefinitionConflict`] if this
    /// loader already materialized a unit with that name.
    pub fn load(&mut self, bytes: &[u8], unit_name: &str) -> Result<ModuleHandle, LoadError> {
        if self.materialized.contains(unit_name) {
            return Err(LoadError::DefinitionConflict(unit_name.to_string()));
        }
        let module = Module::new(&self.engine, bytes)
            .map_err(|e| LoadError::Malformed(e.to_string()))?;
        self.materialized.insert(unit_name.to_string());
        tracing::info!(unit = unit_name, "materialized module");
        Ok(ModuleHandle {
            module,
            unit_name: unit_name.to_string(),
        })
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}
