//! In-memory WASM module loading and per-request invocation.
//!
//! This crate is the execution half of the funcell worker. It turns raw
//! unit bytes into a compiled, invocable [`ModuleHandle`] without touching
//! disk, then dispatches structured JSON arguments into the module's entry
//! export - one fresh execution context per request.
//!
//! The two halves are deliberately separate:
//!
//! - [`Loader`] compiles bytes exactly once per unit name and has no idea
//!   how the module will be called.
//! - [`Invoker`] knows the entry export name and the guest ABI (see
//!   [`invoke`]) and never mutates the handle it is given.
//!
//! Faulty modules cannot take the process down: compile failures, missing
//! exports, traps, and garbage results all surface as typed errors.
//!
//! # Example
//!
//! ```rust,no_run
//! use funcell_engine::{Invoker, Loader};
//!
//! # fn example(wasm_bytes: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
//! let mut loader = Loader::new();
//! let handle = loader.load(wasm_bytes, "Function")?;
//!
//! let invoker = Invoker::new("handle");
//! let result = invoker.invoke(&handle, &serde_json::json!({"x": 1}))?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod invoke;
pub mod loader;

pub use error::{InvocationError, LoadError};
pub use invoke::Invoker;
pub use loader::{Loader, ModuleHandle};
