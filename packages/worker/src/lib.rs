//! # funcell worker
//!
//! A long-lived worker process that materializes one WASM function module
//! from a base64 artifact and serves invocations against it over a
//! line-oriented JSON protocol on stdin/stdout.
//!
//! ## Wire protocol
//!
//! One `{"type": ..., "data": ...}` object per line:
//!
//! | type              | direction | data                     |
//! |-------------------|-----------|--------------------------|
//! | `started`         | out       | `""`                     |
//! | `function`        | in        | base64 artifact text     |
//! | `function_loaded` | out       | `true`                   |
//! | `request`         | in        | invocation argument      |
//! | `response`        | out       | invocation result        |
//! | `error`           | out       | `{request, message}`     |
//!
//! Diagnostics never appear on stdout; they go to stderr through
//! `tracing`, so a strict line-protocol consumer sees envelopes only.
//!
//! ## Lifecycle
//!
//! The worker loads exactly one module per process and serves requests
//! strictly in order until its input closes, which is a clean shutdown.
//! Malformed input and failing user code are logged and survived; the
//! process never exits on its own account except for stream failures.

pub mod protocol;

pub use protocol::{Worker, WorkerConfig, WorkerError};
