//! The protocol state machine and message loop.
//!
//! The loop owns the process's whole lifecycle: emit `started`, block on
//! stdin line by line, and drive one of two phases - awaiting the module,
//! then serving requests against it. The module phase transition happens
//! exactly once; there is no reload.
//!
//! Nothing a peer sends can break the loop. Undecodable lines and
//! messages of the wrong kind for the current phase are discarded with a
//! diagnostic on the tracing side channel, never on the protocol stream.
//! The only fatal conditions are failures of the streams themselves;
//! end-of-input is a clean shutdown.

use std::io::{BufRead, Write};

use thiserror::Error;

use funcell_artifact::{ArtifactKind, ResolutionError};
use funcell_engine::{Invoker, LoadError, Loader, ModuleHandle};
use funcell_envelope::{kind, Envelope, EnvelopeError};

/// Which artifact shape to accept and which entry export to call.
///
/// The defaults describe the archive variant (`Function.wasm` inside a
/// zip, entry export `handle`). The other historical configuration is a
/// direct artifact with a `main` entry.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How `function` message payloads are interpreted.
    pub artifact: ArtifactKind,
    /// The entry export invoked once per request.
    pub entry: String,
    /// The unit name resolved from the artifact and bound to the handle.
    pub unit_name: String,
    /// Appended to the unit name when matching archive entries.
    pub unit_extension: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            artifact: ArtifactKind::Archive,
            entry: "handle".to_string(),
            unit_name: "Function".to_string(),
            unit_extension: ".wasm".to_string(),
        }
    }
}

/// Fatal worker failures.
///
/// Everything recoverable is handled inside the loop; these are the
/// conditions that end the process.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The protocol stream itself failed.
    #[error("protocol stream failure: {0}")]
    Io(#[from] std::io::Error),

    /// An outbound envelope could not be serialized.
    #[error("could not encode outbound envelope: {0}")]
    Encode(#[from] EnvelopeError),
}

/// Recoverable failures on the way from artifact text to module handle.
#[derive(Debug, Error)]
enum SetupError {
    #[error(transparent)]
    Resolve(#[from] ResolutionError),
    #[error(transparent)]
    Load(#[from] LoadError),
}

/// The protocol engine: one loaded module, one message at a time.
pub struct Worker {
    config: WorkerConfig,
    loader: Loader,
    invoker: Invoker,
    module: Option<ModuleHandle>,
}

impl Worker {
    pub fn new(config: WorkerConfig) -> Self {
        let invoker = Invoker::new(config.entry.clone());
        Self {
            config,
            loader: Loader::new(),
            invoker,
            module: None,
        }
    }

    /// Run the message loop until the input stream closes.
    ///
    /// Emits `started` before reading anything, then processes lines
    /// strictly one at a time: the response for request *n* is written
    /// and flushed before line *n + 1* is read.
    pub fn run<R: BufRead, W: Write>(
        &mut self,
        mut input: R,
        mut output: W,
    ) -> Result<(), WorkerError> {
        emit(&mut output, &Envelope::started())?;

        let mut line = String::new();
        loop {
            line.clear();
            if input.read_line(&mut line)? == 0 {
                tracing::info!("input stream closed, shutting down");
                return Ok(());
            }
            let text = line.trim_end_matches(['\r', '\n']);
            if text.is_empty() {
                continue;
            }
            let envelope = match Envelope::decode(text) {
                Ok(envelope) => envelope,
                Err(err) => {
                    tracing::warn!(%err, "discarding undecodable line");
                    continue;
                }
            };

            if let Some(handle) = &self.module {
                if envelope.kind != kind::REQUEST {
                    tracing::warn!(kind = %envelope.kind, "ignoring message while serving");
                    continue;
                }
                tracing::debug!(request = %envelope.data, "handling request");
                match self.invoker.invoke(handle, &envelope.data) {
                    Ok(result) => emit(&mut output, &Envelope::response(result))?,
                    Err(err) => {
                        tracing::warn!(%err, "invocation failed");
                        emit(&mut output, &Envelope::error(envelope.data, err.to_string()))?;
                    }
                }
            } else {
                self.await_module(&mut output, envelope)?;
            }
        }
    }

    /// Handle one line in the awaiting-module phase.
    fn await_module<W: Write>(
        &mut self,
        output: &mut W,
        envelope: Envelope,
    ) -> Result<(), WorkerError> {
        if envelope.kind != kind::FUNCTION {
            tracing::warn!(kind = %envelope.kind, "ignoring message while awaiting module");
            return Ok(());
        }
        let Some(artifact) = envelope.data.as_str() else {
            tracing::warn!("function message carried a non-string artifact");
            return Ok(());
        };
        match self.materialize(artifact) {
            Ok(handle) => {
                self.module = Some(handle);
                emit(output, &Envelope::function_loaded())
            }
            Err(err) => {
                // The artifact is never retried; the supervisor must send
                // another function message.
                tracing::warn!(%err, "module load failed, still awaiting module");
                Ok(())
            }
        }
    }

    fn materialize(&mut self, artifact: &str) -> Result<ModuleHandle, SetupError> {
        let bytes = funcell_artifact::resolve(
            artifact,
            &self.config.unit_name,
            &self.config.unit_extension,
            self.config.artifact,
        )?;
        Ok(self.loader.load(&bytes, &self.config.unit_name)?)
    }
}

/// Write one envelope as a line and flush it immediately.
///
/// The flush keeps the line protocol honest: a consumer must never block
/// on a response that is sitting in a buffer.
fn emit<W: Write>(output: &mut W, envelope: &Envelope) -> Result<(), WorkerError> {
    let line = envelope.encode()?;
    writeln!(output, "{line}")?;
    output.flush()?;
    Ok(())
}
