//! Worker-side processing seam.
//!
//! The actual work is supplied by the caller. The connection task runs it on
//! the blocking pool and awaits it inline, so inbound envelopes keep their
//! arrival order while the async runtime stays free. Errors and panics both
//! become an error-result payload; nothing a processor does can take the
//! connection down.

use std::sync::Arc;

use crate::workload;

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("{0}")]
    Failed(String),
    #[error("processor panicked: {0}")]
    Panicked(String),
}

/// Turns a relayed `input` into the `output` sent back to the requester.
pub trait Processor: Send + Sync + 'static {
    /// # Errors
    ///
    /// Any error is reported to the requester as a `result: -1` payload.
    fn process(&self, input: &str) -> Result<String, ProcessError>;
}

impl<F, E> Processor for F
where
    F: Fn(&str) -> Result<String, E> + Send + Sync + 'static,
    E: std::fmt::Display,
{
    fn process(&self, input: &str) -> Result<String, ProcessError> {
        self(input).map_err(|e| ProcessError::Failed(e.to_string()))
    }
}

/// Run `processor` against `input` and return the payload to forward.
pub async fn run(processor: Arc<dyn Processor>, input: String) -> String {
    let task_input = input.clone();
    let outcome = tokio::task::spawn_blocking(move || processor.process(&task_input)).await;

    let error = match outcome {
        Ok(Ok(output)) => return output,
        Ok(Err(e)) => e,
        Err(join) if join.is_panic() => ProcessError::Panicked(panic_message(join.into_panic())),
        Err(join) => ProcessError::Failed(join.to_string()),
    };

    tracing::warn!(error = %error, "relay: processor failed; returning error result");
    workload::error_payload(&input, &error.to_string())
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return (*s).to_owned();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "unknown panic".to_owned()
}

#[cfg(test)]
#[path = "processor_test.rs"]
mod tests;
