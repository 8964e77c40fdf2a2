#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Consumers of a graded batch.
//!
//! Every sink sees the full batch, in order. A sink that fails or panics is
//! logged and skipped; the sinks after it still run, and whatever earlier
//! sinks already wrote is left alone.

/// Console printer.
pub mod console;
/// Persisted score table.
pub mod csv;
/// Email notifications.
pub mod email;
/// Moves graded files out of the labs directory.
pub mod relocate;
/// Pairwise similarity scan.
pub mod similarity;

use std::panic::{self, AssertUnwindSafe};

use anyhow::Result;
use tracing::{debug, error};

pub use console::ConsoleSink;
pub use csv::CsvSink;
pub use email::{DispatchPolicy, EmailSettings, EmailSink, Mailer, Preferences, SmtpMailer};
pub use relocate::RelocateSink;
pub use similarity::SimilaritySink;

use crate::report::ScoreReport;

/// A consumer of graded batches.
pub trait ResultSink {
    /// Short name used in diagnostics.
    fn name(&self) -> &str;

    /// Processes a whole batch.
    fn handle_batch(&mut self, reports: &[ScoreReport]) -> Result<()>;

    /// Releases anything the sink holds open. Called once, after the last
    /// batch.
    fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A sink that failed while handling a batch or shutting down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkFailure {
    /// Name of the sink.
    pub sink:  String,
    /// What went wrong.
    pub error: String,
}

/// Which sinks succeeded and which failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Sinks that finished without error, in order.
    pub succeeded: Vec<String>,
    /// Sinks that failed, in order.
    pub failed:    Vec<SinkFailure>,
}

impl DispatchSummary {
    /// True if no sink failed.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Extracts the message from a panic payload.
fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "sink panicked".to_string()
    }
}

/// Runs `step` on every sink, containing errors and panics per sink.
fn each_sink<F>(sinks: &mut [Box<dyn ResultSink>], stage: &str, mut step: F) -> DispatchSummary
where
    F: FnMut(&mut Box<dyn ResultSink>) -> Result<()>,
{
    let mut summary = DispatchSummary::default();

    for sink in sinks.iter_mut() {
        let name = sink.name().to_string();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| step(sink)));

        let failure = match outcome {
            Ok(Ok(())) => {
                debug!("{name} sink finished {stage}");
                summary.succeeded.push(name);
                continue;
            }
            Ok(Err(e)) => format!("{e:#}"),
            Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
        };

        error!("{name} sink failed while {stage}: {failure}");
        summary.failed.push(SinkFailure {
            sink:  name,
            error: failure,
        });
    }

    summary
}

/// Hands `reports` to every sink in order. An empty sink list does nothing.
pub fn dispatch(sinks: &mut [Box<dyn ResultSink>], reports: &[ScoreReport]) -> DispatchSummary {
    each_sink(sinks, "handling results", |sink| sink.handle_batch(reports))
}

/// Owns a set of sinks for the length of a grading run.
#[derive(Default)]
pub struct Dispatcher {
    /// Sinks, in dispatch order.
    sinks: Vec<Box<dyn ResultSink>>,
}

impl Dispatcher {
    /// Creates a dispatcher over `sinks`.
    pub fn new(sinks: Vec<Box<dyn ResultSink>>) -> Self {
        Self { sinks }
    }

    /// Appends a sink.
    pub fn push(&mut self, sink: impl ResultSink + 'static) {
        self.sinks.push(Box::new(sink));
    }

    /// Names of the registered sinks, in order.
    pub fn sink_names(&self) -> Vec<&str> {
        self.sinks.iter().map(|sink| sink.name()).collect()
    }

    /// Hands a batch to every sink.
    pub fn dispatch(&mut self, reports: &[ScoreReport]) -> DispatchSummary {
        dispatch(&mut self.sinks, reports)
    }

    /// Shuts every sink down.
    pub fn shutdown(mut self) -> DispatchSummary {
        each_sink(&mut self.sinks, "shutting down", |sink| sink.shutdown())
    }
}
