//! Host boundary
//!
//! The engine hands its output to whatever process embeds it: one batched
//! sample delivery per run, a catalog-changed notification when a run
//! created records, and short human-readable status lines.

use crate::import::ParsedSample;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Downstream consumer of emitted samples and engine notifications
#[async_trait]
pub trait SampleSink: Send + Sync {
    /// One batch per run, in row order
    async fn deliver(&self, samples: Vec<ParsedSample>);

    /// Fired exactly when a run created at least one new catalog record
    async fn catalog_changed(&self);

    /// Short one-line progress or error message
    async fn status_message(&self, message: &str);
}

/// Default sink that routes everything to tracing
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl SampleSink for LogSink {
    async fn deliver(&self, samples: Vec<ParsedSample>) {
        tracing::info!("Delivering {} samples", samples.len());
    }

    async fn catalog_changed(&self) {
        tracing::info!("Catalog metadata changed");
    }

    async fn status_message(&self, message: &str) {
        tracing::info!("{}", message);
    }
}

/// In-memory sink collecting everything it receives.
///
/// Used by tests and useful for embedding when the host wants to poll.
#[derive(Debug, Default)]
pub struct MemorySink {
    samples: Mutex<Vec<ParsedSample>>,
    messages: Mutex<Vec<String>>,
    catalog_changes: AtomicUsize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain all samples received so far
    pub fn take_samples(&self) -> Vec<ParsedSample> {
        std::mem::take(&mut self.samples.lock().unwrap())
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn catalog_changes(&self) -> usize {
        self.catalog_changes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SampleSink for MemorySink {
    async fn deliver(&self, samples: Vec<ParsedSample>) {
        self.samples.lock().unwrap().extend(samples);
    }

    async fn catalog_changed(&self) {
        self.catalog_changes.fetch_add(1, Ordering::Relaxed);
    }

    async fn status_message(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}
