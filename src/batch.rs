//! Multi-document processing.
//!
//! Documents are independent, so they are fanned out over a bounded rayon
//! pool. Inside a document everything stays sequential. [`BackoffClassifier`]
//! absorbs the rate limiting that many concurrent requests provoke.

use crate::classifier::{Classifier, Message};
use crate::error::{ClassifierError, Error, Result};
use crate::model::ExtractionOutcome;
use crate::Clausecut;
use rayon::prelude::*;
use std::time::Duration;

/// Options for batch processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    /// Maximum number of documents processed at once.
    pub max_concurrency: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self { max_concurrency: 8 }
    }
}

impl BatchOptions {
    /// Sets the concurrency bound (at least 1).
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }
}

/// Runs [`Clausecut::extract`] over many documents.
///
/// Outcomes are returned in input order. A document that fails yields
/// [`ExtractionOutcome::Failed`]; the batch itself only fails if the thread
/// pool cannot be built.
pub fn extract_documents<D, C>(
    pipeline: &Clausecut,
    documents: &[D],
    classifier: &C,
    options: BatchOptions,
) -> Result<Vec<ExtractionOutcome>>
where
    D: AsRef<[String]> + Sync,
    C: Classifier + Sync + ?Sized,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.max_concurrency.max(1))
        .build()
        .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;

    tracing::debug!(
        documents = documents.len(),
        threads = options.max_concurrency,
        "batch extraction started"
    );

    Ok(pool.install(|| {
        documents
            .par_iter()
            .map(|lines| pipeline.extract(lines.as_ref(), classifier))
            .collect()
    }))
}

/// Backoff schedule for transient classifier errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Maximum number of attempts (including the initial one).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl BackoffConfig {
    /// Delay before retry number `retry` (0-based): base doubled per retry, capped.
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

/// Wraps a classifier and retries transient transport errors.
///
/// Non-transient errors and successful replies pass straight through.
#[derive(Debug, Clone)]
pub struct BackoffClassifier<C> {
    inner: C,
    config: BackoffConfig,
}

impl<C> BackoffClassifier<C> {
    /// Wraps `inner` with the default schedule.
    pub fn new(inner: C) -> Self {
        Self::with_config(inner, BackoffConfig::default())
    }

    /// Wraps `inner` with a custom schedule.
    pub fn with_config(inner: C, config: BackoffConfig) -> Self {
        Self { inner, config }
    }

    /// Returns the wrapped classifier.
    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: Classifier> Classifier for BackoffClassifier<C> {
    fn classify(&self, messages: &[Message]) -> std::result::Result<String, ClassifierError> {
        let mut retry = 0;
        loop {
            match self.inner.classify(messages) {
                Err(err) if err.is_transient() && retry + 1 < self.config.max_attempts => {
                    let delay = self.config.delay(retry);
                    tracing::warn!(error = %err, ?delay, attempt = retry + 1, "transient classifier error, backing off");
                    std::thread::sleep(delay);
                    retry += 1;
                }
                result => return result,
            }
        }
    }
}
