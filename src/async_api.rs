//! Async API for non-blocking contract splitting.
//!
//! Enable the `async` feature to use these APIs:
//!
//! ```toml
//! [dependencies]
//! clausecut = { version = "0.1", features = ["async"] }
//! ```
//!
//! Classifier calls block, so the pipeline runs on tokio's blocking pool.

use crate::classifier::Classifier;
use crate::error::{Error, Result};
use crate::model::{ContractDocument, ExtractionOutcome};
use crate::Clausecut;
use std::sync::Arc;

fn join_error(e: tokio::task::JoinError) -> Error {
    Error::Io(std::io::Error::other(e.to_string()))
}

/// Asynchronously splits a contract with default settings.
///
/// # Example
///
/// ```no_run
/// # async fn example() -> clausecut::Result<()> {
/// use clausecut::{ClassifierError, Message};
/// use std::sync::Arc;
///
/// let classifier = Arc::new(|_: &[Message]| -> Result<String, ClassifierError> {
///     Ok("[]".to_string())
/// });
/// let lines = vec!["第1条 目的".to_string(), "本文".to_string()];
/// let document = clausecut::async_api::split_document(lines, classifier).await?;
/// println!("{} clauses", document.clauses.len());
/// # Ok(())
/// # }
/// ```
pub async fn split_document<C>(lines: Vec<String>, classifier: Arc<C>) -> Result<ContractDocument>
where
    C: Classifier + Send + Sync + ?Sized + 'static,
{
    AsyncClausecut::new().split(lines, classifier).await
}

/// Asynchronously splits a contract, reporting failure as data.
pub async fn extract_document<C>(lines: Vec<String>, classifier: Arc<C>) -> ExtractionOutcome
where
    C: Classifier + Send + Sync + ?Sized + 'static,
{
    AsyncClausecut::new().extract(lines, classifier).await
}

/// Async wrapper around a configured [`Clausecut`] pipeline.
#[derive(Debug, Clone, Default)]
pub struct AsyncClausecut {
    pipeline: Arc<Clausecut>,
}

impl AsyncClausecut {
    /// Creates a wrapper around the default pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a configured pipeline.
    pub fn from_pipeline(pipeline: Clausecut) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }

    /// Splits a contract on the blocking pool.
    pub async fn split<C>(&self, lines: Vec<String>, classifier: Arc<C>) -> Result<ContractDocument>
    where
        C: Classifier + Send + Sync + ?Sized + 'static,
    {
        let pipeline = Arc::clone(&self.pipeline);
        tokio::task::spawn_blocking(move || pipeline.split(&lines, &*classifier))
            .await
            .map_err(join_error)?
    }

    /// Splits a contract on the blocking pool, reporting failure as data.
    pub async fn extract<C>(&self, lines: Vec<String>, classifier: Arc<C>) -> ExtractionOutcome
    where
        C: Classifier + Send + Sync + ?Sized + 'static,
    {
        let pipeline = Arc::clone(&self.pipeline);
        let raw_text = lines.join("\n");
        match tokio::task::spawn_blocking(move || pipeline.extract(&lines, &*classifier)).await {
            Ok(outcome) => outcome,
            Err(e) => ExtractionOutcome::Failed(crate::model::ExtractionFailure {
                error: join_error(e).to_string(),
                raw_text,
            }),
        }
    }
}
