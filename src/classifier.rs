//! Classifier boundary.
//!
//! Both verification passes talk to a text classifier (in practice a chat
//! LLM) through the [`Classifier`] trait. The library never performs network
//! I/O itself; callers inject an implementation, and tests inject closures.

use crate::error::ClassifierError;
use serde::{Deserialize, Serialize};

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Creates a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A text classifier that answers a chat request with raw text.
///
/// Implemented for every `Fn(&[Message]) -> Result<String, ClassifierError>`,
/// so a closure is enough for tests and simple integrations:
///
/// ```
/// use clausecut::classifier::{Classifier, Message};
/// use clausecut::ClassifierError;
///
/// let echo = |messages: &[Message]| -> Result<String, ClassifierError> {
///     Ok(messages.last().map(|m| m.content.clone()).unwrap_or_default())
/// };
/// assert_eq!(echo.classify(&[Message::user("[]")]).unwrap(), "[]");
/// ```
pub trait Classifier {
    /// Sends the messages and returns the reply text.
    fn classify(&self, messages: &[Message]) -> Result<String, ClassifierError>;
}

impl<F> Classifier for F
where
    F: Fn(&[Message]) -> Result<String, ClassifierError>,
{
    fn classify(&self, messages: &[Message]) -> Result<String, ClassifierError> {
        self(messages)
    }
}

/// Verdict of a validation function on one classifier reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Validation<T> {
    /// The reply is usable.
    Accept(T),
    /// The reply is malformed; send the identical request again.
    Retry(String),
    /// The reply is a deliberate answer that rules out a usable result.
    Abort(String),
}

/// Why a bounded retry loop gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFailure {
    /// Reason reported by the last validation.
    pub reason: String,
    /// Last raw reply, if any arrived.
    pub raw_response: Option<String>,
    /// Number of classifier calls made.
    pub attempts: usize,
    /// True if the loop stopped on [`Validation::Abort`] rather than exhaustion.
    pub aborted: bool,
}

/// Sends the identical request up to `max_retries + 1` times.
///
/// Each reply goes through `validate`. The first accepted value is returned;
/// an abort or the exhaustion of retries hands an [`AttemptFailure`] to
/// `fallback`, whose result is returned instead. Transport errors are not
/// retried here and propagate immediately.
pub fn retry_or_else<C, T, E, V, F>(
    classifier: &C,
    messages: &[Message],
    max_retries: usize,
    mut validate: V,
    fallback: F,
) -> Result<T, E>
where
    C: Classifier + ?Sized,
    E: From<ClassifierError>,
    V: FnMut(&str) -> Validation<T>,
    F: FnOnce(AttemptFailure) -> Result<T, E>,
{
    let mut failure = AttemptFailure {
        reason: String::from("no attempt made"),
        raw_response: None,
        attempts: 0,
        aborted: false,
    };

    for attempt in 1..=max_retries + 1 {
        let reply = classifier.classify(messages)?;
        failure.attempts = attempt;

        match validate(&reply) {
            Validation::Accept(value) => {
                tracing::debug!(attempt, "classifier reply accepted");
                return Ok(value);
            }
            Validation::Retry(reason) => {
                tracing::warn!(attempt, max_retries, %reason, "classifier reply rejected");
                failure.reason = reason;
                failure.raw_response = Some(reply);
            }
            Validation::Abort(reason) => {
                failure.reason = reason;
                failure.raw_response = Some(reply);
                failure.aborted = true;
                break;
            }
        }
    }

    fallback(failure)
}

/// Strips Markdown code fences (```` ```json ```` and ```` ``` ````) from a reply.
pub fn strip_code_fences(reply: &str) -> String {
    reply.replace("```json", "").replace("```", "").trim().to_string()
}

/// Returns the slice from the first `open` to the last `close`, inclusive.
pub fn outermost_slice(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}
