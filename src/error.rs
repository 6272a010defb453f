//! Error types used by the worklatch runtime and work handlers.
//!
//! Only handler execution is fallible by value: [`HandlerError`] is what a
//! host handler returns when a unit of work goes wrong. Caller contract
//! breaches (completing an id that was never admitted, completing twice,
//! re-fixing a job id) are not errors, they are panics: the tracking state
//! would be corrupt if execution continued past them.

use thiserror::Error;

/// # Errors produced by work handler execution.
///
/// Returned by [`WorkHandler::handle`](crate::WorkHandler::handle) and
/// [`DirectHandler::handle`](crate::DirectHandler::handle). The runtime
/// never retries a failed item; the error ends the current processing
/// iteration and is surfaced through the event bus.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum HandlerError {
    /// The handler could not process the item.
    #[error("work handler failed: {error}")]
    Failed {
        /// The underlying error message.
        error: String,
    },

    /// The handler observed the stop token and bailed out early.
    #[error("work canceled by stop request")]
    Canceled,
}

impl HandlerError {
    /// Convenience constructor for [`HandlerError::Failed`].
    pub fn failed(error: impl Into<String>) -> Self {
        HandlerError::Failed {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use worklatch::HandlerError;
    ///
    /// let err = HandlerError::failed("boom");
    /// assert_eq!(err.as_label(), "handler_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            HandlerError::Failed { .. } => "handler_failed",
            HandlerError::Canceled => "handler_canceled",
        }
    }
}
