//! Streaming response types for providers that support incremental output.

use std::fmt;
use std::pin::Pin;

use futures::Stream;

use crate::types::{Message, TokenUsage};

/// One increment of a streamed completion.
///
/// Providers that support streaming emit a sequence of these through a
/// [`StreamHandle`]. Consumers demultiplex `ToolUse*` variants by `id` when
/// the model is filling in more than one tool call concurrently.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Incremental plain-text output.
    TextDelta(String),
    /// Incremental extended-thinking output.
    ThinkingDelta(String),
    /// Incremental cryptographic signature for a thinking block.
    SignatureDelta(String),
    /// A tool call has started; its input will follow as `ToolUseInputDelta`s.
    ToolUseStart {
        /// Unique identifier for this tool call.
        id: String,
        /// Name of the tool being invoked.
        name: String,
    },
    /// Incremental JSON input for a tool call in progress.
    ToolUseInputDelta {
        /// Identifier matching the `ToolUseStart` this delta belongs to.
        id: String,
        /// Next chunk of the tool call's JSON input.
        delta: String,
    },
    /// A tool call's input is complete.
    ToolUseEnd {
        /// Identifier matching the `ToolUseStart` this event closes.
        id: String,
    },
    /// The full assembled message, emitted once streaming completes.
    MessageComplete(Message),
    /// Token usage for the completion, typically the final event.
    Usage(TokenUsage),
    /// The stream ended with an error.
    Error(StreamError),
}

/// An error surfaced mid-stream.
#[derive(Debug, Clone)]
pub struct StreamError {
    /// Human-readable error message.
    pub message: String,
    /// Whether the caller may retry the request.
    pub is_retryable: bool,
}

impl StreamError {
    /// Construct a retryable stream error.
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            is_retryable: true,
        }
    }

    /// Construct a non-retryable stream error.
    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            is_retryable: false,
        }
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for StreamError {}

/// A handle to an in-progress streamed completion.
///
/// Wraps a boxed [`Stream`] of [`StreamEvent`]s. Providers construct one
/// per `complete_stream` call; callers poll it like any other stream.
pub struct StreamHandle {
    /// The underlying event stream.
    pub receiver: Pin<Box<dyn Stream<Item = StreamEvent> + Send>>,
}

impl fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamHandle").finish_non_exhaustive()
    }
}
