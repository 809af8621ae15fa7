//! Core types and traits shared by every neuron crate.
//!
//! `neuron-types` defines the vocabulary the rest of the workspace builds
//! on: messages and content blocks, completion requests/responses, the
//! object-safe [`ToolDyn`] interface alongside the strongly-typed [`Tool`]
//! trait tools actually implement, the [`Provider`] and [`ContextStrategy`]
//! seams that `neuron-loop` drives, and the error enum for each of those
//! concerns. None of it depends on any other crate in the workspace.

pub mod error;
pub mod stream;
pub mod traits;
pub mod types;
pub mod wasm;

pub use error::*;
pub use stream::*;
pub use traits::*;
pub use types::*;
pub use wasm::*;
