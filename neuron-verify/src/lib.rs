//! Verifier: post-condition checks and claim/citation entailment deciding
//! whether an `ExecutionResult` may surface to the user (spec.md §4.6).

pub mod claims;
pub mod entailment;
pub mod error;
pub mod postcondition;
pub mod types;
pub mod verifier;

pub use entailment::{EntailmentError, EntailmentModel, KeywordOverlapEntailment};
pub use error::VerifierError;
pub use postcondition::PostConditionTable;
pub use types::{Claim, ReasonCode, Status, Verdict};
pub use verifier::{Verifier, VerifierConfig};
