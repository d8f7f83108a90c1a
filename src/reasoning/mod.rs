//! Adversarial reasoning over retrieved evidence.
//!
//! - [`AdversarialReasoner`] gathers evidence, prompts a [`LanguageModel`]
//!   and returns a [`Critique`] whose citations all point into its evidence.
//! - [`parser`] rejects replies that do not follow the section protocol; the
//!   reasoner asks for one reformat before giving up.

mod error;
pub mod llm;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod parser;
pub mod protocol;
mod reasoner;

#[cfg(test)]
mod tests;

pub use error::{LlmError, ReasoningError};
pub use llm::{Conversation, GenaiModel, LanguageModel, Message, Role};
#[cfg(any(test, feature = "mock"))]
pub use mock::MockLanguageModel;
pub use parser::{Citation, ParseError, parse_critique};
pub use protocol::NO_EVIDENCE_NOTICE;
pub use reasoner::{
    AdversarialReasoner, Critique, ReasonerConfig, Weakness, WeaknessBasis, ground,
};
