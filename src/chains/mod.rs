//! Reasoning and evaluation chains plus model-output parsers.

pub mod evaluation;
pub mod parsers;
pub mod reasoning;

pub use evaluation::{EvaluationChain, ScoredOutcome};
pub use parsers::{ThoughtSpec, ValidationVerdict};
pub use reasoning::ReasoningChain;
