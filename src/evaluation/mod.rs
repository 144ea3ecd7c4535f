//! Interaction evaluation

pub mod evaluator;

pub use evaluator::{EvaluationReport, EvaluationResult, EvaluationType, Evaluator, Interaction};
