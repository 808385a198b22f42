//! Boosted Decision Tree model
//!
//! Trees hold leaf values in margin (log-odds) space; the ensemble output is
//! `sigmoid(base_margin + sum(tree outputs))`. Models serialize to canonical
//! JSON with sorted keys so the blake3 hash of a model is reproducible.

pub mod model;
pub mod tree;

pub use model::{logit, sigmoid, EvalHistory, GbdtModel, MODEL_VERSION};
pub use tree::{Node, Tree};
