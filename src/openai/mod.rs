//! OpenAI-compatible wire types and the fake model catalog.

pub mod models;
pub mod types;

pub use models::{list_models, ModelProfile, MODEL_CATALOG};
pub use types::*;
