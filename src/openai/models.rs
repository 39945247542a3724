// Fake Model Catalog
// The static model list served by /v1/models and used for default
// model names of the fake generator.

use super::types::{Model, ModelsResponse};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Owner reported for every fake model
pub const FAKE_OWNER: &str = "fake-vllm";

pub const DEFAULT_COMPLETION_MODEL: &str = "fake-llama-3-8b";
pub const DEFAULT_CHAT_MODEL: &str = "fake-llama-3-8b";
pub const DEFAULT_EMBEDDING_MODEL: &str = "fake-e5-embeddings";

/// A model profile in the fake catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelProfile {
    /// Model identifier (e.g., "fake-mistral-7b")
    pub id: String,
    /// Maximum context length in tokens
    pub max_model_len: u32,
    /// Whether the model produces embeddings rather than text
    pub embedding: bool,
}

impl ModelProfile {
    fn new(id: &str, max_model_len: u32) -> Self {
        Self {
            id: id.to_string(),
            max_model_len,
            embedding: false,
        }
    }

    fn embeddings(mut self) -> Self {
        self.embedding = true;
        self
    }

    /// Wire representation with the given creation timestamp
    pub fn to_model(&self, created: i64) -> Model {
        Model {
            id: self.id.clone(),
            object: "model".to_string(),
            created,
            owned_by: FAKE_OWNER.to_string(),
            root: self.id.clone(),
            parent: None,
            max_model_len: self.max_model_len,
            permission: vec![],
        }
    }
}

/// Static catalog, in listing order
pub static MODEL_CATALOG: LazyLock<Vec<ModelProfile>> = LazyLock::new(|| {
    vec![
        ModelProfile::new("fake-llama-3-8b", 8192),
        ModelProfile::new("fake-mistral-7b", 32768),
        ModelProfile::new("fake-e5-embeddings", 512).embeddings(),
    ]
});

/// Get a model profile by ID
pub fn get_model_profile(model_id: &str) -> Option<&'static ModelProfile> {
    MODEL_CATALOG.iter().find(|p| p.id == model_id)
}

/// Get all model IDs in catalog order
pub fn all_model_ids() -> Vec<&'static str> {
    MODEL_CATALOG.iter().map(|p| p.id.as_str()).collect()
}

/// The `/v1/models` payload
pub fn list_models() -> ModelsResponse {
    let created = chrono::Utc::now().timestamp();
    ModelsResponse::new(MODEL_CATALOG.iter().map(|p| p.to_model(created)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_contents() {
        assert_eq!(
            all_model_ids(),
            vec!["fake-llama-3-8b", "fake-mistral-7b", "fake-e5-embeddings"]
        );
    }

    #[test]
    fn test_context_lengths() {
        assert_eq!(get_model_profile("fake-llama-3-8b").unwrap().max_model_len, 8192);
        assert_eq!(get_model_profile("fake-mistral-7b").unwrap().max_model_len, 32768);
        let e5 = get_model_profile("fake-e5-embeddings").unwrap();
        assert_eq!(e5.max_model_len, 512);
        assert!(e5.embedding);
        assert!(get_model_profile("gpt-4").is_none());
    }

    #[test]
    fn test_list_models_shape() {
        let json = serde_json::to_value(list_models()).unwrap();
        assert_eq!(json["object"], "list");
        let first = &json["data"][0];
        assert_eq!(first["object"], "model");
        assert_eq!(first["owned_by"], "fake-vllm");
        assert_eq!(first["root"], first["id"]);
        assert!(first["parent"].is_null());
        assert_eq!(first["permission"], serde_json::json!([]));
    }
}
