//! Wire types for the accelerator HTTP contract.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `POST /api/memory/similarity` request.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarityRequest<'a> {
    /// First vector.
    pub vector_a: &'a [f32],
    /// Second vector.
    pub vector_b: &'a [f32],
}

/// `POST /api/memory/similarity` response.
#[derive(Clone, Debug, Deserialize)]
pub struct SimilarityResponse {
    /// Cosine similarity.
    pub similarity: f64,
}

/// `POST /api/memory/batch-similarity` request.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSimilarityRequest<'a> {
    /// Vector compared against every entry of `vectors`.
    pub base_vector: &'a [f32],
    /// Candidate vectors.
    pub vectors: &'a [Vec<f32>],
}

/// `POST /api/memory/batch-similarity` response.
#[derive(Clone, Debug, Deserialize)]
pub struct BatchSimilarityResponse {
    /// One similarity per candidate, in request order.
    pub results: Vec<f64>,
}

/// A user memory with its embedding, as sent to the contextual endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedMemory {
    /// Memory identifier.
    pub id: String,
    /// Memory text.
    pub content: String,
    /// Category identifier.
    pub category: String,
    /// Importance in `0.0..=1.0`.
    pub importance_score: f64,
    /// Embedding vector.
    pub embedding: Vec<f32>,
}

/// `POST /api/memory/contextual` request.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextualRequest<'a> {
    /// User the memories belong to.
    pub user_id: String,
    /// Embedding of the current conversation context.
    pub context_embedding: &'a [f32],
    /// Candidate memories.
    pub user_memories: &'a [EmbeddedMemory],
    /// Minimum similarity to keep.
    pub similarity_threshold: f64,
    /// Maximum memories returned.
    pub max_results: usize,
}

/// One memory returned by the contextual endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelevantMemory {
    /// Memory identifier.
    pub id: String,
    /// Memory text.
    #[serde(default)]
    pub content: String,
    /// Similarity to the context embedding.
    pub similarity: f64,
    /// Combined relevance score, when the service computes one.
    #[serde(default)]
    pub relevance_score: Option<f64>,
}

/// Priority of a background processing task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    /// Run whenever.
    Low,
    /// Default priority.
    Normal,
    /// Run first.
    High,
}

/// `POST /api/memory/process` request.
#[derive(Clone, Debug, Serialize)]
pub struct ProcessRequest {
    /// Task type understood by the accelerator.
    #[serde(rename = "type")]
    pub task_type: String,
    /// Scheduling priority.
    pub priority: TaskPriority,
    /// Task payload.
    pub payload: Value,
}
