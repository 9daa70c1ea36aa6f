use serde::{Deserialize, Serialize};

fn default_node_type() -> String {
    "Entity".to_string()
}

fn default_edge_type() -> String {
    "RELATED_TO".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Properties {
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default = "default_node_type")]
    pub node_type: String,
    #[serde(default)]
    pub properties: Properties,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub target: String,
    #[serde(rename = "type", default = "default_edge_type")]
    pub edge_type: String,
    #[serde(default)]
    pub properties: Properties,
}

/// Raw node/edge payload extracted from one chunk, exactly as the model
/// returns it. Missing fields default so a sloppy response still parses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphPayload {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub relationships: Vec<GraphEdge>,
}

impl GraphPayload {
    pub fn absorb(&mut self, other: GraphPayload) {
        self.nodes.extend(other.nodes);
        self.relationships.extend(other.relationships);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    Success,
    /// The response was not valid structured output; payload is empty.
    ParseError,
    Failed,
}

/// The one tagged per-chunk result shape, regardless of which execution
/// strategy produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkOutcome {
    pub chunk_index: usize,
    pub status: ChunkStatus,
    pub data: GraphPayload,
    pub error: Option<String>,
}

impl ChunkOutcome {
    pub fn success(chunk_index: usize, data: GraphPayload) -> Self {
        Self {
            chunk_index,
            status: ChunkStatus::Success,
            data,
            error: None,
        }
    }

    pub fn parse_error(chunk_index: usize, error: impl Into<String>) -> Self {
        Self {
            chunk_index,
            status: ChunkStatus::ParseError,
            data: GraphPayload::default(),
            error: Some(error.into()),
        }
    }

    pub fn failed(chunk_index: usize, error: impl Into<String>) -> Self {
        Self {
            chunk_index,
            status: ChunkStatus::Failed,
            data: GraphPayload::default(),
            error: Some(error.into()),
        }
    }

    /// Classify a raw model response. An empty body counts as a successful
    /// empty extraction; a non-JSON body is downgraded to ParseError, never
    /// surfaced as a failure.
    pub fn from_response_text(chunk_index: usize, body: &str) -> Self {
        if body.trim().is_empty() {
            return Self::success(chunk_index, GraphPayload::default());
        }
        match serde_json::from_str::<GraphPayload>(body.trim()) {
            Ok(payload) => Self::success(chunk_index, payload),
            Err(err) => Self::parse_error(chunk_index, err.to_string()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == ChunkStatus::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_payload() {
        let body = r#"{
            "nodes": [{"id": "acme_corp", "type": "Organization", "properties": {"description": "a company"}}],
            "relationships": [{"source": "acme_corp", "target": "widget", "type": "produces"}]
        }"#;
        let outcome = ChunkOutcome::from_response_text(0, body);
        assert_eq!(outcome.status, ChunkStatus::Success);
        assert_eq!(outcome.data.nodes[0].id, "acme_corp");
        assert_eq!(outcome.data.relationships[0].edge_type, "produces");
    }

    #[test]
    fn empty_body_is_empty_success() {
        let outcome = ChunkOutcome::from_response_text(3, "   ");
        assert_eq!(outcome.status, ChunkStatus::Success);
        assert!(outcome.data.nodes.is_empty());
    }

    #[test]
    fn non_json_downgrades_to_parse_error() {
        let outcome = ChunkOutcome::from_response_text(1, "Sure! Here are the entities:");
        assert_eq!(outcome.status, ChunkStatus::ParseError);
        assert!(outcome.data.nodes.is_empty());
        assert!(outcome.error.is_some());
    }

    #[test]
    fn missing_fields_use_defaults() {
        let body = r#"{"nodes": [{"id": "x"}], "relationships": [{"source": "x", "target": "y"}]}"#;
        let outcome = ChunkOutcome::from_response_text(0, body);
        assert_eq!(outcome.data.nodes[0].node_type, "Entity");
        assert_eq!(outcome.data.relationships[0].edge_type, "RELATED_TO");
    }
}
