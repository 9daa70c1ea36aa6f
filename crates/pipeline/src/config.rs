use serde::{Deserialize, Serialize};

use ingest::ChunkerConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub chunking: ChunkingConfig,
    pub neo4j: Neo4jConfig,
    pub default_model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub token_chunk_size: usize,
    pub chunk_overlap: usize,
    /// Total token budget across the whole document; divided by the chunk
    /// size it caps how many chunks a run may produce.
    pub max_token_chunk_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Neo4jConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig {
                token_chunk_size: 130,
                chunk_overlap: 15,
                max_token_chunk_size: 10_000,
            },
            neo4j: Neo4jConfig {
                uri: "bolt://localhost:7687".to_string(),
                user: "neo4j".to_string(),
                password: "neo4j".to_string(),
            },
            default_model: "deepseek".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            chunking: ChunkingConfig {
                token_chunk_size: env_usize("TOKEN_CHUNK_SIZE", defaults.chunking.token_chunk_size),
                chunk_overlap: env_usize("CHUNK_OVERLAP", defaults.chunking.chunk_overlap),
                max_token_chunk_size: env_usize(
                    "MAX_TOKEN_CHUNK_SIZE",
                    defaults.chunking.max_token_chunk_size,
                ),
            },
            neo4j: Neo4jConfig {
                uri: env_string("NEO4J_URI", &defaults.neo4j.uri),
                user: env_string("NEO4J_USER", &defaults.neo4j.user),
                password: env_string("NEO4J_PASSWORD", &defaults.neo4j.password),
            },
            default_model: env_string("DEFAULT_MODEL", &defaults.default_model),
        }
    }

    pub fn chunker_config(&self) -> ChunkerConfig {
        ChunkerConfig {
            target_tokens: self.chunking.token_chunk_size,
            overlap_tokens: self.chunking.chunk_overlap,
            max_total_chunks: self.chunking.max_token_chunk_size / self.chunking.token_chunk_size.max(1),
        }
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}
