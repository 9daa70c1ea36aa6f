/// Default extraction instructions, aiming for the maximum number of
/// entities and relationships. Callers may supply their own per document
/// type; prompt text is a parameter everywhere downstream.
pub const GENERIC_EXTRACTION_PROMPT: &str = r#"Extract all entities and relationships from this text to build a knowledge graph.

Return ONLY this JSON format:
{
  "nodes": [
    {"id": "entity_id", "type": "EntityType", "properties": {"description": "what is this"}}
  ],
  "relationships": [
    {"source": "id1", "target": "id2", "type": "RELATIONSHIP", "properties": {"description": "how they relate"}}
  ]
}

Rules:
- Extract EVERY entity: people, organizations, places, concepts, products, events
- Use simple IDs like "person_name", "org_name", "concept_name"
- Extract ALL relationships between entities
- If no entities, return {"nodes": [], "relationships": []}
- Return ONLY JSON, no markdown or text"#;

#[derive(Debug, Clone)]
pub struct ExtractionPrompt {
    pub system: String,
}

impl Default for ExtractionPrompt {
    fn default() -> Self {
        Self {
            system: GENERIC_EXTRACTION_PROMPT.to_string(),
        }
    }
}

impl ExtractionPrompt {
    pub fn custom(system: Option<String>) -> Self {
        match system {
            Some(system) if !system.trim().is_empty() => Self { system },
            _ => Self::default(),
        }
    }

    pub fn user_message(&self, chunk_text: &str) -> String {
        format!(
            "Extract entities and relationships from this text:\n\n{}",
            chunk_text
        )
    }
}

pub fn summary_prompt(text: &str) -> String {
    format!(
        "Summarize the following document excerpt in 2-3 sentences. \
         Keep it concise and factual. Do NOT use markdown formatting.\n\n{}",
        text
    )
}
