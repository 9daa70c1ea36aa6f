use std::sync::OnceLock;

use regex::Regex;

use crate::error::GraphError;

/// Structural labels owned by the storage schema. An extracted entity type
/// that collides with one of these is renamed so it cannot shadow them.
pub const RESERVED_LABELS: [&str; 4] = ["Document", "Chunk", "Session", "Message"];

/// Marker label shared by every entity node regardless of its typed label.
pub const ENTITY_MARKER: &str = "__Entity__";

fn label_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid pattern"))
}

/// Turns an extracted entity type into a label safe to interpolate into a
/// query. Labels are not parameterizable, so anything outside the allowed
/// token pattern is rejected rather than escaped.
pub fn entity_label(node_type: &str) -> Result<String, GraphError> {
    let trimmed = node_type.trim();
    let base = if trimmed.is_empty() { "Entity" } else { trimmed };

    let label = if RESERVED_LABELS.contains(&base) {
        format!("{base}Entity")
    } else {
        base.to_string()
    };

    if !label_pattern().is_match(&label) {
        return Err(GraphError::InvalidLabel(label));
    }
    Ok(label)
}

/// Canonical relationship-type token: uppercase, spaces and hyphens become
/// underscores. Validated the same way as labels since relationship types
/// are interpolated too.
pub fn normalize_rel_type(rel_type: &str) -> Result<String, GraphError> {
    let trimmed = rel_type.trim();
    let base = if trimmed.is_empty() { "RELATED_TO" } else { trimmed };

    let token = base.to_uppercase().replace([' ', '-'], "_");
    if !label_pattern().is_match(&token) {
        return Err(GraphError::InvalidLabel(token));
    }
    Ok(token)
}
