use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static EDGE_NOISE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^[\s"'`(\[]+|[\s"'`)\].,;:!?]+$"#).expect("edge noise pattern")
});
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern"));
static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}]+").expect("non-word pattern"));

pub const DEFAULT_RELATIONSHIP_TYPE: &str = "RELATED_TO";

/// Display form of a name: surrounding quotes/brackets/punctuation removed,
/// inner whitespace collapsed, casing preserved.
pub fn clean_name(name: &str) -> String {
    let trimmed = EDGE_NOISE.replace_all(name, "");
    WHITESPACE.replace_all(&trimmed, " ").into_owned()
}

/// Dedup key: "weaviate", " Weaviate " and "WEAVIATE." all map to "WEAVIATE".
pub fn normalize_key(name: &str) -> String {
    clean_name(name).to_uppercase()
}

/// Relationship types are stored as UPPER_SNAKE labels.
pub fn normalize_relationship_type(raw: Option<&str>) -> String {
    let label = raw
        .map(|r| NON_WORD.replace_all(r.trim(), "_").trim_matches('_').to_uppercase())
        .unwrap_or_default();

    if label.is_empty() {
        DEFAULT_RELATIONSHIP_TYPE.to_string()
    } else {
        label
    }
}

/// Resolves names and entity types for one extraction call against the
/// caller's allow-list.
pub struct EntityNormalizer {
    /// Maps uppercased label -> label as supplied by the caller
    allowed_types: HashMap<String, String>,
}

impl EntityNormalizer {
    pub fn new(allowed_types: &[String]) -> Self {
        let allowed_types = allowed_types
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(|t| (t.to_uppercase(), t.to_string()))
            .collect();

        Self { allowed_types }
    }

    pub fn key(&self, name: &str) -> String {
        normalize_key(name)
    }

    pub fn display_name(&self, name: &str) -> String {
        clean_name(name)
    }

    /// Canonical allow-list label for a model-supplied type, if allowed
    pub fn entity_type(&self, raw: &str) -> Option<String> {
        self.allowed_types.get(&normalize_key(raw)).cloned()
    }

    pub fn allowed_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.allowed_types.values().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}
