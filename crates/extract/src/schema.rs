use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::normalizer::{normalize_relationship_type, EntityNormalizer};

/// Strength scale requested from the model
pub const MIN_STRENGTH: f64 = 1.0;
pub const MAX_STRENGTH: f64 = 10.0;
/// Used when the model leaves strength out
pub const DEFAULT_STRENGTH: f64 = 1.0;

/// Entity record as the model wrote it
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEntity {
    #[serde(default, alias = "entity_name")]
    pub name: Option<String>,
    #[serde(default, rename = "type", alias = "entity_type")]
    pub entity_type: Option<String>,
    #[serde(default, alias = "entity_description")]
    pub description: Option<String>,
}

/// Relationship record as the model wrote it
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRelationship {
    #[serde(default, alias = "source_entity")]
    pub source: Option<String>,
    #[serde(default, alias = "target_entity")]
    pub target: Option<String>,
    #[serde(default, rename = "type", alias = "relation")]
    pub relationship_type: Option<String>,
    #[serde(default, alias = "relationship_description", alias = "evidence")]
    pub description: Option<String>,
    #[serde(default, alias = "relationship_strength")]
    pub strength: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityCandidate {
    /// Normalized dedup key
    pub key: String,
    /// Display name as first written
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipCandidate {
    pub source_key: String,
    pub source_name: String,
    pub target_key: String,
    pub target_name: String,
    #[serde(rename = "type")]
    pub relationship_type: String,
    pub description: String,
    pub strength: f64,
}

/// One validated extraction hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Candidate {
    Entity(EntityCandidate),
    Relationship(RelationshipCandidate),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub candidates: Vec<Candidate>,
    /// Records dropped because a required field was missing or invalid
    pub rejected: usize,
}

impl ExtractionResult {
    pub fn entities(&self) -> impl Iterator<Item = &EntityCandidate> {
        self.candidates.iter().filter_map(|c| match c {
            Candidate::Entity(e) => Some(e),
            Candidate::Relationship(_) => None,
        })
    }

    pub fn relationships(&self) -> impl Iterator<Item = &RelationshipCandidate> {
        self.candidates.iter().filter_map(|c| match c {
            Candidate::Relationship(r) => Some(r),
            Candidate::Entity(_) => None,
        })
    }
}

fn required(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl RawEntity {
    /// All of name, allow-listed type and description must be present.
    pub fn validate(&self, normalizer: &EntityNormalizer) -> Option<EntityCandidate> {
        let raw_name = required(&self.name)?;
        let entity_type = normalizer.entity_type(required(&self.entity_type)?)?;
        let description = required(&self.description)?;

        let key = normalizer.key(raw_name);
        if key.is_empty() {
            return None;
        }

        Some(EntityCandidate {
            key,
            name: normalizer.display_name(raw_name),
            entity_type,
            description: description.to_string(),
        })
    }
}

impl RawRelationship {
    /// Both endpoints and a description are required; self-loops and
    /// non-numeric strengths are rejected, numeric strengths are clamped.
    pub fn validate(&self, normalizer: &EntityNormalizer) -> Option<RelationshipCandidate> {
        let source = required(&self.source)?;
        let target = required(&self.target)?;
        let description = required(&self.description)?;

        let source_key = normalizer.key(source);
        let target_key = normalizer.key(target);
        if source_key.is_empty() || target_key.is_empty() || source_key == target_key {
            return None;
        }

        let strength = match &self.strength {
            None | Some(Value::Null) => DEFAULT_STRENGTH,
            Some(value) => parse_strength(value)?,
        };

        Some(RelationshipCandidate {
            source_key,
            source_name: normalizer.display_name(source),
            target_key,
            target_name: normalizer.display_name(target),
            relationship_type: normalize_relationship_type(self.relationship_type.as_deref()),
            description: description.to_string(),
            strength,
        })
    }
}

fn parse_strength(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };

    number
        .is_finite()
        .then(|| number.clamp(MIN_STRENGTH, MAX_STRENGTH))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn normalizer() -> EntityNormalizer {
        EntityNormalizer::new(&["Person".to_string(), "Organization".to_string()])
    }

    #[test]
    fn test_entity_requires_allowed_type() {
        let ok: RawEntity = serde_json::from_value(json!({
            "name": "Alice", "type": "person", "description": "An engineer"
        })).unwrap();
        let bad_type: RawEntity = serde_json::from_value(json!({
            "name": "Paris", "type": "Location", "description": "A city"
        })).unwrap();
        let no_description: RawEntity = serde_json::from_value(json!({
            "name": "Bob", "type": "Person"
        })).unwrap();

        let candidate = ok.validate(&normalizer()).unwrap();
        assert_eq!(candidate.key, "ALICE");
        assert_eq!(candidate.name, "Alice");
        assert_eq!(candidate.entity_type, "Person");
        assert!(bad_type.validate(&normalizer()).is_none());
        assert!(no_description.validate(&normalizer()).is_none());
    }

    #[test]
    fn test_relationship_strength_handling() {
        let clamped: RawRelationship = serde_json::from_value(json!({
            "source": "Alice", "target": "Acme", "description": "works at", "strength": 42
        })).unwrap();
        let textual: RawRelationship = serde_json::from_value(json!({
            "source": "Alice", "target": "Acme", "description": "works at", "strength": "7"
        })).unwrap();
        let garbage: RawRelationship = serde_json::from_value(json!({
            "source": "Alice", "target": "Acme", "description": "works at", "strength": "very"
        })).unwrap();
        let missing: RawRelationship = serde_json::from_value(json!({
            "source": "Alice", "target": "Acme", "description": "works at"
        })).unwrap();

        assert_eq!(clamped.validate(&normalizer()).unwrap().strength, MAX_STRENGTH);
        assert_eq!(textual.validate(&normalizer()).unwrap().strength, 7.0);
        assert!(garbage.validate(&normalizer()).is_none());
        assert_eq!(missing.validate(&normalizer()).unwrap().strength, DEFAULT_STRENGTH);
    }

    #[test]
    fn test_relationship_rejects_self_loop() {
        let raw: RawRelationship = serde_json::from_value(json!({
            "source": "Acme", "target": "ACME", "description": "is itself", "strength": 3
        })).unwrap();
        assert!(raw.validate(&normalizer()).is_none());
    }

    #[test]
    fn test_candidate_is_tagged() {
        let candidate = Candidate::Entity(EntityCandidate {
            key: "A".into(),
            name: "A".into(),
            entity_type: "Person".into(),
            description: "d".into(),
        });
        let value = serde_json::to_value(&candidate).unwrap();
        assert_eq!(value["kind"], "entity");
        assert_eq!(value["type"], "Person");
    }
}
