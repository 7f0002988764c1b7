//! Permissive parsing of extraction output.
//!
//! The prompt asks for a JSON object, but models also wrap it in code fences,
//! prepend chatter, or fall back to the tuple-delimited record format
//! (`("entity";name;type;description)|("relationship";src;tgt;desc;strength)`).
//! Each record is decoded on its own so one malformed record never takes the
//! rest of the chunk with it.

use serde::Deserialize;
use serde_json::Value;

use crate::schema::{RawEntity, RawRelationship};

#[derive(Debug, Default)]
pub struct ParsedOutput {
    pub entities: Vec<RawEntity>,
    pub relationships: Vec<RawRelationship>,
    /// Records whose shape could not be decoded at all
    pub malformed: usize,
}

#[derive(Debug, thiserror::Error)]
#[error("unrecognized extraction output: {0}")]
pub struct ParseError(pub String);

#[derive(Deserialize)]
struct JsonEnvelope {
    #[serde(default)]
    entities: Vec<Value>,
    #[serde(default, alias = "relations")]
    relationships: Vec<Value>,
}

/// Strip a ```json fence and anything around the outermost JSON object.
pub fn extract_json_object(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix("```").unwrap_or(trimmed).trim();

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (start < end).then(|| &trimmed[start..=end])
}

pub fn parse_extraction_output(output: &str) -> Result<ParsedOutput, ParseError> {
    if let Some(parsed) = parse_json(output) {
        return Ok(parsed);
    }

    let parsed = parse_delimited(output);
    if parsed.entities.is_empty() && parsed.relationships.is_empty() {
        let preview: String = output.chars().take(120).collect();
        return Err(ParseError(preview));
    }

    Ok(parsed)
}

fn parse_json(output: &str) -> Option<ParsedOutput> {
    let envelope: JsonEnvelope = serde_json::from_str(extract_json_object(output)?).ok()?;
    let mut parsed = ParsedOutput::default();

    for value in envelope.entities {
        match serde_json::from_value::<RawEntity>(value) {
            Ok(entity) => parsed.entities.push(entity),
            Err(_) => parsed.malformed += 1,
        }
    }
    for value in envelope.relationships {
        match serde_json::from_value::<RawRelationship>(value) {
            Ok(relationship) => parsed.relationships.push(relationship),
            Err(_) => parsed.malformed += 1,
        }
    }

    Some(parsed)
}

fn parse_delimited(output: &str) -> ParsedOutput {
    let cleaned = output.replace("{completion_delimiter}", "");
    let cleaned = cleaned.trim();

    let record_delimiter = if cleaned.contains("{record_delimiter}") {
        "{record_delimiter}"
    } else if cleaned.contains('|') {
        "|"
    } else {
        "\n"
    };
    let tuple_delimiter = if cleaned.contains("{tuple_delimiter}") {
        "{tuple_delimiter}"
    } else if cleaned.contains(';') {
        ";"
    } else {
        "\t"
    };

    let mut parsed = ParsedOutput::default();

    for record in cleaned.split(record_delimiter).map(str::trim) {
        if record.is_empty() {
            continue;
        }
        let record = record
            .strip_prefix('(')
            .and_then(|r| r.strip_suffix(')'))
            .unwrap_or(record)
            .trim();

        let tokens: Vec<String> = record
            .split(tuple_delimiter)
            .map(|t| t.trim().to_string())
            .collect();
        let kind = tokens[0].trim_matches(|c| c == '"' || c == '\'' || c == ' ').to_lowercase();

        match (kind.as_str(), tokens.len()) {
            ("entity", 4) => parsed.entities.push(RawEntity {
                name: Some(tokens[1].clone()),
                entity_type: Some(tokens[2].clone()),
                description: Some(tokens[3].clone()),
            }),
            ("relationship", 5) => parsed.relationships.push(RawRelationship {
                source: Some(tokens[1].clone()),
                target: Some(tokens[2].clone()),
                relationship_type: None,
                description: Some(tokens[3].clone()),
                strength: Some(Value::String(tokens[4].clone())),
            }),
            ("relationship", 6) => parsed.relationships.push(RawRelationship {
                source: Some(tokens[1].clone()),
                target: Some(tokens[2].clone()),
                relationship_type: Some(tokens[3].clone()),
                description: Some(tokens[4].clone()),
                strength: Some(Value::String(tokens[5].clone())),
            }),
            ("entity", _) | ("relationship", _) => parsed.malformed += 1,
            _ => {}
        }
    }

    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_fenced_json() {
        let output = r#"Here you go:
```json
{"entities": [{"name": "Alice", "type": "Person", "description": "engineer"}],
 "relationships": [{"source": "Alice", "target": "Acme", "type": "works_for", "description": "employee", "strength": 8}]}
```"#;
        let parsed = parse_extraction_output(output).unwrap();

        assert_eq!(parsed.entities.len(), 1);
        assert_eq!(parsed.relationships.len(), 1);
        assert_eq!(parsed.entities[0].name.as_deref(), Some("Alice"));
        assert_eq!(parsed.relationships[0].relationship_type.as_deref(), Some("works_for"));
    }

    #[test]
    fn test_malformed_record_does_not_drop_siblings() {
        let output = r#"{"entities": [{"name": "Alice", "type": "Person", "description": "x"}, 42],
                         "relations": [{"source": "Alice", "target": "Bob", "evidence": "met"}]}"#;
        let parsed = parse_extraction_output(output).unwrap();

        assert_eq!(parsed.entities.len(), 1);
        assert_eq!(parsed.relationships.len(), 1);
        assert_eq!(parsed.relationships[0].description.as_deref(), Some("met"));
        assert_eq!(parsed.malformed, 1);
    }

    #[test]
    fn test_parses_delimited_records() {
        let output = "(\"entity\";Alice;Person;An engineer)|(\"entity\";Acme;Organization;A company)|\
                      (\"relationship\";Alice;Acme;Alice works at Acme;8){completion_delimiter}";
        let parsed = parse_extraction_output(output).unwrap();

        assert_eq!(parsed.entities.len(), 2);
        assert_eq!(parsed.relationships.len(), 1);
        assert_eq!(parsed.relationships[0].source.as_deref(), Some("Alice"));
        assert_eq!(parsed.relationships[0].strength, Some(Value::String("8".into())));
    }

    #[test]
    fn test_delimited_wrong_arity_is_malformed() {
        let output = "(\"entity\";Alice;Person)|(\"entity\";Bob;Person;A friend)";
        let parsed = parse_extraction_output(output).unwrap();

        assert_eq!(parsed.entities.len(), 1);
        assert_eq!(parsed.malformed, 1);
    }

    #[test]
    fn test_unstructured_output_is_an_error() {
        assert!(parse_extraction_output("I could not find any entities, sorry.").is_err());
        assert!(parse_extraction_output("").is_err());
    }
}
