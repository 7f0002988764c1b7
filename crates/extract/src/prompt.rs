pub const EXTRACTION_SYSTEM_PROMPT: &str =
    "You extract knowledge graphs from text. You answer with a single JSON object and nothing else.";

/// Sentence appended to generation prompts when output must be in a
/// specific language.
pub fn language_directive(language: Option<&str>) -> String {
    match language.map(str::trim).filter(|l| !l.is_empty()) {
        Some(language) => format!("\nWrite every description and summary in {}.\n", language),
        None => String::new(),
    }
}

pub fn build_extraction_prompt(chunk_text: &str, entity_types: &[&str], language: Option<&str>) -> String {
    let types = entity_types.join(", ");
    format!(
        r#"Extract entities and relationships from the following text.

INSTRUCTIONS:
1. Identify every entity whose type is one of: {types}
2. For each entity give its name as written in the text, its type and a comprehensive description of its attributes and activities
3. Identify every pair of extracted entities that are clearly related
4. For each relationship explain why the entities are related and rate the strength of the relationship from 1 to 10
5. Output ONLY valid JSON, nothing else

SCHEMA:
{{
  "entities": [
    {{"name": "EntityName", "type": "one of the entity types", "description": "comprehensive description"}}
  ],
  "relationships": [
    {{"source": "EntityName", "target": "OtherEntityName", "type": "SHORT_VERB_PHRASE", "description": "why they are related", "strength": 7}}
  ]
}}

RULES:
- Entity types must be one of: {types}
- Relationship source and target must be names of extracted entities
- Relationship types should be short verb phrases: "works_for", "located_in", "founded", etc.
- Strength is an integer between 1 and 10
- Output ONLY the JSON object, no markdown, no explanations
{language}
TEXT:
{chunk_text}

JSON OUTPUT:"#,
        types = types,
        language = language_directive(language),
        chunk_text = chunk_text,
    )
}

pub fn build_retry_prompt(invalid_json: &str) -> String {
    format!(
        r#"The following JSON is invalid:

{}

Fix this JSON. Output only valid JSON with no markdown formatting, no code blocks, no explanations. Just the raw JSON object."#,
        invalid_json
    )
}
