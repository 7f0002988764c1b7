use serde::{Deserialize, Serialize};

/// One row of a passthrough read query
pub type Record = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelationshipKey {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub relationship_type: String,
}

/// Anything that carries a fragment list and a summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ItemKey {
    Entity { key: String },
    Relationship(RelationshipKey),
}

/// Result of one atomic upsert
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub created: bool,
    /// False when the same fragment text was already stored
    pub fragment_added: bool,
    /// Stored type when it differs from the incoming one
    pub conflicting_type: Option<String>,
}

/// An entity first named only as a relationship endpoint has no type and no
/// fragments until an extraction describes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub key: String,
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: Option<String>,
    pub fragments: Vec<String>,
    pub summary: Option<String>,
    /// Fragment count the summary was computed from
    pub summary_fragments: usize,
    pub chunk_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    pub key: RelationshipKey,
    pub source_name: String,
    pub target_name: String,
    pub strength: f64,
    pub fragments: Vec<String>,
    pub summary: Option<String>,
    pub summary_fragments: usize,
    pub chunk_ids: Vec<String>,
}

/// A multi-fragment item whose summary is missing or out of date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptionSet {
    pub item: ItemKey,
    /// Human-readable name used in the summarization prompt
    pub name: String,
    pub fragments: Vec<String>,
}

pub fn relationship_display(source_name: &str, relationship_type: &str, target_name: &str) -> String {
    format!("{} {} {}", source_name, relationship_type, target_name)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSummary {
    pub levels: usize,
    /// Communities across all levels
    pub community_count: usize,
    pub top_level_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberEntity {
    pub key: String,
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: Option<String>,
    pub summary: Option<String>,
    pub mentions: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberRelationship {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub relationship_type: String,
    pub summary: Option<String>,
    pub strength: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildCommunity {
    pub id: String,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub rating: Option<f64>,
}

/// Everything the community summarizer needs for one community
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityInput {
    pub id: String,
    pub level: usize,
    pub entities: Vec<MemberEntity>,
    pub relationships: Vec<MemberRelationship>,
    pub children: Vec<ChildCommunity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityReport {
    pub title: String,
    pub summary: String,
    pub rating: f64,
    pub rating_explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityRecord {
    pub id: String,
    pub level: usize,
    pub community_id: i64,
    pub parent: Option<String>,
    /// Entity keys, transitively through child communities
    pub members: Vec<String>,
    pub report: Option<CommunityReport>,
}

pub fn community_node_id(level: usize, community_id: i64) -> String {
    format!("{}-{}", level, community_id)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub chunk_count: usize,
    pub entity_count: usize,
    pub relationship_count: usize,
    pub community_count: usize,
}
