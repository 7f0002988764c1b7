use anyhow::{bail, Result};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use petgraph::graph::UnGraph;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

use extract::{EntityCandidate, RelationshipCandidate};
use ingest::Chunk;

use crate::louvain::LouvainDetector;
use crate::model::{
    community_node_id, relationship_display, ChildCommunity, CommunityInput, CommunityRecord,
    CommunityReport, DescriptionSet, EntityRecord, GraphStats, ItemKey, MemberEntity,
    MemberRelationship, MergeOutcome, PartitionSummary, Record, RelationshipKey,
    RelationshipRecord,
};
use crate::store::GraphStore;

/// In-process graph store. Same-key upserts serialize on the map entry lock.
/// Partitioning runs multi-level Louvain over the entity graph.
#[derive(Default)]
pub struct MemoryStore {
    chunks: DashMap<String, Chunk>,
    entities: DashMap<String, EntityRecord>,
    relationships: DashMap<RelationshipKey, RelationshipRecord>,
    communities: DashMap<String, CommunityRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity(&self, key: &str) -> Option<EntityRecord> {
        self.entities.get(key).map(|e| e.clone())
    }

    /// Snapshot sorted by key
    pub fn entities(&self) -> Vec<EntityRecord> {
        let mut entities: Vec<_> = self.entities.iter().map(|e| e.value().clone()).collect();
        entities.sort_by(|a, b| a.key.cmp(&b.key));
        entities
    }

    pub fn relationship(&self, key: &RelationshipKey) -> Option<RelationshipRecord> {
        self.relationships.get(key).map(|r| r.clone())
    }

    /// Snapshot sorted by key
    pub fn relationships(&self) -> Vec<RelationshipRecord> {
        let mut relationships: Vec<_> = self.relationships.iter().map(|r| r.value().clone()).collect();
        relationships.sort_by(|a, b| a.key.cmp(&b.key));
        relationships
    }

    fn child_communities(&self, parent: &str) -> Vec<ChildCommunity> {
        let mut children: Vec<_> = self
            .communities
            .iter()
            .filter(|c| c.parent.as_deref() == Some(parent))
            .map(|c| (c.community_id, ChildCommunity {
                id: c.id.clone(),
                title: c.report.as_ref().map(|r| r.title.clone()),
                summary: c.report.as_ref().map(|r| r.summary.clone()),
                rating: c.report.as_ref().map(|r| r.rating),
            }))
            .collect();
        children.sort_by_key(|(community_id, _)| *community_id);
        children.into_iter().map(|(_, child)| child).collect()
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) -> bool {
    if list.iter().any(|v| v == value) {
        false
    } else {
        list.push(value.to_string());
        true
    }
}

fn endpoint_entity(key: &str, name: &str) -> EntityRecord {
    EntityRecord {
        key: key.to_string(),
        name: name.to_string(),
        entity_type: None,
        fragments: Vec::new(),
        summary: None,
        summary_fragments: 0,
        chunk_ids: Vec::new(),
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn verify(&self) -> Result<()> {
        Ok(())
    }

    async fn init_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn upsert_chunk(&self, chunk: &Chunk) -> Result<()> {
        self.chunks
            .entry(chunk.chunk_id.clone())
            .or_insert_with(|| chunk.clone());
        Ok(())
    }

    async fn merge_entity(&self, entity: &EntityCandidate, chunk_id: Option<&str>) -> Result<MergeOutcome> {
        let chunk_id = chunk_id.filter(|id| self.chunks.contains_key(*id));

        let outcome = match self.entities.entry(entity.key.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(EntityRecord {
                    key: entity.key.clone(),
                    name: entity.name.clone(),
                    entity_type: Some(entity.entity_type.clone()),
                    fragments: vec![entity.description.clone()],
                    summary: None,
                    summary_fragments: 0,
                    chunk_ids: chunk_id.map(|id| vec![id.to_string()]).unwrap_or_default(),
                });
                MergeOutcome {
                    created: true,
                    fragment_added: true,
                    conflicting_type: None,
                }
            }
            Entry::Occupied(mut slot) => {
                let record = slot.get_mut();
                let created = record.entity_type.is_none();
                if created {
                    record.name = entity.name.clone();
                    record.entity_type = Some(entity.entity_type.clone());
                }
                let fragment_added = push_unique(&mut record.fragments, &entity.description);
                if let Some(id) = chunk_id {
                    push_unique(&mut record.chunk_ids, id);
                }
                MergeOutcome {
                    created,
                    fragment_added,
                    conflicting_type: record
                        .entity_type
                        .as_ref()
                        .filter(|stored| **stored != entity.entity_type)
                        .cloned(),
                }
            }
        };

        Ok(outcome)
    }

    async fn merge_relationship(
        &self,
        relationship: &RelationshipCandidate,
        chunk_id: Option<&str>,
    ) -> Result<MergeOutcome> {
        let chunk_id = chunk_id.filter(|id| self.chunks.contains_key(*id));

        for (key, name) in [
            (&relationship.source_key, &relationship.source_name),
            (&relationship.target_key, &relationship.target_name),
        ] {
            self.entities
                .entry(key.clone())
                .or_insert_with(|| endpoint_entity(key, name));
        }

        let key = RelationshipKey {
            source: relationship.source_key.clone(),
            target: relationship.target_key.clone(),
            relationship_type: relationship.relationship_type.clone(),
        };

        let outcome = match self.relationships.entry(key.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(RelationshipRecord {
                    key,
                    source_name: relationship.source_name.clone(),
                    target_name: relationship.target_name.clone(),
                    strength: relationship.strength,
                    fragments: vec![relationship.description.clone()],
                    summary: None,
                    summary_fragments: 0,
                    chunk_ids: chunk_id.map(|id| vec![id.to_string()]).unwrap_or_default(),
                });
                MergeOutcome {
                    created: true,
                    fragment_added: true,
                    conflicting_type: None,
                }
            }
            Entry::Occupied(mut slot) => {
                let record = slot.get_mut();
                record.strength = record.strength.max(relationship.strength);
                let fragment_added = push_unique(&mut record.fragments, &relationship.description);
                if let Some(id) = chunk_id {
                    push_unique(&mut record.chunk_ids, id);
                }
                MergeOutcome {
                    created: false,
                    fragment_added,
                    conflicting_type: None,
                }
            }
        };

        Ok(outcome)
    }

    async fn adopt_single_fragments(&self) -> Result<usize> {
        let mut adopted = 0;

        for mut entity in self.entities.iter_mut() {
            if entity.fragments.len() == 1 && (entity.summary.is_none() || entity.summary_fragments != 1) {
                entity.summary = Some(entity.fragments[0].clone());
                entity.summary_fragments = 1;
                adopted += 1;
            }
        }
        for mut relationship in self.relationships.iter_mut() {
            if relationship.fragments.len() == 1
                && (relationship.summary.is_none() || relationship.summary_fragments != 1)
            {
                relationship.summary = Some(relationship.fragments[0].clone());
                relationship.summary_fragments = 1;
                adopted += 1;
            }
        }

        Ok(adopted)
    }

    async fn stale_descriptions(&self) -> Result<Vec<DescriptionSet>> {
        let is_stale = |fragments: &[String], summary: &Option<String>, summarized: usize| {
            fragments.len() > 1 && (summary.is_none() || summarized != fragments.len())
        };

        let mut stale: Vec<DescriptionSet> = self
            .entities()
            .into_iter()
            .filter(|e| is_stale(&e.fragments, &e.summary, e.summary_fragments))
            .map(|e| DescriptionSet {
                item: ItemKey::Entity { key: e.key },
                name: e.name,
                fragments: e.fragments,
            })
            .collect();

        stale.extend(
            self.relationships()
                .into_iter()
                .filter(|r| is_stale(&r.fragments, &r.summary, r.summary_fragments))
                .map(|r| DescriptionSet {
                    name: relationship_display(&r.source_name, &r.key.relationship_type, &r.target_name),
                    item: ItemKey::Relationship(r.key),
                    fragments: r.fragments,
                }),
        );

        Ok(stale)
    }

    async fn save_summary(&self, item: &ItemKey, summary: &str, fragment_count: usize) -> Result<bool> {
        fn apply(
            fragments: &[String],
            slot: &mut Option<String>,
            summarized: &mut usize,
            summary: &str,
            fragment_count: usize,
        ) -> bool {
            if fragments.len() != fragment_count {
                return false;
            }
            *slot = Some(summary.to_string());
            *summarized = fragment_count;
            true
        }

        let saved = match item {
            ItemKey::Entity { key } => self.entities.get_mut(key).is_some_and(|mut entity| {
                let entity = &mut *entity;
                apply(&entity.fragments, &mut entity.summary, &mut entity.summary_fragments, summary, fragment_count)
            }),
            ItemKey::Relationship(key) => self.relationships.get_mut(key).is_some_and(|mut relationship| {
                let relationship = &mut *relationship;
                apply(
                    &relationship.fragments,
                    &mut relationship.summary,
                    &mut relationship.summary_fragments,
                    summary,
                    fragment_count,
                )
            }),
        };

        Ok(saved)
    }

    async fn partition(&self) -> Result<PartitionSummary> {
        self.communities.clear();

        let keys: Vec<String> = self.entities().into_iter().map(|e| e.key).collect();
        if keys.is_empty() {
            return Ok(PartitionSummary::default());
        }

        let mut graph: UnGraph<(), f64> = UnGraph::new_undirected();
        let index: HashMap<&str, _> = keys.iter().map(|k| (k.as_str(), graph.add_node(()))).collect();
        for relationship in self.relationships() {
            if let (Some(&a), Some(&b)) = (
                index.get(relationship.key.source.as_str()),
                index.get(relationship.key.target.as_str()),
            ) {
                graph.add_edge(a, b, 1.0);
            }
        }

        let levels = LouvainDetector::new(&graph).detect_hierarchy();

        for (level, assignment) in levels.iter().enumerate() {
            let mut members: BTreeMap<usize, Vec<String>> = BTreeMap::new();
            for (node, &community) in assignment.iter().enumerate() {
                members.entry(community).or_default().push(keys[node].clone());
            }

            for (community, member_keys) in members {
                let parent = levels.get(level + 1).and_then(|coarser| {
                    let first = assignment.iter().position(|&c| c == community)?;
                    Some(community_node_id(level + 1, coarser[first] as i64))
                });
                let id = community_node_id(level, community as i64);
                self.communities.insert(id.clone(), CommunityRecord {
                    id,
                    level,
                    community_id: community as i64,
                    parent,
                    members: member_keys,
                    report: None,
                });
            }
        }

        let top_level_count = levels
            .last()
            .map(|top| top.iter().collect::<HashSet<_>>().len())
            .unwrap_or(0);
        let summary = PartitionSummary {
            levels: levels.len(),
            community_count: self.communities.len(),
            top_level_count,
        };
        debug!(levels = summary.levels, communities = summary.community_count, "Partitioned entity graph");

        Ok(summary)
    }

    async fn community_inputs(&self, level: usize) -> Result<Vec<CommunityInput>> {
        let mut communities: Vec<CommunityRecord> = self
            .communities
            .iter()
            .filter(|c| c.level == level)
            .map(|c| c.value().clone())
            .collect();
        communities.sort_by_key(|c| c.community_id);

        let relationships = self.relationships();
        let mut inputs = Vec::with_capacity(communities.len());

        for community in communities {
            let members: HashSet<&str> = community.members.iter().map(String::as_str).collect();

            let entities = community
                .members
                .iter()
                .filter_map(|key| self.entities.get(key))
                .map(|e| MemberEntity {
                    key: e.key.clone(),
                    name: e.name.clone(),
                    entity_type: e.entity_type.clone(),
                    summary: e.summary.clone(),
                    mentions: e.chunk_ids.len(),
                })
                .collect();

            let internal = relationships
                .iter()
                .filter(|r| members.contains(r.key.source.as_str()) && members.contains(r.key.target.as_str()))
                .map(|r| MemberRelationship {
                    source: r.source_name.clone(),
                    target: r.target_name.clone(),
                    relationship_type: r.key.relationship_type.clone(),
                    summary: r.summary.clone(),
                    strength: r.strength,
                })
                .collect();

            inputs.push(CommunityInput {
                children: if level > 0 { self.child_communities(&community.id) } else { Vec::new() },
                id: community.id,
                level,
                entities,
                relationships: internal,
            });
        }

        Ok(inputs)
    }

    async fn save_community_report(&self, community_id: &str, report: &CommunityReport) -> Result<()> {
        match self.communities.get_mut(community_id) {
            Some(mut community) => {
                community.report = Some(report.clone());
                Ok(())
            }
            None => bail!("Unknown community {}", community_id),
        }
    }

    async fn communities(&self) -> Result<Vec<CommunityRecord>> {
        let mut communities: Vec<_> = self.communities.iter().map(|c| c.value().clone()).collect();
        communities.sort_by_key(|c| (c.level, c.community_id));
        Ok(communities)
    }

    async fn query(&self, _statement: &str) -> Result<Vec<Record>> {
        bail!("The in-memory store does not support query statements")
    }

    async fn stats(&self) -> Result<GraphStats> {
        Ok(GraphStats {
            chunk_count: self.chunks.len(),
            entity_count: self.entities.len(),
            relationship_count: self.relationships.len(),
            community_count: self.communities.len(),
        })
    }
}
