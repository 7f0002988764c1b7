use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use neo4rs::{query, Graph, Query, Row};
use serde::Deserialize;
use tracing::{debug, info};

use extract::{EntityCandidate, RelationshipCandidate};
use ingest::Chunk;

use crate::cypher;
use crate::model::{
    relationship_display, ChildCommunity, CommunityInput, CommunityRecord, CommunityReport,
    DescriptionSet, GraphStats, ItemKey, MemberEntity, MemberRelationship, MergeOutcome,
    PartitionSummary, Record, RelationshipKey,
};
use crate::store::GraphStore;

pub struct Neo4jStore {
    graph: Graph,
}

fn column_count(row: &Row, column: &str) -> Result<usize> {
    let count: i64 = row
        .get(column)
        .with_context(|| format!("Failed to read count column {}", column))?;
    Ok(count.max(0) as usize)
}

#[derive(Deserialize)]
struct CommunityRow {
    id: String,
    level: i64,
    community_id: i64,
    parent: Option<String>,
    members: Vec<String>,
    title: Option<String>,
    summary: Option<String>,
    rating: Option<f64>,
    rating_explanation: Option<String>,
}

impl Neo4jStore {
    pub fn new(graph: Graph) -> Self {
        Self { graph }
    }

    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self> {
        let graph = Graph::new(uri, user, password)
            .await
            .with_context(|| format!("Failed to connect to Neo4j at {}", uri))?;
        Ok(Self::new(graph))
    }

    async fn rows(&self, statement: Query) -> Result<Vec<Row>> {
        let mut result = self.graph.execute(statement).await?;
        let mut rows = Vec::new();
        while let Some(row) = result.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    async fn single(&self, statement: Query) -> Result<Option<Row>> {
        let mut result = self.graph.execute(statement).await?;
        Ok(result.next().await?)
    }

    async fn count(&self, statement: Query, column: &str) -> Result<usize> {
        match self.single(statement).await? {
            Some(row) => column_count(&row, column),
            None => Ok(0),
        }
    }

    async fn drop_projection(&self) -> Result<()> {
        self.rows(query(cypher::DROP_PROJECTION).param("name", cypher::PROJECTION))
            .await
            .context("Failed to drop graph projection")?;
        Ok(())
    }
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn verify(&self) -> Result<()> {
        self.single(query(cypher::PING))
            .await
            .context("Neo4j is unreachable")?;

        let version = self
            .single(query(cypher::GDS_VERSION))
            .await
            .context("Graph Data Science library is not installed")?
            .and_then(|row| row.get::<String>("version").ok());

        match version {
            Some(version) => {
                info!(gds_version = %version, "Connected to Neo4j");
                Ok(())
            }
            None => bail!("Graph Data Science library did not report a version"),
        }
    }

    async fn init_schema(&self) -> Result<()> {
        for statement in cypher::CONSTRAINTS {
            self.graph
                .run(query(statement))
                .await
                .with_context(|| format!("Failed to apply schema statement: {}", statement))?;
        }
        debug!("Neo4j constraints in place");
        Ok(())
    }

    async fn upsert_chunk(&self, chunk: &Chunk) -> Result<()> {
        let statement = query(cypher::UPSERT_CHUNK)
            .param("id", chunk.chunk_id.clone())
            .param("doc_id", chunk.doc_id.clone())
            .param("text", chunk.text.clone())
            .param("source", chunk.source.clone())
            .param("start", chunk.offset.0 as i64)
            .param("end", chunk.offset.1 as i64);

        self.graph
            .run(statement)
            .await
            .with_context(|| format!("Failed to store chunk {}", chunk.chunk_id))
    }

    async fn merge_entity(&self, entity: &EntityCandidate, chunk_id: Option<&str>) -> Result<MergeOutcome> {
        let statement = query(cypher::MERGE_ENTITY)
            .param("key", entity.key.clone())
            .param("name", entity.name.clone())
            .param("type", entity.entity_type.clone())
            .param("description", entity.description.clone())
            .param("chunk_id", chunk_id.unwrap_or_default());

        let row = self
            .single(statement)
            .await
            .with_context(|| format!("Failed to merge entity {}", entity.key))?
            .with_context(|| format!("Entity merge for {} returned nothing", entity.key))?;

        let stored_type: String = row.get("stored_type")?;
        Ok(MergeOutcome {
            created: row.get("created")?,
            fragment_added: row.get("added")?,
            conflicting_type: (stored_type != entity.entity_type).then_some(stored_type),
        })
    }

    async fn merge_relationship(
        &self,
        relationship: &RelationshipCandidate,
        chunk_id: Option<&str>,
    ) -> Result<MergeOutcome> {
        let statement = query(cypher::MERGE_RELATIONSHIP)
            .param("source", relationship.source_key.clone())
            .param("source_name", relationship.source_name.clone())
            .param("target", relationship.target_key.clone())
            .param("target_name", relationship.target_name.clone())
            .param("type", relationship.relationship_type.clone())
            .param("description", relationship.description.clone())
            .param("strength", relationship.strength)
            .param("chunk_id", chunk_id.unwrap_or_default());

        let display =
            relationship_display(&relationship.source_key, &relationship.relationship_type, &relationship.target_key);
        let row = self
            .single(statement)
            .await
            .with_context(|| format!("Failed to merge relationship {}", display))?
            .with_context(|| format!("Relationship merge for {} returned nothing", display))?;

        Ok(MergeOutcome {
            created: row.get("created")?,
            fragment_added: row.get("added")?,
            conflicting_type: None,
        })
    }

    async fn adopt_single_fragments(&self) -> Result<usize> {
        let entities = self
            .count(query(cypher::ADOPT_ENTITY_FRAGMENTS), "updated")
            .await
            .context("Failed to adopt single entity fragments")?;
        let relationships = self
            .count(query(cypher::ADOPT_RELATIONSHIP_FRAGMENTS), "updated")
            .await
            .context("Failed to adopt single relationship fragments")?;
        Ok(entities + relationships)
    }

    async fn stale_descriptions(&self) -> Result<Vec<DescriptionSet>> {
        let mut stale = Vec::new();

        for row in self.rows(query(cypher::STALE_ENTITIES)).await? {
            stale.push(DescriptionSet {
                item: ItemKey::Entity { key: row.get("key")? },
                name: row.get("name")?,
                fragments: row.get("fragments")?,
            });
        }

        for row in self.rows(query(cypher::STALE_RELATIONSHIPS)).await? {
            let key = RelationshipKey {
                source: row.get("source")?,
                target: row.get("target")?,
                relationship_type: row.get("type")?,
            };
            let source_name: String = row.get("source_name")?;
            let target_name: String = row.get("target_name")?;
            stale.push(DescriptionSet {
                name: relationship_display(&source_name, &key.relationship_type, &target_name),
                item: ItemKey::Relationship(key),
                fragments: row.get("fragments")?,
            });
        }

        Ok(stale)
    }

    async fn save_summary(&self, item: &ItemKey, summary: &str, fragment_count: usize) -> Result<bool> {
        let statement = match item {
            ItemKey::Entity { key } => query(cypher::SAVE_ENTITY_SUMMARY).param("key", key.clone()),
            ItemKey::Relationship(key) => query(cypher::SAVE_RELATIONSHIP_SUMMARY)
                .param("source", key.source.clone())
                .param("target", key.target.clone())
                .param("type", key.relationship_type.clone()),
        }
        .param("summary", summary)
        .param("count", fragment_count as i64);

        let saved = self
            .count(statement, "saved")
            .await
            .context("Failed to save summary")?;
        Ok(saved > 0)
    }

    async fn partition(&self) -> Result<PartitionSummary> {
        self.graph
            .run(query(cypher::DELETE_COMMUNITIES))
            .await
            .context("Failed to clear previous communities")?;

        if self.count(query(cypher::COUNT_ENTITIES), "count").await? == 0 {
            return Ok(PartitionSummary::default());
        }

        self.drop_projection().await?;
        let projected = self
            .single(query(cypher::PROJECT_ENTITIES).param("name", cypher::PROJECTION))
            .await
            .context("Failed to project entity graph")?;
        if let Some(row) = projected {
            debug!(
                nodes = row.get::<i64>("nodes").unwrap_or(0),
                relationships = row.get::<i64>("relationships").unwrap_or(0),
                "Projected entity graph"
            );
        }

        let leiden = self
            .single(query(cypher::LEIDEN_WRITE).param("name", cypher::PROJECTION))
            .await
            .context("Leiden community detection failed")?;
        if let Some(row) = leiden {
            debug!(
                ran_levels = row.get::<i64>("ranLevels").unwrap_or(0),
                communities = row.get::<i64>("communityCount").unwrap_or(0),
                "Leiden finished"
            );
        }

        self.graph
            .run(query(cypher::WRITE_HIERARCHY))
            .await
            .context("Failed to write community hierarchy")?;
        self.drop_projection().await?;

        let shape = self
            .single(query(cypher::COMMUNITY_SHAPE))
            .await?
            .context("Community count returned nothing")?;
        let total = column_count(&shape, "total")?;
        let levels = match shape.get::<Option<i64>>("top").ok().flatten() {
            Some(top) => top.max(0) as usize + 1,
            None => 0,
        };

        Ok(PartitionSummary {
            levels,
            community_count: total,
            top_level_count: column_count(&shape, "top_count")?,
        })
    }

    async fn community_inputs(&self, level: usize) -> Result<Vec<CommunityInput>> {
        let rows = self
            .rows(query(cypher::COMMUNITY_INPUTS).param("level", level as i64))
            .await
            .with_context(|| format!("Failed to load level {} communities", level))?;

        let mut inputs = Vec::with_capacity(rows.len());
        for row in rows {
            inputs.push(CommunityInput {
                id: row.get("id")?,
                level,
                entities: row.get::<Vec<MemberEntity>>("entities")?,
                relationships: row.get::<Vec<MemberRelationship>>("relationships")?,
                children: row.get::<Vec<ChildCommunity>>("children")?,
            });
        }
        Ok(inputs)
    }

    async fn save_community_report(&self, community_id: &str, report: &CommunityReport) -> Result<()> {
        let statement = query(cypher::SAVE_COMMUNITY_REPORT)
            .param("id", community_id)
            .param("title", report.title.clone())
            .param("summary", report.summary.clone())
            .param("rating", report.rating)
            .param("rating_explanation", report.rating_explanation.clone());

        if self.count(statement, "saved").await? == 0 {
            bail!("Unknown community {}", community_id);
        }
        Ok(())
    }

    async fn communities(&self) -> Result<Vec<CommunityRecord>> {
        let mut communities = Vec::new();

        for row in self.rows(query(cypher::COMMUNITIES)).await? {
            let row: CommunityRow = row.to()?;
            let report = match (row.title, row.summary) {
                (Some(title), Some(summary)) => Some(CommunityReport {
                    title,
                    summary,
                    rating: row.rating.unwrap_or_default(),
                    rating_explanation: row.rating_explanation.unwrap_or_default(),
                }),
                _ => None,
            };
            communities.push(CommunityRecord {
                id: row.id,
                level: row.level.max(0) as usize,
                community_id: row.community_id,
                parent: row.parent,
                members: row.members,
                report,
            });
        }

        Ok(communities)
    }

    async fn query(&self, statement: &str) -> Result<Vec<Record>> {
        let rows = self
            .rows(query(statement))
            .await
            .context("Query failed")?;

        rows.iter()
            .map(|row| row.to::<Record>().context("Failed to decode query row"))
            .collect()
    }

    async fn stats(&self) -> Result<GraphStats> {
        let row = self
            .single(query(cypher::STATS))
            .await?
            .context("Statistics query returned nothing")?;
        Ok(GraphStats {
            chunk_count: column_count(&row, "chunks")?,
            entity_count: column_count(&row, "entities")?,
            relationship_count: column_count(&row, "relationships")?,
            community_count: column_count(&row, "communities")?,
        })
    }
}
