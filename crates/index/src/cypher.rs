//! Cypher statements used by [`crate::Neo4jStore`].
//!
//! Every read-modify-write statement takes the write lock on the node or edge
//! (`SET x._lock = true REMOVE x._lock`) before reading its fragment list.
//! The lock is held until the statement's transaction commits.

pub const PROJECTION: &str = "entity-graph";

pub const CONSTRAINTS: &[&str] = &[
    "CREATE CONSTRAINT chunk_id IF NOT EXISTS FOR (c:Chunk) REQUIRE c.id IS UNIQUE",
    "CREATE CONSTRAINT entity_key IF NOT EXISTS FOR (e:Entity) REQUIRE e.key IS UNIQUE",
    "CREATE CONSTRAINT community_id IF NOT EXISTS FOR (c:Community) REQUIRE c.id IS UNIQUE",
];

pub const PING: &str = "RETURN 1 AS ok";

pub const GDS_VERSION: &str = "RETURN gds.version() AS version";

pub const UPSERT_CHUNK: &str = r#"
MERGE (c:Chunk {id: $id})
ON CREATE SET c.doc_id = $doc_id, c.text = $text, c.source = $source,
              c.start = $start, c.end = $end
"#;

/// An endpoint-only entity (no type yet) takes the incoming name and type.
pub const MERGE_ENTITY: &str = r#"
MERGE (e:Entity {key: $key})
ON CREATE SET e.name = $name, e.fragments = [], e.summary_fragments = 0
SET e._lock = true
REMOVE e._lock
WITH e, e.type IS NULL AS created, NOT $description IN e.fragments AS added
SET e.name = CASE WHEN created THEN $name ELSE e.name END,
    e.type = coalesce(e.type, $type),
    e.fragments = CASE WHEN added THEN e.fragments + $description ELSE e.fragments END
WITH e, created, added
OPTIONAL MATCH (c:Chunk {id: $chunk_id})
FOREACH (_ IN CASE WHEN c IS NULL THEN [] ELSE [1] END | MERGE (c)-[:HAS_ENTITY]->(e))
RETURN created, added, e.type AS stored_type
"#;

/// Missing endpoints are created untyped. Endpoints are merged and locked in
/// key order so two writers on the same pair cannot deadlock. The chunk id is
/// only recorded when the chunk node exists.
pub const MERGE_RELATIONSHIP: &str = r#"
UNWIND CASE WHEN $source <= $target
       THEN [[$source, $source_name], [$target, $target_name]]
       ELSE [[$target, $target_name], [$source, $source_name]] END AS endpoint
MERGE (n:Entity {key: endpoint[0]})
ON CREATE SET n.name = endpoint[1], n.fragments = [], n.summary_fragments = 0
SET n._lock = true
REMOVE n._lock
WITH count(n) AS locked
MATCH (s:Entity {key: $source}), (t:Entity {key: $target})
MERGE (s)-[r:RELATION {type: $type}]->(t)
ON CREATE SET r.fragments = [], r.strength = $strength, r.summary_fragments = 0, r.chunk_ids = [],
              r.source_name = $source_name, r.target_name = $target_name
SET r._lock = true
REMOVE r._lock
WITH r, size(r.fragments) = 0 AS created, NOT $description IN r.fragments AS added
OPTIONAL MATCH (c:Chunk {id: $chunk_id})
SET r.fragments = CASE WHEN added THEN r.fragments + $description ELSE r.fragments END,
    r.strength = CASE WHEN $strength > r.strength THEN $strength ELSE r.strength END,
    r.chunk_ids = CASE WHEN c IS NULL OR $chunk_id IN r.chunk_ids
                       THEN r.chunk_ids ELSE r.chunk_ids + $chunk_id END
RETURN created, added
"#;

pub const ADOPT_ENTITY_FRAGMENTS: &str = r#"
MATCH (e:Entity)
WHERE size(e.fragments) = 1 AND (e.summary IS NULL OR e.summary_fragments <> 1)
SET e.summary = e.fragments[0], e.summary_fragments = 1
RETURN count(e) AS updated
"#;

pub const ADOPT_RELATIONSHIP_FRAGMENTS: &str = r#"
MATCH (:Entity)-[r:RELATION]->(:Entity)
WHERE size(r.fragments) = 1 AND (r.summary IS NULL OR r.summary_fragments <> 1)
SET r.summary = r.fragments[0], r.summary_fragments = 1
RETURN count(r) AS updated
"#;

pub const STALE_ENTITIES: &str = r#"
MATCH (e:Entity)
WHERE size(e.fragments) > 1 AND (e.summary IS NULL OR e.summary_fragments <> size(e.fragments))
RETURN e.key AS key, e.name AS name, e.fragments AS fragments
ORDER BY key
"#;

pub const STALE_RELATIONSHIPS: &str = r#"
MATCH (s:Entity)-[r:RELATION]->(t:Entity)
WHERE size(r.fragments) > 1 AND (r.summary IS NULL OR r.summary_fragments <> size(r.fragments))
RETURN s.key AS source, t.key AS target, r.type AS type,
       r.source_name AS source_name, r.target_name AS target_name, r.fragments AS fragments
ORDER BY source, target, type
"#;

pub const SAVE_ENTITY_SUMMARY: &str = r#"
MATCH (e:Entity {key: $key})
SET e._lock = true
REMOVE e._lock
WITH e WHERE size(e.fragments) = $count
SET e.summary = $summary, e.summary_fragments = $count
RETURN count(e) AS saved
"#;

pub const SAVE_RELATIONSHIP_SUMMARY: &str = r#"
MATCH (:Entity {key: $source})-[r:RELATION {type: $type}]->(:Entity {key: $target})
SET r._lock = true
REMOVE r._lock
WITH r WHERE size(r.fragments) = $count
SET r.summary = $summary, r.summary_fragments = $count
RETURN count(r) AS saved
"#;

pub const DELETE_COMMUNITIES: &str = "MATCH (c:Community) DETACH DELETE c";

pub const COUNT_ENTITIES: &str = "MATCH (e:Entity) RETURN count(e) AS count";

pub const DROP_PROJECTION: &str =
    "CALL gds.graph.drop($name, false) YIELD graphName RETURN graphName";

/// Undirected projection that keeps isolated entities as nodes
pub const PROJECT_ENTITIES: &str = r#"
MATCH (source:Entity)
OPTIONAL MATCH (source)-[:RELATION]->(target:Entity)
WITH gds.graph.project($name, source, target, {}, {undirectedRelationshipTypes: ['*']}) AS g
RETURN g.nodeCount AS nodes, g.relationshipCount AS relationships
"#;

/// Writes `communities`, one id per level, finest first
pub const LEIDEN_WRITE: &str = r#"
CALL gds.leiden.write($name, {
    writeProperty: 'communities',
    includeIntermediateCommunities: true,
    randomSeed: 42
})
YIELD ranLevels, communityCount
RETURN ranLevels, communityCount
"#;

pub const WRITE_HIERARCHY: &str = r#"
MATCH (e:Entity) WHERE e.communities IS NOT NULL
UNWIND range(0, size(e.communities) - 1) AS level
CALL {
    WITH e, level
    WITH e, level WHERE level = 0
    MERGE (c:Community {id: '0-' + toString(e.communities[0])})
    ON CREATE SET c.level = 0, c.community_id = e.communities[0]
    MERGE (e)-[:IN_COMMUNITY]->(c)
    RETURN count(*) AS members
}
CALL {
    WITH e, level
    WITH e, level WHERE level > 0
    MERGE (child:Community {id: toString(level - 1) + '-' + toString(e.communities[level - 1])})
    ON CREATE SET child.level = level - 1, child.community_id = e.communities[level - 1]
    MERGE (parent:Community {id: toString(level) + '-' + toString(e.communities[level])})
    ON CREATE SET parent.level = level, parent.community_id = e.communities[level]
    MERGE (child)-[:IN_COMMUNITY]->(parent)
    RETURN count(*) AS links
}
RETURN count(*) AS rows
"#;

pub const COMMUNITY_SHAPE: &str = r#"
MATCH (c:Community)
WITH count(c) AS total, max(c.level) AS top
OPTIONAL MATCH (t:Community {level: top})
RETURN total, top, count(t) AS top_count
"#;

pub const COMMUNITY_INPUTS: &str = r#"
MATCH (c:Community {level: $level})
CALL {
    WITH c
    MATCH (c)<-[:IN_COMMUNITY*]-(e:Entity)
    WITH DISTINCT e
    OPTIONAL MATCH (e)<-[:HAS_ENTITY]-(chunk:Chunk)
    WITH e, count(chunk) AS mentions
    RETURN collect({key: e.key, name: e.name, type: e.type, summary: e.summary, mentions: mentions}) AS entities,
           collect(e) AS nodes
}
CALL {
    WITH nodes
    UNWIND nodes AS s
    MATCH (s)-[r:RELATION]->(t:Entity) WHERE t IN nodes
    RETURN collect({source: r.source_name, target: r.target_name, type: r.type, summary: r.summary, strength: r.strength}) AS relationships
}
CALL {
    WITH c
    OPTIONAL MATCH (child:Community)-[:IN_COMMUNITY]->(c)
    WITH child ORDER BY child.community_id
    RETURN collect(CASE WHEN child IS NULL THEN NULL
                   ELSE {id: child.id, title: child.title, summary: child.summary, rating: child.rating} END) AS children
}
RETURN c.id AS id, c.level AS level, entities, relationships, children
ORDER BY c.community_id
"#;

pub const SAVE_COMMUNITY_REPORT: &str = r#"
MATCH (c:Community {id: $id})
SET c.title = $title, c.summary = $summary, c.rating = $rating,
    c.rating_explanation = $rating_explanation
RETURN count(c) AS saved
"#;

pub const COMMUNITIES: &str = r#"
MATCH (c:Community)
OPTIONAL MATCH (c)-[:IN_COMMUNITY]->(p:Community)
OPTIONAL MATCH (c)<-[:IN_COMMUNITY*]-(e:Entity)
WITH c, p, collect(DISTINCT e.key) AS members
RETURN c.id AS id, c.level AS level, c.community_id AS community_id, p.id AS parent, members,
       c.title AS title, c.summary AS summary, c.rating AS rating,
       c.rating_explanation AS rating_explanation
ORDER BY level, community_id
"#;

pub const STATS: &str = r#"
CALL { MATCH (c:Chunk) RETURN count(c) AS chunks }
CALL { MATCH (e:Entity) RETURN count(e) AS entities }
CALL { MATCH (:Entity)-[r:RELATION]->(:Entity) RETURN count(r) AS relationships }
CALL { MATCH (c:Community) RETURN count(c) AS communities }
RETURN chunks, entities, relationships, communities
"#;
