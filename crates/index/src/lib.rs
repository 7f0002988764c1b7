pub mod cypher;
pub mod louvain;
pub mod memory;
pub mod merger;
pub mod model;
pub mod neo4j_store;
pub mod resilient;
pub mod store;
pub mod testing;

pub use memory::MemoryStore;
pub use merger::{GraphMerger, MergeReport};
pub use model::{
    community_node_id, ChildCommunity, CommunityInput, CommunityRecord, CommunityReport,
    DescriptionSet, EntityRecord, GraphStats, ItemKey, MemberEntity, MemberRelationship,
    MergeOutcome, PartitionSummary, Record, RelationshipKey, RelationshipRecord,
};
pub use neo4j_store::Neo4jStore;
pub use resilient::ResilientStore;
pub use store::GraphStore;
