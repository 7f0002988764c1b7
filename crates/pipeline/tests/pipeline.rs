use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use extract::testing::{user_prompt, ScriptedModel};
use extract::{ChatMessage, LlmError};
use index::testing::FlakyStore;
use index::{GraphStore, MemoryStore};
use pipeline::{GraphRag, PipelineConfig, PipelineError};

const WORKS_FOR: &str = "A works for B";
const LIVES_IN: &str = "A lives in C";
// names E without describing it
const MANAGES: &str = "D manages E";
const TEAM: &str = "E is a team";

const RING_SIZE: usize = 10;

fn test_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.retry.max_retries = 0;
    config.cache.enabled = false;
    config.concurrency.workers = 4;
    config.concurrency.request_timeout_secs = 5;
    config.store_retry.initial_backoff_ms = 1;
    config.store_retry.max_backoff_ms = 2;
    config
}

fn allowed() -> Vec<String> {
    vec!["Person".into(), "Organization".into(), "Location".into()]
}

fn extraction_for(text: &str) -> String {
    match text {
        WORKS_FOR => r#"{"entities": [
                {"name": "A", "type": "Person", "description": "A is an employee"},
                {"name": "B", "type": "Organization", "description": "B is an employer"}
            ],
            "relationships": [
                {"source": "A", "target": "B", "type": "WORKS_FOR", "description": "A works for B", "strength": 8}
            ]}"#
        .to_string(),
        LIVES_IN => r#"{"entities": [
                {"name": "A", "type": "Person", "description": "A is a resident of C"},
                {"name": "C", "type": "Location", "description": "C is a town"}
            ],
            "relationships": [
                {"source": "A", "target": "C", "type": "LIVES_IN", "description": "A lives in C", "strength": 6}
            ]}"#
        .to_string(),
        "Weaviate is a database" => r#"{"entities": [
                {"name": "Weaviate", "type": "Organization", "description": "A vector database"}
            ]}"#
        .to_string(),
        "WEAVIATE is open source" => r#"{"entities": [
                {"name": "WEAVIATE", "type": "Organization", "description": "An open source project"}
            ]}"#
        .to_string(),
        MANAGES => r#"{"entities": [
                {"name": "D", "type": "Person", "description": "D is a manager"}
            ],
            "relationships": [
                {"source": "D", "target": "E", "type": "MANAGES", "description": "D manages E", "strength": 7}
            ]}"#
        .to_string(),
        TEAM => r#"{"entities": [
                {"name": "E", "type": "Organization", "description": "E is a team"}
            ]}"#
        .to_string(),
        text => match text.strip_prefix("ring ").and_then(|i| i.parse::<usize>().ok()) {
            Some(index) => ring_extraction(index),
            None => r#"{"entities": [], "relationships": []}"#.to_string(),
        },
    }
}

fn ring_node(index: usize) -> String {
    format!("N{:02}", index % (3 * RING_SIZE))
}

/// Triangle `index` of a ring of triangles, linked to the first node of the
/// next triangle
fn ring_extraction(index: usize) -> String {
    let nodes: Vec<String> = (0..3).map(|i| ring_node(3 * index + i)).collect();
    let entities: Vec<serde_json::Value> = nodes
        .iter()
        .map(|n| serde_json::json!({"name": n, "type": "Person", "description": format!("{} is in triangle {}", n, index)}))
        .collect();
    let link = |source: &str, target: &str| {
        serde_json::json!({
            "source": source,
            "target": target,
            "type": "KNOWS",
            "description": format!("{} knows {}", source, target),
            "strength": 5
        })
    };
    let relationships = vec![
        link(&nodes[0], &nodes[1]),
        link(&nodes[1], &nodes[2]),
        link(&nodes[0], &nodes[2]),
        link(&nodes[2], &ring_node(3 * (index + 1))),
    ];
    serde_json::json!({"entities": entities, "relationships": relationships}).to_string()
}

fn community_id(prompt: &str) -> &str {
    prompt
        .split("COMMUNITY ")
        .nth(1)
        .and_then(|rest| rest.split(' ').next())
        .unwrap_or("")
}

fn chunk_text(prompt: &str) -> &str {
    prompt
        .split("TEXT:\n")
        .nth(1)
        .and_then(|rest| rest.split("\n\nJSON OUTPUT:").next())
        .unwrap_or("")
}

/// Answers extraction, summary and community prompts; `summaries` decides
/// what description summaries return.
fn scripted<F>(summaries: F) -> Arc<ScriptedModel>
where
    F: Fn(&str) -> Result<String, LlmError> + Send + Sync + 'static,
{
    Arc::new(ScriptedModel::new(move |messages: &[ChatMessage]| {
        let prompt = user_prompt(messages);
        if prompt.starts_with("Extract entities") {
            Ok(extraction_for(chunk_text(prompt)))
        } else if prompt.starts_with("Combine the descriptions") {
            summaries(prompt)
        } else {
            let id = community_id(prompt);
            Ok(serde_json::json!({
                "title": format!("Group {}", id),
                "summary": format!("Summary of {}", id),
                "rating": 4,
                "rating_explanation": "Local"
            })
            .to_string())
        }
    }))
}

fn default_model() -> Arc<ScriptedModel> {
    scripted(|_| Ok("A is an employee of B and lives in C.".into()))
}

async fn build(store: Arc<MemoryStore>, model: Arc<ScriptedModel>) -> GraphRag {
    GraphRag::new(store, model, test_config()).await.unwrap()
}

type Snapshot = (
    BTreeMap<String, (String, Option<String>, BTreeSet<String>)>,
    BTreeMap<String, BTreeSet<String>>,
);

/// Entities and relationships as sets, ignoring fragment order
fn snapshot(store: &MemoryStore) -> Snapshot {
    let entities = store
        .entities()
        .into_iter()
        .map(|e| (e.key, (e.name, e.entity_type, e.fragments.into_iter().collect())))
        .collect();
    let relationships = store
        .relationships()
        .into_iter()
        .map(|r| {
            let key = format!("{}|{}|{}", r.key.source, r.key.relationship_type, r.key.target);
            (key, r.fragments.into_iter().collect())
        })
        .collect();
    (entities, relationships)
}

#[tokio::test]
async fn works_for_lives_in_scenario() {
    let store = Arc::new(MemoryStore::new());
    let model = default_model();
    let rag = build(store.clone(), model.clone()).await;

    let report = rag
        .extract(&[WORKS_FOR.to_string(), LIVES_IN.to_string()], &allowed())
        .await
        .unwrap();

    assert_eq!(report.imported_relationships, 2);
    assert!(report.message.contains("2 relationships"));
    assert_eq!(report.chunks_failed, 0);

    let entities = store.entities();
    assert_eq!(entities.len(), 3);
    let a = store.entity("A").unwrap();
    assert_eq!(a.fragments.len(), 2);
    assert_eq!(a.chunk_ids.len(), 2);
    assert_eq!(store.entity("B").unwrap().fragments.len(), 1);
    assert_eq!(store.relationships().len(), 2);

    let before = model.calls();
    let summary = rag.summarize_entities_and_relationships().await.unwrap();

    // only A has more than one fragment
    assert_eq!(model.calls() - before, 1);
    assert_eq!(summary.summarized, 1);
    assert_eq!(summary.adopted, 4);
    assert_eq!(summary.status, "success");
    assert_eq!(
        store.entity("A").unwrap().summary.as_deref(),
        Some("A is an employee of B and lives in C.")
    );
    assert_eq!(store.entity("C").unwrap().summary.as_deref(), Some("C is a town"));
}

#[tokio::test]
async fn identical_merges_are_idempotent() {
    let store = Arc::new(MemoryStore::new());
    let rag = build(store.clone(), default_model()).await;
    let texts = vec![WORKS_FOR.to_string(), LIVES_IN.to_string()];

    rag.extract(&texts, &allowed()).await.unwrap();
    let first = (store.entities(), store.relationships());
    let again = rag.extract(&texts, &allowed()).await.unwrap();

    assert_eq!((store.entities(), store.relationships()), first);
    assert_eq!(again.merge.entities_created, 0);
    assert_eq!(again.merge.duplicate_fragments, 6);
}

#[tokio::test]
async fn merge_order_does_not_change_the_graph() {
    let forward = Arc::new(MemoryStore::new());
    let backward = Arc::new(MemoryStore::new());

    build(forward.clone(), default_model())
        .await
        .extract(&[WORKS_FOR.to_string(), LIVES_IN.to_string()], &allowed())
        .await
        .unwrap();
    build(backward.clone(), default_model())
        .await
        .extract(&[LIVES_IN.to_string(), WORKS_FOR.to_string()], &allowed())
        .await
        .unwrap();

    assert_eq!(snapshot(&forward), snapshot(&backward));
}

#[tokio::test]
async fn split_batches_match_a_single_batch() {
    let together = Arc::new(MemoryStore::new());
    let split = Arc::new(MemoryStore::new());
    let reversed = Arc::new(MemoryStore::new());
    let texts = |items: &[&str]| items.iter().map(|t| t.to_string()).collect::<Vec<_>>();

    build(together.clone(), default_model())
        .await
        .extract(&texts(&[WORKS_FOR, MANAGES, TEAM]), &allowed())
        .await
        .unwrap();

    let rag = build(split.clone(), default_model()).await;
    rag.extract(&texts(&[WORKS_FOR, MANAGES]), &allowed()).await.unwrap();
    rag.extract(&texts(&[TEAM]), &allowed()).await.unwrap();

    let rag = build(reversed.clone(), default_model()).await;
    rag.extract(&texts(&[TEAM]), &allowed()).await.unwrap();
    rag.extract(&texts(&[WORKS_FOR, MANAGES]), &allowed()).await.unwrap();

    assert_eq!(split.relationships().len(), 2);
    assert_eq!(snapshot(&together), snapshot(&split));
    assert_eq!(snapshot(&split), snapshot(&reversed));
    assert_eq!(split.entity("E").unwrap().entity_type.as_deref(), Some("Organization"));
}

#[tokio::test]
async fn relationship_to_an_undescribed_entity_is_kept() {
    let store = Arc::new(MemoryStore::new());
    let rag = build(store.clone(), default_model()).await;

    let report = rag.extract(&[MANAGES.to_string()], &allowed()).await.unwrap();

    assert_eq!(report.imported_relationships, 1);
    let e = store.entity("E").unwrap();
    assert!(e.entity_type.is_none());
    assert!(e.fragments.is_empty());
}

#[tokio::test]
async fn transient_store_failure_is_retried() {
    let store = Arc::new(FlakyStore::failing_entity_merges(1));
    let rag = GraphRag::new(store.clone(), default_model(), test_config()).await.unwrap();

    let report = rag.extract(&[WORKS_FOR.to_string()], &allowed()).await.unwrap();

    assert_eq!(report.chunks_failed, 0);
    assert_eq!(report.merge.entities_created, 2);
    assert_eq!(store.memory().entities().len(), 2);
    assert_eq!(store.memory().relationships().len(), 1);
}

#[tokio::test]
async fn casing_variants_share_one_entity() {
    let store = Arc::new(MemoryStore::new());
    let rag = build(store.clone(), default_model()).await;

    rag.extract(&["Weaviate is a database".to_string()], &allowed()).await.unwrap();
    rag.extract(&["WEAVIATE is open source".to_string()], &allowed()).await.unwrap();

    let entities = store.entities();
    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0].key, "WEAVIATE");
    assert_eq!(entities[0].name, "Weaviate");
    assert_eq!(entities[0].fragments.len(), 2);
}

#[tokio::test]
async fn single_fragments_skip_the_model() {
    let store = Arc::new(MemoryStore::new());
    let model = default_model();
    let rag = build(store.clone(), model.clone()).await;
    rag.extract(&[WORKS_FOR.to_string()], &allowed()).await.unwrap();

    let before = model.calls();
    let report = rag.summarize_entities_and_relationships().await.unwrap();

    assert_eq!(model.calls(), before);
    assert_eq!(report.adopted, 3);
    assert!(store.entities().iter().all(|e| e.summary.as_ref() == Some(&e.fragments[0])));
}

#[tokio::test]
async fn failed_summary_stays_unset_and_is_counted() {
    let store = Arc::new(MemoryStore::new());
    let model = scripted(|_| Err(LlmError::Status { status: 500, body: "overloaded".into() }));
    let rag = build(store.clone(), model).await;
    rag.extract(&[WORKS_FOR.to_string(), LIVES_IN.to_string()], &allowed())
        .await
        .unwrap();

    let report = rag.summarize_entities_and_relationships().await.unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.status, "partial");
    assert!(store.entity("A").unwrap().summary.is_none());
    assert!(store.entity("B").unwrap().summary.is_some());
    assert_eq!(rag.metrics().snapshot().summaries_failed, 1);
}

#[tokio::test]
async fn community_hierarchy_is_consistent() {
    let store = Arc::new(MemoryStore::new());
    let rag = build(store.clone(), default_model()).await;
    rag.extract(&[WORKS_FOR.to_string(), LIVES_IN.to_string()], &allowed())
        .await
        .unwrap();
    rag.summarize_entities_and_relationships().await.unwrap();

    let report = rag.summarize_communities().await.unwrap();
    let communities = store.communities().await.unwrap();

    assert!(report.level_count >= 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.summarized, communities.len());
    assert!(communities.iter().all(|c| c.report.is_some()));

    for level in 0..report.level_count {
        let mut members: Vec<&String> = communities
            .iter()
            .filter(|c| c.level == level)
            .flat_map(|c| &c.members)
            .collect();
        members.sort();
        members.dedup();
        assert_eq!(members.len(), 3);
        assert_eq!(
            communities.iter().filter(|c| c.level == level).map(|c| c.members.len()).sum::<usize>(),
            3
        );
    }
    for community in &communities {
        if let Some(parent_id) = &community.parent {
            let parent = communities.iter().find(|c| &c.id == parent_id).unwrap();
            assert_eq!(parent.level, community.level + 1);
            assert!(community.members.iter().all(|m| parent.members.contains(m)));
        } else {
            assert_eq!(community.level, report.level_count - 1);
        }
    }
}

#[tokio::test]
async fn entities_without_relationships_form_singleton_communities() {
    let store = Arc::new(MemoryStore::new());
    let model = default_model();
    let rag = build(store.clone(), model.clone()).await;
    rag.extract(&["Weaviate is a database".to_string()], &allowed()).await.unwrap();
    rag.summarize_entities_and_relationships().await.unwrap();

    let before = model.calls();
    let report = rag.summarize_communities().await.unwrap();

    assert_eq!(report.level_count, 1);
    assert_eq!(report.community_count, 1);
    assert_eq!(report.summarized, 1);
    assert_eq!(model.calls() - before, 1);
    assert!(model.prompts().last().unwrap().contains("Weaviate (Organization): A vector database"));
}

#[tokio::test]
async fn empty_allow_list_is_fatal() {
    let store = Arc::new(MemoryStore::new());
    let model = default_model();
    let rag = build(store, model.clone()).await;

    let result = rag.extract(&[WORKS_FOR.to_string()], &[]).await;

    assert!(matches!(result, Err(PipelineError::Fatal(_))));
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn query_is_passed_to_the_store() {
    let rag = build(Arc::new(MemoryStore::new()), default_model()).await;

    let result = rag.query("MATCH (n) RETURN n").await;

    assert!(matches!(result, Err(PipelineError::Store(_))));
}

#[tokio::test]
async fn coarser_levels_read_their_children_reports() {
    let store = Arc::new(MemoryStore::new());
    let model = default_model();
    let rag = build(store.clone(), model.clone()).await;
    let texts: Vec<String> = (0..RING_SIZE).map(|i| format!("ring {}", i)).collect();
    rag.extract(&texts, &allowed()).await.unwrap();
    rag.summarize_entities_and_relationships().await.unwrap();

    let report = rag.summarize_communities().await.unwrap();
    let communities = store.communities().await.unwrap();
    let prompts = model.prompts();

    assert_eq!(report.level_count, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(communities.iter().filter(|c| c.level == 0).count(), RING_SIZE);
    assert_eq!(communities.iter().filter(|c| c.level == 1).count(), RING_SIZE / 2);

    for parent in communities.iter().filter(|c| c.level == 1) {
        let heading = format!("COMMUNITY {} (level 1)", parent.id);
        let prompt = prompts
            .iter()
            .find(|p| p.contains(&heading))
            .unwrap_or_else(|| panic!("no prompt for {}", parent.id));

        assert!(prompt.contains("SUB-COMMUNITIES:"));
        let children: Vec<_> = communities
            .iter()
            .filter(|c| c.parent.as_deref() == Some(parent.id.as_str()))
            .collect();
        assert_eq!(children.len(), 2);
        for child in children {
            let child_report = child.report.as_ref().unwrap();
            assert!(prompt.contains(&child_report.title), "{} missing from {}", child.id, parent.id);
            assert!(prompt.contains(&child_report.summary));
        }
    }
}
