use std::cmp::Ordering;

use extract::prompt::language_directive;
use index::{ChildCommunity, CommunityInput, MemberEntity, MemberRelationship};

pub const DEFAULT_MAX_INPUT_CHARS: usize = 12_000;

pub const COMMUNITY_SYSTEM_PROMPT: &str =
    "You write reports about communities of a knowledge graph. You answer with a single JSON object and nothing else.";

const NO_DESCRIPTION: &str = "no description";

/// Fills a character budget in priority order. A line that does not fit is
/// skipped and later, shorter lines may still be taken.
struct Budget {
    remaining: usize,
}

impl Budget {
    fn take(&mut self, line: &str) -> bool {
        if line.len() > self.remaining {
            return false;
        }
        self.remaining -= line.len();
        true
    }
}

fn by_rating(a: &ChildCommunity, b: &ChildCommunity) -> Ordering {
    let (ra, rb) = (a.rating.unwrap_or(0.0), b.rating.unwrap_or(0.0));
    rb.partial_cmp(&ra).unwrap_or(Ordering::Equal).then_with(|| a.id.cmp(&b.id))
}

fn by_mentions(a: &MemberEntity, b: &MemberEntity) -> Ordering {
    b.mentions.cmp(&a.mentions).then_with(|| a.name.cmp(&b.name))
}

fn by_strength(a: &MemberRelationship, b: &MemberRelationship) -> Ordering {
    b.strength
        .partial_cmp(&a.strength)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.source.cmp(&b.source))
        .then_with(|| a.target.cmp(&b.target))
        .then_with(|| a.relationship_type.cmp(&b.relationship_type))
}

/// Push as many lines as fit; returns how many were left out.
fn section(out: &mut String, heading: &str, lines: Vec<String>, budget: &mut Budget) -> usize {
    if lines.is_empty() {
        return 0;
    }
    out.push_str(heading);
    out.push('\n');

    let mut omitted = 0;
    for line in lines {
        if budget.take(&line) {
            out.push_str(&line);
        } else {
            omitted += 1;
        }
    }

    if omitted > 0 {
        out.push_str(&format!("({} more omitted)\n", omitted));
    }
    out.push('\n');
    omitted
}

/// Render a community for the report prompt.
///
/// Inputs are ordered deterministically and cut to `max_chars`: child
/// communities by rating, then entities by mention count, then
/// relationships by strength. Section headings and omission notes are not
/// charged to the budget. Returns the data block and the number of omitted
/// lines.
pub fn render_community(input: &CommunityInput, max_chars: usize) -> (String, usize) {
    let mut budget = Budget { remaining: max_chars };
    let mut out = String::new();
    let mut omitted = 0;

    let mut children = input.children.clone();
    children.sort_by(by_rating);
    let child_lines = children
        .iter()
        .map(|c| {
            format!(
                "- [{}] {} (rating {}): {}\n",
                c.id,
                c.title.as_deref().unwrap_or("untitled"),
                c.rating.map(|r| format!("{:.1}", r)).unwrap_or_else(|| "n/a".into()),
                c.summary.as_deref().unwrap_or(NO_DESCRIPTION),
            )
        })
        .collect();
    omitted += section(&mut out, "SUB-COMMUNITIES:", child_lines, &mut budget);

    let mut entities = input.entities.clone();
    entities.sort_by(by_mentions);
    let entity_lines = entities
        .iter()
        .map(|e| {
            format!(
                "- {} ({}): {}\n",
                e.name,
                e.entity_type.as_deref().unwrap_or("untyped"),
                e.summary.as_deref().unwrap_or(NO_DESCRIPTION)
            )
        })
        .collect();
    omitted += section(&mut out, "ENTITIES:", entity_lines, &mut budget);

    let mut relationships = input.relationships.clone();
    relationships.sort_by(by_strength);
    let relationship_lines = relationships
        .iter()
        .map(|r| {
            format!(
                "- {} {} {} (strength {:.0}): {}\n",
                r.source,
                r.relationship_type,
                r.target,
                r.strength,
                r.summary.as_deref().unwrap_or(NO_DESCRIPTION)
            )
        })
        .collect();
    omitted += section(&mut out, "RELATIONSHIPS:", relationship_lines, &mut budget);

    (out, omitted)
}

pub fn build_community_prompt(input: &CommunityInput, max_chars: usize, language: Option<&str>) -> String {
    let (data, _) = render_community(input, max_chars);

    format!(
        r#"Write a report about the community of a knowledge graph described below.

INSTRUCTIONS:
1. Give the community a short, specific title naming its key entities
2. Summarize the community's overall structure, how its entities relate and the significant facts about them
3. Rate the impact of the community from 0 to 10, where 10 is the most significant
4. Explain the rating in one sentence
5. Output ONLY valid JSON, nothing else
{language}
SCHEMA:
{{"title": "...", "summary": "...", "rating": 5.0, "rating_explanation": "..."}}

COMMUNITY {id} (level {level}):

{data}JSON OUTPUT:"#,
        language = language_directive(language),
        id = input.id,
        level = input.level,
        data = data,
    )
}
