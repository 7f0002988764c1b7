use extract::prompt::language_directive;

pub const SUMMARY_SYSTEM_PROMPT: &str =
    "You merge descriptions of knowledge graph items into one coherent description.";

/// One call per item: the item name followed by every fragment, in the
/// order they were merged.
pub fn build_summary_prompt(name: &str, fragments: &[String], language: Option<&str>) -> String {
    let mut prompt = String::from(
        "Combine the descriptions below into a single comprehensive description of the item.\n\
        Keep every fact that appears in at least one description.\n\
        If descriptions contradict each other, resolve the contradiction and state one coherent account.\n\
        Write in the third person and mention the item by name.\n\
        Answer with the description only.\n",
    );
    prompt.push_str(&language_directive(language));

    prompt.push_str(&format!("\nITEM: {}\n\nDESCRIPTIONS:\n", name));
    for fragment in fragments {
        prompt.push_str(&format!("- {}\n", fragment));
    }

    prompt.push_str("\nDESCRIPTION:");
    prompt
}
