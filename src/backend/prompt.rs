//! Prompt templates shared by every backend.
//!
//! Both templates end with the same two-part request (a one-to-two sentence headline, then
//! three to five detailed points). Downstream formatting relies on that structure, so keep
//! the numbered list intact when editing the wording.

/// System message sent to chat-style backends.
pub const SYSTEM_PROMPT: &str =
    "You are a helpful assistant that summarizes academic papers and educational content.";

const OUTPUT_INSTRUCTIONS: &str = "Please provide:
1. A brief headline summary (1-2 sentences)
2. A more detailed summary (3-5 bullet points or 2-3 paragraphs)";

/// Prompt for summarizing a document or a single chunk.
pub fn summary_prompt(text: &str, topic: Option<&str>) -> String {
    format!(
        "Please provide a concise summary of the following educational content.\n\n\
         {topic}Content:\n{text}\n\n{OUTPUT_INSTRUCTIONS}\n\nSummary:",
        topic = topic_line(topic),
    )
}

/// Prompt for the reduce step: synthesize section summaries into one summary.
pub fn combine_prompt(section_summaries: &str, topic: Option<&str>) -> String {
    format!(
        "Please provide a concise, unified summary combining the following section summaries \
         from a longer document.\n\n\
         {topic}Section Summaries from a longer document:\n{section_summaries}\n\n\
         {OUTPUT_INSTRUCTIONS} that synthesizes all sections.\n\nSummary:",
        topic = topic_line(topic),
    )
}

fn topic_line(topic: Option<&str>) -> String {
    match topic.map(str::trim) {
        Some(topic) if !topic.is_empty() => format!("Topic: {topic}\n\n"),
        _ => String::new(),
    }
}
