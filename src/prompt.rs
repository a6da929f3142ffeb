//! Prompt assembly and model-output post-processing.
//!
//! Models wrap answers in fences, prepend chatter, or return markup when
//! plain text was asked for. Everything that turns a raw assistant response
//! into insertable document content lives here.

use crate::api::Message;
use crate::constants::MAX_CONTEXT_CHARS;
use regex::Regex;
use std::sync::OnceLock;

/// Desired shape of the generated content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Plain,
    Rich,
}

/// Builds the system/user message pair for one generation request.
///
/// `selection_text` is empty when the command operates on whole-document
/// context; `document_text` supplies surrounding context either way.
pub fn build_messages(
    instruction: &str,
    selection_text: &str,
    document_text: &str,
    format: OutputFormat,
    tone: Option<&str>,
    system_prompt: Option<&str>,
) -> Vec<Message> {
    let format_rule = match format {
        OutputFormat::Plain => {
            "Respond with plain text only. No markup, no code fences, no commentary."
        }
        OutputFormat::Rich => {
            "Respond with a fragment of simple HTML (p, h1-h3, ul, ol, li, strong, em, blockquote). \
             No code fences, no commentary, no <html> or <body> wrapper."
        }
    };

    let mut system = system_prompt
        .unwrap_or(
            "You are a writing assistant embedded in a document editor. \
             You rewrite or produce text exactly as instructed, and output only \
             the text that should appear in the document.",
        )
        .to_string();
    system.push(' ');
    system.push_str(format_rule);
    if let Some(tone) = tone {
        system.push_str(&format!(" Write in a {} tone.", tone));
    }

    let context = truncate_chars(document_text, MAX_CONTEXT_CHARS);
    let user = if selection_text.is_empty() {
        format!(
            "Instruction: {}\n\nDocument:\n{}",
            instruction.trim(),
            context
        )
    } else {
        format!(
            "Instruction: {}\n\nSelected text:\n{}\n\nDocument context:\n{}",
            instruction.trim(),
            selection_text,
            context
        )
    };

    vec![Message::system(system), Message::user(user)]
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Extracts the insertable payload from a raw assistant response.
pub fn extract_content(response: &str, format: OutputFormat) -> String {
    let unfenced = strip_fences(response);
    let normalized = unfenced.replace("\r\n", "\n").replace('\r', "\n");
    match format {
        OutputFormat::Plain => strip_tags(&normalized).trim().to_string(),
        OutputFormat::Rich => ensure_html(normalized.trim()),
    }
}

/// Pulls the body out of a fenced block (```html, ``` or similar), or returns
/// the trimmed response when no fence is present.
fn strip_fences(response: &str) -> String {
    let trimmed = response.trim();
    let Some(start_idx) = trimmed.find("```") else {
        return trimmed.to_string();
    };
    let after_fence = &trimmed[start_idx + 3..];
    // Skip the language tag on the opening fence line, if any.
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_fence[body_start..];
    match body.find("```") {
        Some(end_idx) => body[..end_idx].trim().to_string(),
        None => body.trim().to_string(),
    }
}

fn tag_regex() -> &'static Regex {
    static TAG_REGEX: OnceLock<Regex> = OnceLock::new();
    TAG_REGEX.get_or_init(|| Regex::new(r"</?[a-zA-Z][^>]*>").unwrap())
}

/// Removes HTML tags from text destined for a plain insertion.
fn strip_tags(text: &str) -> String {
    let stripped = tag_regex().replace_all(text, "");
    html_escape::decode_html_entities(&stripped).to_string()
}

/// Wraps bare text into minimal HTML paragraphs when the model ignored the
/// rich-format rule; passes real markup through untouched.
fn ensure_html(text: &str) -> String {
    if tag_regex().is_match(text) {
        return text.to_string();
    }
    text.split("\n\n")
        .filter(|p| !p.trim().is_empty())
        .map(|p| format!("<p>{}</p>", html_escape::encode_text(p.trim())))
        .collect::<Vec<_>>()
        .join("\n")
}
