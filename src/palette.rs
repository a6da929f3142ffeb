//! Slash command palette.
//!
//! Typing the reserved trigger character at the start of a word opens the
//! palette; the text after it filters a static catalog of commands. Selecting
//! one removes the trigger span from the document and applies a typed
//! [`CommandAction`]. No state machine here; dispatch is fire-and-forget.

use crate::constants::PALETTE_TRIGGER;
use crate::document::{DocumentHandle, Selection};
use crate::prompt::OutputFormat;

/// Typed effect of a palette command.
///
/// Actions that need a collaborator (media search, the AI prompt) are returned
/// to the caller instead of being emitted as named events on the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandAction {
    /// Insert an HTML block at the caret.
    InsertBlock(String),
    /// Open the media search picker.
    OpenMediaSearch(MediaKind),
    /// Focus the AI prompt bar, optionally pre-set to a format.
    OpenAiPrompt(OutputFormat),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

/// One entry in the palette catalog.
#[derive(Debug, Clone)]
pub struct CommandItem {
    pub title: &'static str,
    pub description: &'static str,
    pub action: CommandAction,
}

/// The span of a detected palette trigger plus the query typed after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaletteTrigger {
    /// Char range covering the trigger character and the query.
    pub span: Selection,
    pub query: String,
}

impl PaletteTrigger {
    /// Scans backwards from `cursor` for a trigger character opening the
    /// current word. The trigger must sit at the start of the document or
    /// after whitespace, and the query must not itself contain whitespace.
    pub fn scan(text: &str, cursor: usize) -> Option<Self> {
        let chars: Vec<char> = text.chars().collect();
        let cursor = cursor.min(chars.len());
        let mut idx = cursor;
        while idx > 0 {
            let c = chars[idx - 1];
            if c == PALETTE_TRIGGER {
                if idx >= 2 && !chars[idx - 2].is_whitespace() {
                    return None;
                }
                let query: String = chars[idx..cursor].iter().collect();
                return Some(Self {
                    span: Selection::new(idx - 1, cursor),
                    query,
                });
            }
            if c.is_whitespace() {
                return None;
            }
            idx -= 1;
        }
        None
    }
}

pub struct CommandCatalog {
    items: Vec<CommandItem>,
}

impl Default for CommandCatalog {
    fn default() -> Self {
        Self {
            items: vec![
                CommandItem {
                    title: "Heading 1",
                    description: "Large section heading",
                    action: CommandAction::InsertBlock("<h1></h1>".to_string()),
                },
                CommandItem {
                    title: "Heading 2",
                    description: "Medium section heading",
                    action: CommandAction::InsertBlock("<h2></h2>".to_string()),
                },
                CommandItem {
                    title: "Heading 3",
                    description: "Small section heading",
                    action: CommandAction::InsertBlock("<h3></h3>".to_string()),
                },
                CommandItem {
                    title: "Bullet List",
                    description: "Unordered list",
                    action: CommandAction::InsertBlock("<ul><li></li></ul>".to_string()),
                },
                CommandItem {
                    title: "Numbered List",
                    description: "Ordered list",
                    action: CommandAction::InsertBlock("<ol><li></li></ol>".to_string()),
                },
                CommandItem {
                    title: "Quote",
                    description: "Block quotation",
                    action: CommandAction::InsertBlock("<blockquote></blockquote>".to_string()),
                },
                CommandItem {
                    title: "Table",
                    description: "2x2 table",
                    action: CommandAction::InsertBlock(
                        "<table><tr><td></td><td></td></tr><tr><td></td><td></td></tr></table>"
                            .to_string(),
                    ),
                },
                CommandItem {
                    title: "Divider",
                    description: "Horizontal rule",
                    action: CommandAction::InsertBlock("<hr>".to_string()),
                },
                CommandItem {
                    title: "Code Block",
                    description: "Preformatted code",
                    action: CommandAction::InsertBlock("<pre><code></code></pre>".to_string()),
                },
                CommandItem {
                    title: "Image Search",
                    description: "Find and embed a stock image",
                    action: CommandAction::OpenMediaSearch(MediaKind::Image),
                },
                CommandItem {
                    title: "Video Search",
                    description: "Find and embed a stock video",
                    action: CommandAction::OpenMediaSearch(MediaKind::Video),
                },
                CommandItem {
                    title: "Ask AI",
                    description: "Write or rewrite with an AI instruction",
                    action: CommandAction::OpenAiPrompt(OutputFormat::Rich),
                },
            ],
        }
    }
}

impl CommandCatalog {
    pub fn items(&self) -> &[CommandItem] {
        &self.items
    }

    /// Case-insensitive substring filter on the title.
    pub fn filter(&self, query: &str) -> Vec<&CommandItem> {
        let needle = query.to_lowercase();
        self.items
            .iter()
            .filter(|item| item.title.to_lowercase().contains(&needle))
            .collect()
    }

    /// Dispatches `item` against the document: removes the trigger span, then
    /// applies insert actions in place. Collaborator actions are handed back
    /// to the caller after the span removal.
    pub fn dispatch(
        &self,
        item: &CommandItem,
        doc: &mut dyn DocumentHandle,
        trigger: &PaletteTrigger,
    ) -> Option<CommandAction> {
        doc.delete_range(trigger.span.from, trigger.span.to);
        match &item.action {
            CommandAction::InsertBlock(html) => {
                doc.insert(trigger.span.from, html);
                tracing::debug!(command = item.title, "Palette command applied");
                None
            }
            other => Some(other.clone()),
        }
    }
}
