use crate::document::TextDocument;
use std::path::PathBuf;

/// Central application state shared by the front-end commands.
pub struct AppState {
    /// Currently open file path, if any.
    pub document_path: Option<PathBuf>,
    /// The live document buffer.
    pub document: TextDocument,
}

impl AppState {
    pub fn new(document_path: Option<PathBuf>, text: String) -> Self {
        Self {
            document_path,
            document: TextDocument::new(text),
        }
    }
}
