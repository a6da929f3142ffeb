//! Command surface: the always-visible AI prompt bar.
//!
//! Collects a natural-language instruction, pairs it with the live selection
//! (or whole-document context when nothing is selected), and hands exactly one
//! [`GenerationRequest`] per submission to the session.

use crate::document::{DocumentHandle, Selection};
use crate::generation::{GenerationError, GenerationRequest, GenerationSession};
use crate::prompt::OutputFormat;

/// What happened to a prompt-bar submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A request was issued; the input was cleared.
    Submitted,
    /// The instruction was empty; nothing was issued.
    EmptyInstruction,
    /// No document is mounted; nothing was issued.
    NoDocument,
}

pub struct CommandSurface {
    input: String,
    format: OutputFormat,
    tone: Option<String>,
}

impl CommandSurface {
    pub fn new(format: OutputFormat, tone: Option<String>) -> Self {
        Self {
            input: String::new(),
            format,
            tone,
        }
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    pub fn set_tone(&mut self, tone: Option<String>) {
        self.tone = tone;
    }

    pub fn set_format(&mut self, format: OutputFormat) {
        self.format = format;
    }

    /// Submits the current input against the mounted document.
    ///
    /// With no document mounted this is a no-op, not an error: the surface can
    /// be rendered before an editor exists. The input survives a failed
    /// submission so the user can fix it, and clears on hand-off.
    pub fn submit(
        &mut self,
        doc: Option<&dyn DocumentHandle>,
        session: &mut GenerationSession,
    ) -> SubmitOutcome {
        let Some(doc) = doc else {
            tracing::debug!("Prompt submitted with no document mounted; ignoring");
            return SubmitOutcome::NoDocument;
        };
        if self.input.trim().is_empty() {
            return SubmitOutcome::EmptyInstruction;
        }

        let selection = doc.selection();
        let request = GenerationRequest {
            instruction: self.input.trim().to_string(),
            selection: if selection.is_empty() {
                // Whole-document context; the response lands at the caret.
                Selection::caret(selection.from)
            } else {
                selection
            },
            format: self.format,
            stream: true,
            tone: self.tone.clone(),
        };

        match session.submit(doc, request) {
            Ok(()) => {
                self.input.clear();
                SubmitOutcome::Submitted
            }
            Err(GenerationError::EmptyInstruction) => SubmitOutcome::EmptyInstruction,
            Err(e) => {
                tracing::warn!("Prompt submission rejected: {}", e);
                SubmitOutcome::EmptyInstruction
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{AiChunk, AiProvider, AiStream, ApiError, Message};
    use crate::document::TextDocument;
    use crate::events::TracingSink;
    use crate::generation::GenerationStatus;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct OneShotProvider;

    #[async_trait]
    impl AiProvider for OneShotProvider {
        fn name(&self) -> &str {
            "OneShot"
        }

        async fn check_availability(&self) -> Result<(), ApiError> {
            Ok(())
        }

        async fn chat_stream(&self, _messages: Vec<Message>) -> Result<AiStream, ApiError> {
            Ok(Box::pin(futures::stream::iter(vec![Ok(AiChunk::Content(
                "out".to_string(),
            ))])))
        }
    }

    fn session() -> GenerationSession {
        GenerationSession::new(Arc::new(OneShotProvider), Arc::new(TracingSink)).0
    }

    #[tokio::test]
    async fn test_submit_issues_request_and_clears_input() {
        let mut surface = CommandSurface::new(OutputFormat::Plain, None);
        let mut session = session();
        let mut doc = TextDocument::new("hello world");
        doc.set_selection(crate::document::Selection::new(0, 5));

        surface.set_input("Make it formal");
        let outcome = surface.submit(Some(&doc), &mut session);
        assert_eq!(outcome, SubmitOutcome::Submitted);
        assert!(surface.input().is_empty());
        assert_eq!(session.state().status, GenerationStatus::Loading);
        assert_eq!(
            session.pending_request().unwrap().selection,
            crate::document::Selection::new(0, 5)
        );
    }

    #[tokio::test]
    async fn test_empty_input_does_not_issue() {
        let mut surface = CommandSurface::new(OutputFormat::Plain, None);
        let mut session = session();
        let doc = TextDocument::new("hello");

        surface.set_input("   ");
        let outcome = surface.submit(Some(&doc), &mut session);
        assert_eq!(outcome, SubmitOutcome::EmptyInstruction);
        assert_eq!(session.state().status, GenerationStatus::Idle);
        assert_eq!(surface.input(), "   ");
    }

    #[tokio::test]
    async fn test_no_document_is_a_noop() {
        let mut surface = CommandSurface::new(OutputFormat::Rich, None);
        let mut session = session();

        surface.set_input("Anything");
        let outcome = surface.submit(None, &mut session);
        assert_eq!(outcome, SubmitOutcome::NoDocument);
        assert_eq!(session.state().status, GenerationStatus::Idle);
        assert_eq!(surface.input(), "Anything");
    }

    #[tokio::test]
    async fn test_empty_selection_targets_caret() {
        let mut surface = CommandSurface::new(OutputFormat::Plain, Some("crisp".to_string()));
        let mut session = session();
        let mut doc = TextDocument::new("abc def");
        doc.set_selection(crate::document::Selection::caret(4));

        surface.set_input("Continue this");
        assert_eq!(surface.submit(Some(&doc), &mut session), SubmitOutcome::Submitted);
        let request = session.pending_request().unwrap();
        assert!(request.selection.is_empty());
        assert_eq!(request.selection.from, 4);
        assert_eq!(request.tone.as_deref(), Some("crisp"));
    }
}
