//! Pending-generation state machine.
//!
//! One [`GenerationSession`] per open document tracks the single AI request
//! that may be in flight or awaiting review. The transport runs on a spawned
//! task and reports back through [`TransportEvent`]s tagged with a request id;
//! issuing a new request bumps the id, so chunks from a superseded request are
//! dropped on arrival and two responses can never interleave.
//!
//! State diagram:
//!
//! ```text
//! Idle -> Loading -> Streaming* -> Ready -> Idle   (accept / reject)
//!                 \-> Error -> Idle                (reject)
//! Ready | Error -> Loading                         (regenerate / new submit)
//! ```

use crate::api::{AiChunk, AiProvider, Message};
use crate::document::{DocumentHandle, Selection};
use crate::events::{EventSink, Notice};
use crate::prompt::{self, OutputFormat};
use futures::StreamExt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// A user-issued generation request. Immutable once submitted.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub instruction: String,
    pub selection: Selection,
    pub format: OutputFormat,
    pub stream: bool,
    pub tone: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationStatus {
    Idle,
    Loading,
    Streaming,
    Ready,
    Error,
}

/// Reactively-read state of the current generation.
#[derive(Debug, Clone)]
pub struct GenerationState {
    pub status: GenerationStatus,
    pub response: Option<String>,
    pub reasoning: Option<String>,
    pub error: Option<String>,
}

impl GenerationState {
    fn idle() -> Self {
        Self {
            status: GenerationStatus::Idle,
            response: None,
            reasoning: None,
            error: None,
        }
    }
}

/// Message from the transport task to the session.
#[derive(Debug)]
pub struct TransportEvent {
    pub request_id: u64,
    pub payload: TransportPayload,
}

#[derive(Debug)]
pub enum TransportPayload {
    Content(String),
    Reasoning(String),
    Done,
    Failed(String),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum GenerationError {
    #[error("instruction must not be empty")]
    EmptyInstruction,
    #[error("no completed or failed generation to regenerate")]
    NothingToRegenerate,
}

/// Result of an accept attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptOutcome {
    /// The response replaced the recorded selection.
    Applied,
    /// Status was not `Ready`; nothing happened.
    NotReady,
    /// The document changed under the recorded selection; nothing happened.
    StaleSelection,
}

struct PendingRequest {
    request: GenerationRequest,
    /// Text the selection held when the request was issued.
    snapshot_text: String,
    /// Document revision when the request was issued.
    snapshot_revision: u64,
}

pub struct GenerationSession {
    provider: Arc<dyn AiProvider>,
    sink: Arc<dyn EventSink>,
    system_prompt: Option<String>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    state: GenerationState,
    pending: Option<PendingRequest>,
    request_id: u64,
}

impl GenerationSession {
    /// Creates a session and the receiver its owner must drain, feeding each
    /// event back through [`GenerationSession::apply`].
    pub fn new(
        provider: Arc<dyn AiProvider>,
        sink: Arc<dyn EventSink>,
    ) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let session = Self {
            provider,
            sink,
            system_prompt: None,
            events_tx,
            state: GenerationState::idle(),
            pending: None,
            request_id: 0,
        };
        (session, events_rx)
    }

    pub fn with_system_prompt(mut self, system_prompt: Option<String>) -> Self {
        self.system_prompt = system_prompt;
        self
    }

    pub fn state(&self) -> &GenerationState {
        &self.state
    }

    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    pub fn pending_request(&self) -> Option<&GenerationRequest> {
        self.pending.as_ref().map(|p| &p.request)
    }

    /// Unified diff between the captured selection and the pending response,
    /// for previewing a `Ready` generation before accepting it.
    pub fn diff_preview(&self) -> Option<String> {
        if self.state.status != GenerationStatus::Ready {
            return None;
        }
        let pending = self.pending.as_ref()?;
        let response = self.state.response.as_deref()?;
        Some(diffy::create_patch(&pending.snapshot_text, response).to_string())
    }

    /// Issues a new generation request.
    ///
    /// An empty instruction is rejected locally: no state transition, no
    /// transport call. Submitting while another request is in flight or ready
    /// supersedes it; the old request's remaining chunks are ignored.
    pub fn submit(
        &mut self,
        doc: &dyn DocumentHandle,
        request: GenerationRequest,
    ) -> Result<(), GenerationError> {
        if request.instruction.trim().is_empty() {
            return Err(GenerationError::EmptyInstruction);
        }
        self.start(doc, request);
        Ok(())
    }

    /// Re-issues the identical request (same instruction and selection) after
    /// `Ready` or `Error`, discarding the prior response immediately.
    pub fn regenerate(&mut self, doc: &dyn DocumentHandle) -> Result<(), GenerationError> {
        if !matches!(
            self.state.status,
            GenerationStatus::Ready | GenerationStatus::Error
        ) {
            return Err(GenerationError::NothingToRegenerate);
        }
        let request = self
            .pending
            .as_ref()
            .map(|p| p.request.clone())
            .ok_or(GenerationError::NothingToRegenerate)?;
        self.start(doc, request);
        Ok(())
    }

    fn start(&mut self, doc: &dyn DocumentHandle, request: GenerationRequest) {
        self.request_id += 1;
        let snapshot_text = doc.text_between(request.selection.from, request.selection.to);
        let messages = prompt::build_messages(
            &request.instruction,
            &snapshot_text,
            &doc.text(),
            request.format,
            request.tone.as_deref(),
            self.system_prompt.as_deref(),
        );
        tracing::info!(
            request_id = self.request_id,
            provider = self.provider.name(),
            "Issuing generation request"
        );
        self.pending = Some(PendingRequest {
            snapshot_text,
            snapshot_revision: doc.revision(),
            request: request.clone(),
        });
        self.state = GenerationState {
            status: GenerationStatus::Loading,
            response: None,
            reasoning: None,
            error: None,
        };
        self.spawn_transport(messages, self.request_id, request.stream);
    }

    fn spawn_transport(&self, messages: Vec<Message>, request_id: u64, stream: bool) {
        let provider = Arc::clone(&self.provider);
        let tx = self.events_tx.clone();
        let send = move |payload| {
            // Send failure means the session is gone; nothing left to do.
            let _ = tx.send(TransportEvent {
                request_id,
                payload,
            });
        };
        tokio::spawn(async move {
            let mut chunks = match provider.chat_stream(messages).await {
                Ok(chunks) => chunks,
                Err(e) => {
                    send(TransportPayload::Failed(e.to_string()));
                    return;
                }
            };
            let mut buffered = String::new();
            while let Some(item) = chunks.next().await {
                match item {
                    Ok(AiChunk::Content(text)) => {
                        if stream {
                            send(TransportPayload::Content(text));
                        } else {
                            buffered.push_str(&text);
                        }
                    }
                    Ok(AiChunk::Reasoning(text)) => {
                        send(TransportPayload::Reasoning(text));
                    }
                    Err(e) => {
                        send(TransportPayload::Failed(e.to_string()));
                        return;
                    }
                }
            }
            if !buffered.is_empty() {
                send(TransportPayload::Content(buffered));
            }
            send(TransportPayload::Done);
        });
    }

    /// Applies one transport event. Events tagged with a superseded request id
    /// are dropped.
    pub fn apply(&mut self, event: TransportEvent) {
        if event.request_id != self.request_id {
            tracing::debug!(
                stale_id = event.request_id,
                current_id = self.request_id,
                "Dropping event from superseded request"
            );
            return;
        }
        let receiving = matches!(
            self.state.status,
            GenerationStatus::Loading | GenerationStatus::Streaming
        );
        match event.payload {
            TransportPayload::Content(text) => {
                if receiving {
                    self.state.status = GenerationStatus::Streaming;
                    self.state.response.get_or_insert_with(String::new).push_str(&text);
                }
            }
            TransportPayload::Reasoning(text) => {
                if receiving {
                    self.state.reasoning.get_or_insert_with(String::new).push_str(&text);
                }
            }
            TransportPayload::Done => {
                if !receiving {
                    return;
                }
                let format = self
                    .pending
                    .as_ref()
                    .map(|p| p.request.format)
                    .unwrap_or(OutputFormat::Plain);
                match self.state.response.take() {
                    Some(raw) if !raw.trim().is_empty() => {
                        self.state.response = Some(prompt::extract_content(&raw, format));
                        self.state.status = GenerationStatus::Ready;
                        tracing::info!(request_id = event.request_id, "Generation ready for review");
                    }
                    _ => {
                        self.fail("The model returned an empty response".to_string());
                    }
                }
            }
            TransportPayload::Failed(message) => {
                if receiving {
                    self.fail(message);
                }
            }
        }
    }

    fn fail(&mut self, message: String) {
        tracing::error!("Generation failed: {}", message);
        self.sink.notify(Notice::error(format!("AI error: {}", message)));
        self.state.status = GenerationStatus::Error;
        self.state.error = Some(message);
    }

    /// Commits the pending response into the document, replacing the recorded
    /// selection. Only effective from `Ready`; the guard lives here, not in
    /// the UI, so a racing caller cannot apply stale content.
    pub fn accept(&mut self, doc: &mut dyn DocumentHandle) -> AcceptOutcome {
        if self.state.status != GenerationStatus::Ready {
            return AcceptOutcome::NotReady;
        }
        let (Some(pending), Some(response)) = (self.pending.as_ref(), self.state.response.clone())
        else {
            return AcceptOutcome::NotReady;
        };
        let Selection { from, to } = pending.request.selection;
        if doc.revision() != pending.snapshot_revision
            && doc.text_between(from, to) != pending.snapshot_text
        {
            self.sink.notify(Notice::warning(
                "The selection changed while the AI was writing; review and regenerate",
            ));
            self.state.status = GenerationStatus::Error;
            self.state.error = Some("selection changed since the request was issued".to_string());
            return AcceptOutcome::StaleSelection;
        }
        doc.replace_range(from, to, &response);
        self.reset();
        AcceptOutcome::Applied
    }

    /// Discards the pending response without touching the document.
    /// Effective from `Ready` or `Error`; a no-op otherwise.
    pub fn reject(&mut self) -> bool {
        match self.state.status {
            GenerationStatus::Ready | GenerationStatus::Error => {
                self.reset();
                true
            }
            _ => false,
        }
    }

    fn reset(&mut self) {
        self.state = GenerationState::idle();
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{AiStream, ApiError};
    use crate::document::TextDocument;
    use crate::events::testing::RecordingSink;
    use crate::events::NoticeLevel;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Provider that replays a canned list of chunks per `chat_stream` call.
    struct ScriptedProvider {
        scripts: Mutex<VecDeque<Vec<Result<AiChunk, ApiError>>>>,
    }

    impl ScriptedProvider {
        fn new(scripts: Vec<Vec<Result<AiChunk, ApiError>>>) -> Arc<Self> {
            Arc::new(Self {
                scripts: Mutex::new(scripts.into()),
            })
        }

        fn single(chunks: Vec<Result<AiChunk, ApiError>>) -> Arc<Self> {
            Self::new(vec![chunks])
        }
    }

    #[async_trait]
    impl AiProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "Scripted"
        }

        async fn check_availability(&self) -> Result<(), ApiError> {
            Ok(())
        }

        async fn chat_stream(&self, _messages: Vec<Message>) -> Result<AiStream, ApiError> {
            let script = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected chat_stream call");
            Ok(Box::pin(futures::stream::iter(script)))
        }
    }

    /// Provider that fails before producing a stream.
    struct DownProvider;

    #[async_trait]
    impl AiProvider for DownProvider {
        fn name(&self) -> &str {
            "Down"
        }

        async fn check_availability(&self) -> Result<(), ApiError> {
            Err(ApiError::Response("down".to_string()))
        }

        async fn chat_stream(&self, _messages: Vec<Message>) -> Result<AiStream, ApiError> {
            Err(ApiError::Response("connection refused".to_string()))
        }
    }

    /// Provider that must never be reached.
    struct PanickingProvider;

    #[async_trait]
    impl AiProvider for PanickingProvider {
        fn name(&self) -> &str {
            "Panicking"
        }

        async fn check_availability(&self) -> Result<(), ApiError> {
            Ok(())
        }

        async fn chat_stream(&self, _messages: Vec<Message>) -> Result<AiStream, ApiError> {
            panic!("transport must not be called");
        }
    }

    fn request(instruction: &str, selection: Selection) -> GenerationRequest {
        GenerationRequest {
            instruction: instruction.to_string(),
            selection,
            format: OutputFormat::Plain,
            stream: true,
            tone: None,
        }
    }

    /// Drains events until the current request settles in `Ready` or `Error`.
    async fn settle(
        session: &mut GenerationSession,
        rx: &mut mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        loop {
            let event = rx.recv().await.expect("transport channel closed");
            let current = event.request_id == session.request_id();
            session.apply(event);
            if current
                && matches!(
                    session.state().status,
                    GenerationStatus::Ready | GenerationStatus::Error
                )
            {
                return;
            }
        }
    }

    fn content(text: &str) -> Result<AiChunk, ApiError> {
        Ok(AiChunk::Content(text.to_string()))
    }

    #[tokio::test]
    async fn test_submit_accept_replaces_selection() {
        let provider = ScriptedProvider::single(vec![content("A fox "), content("jumps.")]);
        let sink = Arc::new(RecordingSink::default());
        let (mut session, mut rx) = GenerationSession::new(provider, sink);

        let mut doc = TextDocument::new("Intro. The quick brown fox. Outro.");
        let selection = Selection::new(7, 26);
        assert_eq!(doc.text_between(7, 26), "The quick brown fox");

        session
            .submit(&doc, request("Summarize", selection))
            .unwrap();
        assert_eq!(session.state().status, GenerationStatus::Loading);

        settle(&mut session, &mut rx).await;
        assert_eq!(session.state().status, GenerationStatus::Ready);
        assert_eq!(session.state().response.as_deref(), Some("A fox jumps."));

        assert_eq!(session.accept(&mut doc), AcceptOutcome::Applied);
        assert_eq!(doc.text(), "Intro. A fox jumps.. Outro.");
        assert_eq!(session.state().status, GenerationStatus::Idle);
        assert!(session.state().response.is_none());
    }

    #[tokio::test]
    async fn test_empty_instruction_is_rejected_locally() {
        let (mut session, _rx) =
            GenerationSession::new(Arc::new(PanickingProvider), Arc::new(RecordingSink::default()));
        let doc = TextDocument::new("text");

        let err = session
            .submit(&doc, request("   ", Selection::caret(0)))
            .unwrap_err();
        assert_eq!(err, GenerationError::EmptyInstruction);
        assert_eq!(session.state().status, GenerationStatus::Idle);
    }

    #[tokio::test]
    async fn test_transport_failure_sets_error_and_notifies() {
        let sink = Arc::new(RecordingSink::default());
        let (mut session, mut rx) =
            GenerationSession::new(Arc::new(DownProvider), sink.clone());
        let mut doc = TextDocument::new("untouched");

        session
            .submit(&doc, request("Improve", Selection::new(0, 9)))
            .unwrap();
        settle(&mut session, &mut rx).await;

        assert_eq!(session.state().status, GenerationStatus::Error);
        assert!(session.state().error.as_deref().unwrap().contains("connection refused"));
        assert_eq!(doc.text(), "untouched");

        let notices = sink.notices.lock().unwrap();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Error);

        // Accept from Error is a no-op.
        drop(notices);
        assert_eq!(session.accept(&mut doc), AcceptOutcome::NotReady);
        assert_eq!(doc.text(), "untouched");
    }

    #[tokio::test]
    async fn test_reject_returns_to_idle_without_mutation() {
        let provider = ScriptedProvider::single(vec![content("new text")]);
        let (mut session, mut rx) =
            GenerationSession::new(provider, Arc::new(RecordingSink::default()));
        let doc = TextDocument::new("old text");

        session
            .submit(&doc, request("Rewrite", Selection::new(0, 8)))
            .unwrap();
        settle(&mut session, &mut rx).await;
        assert_eq!(session.state().status, GenerationStatus::Ready);

        assert!(session.reject());
        assert_eq!(session.state().status, GenerationStatus::Idle);
        assert!(session.state().response.is_none());
        assert_eq!(doc.text(), "old text");

        // Reject is idempotent.
        assert!(!session.reject());
    }

    #[tokio::test]
    async fn test_regenerate_discards_prior_response() {
        let provider = ScriptedProvider::new(vec![
            vec![content("first answer")],
            vec![content("second answer")],
        ]);
        let (mut session, mut rx) =
            GenerationSession::new(provider, Arc::new(RecordingSink::default()));
        let doc = TextDocument::new("body");

        session
            .submit(&doc, request("Shorten", Selection::new(0, 4)))
            .unwrap();
        settle(&mut session, &mut rx).await;
        assert_eq!(session.state().response.as_deref(), Some("first answer"));

        session.regenerate(&doc).unwrap();
        assert_eq!(session.state().status, GenerationStatus::Loading);
        assert!(session.state().response.is_none());

        settle(&mut session, &mut rx).await;
        assert_eq!(session.state().response.as_deref(), Some("second answer"));
    }

    #[tokio::test]
    async fn test_regenerate_requires_settled_state() {
        let (mut session, _rx) =
            GenerationSession::new(Arc::new(PanickingProvider), Arc::new(RecordingSink::default()));
        let doc = TextDocument::new("body");
        assert_eq!(
            session.regenerate(&doc).unwrap_err(),
            GenerationError::NothingToRegenerate
        );
    }

    #[tokio::test]
    async fn test_second_submit_supersedes_first() {
        let provider = ScriptedProvider::new(vec![
            vec![content("FIRST")],
            vec![content("SECOND")],
        ]);
        let (mut session, mut rx) =
            GenerationSession::new(provider, Arc::new(RecordingSink::default()));
        let doc = TextDocument::new("body");

        session
            .submit(&doc, request("One", Selection::new(0, 4)))
            .unwrap();
        // Supersede before draining anything from the first request.
        session
            .submit(&doc, request("Two", Selection::new(0, 4)))
            .unwrap();

        settle(&mut session, &mut rx).await;
        assert_eq!(session.state().status, GenerationStatus::Ready);
        assert_eq!(session.state().response.as_deref(), Some("SECOND"));
    }

    #[tokio::test]
    async fn test_stale_selection_refused_on_accept() {
        let provider = ScriptedProvider::single(vec![content("replacement")]);
        let sink = Arc::new(RecordingSink::default());
        let (mut session, mut rx) =
            GenerationSession::new(provider, sink.clone());
        let mut doc = TextDocument::new("target text here");

        session
            .submit(&doc, request("Rewrite", Selection::new(0, 6)))
            .unwrap();
        settle(&mut session, &mut rx).await;
        assert_eq!(session.state().status, GenerationStatus::Ready);

        // User kept typing while the generation streamed.
        doc.replace_range(0, 6, "edited");
        doc.insert(0, "! ");

        assert_eq!(session.accept(&mut doc), AcceptOutcome::StaleSelection);
        assert_eq!(session.state().status, GenerationStatus::Error);
        assert_eq!(doc.text(), "! edited text here");
    }

    #[tokio::test]
    async fn test_accept_tolerates_unrelated_edits() {
        // An edit elsewhere bumps the revision but leaves the recorded range
        // holding the same text, so accept still applies.
        let provider = ScriptedProvider::single(vec![content("Target")]);
        let (mut session, mut rx) =
            GenerationSession::new(provider, Arc::new(RecordingSink::default()));
        let mut doc = TextDocument::new("target text here");

        session
            .submit(&doc, request("Capitalize", Selection::new(0, 6)))
            .unwrap();
        settle(&mut session, &mut rx).await;

        doc.replace_range(12, 16, "now.");
        assert_eq!(doc.text(), "target text now.");

        assert_eq!(session.accept(&mut doc), AcceptOutcome::Applied);
        assert_eq!(doc.text(), "Target text now.");
    }

    #[tokio::test]
    async fn test_empty_completed_response_is_an_error() {
        let provider = ScriptedProvider::single(vec![]);
        let (mut session, mut rx) =
            GenerationSession::new(provider, Arc::new(RecordingSink::default()));
        let doc = TextDocument::new("body");

        session
            .submit(&doc, request("Anything", Selection::caret(0)))
            .unwrap();
        settle(&mut session, &mut rx).await;

        assert_eq!(session.state().status, GenerationStatus::Error);
        assert!(session.state().error.is_some());
    }

    #[tokio::test]
    async fn test_non_streaming_request_delivers_one_chunk() {
        let provider = ScriptedProvider::single(vec![content("part one, "), content("part two")]);
        let (mut session, mut rx) =
            GenerationSession::new(provider, Arc::new(RecordingSink::default()));
        let doc = TextDocument::new("body");

        let mut req = request("Join", Selection::new(0, 4));
        req.stream = false;
        session.submit(&doc, req).unwrap();

        let first = rx.recv().await.unwrap();
        assert!(matches!(
            first.payload,
            TransportPayload::Content(ref text) if text == "part one, part two"
        ));
        session.apply(first);
        settle(&mut session, &mut rx).await;
        assert_eq!(session.state().response.as_deref(), Some("part one, part two"));
    }

    #[tokio::test]
    async fn test_diff_preview_only_when_ready() {
        let provider = ScriptedProvider::single(vec![content("new copy")]);
        let (mut session, mut rx) =
            GenerationSession::new(provider, Arc::new(RecordingSink::default()));
        let doc = TextDocument::new("old copy");

        assert!(session.diff_preview().is_none());
        session
            .submit(&doc, request("Refresh", Selection::new(0, 8)))
            .unwrap();
        settle(&mut session, &mut rx).await;

        let patch = session.diff_preview().unwrap();
        assert!(patch.contains("-old copy"));
        assert!(patch.contains("+new copy"));
    }
}
