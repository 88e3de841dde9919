use crate::config::AiConfig;
use crate::editor::{ApplyOutcome, Editor, ScopeSnapshot, TextRange, apply_patch};
use crate::error::{SessionError, StoreError};
use crate::handlers::assistant::{AiMessage, AiMode, OutboundRequest, build_request};
use crate::models::{ImportSummary, LoadReport, Snippet, SnippetStore};
use crate::search::{self, SearchOptions};
use flume::{Receiver, Sender};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// How long a transient status message stays before reverting to "Ready"
pub const STATUS_TTL: Duration = Duration::from_secs(2);

const READY: &str = "Ready";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    text: String,
    expires_at: Option<Instant>,
}

impl StatusLine {
    fn ready() -> Self {
        Self {
            text: READY.to_string(),
            expires_at: None,
        }
    }

    /// Text shown at `now`; a transient message past its TTL reads as "Ready".
    pub fn text_at(&self, now: Instant) -> &str {
        match self.expires_at {
            Some(at) if now >= at => READY,
            _ => &self.text,
        }
    }

    fn set_transient(&mut self, text: impl Into<String>, now: Instant) {
        self.text = text.into();
        self.expires_at = Some(now + STATUS_TTL);
    }

    fn set_sticky(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.expires_at = None;
    }
}

/// One explain/refactor round trip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiExchange {
    pub id: Uuid,
    pub mode: AiMode,
    pub scope: ScopeSnapshot,
    pub request_text: String,
    /// `None` while the request is in flight.
    pub response_text: Option<String>,
    pub is_error: bool,
    pub extracted_code: Option<String>,
}

impl AiExchange {
    pub fn in_flight(&self) -> bool {
        self.response_text.is_none()
    }
}

/// Everything the front end needs between user actions: the store, the
/// snippet being edited, the pending AI exchange and the status line.
#[derive(Debug)]
pub struct Session {
    store: SnippetStore,
    search_options: SearchOptions,
    ai_config: AiConfig,
    editing: Option<i64>,
    last_selection: Option<TextRange>,
    exchange: Option<AiExchange>,
    status: StatusLine,
    persist_error: Option<StoreError>,
    ai_tx: Sender<AiMessage>,
    ai_rx: Receiver<AiMessage>,
}

impl Session {
    pub fn new(store: SnippetStore, search_options: SearchOptions, ai_config: AiConfig) -> Self {
        let (ai_tx, ai_rx) = flume::unbounded();
        Self {
            store,
            search_options,
            ai_config,
            editing: None,
            last_selection: None,
            exchange: None,
            status: StatusLine::ready(),
            persist_error: None,
            ai_tx,
            ai_rx,
        }
    }

    /// Loads the store and reports the outcome on the status line.
    pub fn init(&mut self) -> Result<LoadReport, StoreError> {
        let result = self.store.load();
        match &result {
            Ok(LoadReport::Fresh) => self.status.set_sticky("Ready (New File)"),
            Ok(LoadReport::Loaded { count, .. }) => self
                .status
                .set_transient(format!("Data loaded ({} snippets)", count), Instant::now()),
            Err(e) => self.status.set_sticky(e.status_text()),
        }
        result
    }

    pub fn store(&self) -> &SnippetStore {
        &self.store
    }

    pub fn snippets(&self) -> &[Snippet] {
        self.store.snippets()
    }

    pub fn status(&self) -> &str {
        self.status_at(Instant::now())
    }

    pub fn status_at(&self, now: Instant) -> &str {
        self.status.text_at(now)
    }

    pub fn search(&self, query: &str) -> Vec<&Snippet> {
        search::filter(self.store.snippets(), query, self.search_options)
    }

    /// Starts editing an existing snippet; saving will update it in place.
    pub fn begin_edit(&mut self, id: i64) -> bool {
        if self.store.get(id).is_some() {
            self.editing = Some(id);
            true
        } else {
            false
        }
    }

    /// Creates a snippet, or updates the one being edited. Returns the id
    /// written, or `None` when the edited snippet no longer exists.
    pub fn save_snippet(
        &mut self,
        title: &str,
        code: &str,
        language: &str,
        tags_input: &str,
    ) -> Result<Option<i64>, SessionError> {
        let now = Instant::now();
        let result = match self.editing {
            Some(id) => self.store.update(id, title, code, language, tags_input),
            None => self
                .store
                .create(title, code, language, tags_input)
                .map(Some),
        };

        let change = match result {
            Ok(Some(change)) => change,
            Ok(None) => {
                self.editing = None;
                self.status.set_transient("Snippet no longer exists", now);
                return Ok(None);
            }
            Err(e) => {
                self.status.set_transient(e.status_text(), now);
                return Err(e.into());
            }
        };

        self.editing = None;
        self.report_persist(&change.persisted, "Saved!", now);
        Ok(Some(change.id))
    }

    pub fn delete_snippet(&mut self, id: i64) -> bool {
        let Some(change) = self.store.delete(id) else {
            return false;
        };

        if self.editing == Some(id) {
            self.editing = None;
        }
        self.report_persist(&change.persisted, "Deleted", Instant::now());
        true
    }

    /// Merges imported snippets into the store.
    pub fn import_snippets(&mut self, incoming: Vec<Snippet>, overwrite: bool) -> ImportSummary {
        let summary = self.store.merge_import(incoming, overwrite);
        let text = format!(
            "Imported {} snippets ({} replaced, {} skipped)",
            summary.added, summary.replaced, summary.skipped
        );
        self.report_persist(&summary.persisted, &text, Instant::now());
        summary
    }

    /// Error from the most recent write of the data file, if it failed.
    pub fn persist_error(&self) -> Option<&StoreError> {
        self.persist_error.as_ref()
    }

    fn report_persist(&mut self, persisted: &Result<(), StoreError>, ok_text: &str, now: Instant) {
        match persisted {
            Ok(()) => {
                self.persist_error = None;
                self.status.set_transient(ok_text, now);
            }
            Err(e) => {
                self.persist_error = Some(e.clone());
                self.status.set_sticky(e.status_text());
            }
        }
    }

    pub fn exchange(&self) -> Option<&AiExchange> {
        self.exchange.as_ref()
    }

    pub fn last_selection(&self) -> Option<TextRange> {
        self.last_selection
    }

    pub fn is_ai_busy(&self) -> bool {
        self.exchange.as_ref().is_some_and(AiExchange::in_flight)
    }

    /// Channel end handed to the worker that performs the request.
    pub fn ai_sender(&self) -> Sender<AiMessage> {
        self.ai_tx.clone()
    }

    /// Captures the scope now and opens a new exchange. Rejected while
    /// another request is in flight; a finished exchange is replaced.
    pub fn start_ai_action<E: Editor + ?Sized>(
        &mut self,
        mode: AiMode,
        editor: &E,
        language: &str,
    ) -> Result<OutboundRequest, SessionError> {
        if self.is_ai_busy() {
            return Err(SessionError::AiBusy);
        }

        let scope = ScopeSnapshot::capture(editor);
        let request = build_request(mode, &scope, language, &self.ai_config);
        let id = Uuid::new_v4();

        tracing::info!(%id, %mode, scope = scope.label(), "starting AI action");

        self.last_selection = scope.range;
        self.exchange = Some(AiExchange {
            id,
            mode,
            request_text: scope.text.clone(),
            scope,
            response_text: None,
            is_error: false,
            extracted_code: None,
        });
        self.status.set_sticky("Asking AI...");

        Ok(OutboundRequest { id, mode, request })
    }

    /// Folds a reply into the pending exchange. Replies for any other id
    /// (dismissed or replaced exchanges) are dropped.
    pub fn receive(&mut self, message: AiMessage) -> bool {
        let now = Instant::now();
        let Some(exchange) = self
            .exchange
            .as_mut()
            .filter(|exchange| exchange.id == message.id() && exchange.in_flight())
        else {
            tracing::debug!(id = %message.id(), "ignoring reply for an exchange that is no longer pending");
            return false;
        };

        match message {
            AiMessage::Reply { reply, .. } => {
                exchange.response_text = Some(reply.text);
                exchange.extracted_code = reply.extracted_code;
                exchange.is_error = false;
                self.status.set_transient("AI response ready", now);
            }
            AiMessage::Failed { error, .. } => {
                tracing::warn!(error = %error, "AI request failed");
                exchange.response_text = Some(format!("Error: {}", error));
                exchange.extracted_code = None;
                exchange.is_error = true;
                self.status.set_transient("AI request failed", now);
            }
        }
        true
    }

    /// Blocks until the pending exchange completes or `timeout` passes.
    /// Returns true when a reply was recorded.
    pub fn wait_ai(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.is_ai_busy() {
            match self.ai_rx.recv_deadline(deadline) {
                Ok(message) => {
                    self.receive(message);
                }
                Err(_) => return false,
            }
        }
        self.exchange.is_some()
    }

    /// Writes the extracted code into the editor at the captured scope and
    /// clears the exchange. Without extracted code nothing changes.
    pub fn apply_fix<E: Editor + ?Sized>(
        &mut self,
        editor: &mut E,
    ) -> Result<ApplyOutcome, SessionError> {
        let exchange = self
            .exchange
            .as_ref()
            .ok_or(SessionError::NoPendingExchange)?;
        if exchange.in_flight() {
            return Err(SessionError::AiBusy);
        }

        let outcome = apply_patch(editor, exchange.extracted_code.as_deref(), &exchange.scope);
        let now = Instant::now();

        if !outcome.edited() {
            self.status.set_transient("No code to apply", now);
            return Ok(outcome);
        }

        if outcome == ApplyOutcome::ReplacedDocumentStale {
            self.status
                .set_transient("Document changed, replaced whole document", now);
        } else {
            self.status.set_transient("Fix applied", now);
        }

        self.clear_exchange();
        Ok(outcome)
    }

    /// Drops the exchange without touching the document.
    pub fn dismiss(&mut self) {
        if self.exchange.is_some() {
            self.clear_exchange();
            self.status = StatusLine::ready();
        }
    }

    fn clear_exchange(&mut self) {
        self.exchange = None;
        self.last_selection = None;
    }
}
