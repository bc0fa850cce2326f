//! HTTP client for OpenAI-compatible streaming chat completions.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::config::{ClientConfig, ServerConfig, ServerConfigHandle};
use crate::context::ContextWindow;
use crate::error::LlmError;
use crate::session::{Outcome, SessionState, StreamEvent, StreamSession};

/// Streaming chat-completion client.
///
/// At most one session is active per client: `submit` retires the previous
/// one before starting a new request.
pub struct ChatClient {
    http: reqwest::Client,
    server: ServerConfigHandle,
    config: ClientConfig,
    generation: Arc<AtomicU64>,
    active: Option<AbortHandle>,
}

/// OpenAI-compatible chat completion request.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

/// Chat message in OpenAI format.
#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

impl<'a> ChatCompletionRequest<'a> {
    fn new(model: &'a str, context: &ContextWindow<'a>, prompt: &'a str) -> Self {
        let messages = context
            .turns()
            .iter()
            .map(|turn| ChatMessage {
                role: turn.role.as_str(),
                content: &turn.text,
            })
            .chain(std::iter::once(ChatMessage {
                role: "user",
                content: prompt,
            }))
            .collect();

        Self {
            model,
            messages,
            stream: true,
        }
    }
}

/// Response from the models endpoint.
#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

impl ChatClient {
    /// Create a client with its own server configuration.
    pub fn new(server: ServerConfig, config: ClientConfig) -> Self {
        Self::with_server_handle(ServerConfigHandle::new(server), config)
    }

    /// Create a client reading a shared server configuration.
    pub fn with_server_handle(server: ServerConfigHandle, config: ClientConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            server,
            config,
            generation: Arc::new(AtomicU64::new(0)),
            active: None,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Current server configuration.
    pub fn server(&self) -> ServerConfig {
        self.server.get()
    }

    /// Handle through which other components can change the server.
    pub fn server_handle(&self) -> ServerConfigHandle {
        self.server.clone()
    }

    /// Change the endpoint used by the next `submit`.
    ///
    /// A session already in flight keeps its original endpoint.
    pub fn update_server(&self, server: ServerConfig) {
        info!("Server endpoint set to {}", server);
        self.server.set(server);
    }

    /// Retire the active session, if any.
    ///
    /// Its handle yields no further events, even ones already buffered.
    pub fn cancel(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = self.active.take() {
            debug!("Retiring previous session");
            task.abort();
        }
    }

    /// Start streaming a reply to `prompt`, preceded by the turns in `context`.
    ///
    /// Must be called from within a tokio runtime. Fails without any network
    /// I/O if the server configuration does not form a valid URL.
    pub fn submit(
        &mut self,
        prompt: &str,
        context: &ContextWindow<'_>,
    ) -> Result<StreamHandle, LlmError> {
        self.cancel();

        let endpoint = self.server.get().chat_completions_url()?;
        let request = ChatCompletionRequest::new(&self.config.model, context, prompt);
        let body = serde_json::to_vec(&request)?;

        info!(
            "Submitting prompt to {} with {} context turn(s)",
            endpoint,
            context.len()
        );
        debug!("Request body: {}", String::from_utf8_lossy(&body));

        let request = self
            .http
            .post(endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);

        let generation = self.generation.load(Ordering::SeqCst);
        let (events, receiver) = mpsc::unbounded_channel();
        let limits = Limits {
            idle: self.config.idle_timeout,
            deadline: self.config.request_timeout.map(|t| Instant::now() + t),
        };

        let task = tokio::spawn(run_session(
            request,
            events,
            limits,
            self.config.error_message.clone(),
        ));
        self.active = Some(task.abort_handle());

        Ok(StreamHandle {
            events: receiver,
            task,
            generation,
            current: Arc::clone(&self.generation),
            finished: false,
        })
    }

    /// List the model ids the server reports.
    pub async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        let url = self.server.get().models_url()?;

        let mut request = self.http.get(url);
        if !self.config.idle_timeout.is_zero() {
            request = request.timeout(self.config.idle_timeout);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let models: ModelList = response.json().await?;
        Ok(models.data.into_iter().map(|m| m.id).collect())
    }
}

impl Default for ChatClient {
    fn default() -> Self {
        Self::new(ServerConfig::default(), ClientConfig::default())
    }
}

/// Receiving end of one streaming session.
///
/// Dropping the handle aborts the request.
pub struct StreamHandle {
    events: mpsc::UnboundedReceiver<StreamEvent>,
    task: JoinHandle<()>,
    generation: u64,
    current: Arc<AtomicU64>,
    finished: bool,
}

impl StreamHandle {
    /// Whether this session has not been superseded or cancelled.
    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation
    }

    /// Next event, in receipt order.
    ///
    /// Returns `None` after the terminal event, or once the session has been
    /// superseded.
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        if self.finished || !self.is_current() {
            return None;
        }

        let event = self.events.recv().await?;
        if !self.is_current() {
            return None;
        }

        if matches!(event, StreamEvent::Finished(_)) {
            self.finished = true;
        }
        Some(event)
    }

    /// Drive the session to its end on the calling task.
    ///
    /// `on_delta` receives the accumulated text after every delta and
    /// `on_terminal` is called once with the success flag. Returns `None`
    /// (without calling `on_terminal`) if the session was superseded first.
    pub async fn for_each<D, T>(mut self, mut on_delta: D, on_terminal: T) -> Option<Outcome>
    where
        D: FnMut(&str),
        T: FnOnce(bool),
    {
        while let Some(event) = self.recv().await {
            match event {
                StreamEvent::Delta(text) => on_delta(&text),
                StreamEvent::Finished(outcome) => {
                    on_terminal(outcome.is_success());
                    return Some(outcome);
                }
            }
        }
        None
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[derive(Debug, Clone, Copy)]
struct Limits {
    idle: Duration,
    deadline: Option<Instant>,
}

impl Limits {
    /// Await `fut` for at most the idle timeout, clamped to the deadline.
    ///
    /// A zero idle timeout means no idle limit.
    async fn guard<F: Future>(&self, fut: F) -> Result<F::Output, LlmError> {
        let idle = (!self.idle.is_zero()).then_some(self.idle);
        let remaining = self
            .deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()));

        let wait = match (idle, remaining) {
            (Some(idle), Some(remaining)) => idle.min(remaining),
            (Some(wait), None) | (None, Some(wait)) => wait,
            (None, None) => return Ok(fut.await),
        };

        tokio::time::timeout(wait, fut)
            .await
            .map_err(|_| LlmError::Timeout(wait))
    }
}

async fn run_session(
    request: reqwest::RequestBuilder,
    events: mpsc::UnboundedSender<StreamEvent>,
    limits: Limits,
    error_message: String,
) {
    let mut session = StreamSession::new();

    let tail = match stream_response(request, &mut session, &events, limits).await {
        Ok(()) => session.finish(),
        Err(e) => {
            warn!("Chat completion failed: {}", e);
            session.fail(&error_message)
        }
    };

    for event in tail {
        // The receiver may already be gone; nothing left to notify.
        let _ = events.send(event);
    }

    info!(
        "Session finished: {:?} ({} bytes of text)",
        session.state(),
        session.text().len()
    );
}

async fn stream_response(
    request: reqwest::RequestBuilder,
    session: &mut StreamSession,
    events: &mpsc::UnboundedSender<StreamEvent>,
    limits: Limits,
) -> Result<(), LlmError> {
    let response = limits.guard(request.send()).await??;

    let status = response.status();
    if !status.is_success() {
        let body = match limits.guard(response.text()).await {
            Ok(Ok(body)) => body,
            _ => String::new(),
        };
        return Err(LlmError::Api {
            status: status.as_u16(),
            body,
        });
    }

    let mut body = response.bytes_stream();
    while let Some(chunk) = limits.guard(body.next()).await? {
        let chunk = chunk?;
        trace!("Received chunk: {}", String::from_utf8_lossy(&chunk));

        for event in session.feed(&chunk) {
            if events.send(event).is_err() {
                debug!("Stream handle dropped; stopping");
                return Ok(());
            }
        }

        if session.state() != SessionState::Active {
            break;
        }
    }

    Ok(())
}
