//! # Jarvis LLM client
//!
//! Streaming chat completions against a local OpenAI-compatible inference
//! server (LM Studio, llama-server, ...).
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │  Conversation   │ --> │ Context Builder │ --> │   ChatClient    │
//! │  history        │     │ (token budget)  │     │  (SSE stream)   │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//!                                                        │
//!                                                 ┌──────┴──────┐
//!                                                 │ StreamHandle │
//!                                                 │ deltas + end │
//!                                                 └─────────────┘
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use jarvis_llm::{select, ChatClient, ClientConfig, ServerConfig};
//!
//! let mut client = ChatClient::new(ServerConfig::default(), ClientConfig::default());
//! let window = select(&history, client.config().token_budget);
//! let handle = client.submit("Hello!", &window)?;
//!
//! handle
//!     .for_each(|text| println!("{text}"), |ok| println!("done: {ok}"))
//!     .await;
//! ```

mod client;
mod config;
mod context;
mod error;
mod session;
mod turn;

pub use client::{ChatClient, StreamHandle};
pub use config::{ClientConfig, ClientConfigBuilder, ServerConfig, ServerConfigHandle};
pub use context::{estimate_tokens, select, ContextWindow};
pub use error::LlmError;
pub use session::{parse_line, Line, Outcome, SessionState, StreamEvent, StreamSession};
pub use turn::{Role, Turn};

/// Default port of the local inference server.
pub const DEFAULT_PORT: u16 = 1234;

/// Default host of the local inference server.
pub const DEFAULT_HOST: &str = "localhost";

/// Default model id sent with every request.
pub const DEFAULT_MODEL: &str = "qwen2.5-coder-32b-instruct";

/// Default token budget for the context window.
pub const DEFAULT_TOKEN_BUDGET: usize = 25_000;

/// Heuristic characters-per-token ratio used by the context builder.
pub const CHARS_PER_TOKEN: usize = 4;

/// Text delivered as the final delta when a session fails in transport.
pub const TRANSPORT_ERROR_MESSAGE: &str =
    "Sorry, an error occurred while processing the request.";

/// Path of the streaming chat-completions endpoint.
pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Path of the model listing endpoint.
pub const MODELS_PATH: &str = "/v1/models";
