//! CLI commands.

use clap::Args;
use jarvis_llm::{ChatClient, ClientConfig, ContextWindow, Outcome, ServerConfig};
use std::time::Duration;
use tracing::{debug, warn};

use crate::render::DeltaPrinter;

pub mod ask;
pub mod chat;
pub mod info;
pub mod models;

/// Connection options shared by every command.
///
/// Unset flags fall back to `JARVIS_*` environment variables, then defaults.
#[derive(Args, Debug, Default)]
pub(crate) struct ConnectionArgs {
    /// Server host
    #[arg(long, global = true)]
    host: Option<String>,

    /// Server port
    #[arg(long, global = true)]
    port: Option<u16>,

    /// URL scheme (http or https)
    #[arg(long, global = true)]
    scheme: Option<String>,

    /// Model id sent with each request
    #[arg(long, global = true)]
    model: Option<String>,

    /// Token budget for prior conversation turns
    #[arg(long, global = true)]
    budget: Option<usize>,

    /// Seconds to wait for the next chunk before giving up (0 disables)
    #[arg(long, global = true)]
    idle_timeout: Option<u64>,

    /// Overall request deadline in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,
}

impl ConnectionArgs {
    pub(crate) fn resolve(&self) -> (ServerConfig, ClientConfig) {
        let mut server = ServerConfig::from_env();
        if let Some(host) = &self.host {
            server.host = host.clone();
        }
        if let Some(port) = self.port {
            server.port = port;
        }
        if let Some(scheme) = &self.scheme {
            server.scheme = scheme.clone();
        }

        let mut config = ClientConfig::from_env();
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(budget) = self.budget {
            config.token_budget = budget;
        }
        if let Some(secs) = self.idle_timeout {
            config.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.timeout {
            config.request_timeout = Some(Duration::from_secs(secs));
        }

        (server, config)
    }
}

/// Stream a reply to stdout.
///
/// Returns the outcome with the final text, or `None` if the user pressed
/// Ctrl-C before the reply finished.
pub(crate) async fn stream_reply(
    client: &mut ChatClient,
    prompt: &str,
    window: &ContextWindow<'_>,
) -> miette::Result<Option<(Outcome, String)>> {
    let handle = client
        .submit(prompt, window)
        .map_err(|e| miette::miette!("{}", e))?;

    let mut printer = DeltaPrinter::new(std::io::stdout());
    let outcome = tokio::select! {
        outcome = handle.for_each(
            |text| {
                if let Err(e) = printer.update(text) {
                    warn!("Failed to write reply: {}", e);
                }
            },
            |success| debug!("Reply finished (success: {})", success),
        ) => outcome,
        _ = tokio::signal::ctrl_c() => {
            client.cancel();
            None
        }
    };
    println!();

    Ok(outcome.map(|outcome| (outcome, printer.text().to_string())))
}
