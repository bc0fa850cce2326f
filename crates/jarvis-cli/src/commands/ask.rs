//! Ask command - one prompt, one streamed reply.

use jarvis_llm::{select, ChatClient, ClientConfig, Outcome, ServerConfig};
use std::path::Path;
use tracing::info;

use super::stream_reply;
use crate::history;

pub(crate) async fn run(
    server: ServerConfig,
    config: ClientConfig,
    prompt: &str,
    history_path: Option<&Path>,
) -> miette::Result<()> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return Err(miette::miette!("Prompt is empty"));
    }

    let history = match history_path {
        Some(path) => history::load(path)?,
        None => Vec::new(),
    };

    let window = select(&history, config.token_budget);
    if window.len() < history.len() {
        info!(
            "History truncated to the last {} of {} turn(s)",
            window.len(),
            history.len()
        );
    }

    let mut client = ChatClient::new(server, config);
    match stream_reply(&mut client, prompt, &window).await? {
        Some((Outcome::Completed, _)) => Ok(()),
        Some((Outcome::Failed, _)) => Err(miette::miette!(
            "Request to {} failed",
            client.server()
        )),
        None => Err(miette::miette!("Cancelled")),
    }
}
