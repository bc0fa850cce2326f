//! Models command - list what the server can run.

use jarvis_llm::{ChatClient, ClientConfig, ServerConfig};

pub(crate) async fn run(server: ServerConfig, config: ClientConfig) -> miette::Result<()> {
    let client = ChatClient::new(server, config);
    let models = client
        .list_models()
        .await
        .map_err(|e| miette::miette!("Failed to list models: {}", e))?;

    if models.is_empty() {
        println!("No models loaded on {}.", client.server());
        return Ok(());
    }

    println!("Models on {}:", client.server());
    for model in models {
        let marker = if model == client.config().model {
            " (selected)"
        } else {
            ""
        };
        println!("  - {}{}", model, marker);
    }

    Ok(())
}
