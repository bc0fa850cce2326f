//! Info command - show the effective configuration.

use jarvis_llm::{ClientConfig, ServerConfig};

pub(crate) fn run(server: &ServerConfig, config: &ClientConfig) -> miette::Result<()> {
    println!("Jarvis");
    println!("======");
    println!();
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!();

    match server.chat_completions_url() {
        Ok(url) => println!("Endpoint:        {}", url),
        Err(e) => println!("Endpoint:        invalid ({})", e),
    }
    println!("Model:           {}", config.model);
    println!("Token budget:    {}", config.token_budget);
    if config.idle_timeout.is_zero() {
        println!("Idle timeout:    none");
    } else {
        println!("Idle timeout:    {}s", config.idle_timeout.as_secs());
    }
    match config.request_timeout {
        Some(timeout) => println!("Request timeout: {}s", timeout.as_secs()),
        None => println!("Request timeout: none"),
    }
    println!();

    println!("Environment overrides:");
    println!("  JARVIS_HOST, JARVIS_PORT, JARVIS_SCHEME, JARVIS_MODEL,");
    println!("  JARVIS_TOKEN_BUDGET, JARVIS_IDLE_TIMEOUT_SECS, JARVIS_REQUEST_TIMEOUT_SECS");

    Ok(())
}
