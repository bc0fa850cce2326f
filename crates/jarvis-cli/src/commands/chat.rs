//! Chat command - interactive conversation with in-memory history.

use jarvis_llm::{select, ChatClient, ClientConfig, Outcome, ServerConfig, Turn};
use std::future::Future;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing::debug;

use super::stream_reply;

pub(crate) async fn run(server: ServerConfig, config: ClientConfig) -> miette::Result<()> {
    let budget = config.token_budget;
    println!("Chatting with {} at {}", config.model, server);
    println!("Commands: /clear, /server <host> <port>, /exit");
    println!();

    let mut client = ChatClient::new(server, config);
    let mut history: Vec<Turn> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let line = match read_input(&mut lines, tokio::signal::ctrl_c()).await? {
            Input::Line(line) => line,
            Input::Eof => break,
            Input::Interrupted => {
                println!();
                break;
            }
        };

        let prompt = line.trim();
        if prompt.is_empty() {
            continue;
        }

        if let Some(command) = prompt.strip_prefix('/') {
            let mut parts = command.split_whitespace();
            match parts.next() {
                Some("exit") | Some("quit") => break,
                Some("clear") => {
                    history.clear();
                    println!("Conversation cleared.");
                }
                Some("server") => {
                    let args: Vec<&str> = parts.collect();
                    match parse_server(&args, &client.server()) {
                        Ok(server) => {
                            println!("Next request goes to {}", server);
                            client.update_server(server);
                        }
                        Err(e) => println!("{}", e),
                    }
                }
                _ => println!("Unknown command: {}", prompt),
            }
            continue;
        }

        let window = select(&history, budget);
        debug!(
            "Sending {} of {} prior turn(s), ~{} tokens",
            window.len(),
            history.len(),
            window.estimated_tokens()
        );

        match stream_reply(&mut client, prompt, &window).await {
            Ok(Some((Outcome::Completed, reply))) => {
                history.push(Turn::user(prompt));
                history.push(Turn::assistant(reply));
            }
            Ok(Some((Outcome::Failed, _))) => {}
            Ok(None) => println!("[cancelled]"),
            Err(e) => eprintln!("Error: {}", e),
        }
    }

    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Line(String),
    Eof,
    Interrupted,
}

/// Wait for the next input line, or for `interrupt` to fire.
///
/// Once a reply has been streamed, Ctrl-C no longer terminates the process,
/// so the prompt has to listen for it too.
async fn read_input<R, F>(lines: &mut Lines<R>, interrupt: F) -> miette::Result<Input>
where
    R: AsyncBufRead + Unpin,
    F: Future,
{
    tokio::select! {
        line = lines.next_line() => {
            let line = line.map_err(|e| miette::miette!("Failed to read input: {}", e))?;
            Ok(line.map_or(Input::Eof, Input::Line))
        }
        _ = interrupt => Ok(Input::Interrupted),
    }
}

/// Parse `/server <host> <port>`, keeping the current scheme.
fn parse_server(args: &[&str], current: &ServerConfig) -> Result<ServerConfig, String> {
    let [host, port] = args else {
        return Err("Usage: /server <host> <port>".to_string());
    };
    let port: u16 = port
        .parse()
        .map_err(|_| format!("Invalid port: {}", port))?;

    Ok(ServerConfig::new(*host, port).with_scheme(current.scheme.clone()))
}
