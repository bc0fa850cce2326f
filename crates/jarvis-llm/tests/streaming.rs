use std::time::Duration;

use jarvis_llm::{
    select, ChatClient, ClientConfig, ContextWindow, Outcome, ServerConfig, StreamEvent,
    StreamHandle, Turn, TRANSPORT_ERROR_MESSAGE,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

const SSE_HEAD: &str =
    "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n";

/// What the fake server sends back after reading the request.
struct Reply {
    head: String,
    chunks: Vec<Vec<u8>>,
    /// Keep the connection open this long after the last chunk.
    hold: Option<Duration>,
}

impl Reply {
    fn sse(chunks: &[&str]) -> Self {
        Self {
            head: SSE_HEAD.to_string(),
            chunks: chunks.iter().map(|c| c.as_bytes().to_vec()).collect(),
            hold: None,
        }
    }

    fn holding(mut self, hold: Duration) -> Self {
        self.hold = Some(hold);
        self
    }
}

fn frame(content: &str) -> String {
    format!(
        "data: {}\n",
        serde_json::json!({ "choices": [{ "delta": { "content": content } }] })
    )
}

fn delta(text: &str) -> StreamEvent {
    StreamEvent::Delta(text.to_string())
}

fn test_config() -> ClientConfig {
    ClientConfig::builder()
        .model("test-model")
        .idle_timeout(Duration::from_secs(5))
        .build()
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];

    loop {
        let n = socket.read(&mut buf).await.expect("read request");
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);

        if let Some(end) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&data[..end]).to_lowercase();
            let length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if data.len() >= end + 4 + length {
                break;
            }
        }
    }

    String::from_utf8(data).expect("request is utf-8")
}

/// Serve a single connection, returning the raw request it received.
async fn spawn_server(reply: Reply) -> (ServerConfig, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind local test server");
    let port = listener.local_addr().expect("local addr").port();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept connection");
        let request = read_request(&mut socket).await;

        socket
            .write_all(reply.head.as_bytes())
            .await
            .expect("write head");
        for chunk in reply.chunks {
            socket.write_all(&chunk).await.expect("write chunk");
            socket.flush().await.expect("flush chunk");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        if let Some(hold) = reply.hold {
            tokio::time::sleep(hold).await;
        }

        request
    });

    (ServerConfig::new("127.0.0.1", port), server)
}

async fn collect(mut handle: StreamHandle) -> Vec<StreamEvent> {
    let drain = async {
        let mut events = Vec::new();
        while let Some(event) = handle.recv().await {
            events.push(event);
        }
        events
    };
    tokio::time::timeout(Duration::from_secs(10), drain)
        .await
        .expect("session finishes")
}

#[tokio::test]
async fn test_streams_frames_split_across_chunks() {
    let (server_config, server) = spawn_server(Reply::sse(&[
        r#"data: {"choices":[{"delta":{"content":"Hel"#,
        "lo\"}}]}\n",
        "data: [DONE]\n",
    ]))
    .await;

    let history = vec![Turn::user("hi"), Turn::assistant("hello!")];
    let window = select(&history, 100);

    let mut client = ChatClient::new(server_config, test_config());
    let handle = client.submit("say hello", &window).expect("submit");

    let events = collect(handle).await;
    assert_eq!(
        events,
        vec![delta("Hello"), StreamEvent::Finished(Outcome::Completed)]
    );

    let request = server.await.expect("server task completes");
    assert!(request.starts_with("POST /v1/chat/completions HTTP/1.1\r\n"));
    assert!(request
        .to_lowercase()
        .contains("content-type: application/json"));

    let body = request.split("\r\n\r\n").nth(1).expect("request body");
    let body: serde_json::Value = serde_json::from_str(body).expect("json body");
    assert_eq!(
        body,
        serde_json::json!({
            "model": "test-model",
            "messages": [
                { "role": "user", "content": "hi" },
                { "role": "assistant", "content": "hello!" },
                { "role": "user", "content": "say hello" },
            ],
            "stream": true,
        })
    );
}

#[tokio::test]
async fn test_skips_malformed_lines() {
    let garbage_then_frame = format!("data: {{garbage\n{}", frame("X"));
    let (server_config, _server) =
        spawn_server(Reply::sse(&[garbage_then_frame.as_str(), "data: [DONE]\n"])).await;

    let mut client = ChatClient::new(server_config, test_config());
    let handle = client
        .submit("hi", &ContextWindow::empty())
        .expect("submit");

    assert_eq!(
        collect(handle).await,
        vec![delta("X"), StreamEvent::Finished(Outcome::Completed)]
    );
}

#[tokio::test]
async fn test_close_without_done_is_success() {
    let first = frame("A");
    let (server_config, _server) = spawn_server(Reply::sse(&[first.as_str()])).await;

    let mut client = ChatClient::new(server_config, test_config());
    let handle = client
        .submit("hi", &ContextWindow::empty())
        .expect("submit");

    assert_eq!(
        collect(handle).await,
        vec![delta("A"), StreamEvent::Finished(Outcome::Completed)]
    );
}

#[tokio::test]
async fn test_error_status_fails_session() {
    let (server_config, _server) = spawn_server(Reply {
        head: "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 4\r\nConnection: close\r\n\r\noops"
            .to_string(),
        chunks: Vec::new(),
        hold: None,
    })
    .await;

    let mut client = ChatClient::new(server_config, test_config());
    let handle = client
        .submit("hi", &ContextWindow::empty())
        .expect("submit");

    assert_eq!(
        collect(handle).await,
        vec![
            delta(TRANSPORT_ERROR_MESSAGE),
            StreamEvent::Finished(Outcome::Failed)
        ]
    );
}

#[tokio::test]
async fn test_truncated_body_fails_after_delta() {
    // Promise more bytes than are sent, then hang up mid-frame.
    let first = frame("A");
    let (server_config, _server) = spawn_server(Reply {
        head: "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nContent-Length: 4096\r\n\r\n"
            .to_string(),
        chunks: vec![
            first.into_bytes(),
            br#"data: {"choices":[{"delta":{"content":"B"#.to_vec(),
        ],
        hold: None,
    })
    .await;

    let mut client = ChatClient::new(server_config, test_config());
    let handle = client
        .submit("hi", &ContextWindow::empty())
        .expect("submit");

    assert_eq!(
        collect(handle).await,
        vec![
            delta("A"),
            delta(TRANSPORT_ERROR_MESSAGE),
            StreamEvent::Finished(Outcome::Failed)
        ]
    );
}

#[tokio::test]
async fn test_connection_refused_fails_session() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind local test server");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);

    let mut client = ChatClient::new(ServerConfig::new("127.0.0.1", port), test_config());
    let handle = client
        .submit("hi", &ContextWindow::empty())
        .expect("submit");

    assert_eq!(
        collect(handle).await,
        vec![
            delta(TRANSPORT_ERROR_MESSAGE),
            StreamEvent::Finished(Outcome::Failed)
        ]
    );
}

#[tokio::test]
async fn test_idle_timeout_fails_session() {
    let first = frame("slow");
    let (server_config, server) =
        spawn_server(Reply::sse(&[first.as_str()]).holding(Duration::from_secs(5))).await;

    let config = ClientConfig::builder()
        .idle_timeout(Duration::from_millis(300))
        .error_message("timed out")
        .build();
    let mut client = ChatClient::new(server_config, config);
    let handle = client
        .submit("hi", &ContextWindow::empty())
        .expect("submit");

    assert_eq!(
        collect(handle).await,
        vec![
            delta("slow"),
            delta("timed out"),
            StreamEvent::Finished(Outcome::Failed)
        ]
    );
    server.abort();
}

#[tokio::test]
async fn test_request_deadline_fails_session() {
    // Every frame arrives well inside the idle timeout.
    let frames: Vec<String> = (0..40).map(|_| frame("a")).collect();
    let chunks: Vec<&str> = frames.iter().map(String::as_str).collect();
    let (server_config, server) = spawn_server(Reply::sse(&chunks)).await;

    let config = ClientConfig::builder()
        .idle_timeout(Duration::from_secs(5))
        .request_timeout(Duration::from_millis(200))
        .error_message("deadline")
        .build();
    let mut client = ChatClient::new(server_config, config);
    let handle = client
        .submit("hi", &ContextWindow::empty())
        .expect("submit");

    let events = collect(handle).await;
    assert!(events.len() >= 3, "expected deltas before the deadline");
    assert!(events.len() < 42, "deadline fired before the stream ended");
    assert_eq!(events[0], delta("a"));
    assert_eq!(
        events[events.len() - 2..],
        [delta("deadline"), StreamEvent::Finished(Outcome::Failed)]
    );
    server.abort();
}

#[tokio::test]
async fn test_zero_idle_timeout_disables_idle_limit() {
    let first = frame("A");
    let (server_config, _server) =
        spawn_server(Reply::sse(&[first.as_str(), "data: [DONE]\n"])).await;

    let config = ClientConfig::builder()
        .idle_timeout(Duration::ZERO)
        .build();
    let mut client = ChatClient::new(server_config, config);
    let handle = client
        .submit("hi", &ContextWindow::empty())
        .expect("submit");

    assert_eq!(
        collect(handle).await,
        vec![delta("A"), StreamEvent::Finished(Outcome::Completed)]
    );
}

#[tokio::test]
async fn test_new_submit_supersedes_active_session() {
    let first_frame = frame("first");
    let (first_server, first) =
        spawn_server(Reply::sse(&[first_frame.as_str()]).holding(Duration::from_secs(5))).await;
    let second_frame = frame("second");
    let (second_server, _second) =
        spawn_server(Reply::sse(&[second_frame.as_str(), "data: [DONE]\n"])).await;

    let mut client = ChatClient::new(first_server, test_config());
    let mut first_handle = client
        .submit("one", &ContextWindow::empty())
        .expect("first submit");
    assert_eq!(first_handle.recv().await, Some(delta("first")));
    assert!(first_handle.is_current());

    // Only affects the next submit.
    client.update_server(second_server);
    let second_handle = client
        .submit("two", &ContextWindow::empty())
        .expect("second submit");

    assert!(!first_handle.is_current());
    assert_eq!(first_handle.recv().await, None);

    assert_eq!(
        collect(second_handle).await,
        vec![delta("second"), StreamEvent::Finished(Outcome::Completed)]
    );
    assert_eq!(first_handle.recv().await, None);
    first.abort();
}

#[tokio::test]
async fn test_cancel_silences_handle() {
    let first = frame("partial");
    let (server_config, server) =
        spawn_server(Reply::sse(&[first.as_str()]).holding(Duration::from_secs(5))).await;

    let mut client = ChatClient::new(server_config, test_config());
    let mut handle = client
        .submit("hi", &ContextWindow::empty())
        .expect("submit");
    assert_eq!(handle.recv().await, Some(delta("partial")));

    client.cancel();
    assert_eq!(handle.recv().await, None);
    server.abort();
}

#[tokio::test]
async fn test_for_each_delivers_callbacks_in_order() {
    let one = frame("one ");
    let two = frame("two");
    let ignored = frame("ignored");
    let (server_config, _server) = spawn_server(Reply::sse(&[
        one.as_str(),
        two.as_str(),
        "data: [DONE]\n",
        ignored.as_str(),
    ]))
    .await;

    let mut client = ChatClient::new(server_config, test_config());
    let handle = client
        .submit("count", &ContextWindow::empty())
        .expect("submit");

    let mut deltas = Vec::new();
    let mut terminals = Vec::new();
    let outcome = handle
        .for_each(|text| deltas.push(text.to_string()), |ok| terminals.push(ok))
        .await;

    assert_eq!(outcome, Some(Outcome::Completed));
    assert_eq!(deltas, vec!["one ", "one two"]);
    assert_eq!(terminals, vec![true]);
}

#[tokio::test]
async fn test_models_are_listed() {
    let body = r#"{"object":"list","data":[{"id":"qwen2.5-coder-32b-instruct","object":"model"},{"id":"llama-3.1-8b","object":"model"}]}"#;
    let (server_config, server) = spawn_server(Reply {
        head: format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        ),
        chunks: Vec::new(),
        hold: None,
    })
    .await;

    let client = ChatClient::new(server_config, test_config());
    let models = client.list_models().await.expect("list models");
    assert_eq!(models, vec!["qwen2.5-coder-32b-instruct", "llama-3.1-8b"]);

    let request = server.await.expect("server task completes");
    assert!(request.starts_with("GET /v1/models HTTP/1.1\r\n"));
}
