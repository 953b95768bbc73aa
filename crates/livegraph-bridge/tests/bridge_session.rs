//! End-to-end tests: a session talking to a fake engine on loopback.
//!
//! The fake engine is a plain `TcpListener`; it reads newline-terminated
//! frames exactly as a real engine would.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use livegraph_bridge::application::{Command, Session};
use livegraph_bridge::domain::BridgeConfig;
use livegraph_bridge::infrastructure::{MemoryDocument, RecordingStatus};

const WAIT: Duration = Duration::from_secs(5);

async fn engine() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback");
    let port = listener.local_addr().expect("local addr").port();
    (listener, port)
}

fn config(port: u16) -> BridgeConfig {
    BridgeConfig {
        engine_port: port,
        retry_interval: Duration::from_millis(100),
        connect_timeout: Duration::from_millis(500),
        debounce_window: Duration::from_millis(50),
        ..BridgeConfig::default()
    }
}

async fn accept(listener: &TcpListener) -> BufReader<TcpStream> {
    let (stream, _) = timeout(WAIT, listener.accept())
        .await
        .expect("bridge connects in time")
        .expect("accept");
    BufReader::new(stream)
}

async fn next_graph(reader: &mut BufReader<TcpStream>) -> serde_json::Value {
    let mut line = String::new();
    timeout(WAIT, reader.read_line(&mut line))
        .await
        .expect("frame arrives in time")
        .expect("read frame");
    assert!(line.ends_with('\n'), "frames are newline-terminated");
    serde_json::from_str(line.trim_end()).expect("frame is graph JSON")
}

#[tokio::test]
async fn test_run_sends_graph_to_engine() {
    // Arrange
    let (listener, port) = engine().await;
    let document = Arc::new(MemoryDocument::new(
        "return c.top('noise').connect(c.top('level'))",
        std::env::temp_dir(),
    ));
    let status = Arc::new(RecordingStatus::new());
    let session = Session::new(config(port), document, status.clone());
    session.open();
    let mut engine_side = accept(&listener).await;
    assert!(session.wait_connected(WAIT).await);

    // Act
    let result = session.run().await;
    let graph = next_graph(&mut engine_side).await;

    // Assert
    assert_eq!(result, "Correct");
    assert_eq!(status.last_status().as_deref(), Some("Correct"));
    assert_eq!(graph["/level_top_0"]["inputs"][0], "/noise_top_1");
}

#[tokio::test]
async fn test_live_edits_are_debounced_into_one_frame() {
    // Arrange
    let (listener, port) = engine().await;
    let document = Arc::new(MemoryDocument::new("return c.top('noise')", std::env::temp_dir()));
    let status = Arc::new(RecordingStatus::new());
    let session = Session::new(config(port), document.clone(), status.clone());
    session.start();
    let mut engine_side = accept(&listener).await;
    assert!(session.wait_connected(WAIT).await);

    // Act: three quick edits, each followed by activity.
    for op in ["blur", "level", "ramp"] {
        document.set_text(format!("return c.top('{op}')"));
        session.on_editor_activity();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let graph = next_graph(&mut engine_side).await;
    // The status is written right after the send completes.
    for _ in 0..100 {
        if status.clear_count() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // Assert: only the final text was evaluated.
    assert!(graph.get("/ramp_top_0").is_some(), "{graph}");
    assert_eq!(status.clear_count(), 1);
}

#[tokio::test]
async fn test_run_without_engine_reports_correct() {
    // Arrange: a listener that is dropped immediately leaves the port closed.
    let (listener, port) = engine().await;
    drop(listener);
    let document = Arc::new(MemoryDocument::new("return c.chop('lfo')", std::env::temp_dir()));
    let session = Session::new(config(port), document, Arc::new(RecordingStatus::new()));

    // Act
    let result = session.execute(Command::Run).await;

    // Assert
    assert_eq!(result.as_deref(), Some("Correct"));
    assert!(!session.is_connected());
}

#[tokio::test]
async fn test_bridge_reconnects_after_engine_restart() {
    // Arrange
    let (listener, port) = engine().await;
    let document = Arc::new(MemoryDocument::new("return c.top('noise')", std::env::temp_dir()));
    let session = Session::new(config(port), document, Arc::new(RecordingStatus::new()));
    session.open();
    let first = accept(&listener).await;
    assert!(session.wait_connected(WAIT).await);

    // Act: the engine drops the connection, then accepts a new one.
    drop(first);
    let mut second = accept(&listener).await;
    assert!(session.wait_connected(WAIT).await);
    let result = session.run().await;

    // Assert
    assert_eq!(result, "Correct");
    let graph = next_graph(&mut second).await;
    assert!(graph.get("/noise_top_0").is_some(), "{graph}");
}

#[tokio::test]
async fn test_validation_failure_sends_nothing() {
    // Arrange
    let (listener, port) = engine().await;
    let document = Arc::new(MemoryDocument::new("return 'not a node'", std::env::temp_dir()));
    let session = Session::new(config(port), document, Arc::new(RecordingStatus::new()));
    session.open();
    let mut engine_side = accept(&listener).await;
    assert!(session.wait_connected(WAIT).await);

    // Act
    let result = session.run().await;

    // Assert
    assert_eq!(
        result,
        "Validation failed\nexpected a node or a list of nodes, got string"
    );
    let mut line = String::new();
    let nothing = timeout(Duration::from_millis(200), engine_side.read_line(&mut line)).await;
    assert!(nothing.is_err(), "no frame expected, got {line:?}");
}
