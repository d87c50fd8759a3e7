use random_photo::events::{Direction, DisplayCommand};
use random_photo::tasks::{control, watch};
use std::fs;
use std::time::Duration;
use tempfile::tempdir;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

async fn recv(rx: &mut mpsc::Receiver<DisplayCommand>) -> DisplayCommand {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timeout waiting for command")
        .expect("command channel closed")
}

async fn connect(path: &std::path::Path) -> UnixStream {
    for _ in 0..50 {
        if let Ok(stream) = UnixStream::connect(path).await {
            return stream;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("control socket never came up at {}", path.display());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn control_socket_forwards_known_commands() {
    let tmp = tempdir().unwrap();
    let socket = tmp.path().join("run/control.sock");
    let (tx, mut rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(control::run(socket.clone(), tx, cancel.clone()));

    let mut stream = connect(&socket).await;
    stream
        .write_all(b"{\"command\":\"next\"}\n{\"command\":\"reboot\"}\n\n{\"command\":\"pause\"}\n")
        .await
        .unwrap();
    stream.shutdown().await.unwrap();

    assert_eq!(recv(&mut rx).await, DisplayCommand::Advance(Direction::Next));
    assert_eq!(recv(&mut rx).await, DisplayCommand::Pause);

    // One request without a trailing newline, as a button daemon sends it.
    let mut stream = connect(&socket).await;
    stream.write_all(br#"{"command":"toggle-state"}"#).await.unwrap();
    drop(stream);
    assert_eq!(recv(&mut rx).await, DisplayCommand::Toggle);

    cancel.cancel();
    handle.await.unwrap().unwrap();
    assert!(!socket.exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stale_socket_file_is_replaced() {
    let tmp = tempdir().unwrap();
    let socket = tmp.path().join("control.sock");
    fs::write(&socket, b"leftover").unwrap();

    let (tx, mut rx) = mpsc::channel(4);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(control::run(socket.clone(), tx, cancel.clone()));

    let mut stream = connect(&socket).await;
    stream.write_all(b"{\"command\":\"refresh\"}\n").await.unwrap();
    assert_eq!(recv(&mut rx).await, DisplayCommand::Refresh);

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn directory_changes_collapse_into_one_refresh() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().to_path_buf();
    let (tx, mut rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(watch::run(
        root.clone(),
        false,
        Duration::from_millis(300),
        tx,
        cancel.clone(),
    ));

    // Give the watcher time to register before touching the tree.
    tokio::time::sleep(Duration::from_millis(200)).await;
    for name in ["one.jpg", "two.jpg", "three.jpg"] {
        fs::write(root.join(name), b"x").unwrap();
    }

    assert_eq!(recv(&mut rx).await, DisplayCommand::Refresh);
    let extra = tokio::time::timeout(Duration::from_millis(800), rx.recv()).await;
    assert!(extra.is_err(), "expected a single refresh, got {extra:?}");

    cancel.cancel();
    handle.await.unwrap().unwrap();
}
