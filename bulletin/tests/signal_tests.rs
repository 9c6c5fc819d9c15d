#![cfg(unix)]
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::time::Duration;

use bulletin::controller::{SHUTDOWN_BROADCAST, shutdown};
use bulletin_common::Signal;
use pretty_assertions::assert_eq;

#[tokio::test]
async fn terminate_signal_broadcasts_shutdown() {
    let mut receiver = SHUTDOWN_BROADCAST.subscribe();
    let waiter = tokio::spawn(shutdown());

    // Let the handler install before the signal is raised
    tokio::time::sleep(Duration::from_millis(200)).await;
    let status = std::process::Command::new("kill")
        .args(["-TERM", &std::process::id().to_string()])
        .status()
        .unwrap();
    assert!(status.success());

    waiter.await.unwrap().unwrap();
    assert_eq!(receiver.recv().await.unwrap(), Signal::Shutdown);
}
