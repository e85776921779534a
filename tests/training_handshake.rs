//! Sender/receiver training handshake over a loopback pair

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use edgecast::protocol::meta;
use edgecast::{Error, ErrorKind, LoopbackTransport, NodeType, OffloadEvent};

use common::{metadata, next_event, node, raw_session, training_config};

const TABLE: &[(&str, &str)] = &[
    ("cfg", "@SENDER@/model.json"),
    ("data", "@SENDER@/train.bin"),
    ("pipe", "@RECEIVER@/run.pipeline"),
];

#[tokio::test]
async fn test_end_to_end_handshake() {
    let dir = TempDir::new().unwrap();
    let sender_root = dir.path().join("sender");
    let receiver_root = dir.path().join("receiver");
    std::fs::create_dir_all(&sender_root).unwrap();
    std::fs::write(sender_root.join("model.json"), b"{\"layers\":3}").unwrap();
    std::fs::write(sender_root.join("train.bin"), b"samples").unwrap();

    let (left, right) = LoopbackTransport::pair();
    let sender = node(
        training_config(NodeType::Sender, &sender_root, TABLE, 5_000),
        left,
    )
    .await;
    let mut receiver = node(
        training_config(NodeType::Receiver, &receiver_root, TABLE, 5_000),
        right,
    )
    .await;

    sender.coordinator.start().await.unwrap();
    receiver.coordinator.start().await.unwrap();

    // Transferred files land under the receiver's writable root, named
    // by their table templates.
    assert_eq!(
        std::fs::read(receiver_root.join("model.json")).unwrap(),
        b"{\"layers\":3}"
    );
    assert_eq!(
        std::fs::read(receiver_root.join("train.bin")).unwrap(),
        b"samples"
    );

    // Both sides launched their pipeline, each resolved against its
    // own writable root.
    let sender_log = sender.runtime.log();
    assert_eq!(sender_log.started, 1);
    assert!(sender_log.constructed[0].contains(&sender_root.display().to_string()));
    assert!(!sender_log.constructed[0].contains('@'));

    let receiver_log = receiver.runtime.log();
    assert_eq!(receiver_log.started, 1);
    assert!(receiver_log.constructed[0].contains(&receiver_root.display().to_string()));
    assert!(!receiver_log.constructed[0].contains('@'));

    // The dispatch path raised one event per transfer, in order.
    match next_event(&mut receiver.events).await {
        OffloadEvent::ModelRegistered { key, .. } => assert_eq!(key, "cfg"),
        other => panic!("unexpected event: {:?}", other),
    }
    match next_event(&mut receiver.events).await {
        OffloadEvent::ModelRegistered { key, .. } => assert_eq!(key, "data"),
        other => panic!("unexpected event: {:?}", other),
    }
    match next_event(&mut receiver.events).await {
        OffloadEvent::PipelineRegistered { key } => assert_eq!(key, "pipe"),
        other => panic!("unexpected event: {:?}", other),
    }

    // stop halts the pipelines without tearing the session down.
    sender.coordinator.stop().await.unwrap();
    receiver.coordinator.stop().await.unwrap();
    assert_eq!(sender.runtime.log().stopped, 1);
    assert_eq!(receiver.runtime.log().stopped, 1);

    sender.coordinator.destroy().await.unwrap();
    receiver.coordinator.destroy().await.unwrap();
}

#[tokio::test]
async fn test_sentinel_first_blocks_launch() {
    let dir = TempDir::new().unwrap();
    let receiver_root = dir.path().join("receiver");

    let (left, right) = LoopbackTransport::pair();
    let (session, _wire) = raw_session(left).await;
    let receiver = node(
        training_config(NodeType::Receiver, &receiver_root, TABLE, 300),
        right,
    )
    .await;

    // Sentinel arrives before any data transfer.
    session
        .send(
            metadata(&[
                (meta::SERVICE_TYPE, "pipeline_raw"),
                (meta::SERVICE_KEY, "pipe"),
            ]),
            b"datasrc location=@RECEIVER@/train.bin ! trainer".to_vec(),
        )
        .await
        .unwrap();
    // A data item after the sentinel is dropped, not persisted.
    session
        .send(
            metadata(&[
                (meta::SERVICE_TYPE, "model_raw"),
                (meta::SERVICE_KEY, "cfg"),
            ]),
            b"too-late".to_vec(),
        )
        .await
        .unwrap();

    let result = receiver.coordinator.start().await;
    match result {
        Err(Error::CompletionTimeout { .. }) => {}
        other => panic!("expected completion timeout, got {:?}", other.err()),
    }
    assert_eq!(receiver.runtime.log().started, 0);
    assert!(!receiver_root.join("model.json").exists());
}

#[tokio::test]
async fn test_receiver_times_out_within_budget() {
    let dir = TempDir::new().unwrap();
    let (left, right) = LoopbackTransport::pair();
    let (_session, _wire) = raw_session(left).await;
    let receiver = node(
        training_config(NodeType::Receiver, &dir.path().join("receiver"), TABLE, 200),
        right,
    )
    .await;

    let started = Instant::now();
    let err = receiver.coordinator.start().await.err().expect("must time out");
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert!(started.elapsed() < Duration::from_secs(5), "must not hang");
    assert_eq!(receiver.runtime.log().constructed.len(), 0);
}

#[tokio::test]
async fn test_sender_aborts_on_missing_file() {
    let dir = TempDir::new().unwrap();
    let sender_root = dir.path().join("sender");
    std::fs::create_dir_all(&sender_root).unwrap();
    // model.json exists, train.bin does not.
    std::fs::write(sender_root.join("model.json"), b"{}").unwrap();

    let (left, _right) = LoopbackTransport::pair();
    let sender = node(
        training_config(NodeType::Sender, &sender_root, TABLE, 5_000),
        left,
    )
    .await;

    let err = sender.coordinator.start().await.err().expect("must fail");
    assert_eq!(err.kind(), ErrorKind::Io);
    // The sender pipeline must not launch after a failed sweep.
    assert_eq!(sender.runtime.log().constructed.len(), 0);
}

#[tokio::test]
async fn test_sender_rejects_entry_without_placeholder() {
    let dir = TempDir::new().unwrap();
    let sender_root = dir.path().join("sender");
    std::fs::create_dir_all(&sender_root).unwrap();

    let table = &[
        ("cfg", "/literal/model.json"),
        ("pipe", "@RECEIVER@/run.pipeline"),
    ];
    let (left, _right) = LoopbackTransport::pair();
    let sender = node(
        training_config(NodeType::Sender, &sender_root, table, 5_000),
        left,
    )
    .await;

    let err = sender.coordinator.start().await.err().expect("must fail");
    assert_eq!(err.kind(), ErrorKind::InvalidParameter);
}

#[tokio::test]
async fn test_start_is_exclusive_while_in_flight() {
    let dir = TempDir::new().unwrap();
    let (left, right) = LoopbackTransport::pair();
    let (_session, _wire) = raw_session(left).await;
    let receiver = node(
        training_config(NodeType::Receiver, &dir.path().join("receiver"), TABLE, 300),
        right,
    )
    .await;
    let coordinator = Arc::new(receiver.coordinator);

    // First start blocks in the completion wait.
    let first = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.start().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    // A second start while the first is in flight is rejected without
    // running the handshake again.
    let second = coordinator.start().await;
    assert!(matches!(second, Err(Error::Internal(_))));

    // The failed wait reverts the state, so start may be retried.
    let first = first.await.unwrap();
    assert!(matches!(first, Err(Error::CompletionTimeout { .. })));
    let retry = coordinator.start().await;
    assert!(matches!(retry, Err(Error::CompletionTimeout { .. })));
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let dir = TempDir::new().unwrap();
    let sender_root = dir.path().join("sender");
    std::fs::create_dir_all(&sender_root).unwrap();
    std::fs::write(sender_root.join("model.json"), b"{}").unwrap();
    std::fs::write(sender_root.join("train.bin"), b"s").unwrap();

    let (left, right) = LoopbackTransport::pair();
    let sender = node(
        training_config(NodeType::Sender, &sender_root, TABLE, 5_000),
        left,
    )
    .await;
    let _receiver_side = raw_session(right).await;

    sender.coordinator.start().await.unwrap();
    assert!(sender.coordinator.start().await.is_err());
}
