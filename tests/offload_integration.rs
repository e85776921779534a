//! Plain-mode offloading between two in-process nodes

mod common;

use std::time::Duration;

use tempfile::TempDir;

use edgecast::protocol::meta;
use edgecast::{Error, LoopbackTransport, OffloadEvent, TransportMessage};

use common::{metadata, next_event, node, plain_config, raw_session};

#[tokio::test]
async fn test_request_delivers_descriptor_metadata() {
    let dir = TempDir::new().unwrap();
    let (left, right) = LoopbackTransport::pair();
    let sender = node(plain_config(&dir.path().join("a")), left).await;
    let (_session, mut wire) = raw_session(right).await;

    sender
        .coordinator
        .set_service(
            "classifier",
            r#"{
                "service-type": "model_raw",
                "service-key": "classifier",
                "name": "mobilenet.tflite",
                "description": "image classifier",
                "activate": "true"
            }"#,
        )
        .unwrap();
    sender
        .coordinator
        .request("classifier", b"weights".to_vec())
        .await
        .unwrap();

    let message = wire.recv().await.unwrap();
    assert_eq!(message.meta(meta::SERVICE_TYPE), Some("model_raw"));
    assert_eq!(message.meta(meta::SERVICE_KEY), Some("classifier"));
    assert_eq!(message.meta(meta::NAME), Some("mobilenet.tflite"));
    assert_eq!(message.meta(meta::DESCRIPTION), Some("image classifier"));
    assert_eq!(message.meta(meta::ACTIVATE), Some("true"));
    assert_eq!(message.payload, b"weights");
    assert_eq!(
        message.meta(meta::PAYLOAD_DIGEST),
        Some(edgecast::payload_digest(b"weights").as_str())
    );
}

#[tokio::test]
async fn test_unknown_key_fails_and_sends_nothing() {
    let dir = TempDir::new().unwrap();
    let (left, right) = LoopbackTransport::pair();
    let sender = node(plain_config(&dir.path().join("a")), left).await;
    let (_session, mut wire) = raw_session(right).await;

    let result = sender.coordinator.request("ghost", b"x".to_vec()).await;
    assert!(matches!(result, Err(Error::ServiceNotFound { .. })));

    let arrived = tokio::time::timeout(Duration::from_millis(100), wire.recv()).await;
    assert!(arrived.is_err(), "no message may be sent for an unknown key");
}

#[tokio::test]
async fn test_registry_overwrite_uses_latest_descriptor() {
    let dir = TempDir::new().unwrap();
    let (left, right) = LoopbackTransport::pair();
    let sender = node(plain_config(&dir.path().join("a")), left).await;
    let (_session, mut wire) = raw_session(right).await;

    sender
        .coordinator
        .set_service("k", r#"{"service-type":"model_raw","service-key":"k","name":"first"}"#)
        .unwrap();
    sender
        .coordinator
        .set_service("k", r#"{"service-type":"reply","service-key":"k"}"#)
        .unwrap();
    sender.coordinator.request("k", b"x".to_vec()).await.unwrap();

    let message = wire.recv().await.unwrap();
    assert_eq!(message.meta(meta::SERVICE_TYPE), Some("reply"));
    assert_eq!(message.meta(meta::NAME), None);
}

#[tokio::test]
async fn test_model_install_persists_and_registers() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("b");
    let (left, right) = LoopbackTransport::pair();
    let (session, _wire) = raw_session(left).await;
    let mut receiver = node(plain_config(&root), right).await;

    session
        .send(
            metadata(&[
                (meta::SERVICE_TYPE, "model_raw"),
                (meta::SERVICE_KEY, "classifier"),
                (meta::NAME, "mobilenet.tflite"),
                (meta::ACTIVATE, "true"),
            ]),
            b"weights".to_vec(),
        )
        .await
        .unwrap();

    match next_event(&mut receiver.events).await {
        OffloadEvent::ModelRegistered { key, version } => {
            assert_eq!(key, "classifier");
            assert_eq!(version, "1");
        }
        other => panic!("unexpected event: {:?}", other),
    }

    let on_disk = std::fs::read(root.join("mobilenet.tflite")).unwrap();
    assert_eq!(on_disk, b"weights");
    assert_eq!(
        receiver.installer.active_model_path("classifier"),
        Some(root.join("mobilenet.tflite"))
    );
}

#[tokio::test]
async fn test_model_uri_is_resolved_before_install() {
    let dir = TempDir::new().unwrap();
    let (left, right) = LoopbackTransport::pair();
    let (session, _wire) = raw_session(left).await;
    let mut receiver = node(plain_config(&dir.path().join("b")), right).await;
    receiver
        .resolver
        .insert("http://models.local/classifier", b"fetched-weights".to_vec());

    session
        .send(
            metadata(&[
                (meta::SERVICE_TYPE, "model_uri"),
                (meta::SERVICE_KEY, "classifier"),
            ]),
            b"http://models.local/classifier".to_vec(),
        )
        .await
        .unwrap();

    match next_event(&mut receiver.events).await {
        OffloadEvent::ModelRegistered { key, .. } => assert_eq!(key, "classifier"),
        other => panic!("unexpected event: {:?}", other),
    }
    let on_disk = std::fs::read(dir.path().join("b").join("classifier")).unwrap();
    assert_eq!(on_disk, b"fetched-weights");
}

#[tokio::test]
async fn test_pipeline_install() {
    let dir = TempDir::new().unwrap();
    let (left, right) = LoopbackTransport::pair();
    let (session, _wire) = raw_session(left).await;
    let mut receiver = node(plain_config(&dir.path().join("b")), right).await;

    session
        .send(
            metadata(&[
                (meta::SERVICE_TYPE, "pipeline_raw"),
                (meta::SERVICE_KEY, "run"),
            ]),
            b"src ! sink".to_vec(),
        )
        .await
        .unwrap();

    match next_event(&mut receiver.events).await {
        OffloadEvent::PipelineRegistered { key } => assert_eq!(key, "run"),
        other => panic!("unexpected event: {:?}", other),
    }
    assert_eq!(receiver.installer.pipeline("run").as_deref(), Some("src ! sink"));
}

#[tokio::test]
async fn test_model_name_cannot_escape_writable_root() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("b");
    let (left, right) = LoopbackTransport::pair();
    let (session, _wire) = raw_session(left).await;
    let mut receiver = node(plain_config(&root), right).await;

    // Relative traversal in the name metadata must stay inside the root.
    session
        .send(
            metadata(&[
                (meta::SERVICE_TYPE, "model_raw"),
                (meta::SERVICE_KEY, "classifier"),
                (meta::NAME, "../outside.bin"),
            ]),
            b"escape".to_vec(),
        )
        .await
        .unwrap();
    match next_event(&mut receiver.events).await {
        OffloadEvent::ModelRegistered { key, .. } => assert_eq!(key, "classifier"),
        other => panic!("unexpected event: {:?}", other),
    }
    assert!(!dir.path().join("outside.bin").exists());
    assert_eq!(std::fs::read(root.join("outside.bin")).unwrap(), b"escape");

    // An absolute name must not replace the root either.
    let elsewhere = dir.path().join("anywhere.bin");
    let absolute_name = elsewhere.display().to_string();
    session
        .send(
            metadata(&[
                (meta::SERVICE_TYPE, "model_raw"),
                (meta::SERVICE_KEY, "classifier"),
                (meta::NAME, absolute_name.as_str()),
            ]),
            b"abs".to_vec(),
        )
        .await
        .unwrap();
    match next_event(&mut receiver.events).await {
        OffloadEvent::ModelRegistered { .. } => {}
        other => panic!("unexpected event: {:?}", other),
    }
    assert!(!elsewhere.exists());
    assert_eq!(std::fs::read(root.join("anywhere.bin")).unwrap(), b"abs");

    // A name with no usable component is refused outright.
    session
        .send(
            metadata(&[
                (meta::SERVICE_TYPE, "model_raw"),
                (meta::SERVICE_KEY, "classifier"),
                (meta::NAME, ".."),
            ]),
            b"dotdot".to_vec(),
        )
        .await
        .unwrap();
    match next_event(&mut receiver.events).await {
        OffloadEvent::DispatchFailed { error, .. } => {
            assert!(error.contains("file name"), "error was: {}", error);
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_message_does_not_poison_dispatch() {
    let dir = TempDir::new().unwrap();
    let (left, right) = LoopbackTransport::pair();
    let (session, _wire) = raw_session(left).await;
    let mut receiver = node(plain_config(&dir.path().join("b")), right).await;

    // Unknown service type is logged and ignored without an event.
    session
        .send(
            metadata(&[(meta::SERVICE_TYPE, "hologram"), (meta::SERVICE_KEY, "k")]),
            b"???".to_vec(),
        )
        .await
        .unwrap();
    // Missing service type fails dispatch and surfaces as an event.
    session
        .send(metadata(&[(meta::SERVICE_KEY, "k")]), b"???".to_vec())
        .await
        .unwrap();
    // A well-formed message afterwards must still be processed.
    session
        .send(
            metadata(&[(meta::SERVICE_TYPE, "reply")]),
            b"still-works".to_vec(),
        )
        .await
        .unwrap();

    match next_event(&mut receiver.events).await {
        OffloadEvent::DispatchFailed { .. } => {}
        other => panic!("unexpected event: {:?}", other),
    }
    match next_event(&mut receiver.events).await {
        OffloadEvent::Reply { payload } => assert_eq!(payload, b"still-works"),
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn test_digest_mismatch_is_rejected() {
    let dir = TempDir::new().unwrap();
    let (left, right) = LoopbackTransport::pair();
    let (session, _wire) = raw_session(left).await;
    let mut receiver = node(plain_config(&dir.path().join("b")), right).await;

    session
        .send(
            metadata(&[
                (meta::SERVICE_TYPE, "reply"),
                (meta::PAYLOAD_DIGEST, "deadbeef"),
            ]),
            b"tampered".to_vec(),
        )
        .await
        .unwrap();

    match next_event(&mut receiver.events).await {
        OffloadEvent::DispatchFailed { error, .. } => {
            assert!(error.contains("digest"), "error was: {}", error);
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn test_destroy_closes_the_wire() {
    let dir = TempDir::new().unwrap();
    let (left, right) = LoopbackTransport::pair();
    let sender = node(plain_config(&dir.path().join("a")), left).await;
    let (_session, mut wire) = raw_session(right).await;

    sender.coordinator.destroy().await.unwrap();
    assert!(wire.recv().await.is_none());

    let result = sender.coordinator.request("k", Vec::new()).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_message_envelope_survives_json() {
    let message = TransportMessage::new(
        metadata(&[(meta::SERVICE_TYPE, "reply")]),
        vec![0, 159, 146, 150],
    );
    let json = message.to_json().unwrap();
    let parsed = TransportMessage::from_json(&json).unwrap();
    assert_eq!(parsed.id, message.id);
    assert_eq!(parsed.payload, message.payload);
    assert_eq!(parsed.meta(meta::SERVICE_TYPE), Some("reply"));
}
