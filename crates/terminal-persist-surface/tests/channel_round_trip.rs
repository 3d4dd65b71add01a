//! Serialization round trips between the host channel and a surface.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use terminal_persist_core::{Error, HostMessage, SerializationPayload, SurfaceMessage, SurfaceSettings};
use terminal_persist_storage::SessionCodec;
use terminal_persist_surface::{
    CacheManager, ScrollbackBuffer, SerializationChannel, SurfaceEndpoint, SurfaceLink,
};

#[tokio::test(start_paused = true)]
async fn timed_out_request_fails_and_late_response_is_dropped() {
    let channel = Arc::new(SerializationChannel::default());
    let (tx, mut surface_rx) = mpsc::unbounded_channel();
    channel.attach(tx);

    let started = tokio::time::Instant::now();
    let err = channel
        .request_serialization(vec!["t1".into()], &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::SurfaceCommunicationFailed(_)));
    assert!(started.elapsed() >= Duration::from_secs(10));
    assert!(started.elapsed() < Duration::from_secs(11));
    assert!(!channel.has_pending());

    // The surface answers far too late
    let request_id = match surface_rx.recv().await.unwrap() {
        SurfaceMessage::RequestSerialization { request_id, .. } => request_id,
        other => panic!("unexpected message: {other:?}"),
    };
    let resolved = channel.handle_response(HostMessage::SerializationResponse {
        request_id,
        payload: SerializationPayload::new(),
    });
    assert!(!resolved);
    assert!(!channel.has_pending());

    // The channel is usable again; the stale response did not leak into it
    let err = channel
        .request_serialization(vec!["t1".into()], &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SurfaceCommunicationFailed(_)));
}

#[tokio::test]
async fn linked_surface_serves_requests() {
    let cache = Arc::new(CacheManager::new(SurfaceSettings::default(), SessionCodec::gzip()));
    let buffer = Arc::new(ScrollbackBuffer::new());
    buffer.append(&"x".repeat(1500));
    cache.register("t1".into(), buffer).await;

    let channel = Arc::new(SerializationChannel::default());
    let link = SurfaceLink::connect(Arc::clone(&channel), SurfaceEndpoint::new(cache));
    assert!(channel.is_attached());

    let payload = channel
        .request_serialization(vec!["t1".into()], &CancellationToken::new())
        .await
        .unwrap();
    let entry = payload.get(&"t1".into()).unwrap();
    assert!(entry.metadata.compressed);
    assert_eq!(
        SessionCodec::gzip().decode_terminal(entry).unwrap(),
        "x".repeat(1500)
    );

    link.disconnect().await;
    assert!(!channel.is_attached());
}
