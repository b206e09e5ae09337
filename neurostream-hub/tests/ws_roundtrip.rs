//! End-to-end WebSocket exercise against a hub backed by the synthetic board.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use neurostream_hub::{server, BroadcastEvent, HubConfig, StreamHub, SyntheticConnector};
use neurostream_store::EventStore;

type WsClient = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn start_server() -> (String, neurostream_hub::HubHandle) {
    let hub = StreamHub::spawn(
        Arc::new(SyntheticConnector::default()),
        Arc::new(EventStore::in_memory().unwrap()),
        None,
        HubConfig::default(),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let commands = hub.commands();
    tokio::spawn(async move {
        let _ = server::serve(listener, commands).await;
    });
    (format!("ws://{addr}"), hub)
}

async fn next_event(ws: &mut WsClient) -> BroadcastEvent {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(10), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("read failed");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

#[tokio::test]
async fn full_session_over_websocket() {
    let (url, hub) = start_server().await;
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

    // Catch-up frame announces the current mode.
    match next_event(&mut ws).await {
        BroadcastEvent::ModeChanged { mode } => assert_eq!(mode, "background"),
        other => panic!("expected catch-up, got {other:?}"),
    }

    ws.send(Message::Text(
        r#"{"type":"set_mode","mode":"study"}"#.into(),
    ))
    .await
    .unwrap();
    match next_event(&mut ws).await {
        BroadcastEvent::ModeChanged { mode } => assert_eq!(mode, "study"),
        other => panic!("expected mode_changed, got {other:?}"),
    }

    ws.send(Message::Text(r#"{"type":"start_recording"}"#.into()))
        .await
        .unwrap();
    match next_event(&mut ws).await {
        BroadcastEvent::RecordingStarted => {}
        other => panic!("expected recording_started, got {other:?}"),
    }

    // The synthetic board yields a full window on the first cycle.
    loop {
        match next_event(&mut ws).await {
            BroadcastEvent::EegData { data, mode, .. } => {
                assert_eq!(mode, "study");
                assert!((0.0..=100.0).contains(&data.focus_score));
                assert!((0.0..=100.0).contains(&data.load_score));
                break;
            }
            other => panic!("expected eeg_data, got {other:?}"),
        }
    }

    ws.send(Message::Text(r#"{"type":"stop_recording"}"#.into()))
        .await
        .unwrap();
    loop {
        match next_event(&mut ws).await {
            BroadcastEvent::EegData { .. } => continue,
            BroadcastEvent::RecordingStopped => break,
            other => panic!("expected recording_stopped, got {other:?}"),
        }
    }

    ws.close(None).await.unwrap();
    hub.shutdown().await;
}

#[tokio::test]
async fn disconnecting_client_does_not_disturb_others() {
    let (url, hub) = start_server().await;

    let (mut first, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    let (mut second, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    next_event(&mut first).await;
    next_event(&mut second).await;

    first.close(None).await.unwrap();
    drop(first);

    // The survivor still gets broadcasts.
    second
        .send(Message::Text(
            r#"{"type":"set_mode","mode":"meeting"}"#.into(),
        ))
        .await
        .unwrap();
    match next_event(&mut second).await {
        BroadcastEvent::ModeChanged { mode } => assert_eq!(mode, "meeting"),
        other => panic!("expected mode_changed, got {other:?}"),
    }

    hub.shutdown().await;
}
