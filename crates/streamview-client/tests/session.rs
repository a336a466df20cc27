use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use streamview_client::mock::{MockConnector, COMMITTED_MARKER};
use streamview_client::{
    noop_reporter, run_session, Endpoint, EngineEvent, IceConfig, NullSink, SessionConfig,
};
use streamview_common::IceCandidate;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

const OFFER: &str = r#"{"type":"sdp","data":{"type":"offer","sdp":"v=0\r\no=- 1 1 IN IP4 0.0.0.0\r\n"}}"#;
const REMOTE_ICE: &str = r#"{"type":"ice","data":{"candidate":"candidate:7 1 udp 2122260223 10.1.1.7 40000 typ host","sdpMLineIndex":0,"sdpMid":"0"}}"#;

fn local_config(port: u16) -> SessionConfig {
    SessionConfig {
        endpoint: Endpoint {
            host: Some("127.0.0.1".into()),
            port: Some(port),
            path: Some("ws".into()),
        },
        ice: IceConfig {
            servers: vec![],
            ..Default::default()
        },
        keepalive: None,
        greeting: Some("HELLO".into()),
        ..Default::default()
    }
}

async fn next_text(ws: &mut WebSocketStream<TcpStream>) -> String {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return text.as_str().to_owned(),
            Some(Ok(_)) => continue,
            other => panic!("expected a text frame, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_full_negotiation_over_websocket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let connector = MockConnector::new();

    let client = tokio::spawn(run_session(
        local_config(port),
        connector.clone(),
        Arc::new(NullSink),
        noop_reporter(),
    ));

    let (stream, _) = listener.accept().await.unwrap();
    let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
    assert_eq!(next_text(&mut ws).await, "HELLO");

    // Plain-text replies are not signaling messages and must be ignored.
    ws.send(Message::Text("HELLO".into())).await.unwrap();
    ws.send(Message::Text(OFFER.into())).await.unwrap();

    let answer: Value = serde_json::from_str(&next_text(&mut ws).await).unwrap();
    assert_eq!(answer["type"], "sdp");
    assert_eq!(answer["data"]["type"], "answer");
    assert!(answer["data"]["sdp"]
        .as_str()
        .unwrap()
        .ends_with(COMMITTED_MARKER));
    assert_eq!(connector.created(), 1);

    assert!(connector.emit(EngineEvent::LocalCandidate(Some(IceCandidate {
        candidate: "candidate:1 1 udp 2122260223 127.0.0.1 50000 typ host".into(),
        sdp_mline_index: Some(0),
        sdp_mid: Some("0".into()),
        username_fragment: None,
    }))));
    assert!(connector.emit(EngineEvent::LocalCandidate(None)));
    let ice: Value = serde_json::from_str(&next_text(&mut ws).await).unwrap();
    assert_eq!(ice["type"], "ice");
    assert_eq!(ice["data"]["sdpMLineIndex"], 0);
    assert!(ice["data"].get("usernameFragment").is_none());

    ws.send(Message::Text(REMOTE_ICE.into())).await.unwrap();
    ws.close(None).await.unwrap();

    client.await.unwrap().unwrap();
    let handle = connector.last_handle().unwrap();
    assert_eq!(handle.applied_candidates().len(), 1);
    assert_eq!(handle.calls().close, 1);
    assert_eq!(connector.created(), 1);
}

#[tokio::test]
async fn test_unreachable_endpoint_fails_once() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let connector = MockConnector::new();
    let result = run_session(
        local_config(port),
        connector.clone(),
        Arc::new(NullSink),
        noop_reporter(),
    )
    .await;
    assert!(result.is_err());
    assert_eq!(connector.created(), 0);
}

#[tokio::test]
async fn test_invalid_host_is_rejected_before_connecting() {
    let mut config = local_config(8443);
    config.endpoint.host = Some("not a host".into());
    let result = run_session(
        config,
        MockConnector::new(),
        Arc::new(NullSink),
        noop_reporter(),
    )
    .await;
    assert!(result.is_err());
}
