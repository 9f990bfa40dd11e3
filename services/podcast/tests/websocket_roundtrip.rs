//! services/podcast/tests/websocket_roundtrip.rs
//!
//! Runs the protocol client over a real WebSocket against a local scripted server.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bidirection_protocol::{
    BidirectionClient, ClientOptions, Credentials, EventType, Frame, MsgType, TtsError,
};
use futures::{SinkExt, StreamExt};
use podcast_core::{AudioParams, SynthesisRequest};
use podcast_lib::adapters::WebSocketConnector;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, Default, Clone)]
struct Seen {
    headers: Vec<(String, String)>,
    events: Vec<EventType>,
    text: Option<String>,
}

impl Seen {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

fn reply(event: EventType, session_id: Option<&str>) -> Message {
    let mut frame = Frame::with_event(MsgType::FullServerResponse, event, session_id, &b"{}"[..]);
    if event.carries_connect_id() {
        frame = frame.with_connect_id("local-connect");
    }
    Message::Binary(frame.encode().unwrap())
}

/// Accepts one connection and plays the service side of the protocol.
///
/// `audio` is streamed after `FinishSession`; `reject` answers the task with an error frame instead.
async fn serve_once(listener: TcpListener, audio: Vec<&'static [u8]>, reject: bool) -> Seen {
    let (tcp, _) = listener.accept().await.unwrap();
    let seen = Arc::new(Mutex::new(Seen::default()));

    let capture = seen.clone();
    let mut ws = tokio_tungstenite::accept_hdr_async(tcp, move |request: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
        capture.lock().unwrap().headers = request
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
            .collect();
        response
            .headers_mut()
            .insert("x-tt-logid", HeaderValue::from_static("20240101-local"));
        Ok(response)
    })
    .await
    .unwrap();

    let mut session_id = String::new();
    while let Some(message) = ws.next().await {
        let data = match message {
            Ok(Message::Binary(data)) => data,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };
        let frame = Frame::decode(&data).unwrap();
        let Some(event) = frame.event else { continue };
        seen.lock().unwrap().events.push(event);

        match event {
            EventType::StartConnection => ws.send(reply(EventType::ConnectionStarted, None)).await.unwrap(),
            EventType::StartSession => {
                session_id = frame.session_id.clone().unwrap_or_default();
                ws.send(reply(EventType::SessionStarted, Some(&session_id))).await.unwrap();
            }
            EventType::TaskRequest => {
                let body: serde_json::Value = serde_json::from_slice(&frame.payload).unwrap();
                seen.lock().unwrap().text = body["req_params"]["text"].as_str().map(str::to_owned);
                if reject {
                    let error = Frame::error(45_000_001, &br#"{"error":"quota exceeded"}"#[..]);
                    ws.send(Message::Binary(error.encode().unwrap())).await.unwrap();
                }
            }
            EventType::FinishSession => {
                for chunk in &audio {
                    let frame = Frame::audio_only(Some(EventType::TtsResponse), Some(&session_id), *chunk);
                    ws.send(Message::Binary(frame.encode().unwrap())).await.unwrap();
                }
                ws.send(reply(EventType::SessionFinished, Some(&session_id))).await.unwrap();
            }
            EventType::FinishConnection => ws.send(reply(EventType::ConnectionFinished, None)).await.unwrap(),
            _ => {}
        }
    }

    let seen = seen.lock().unwrap().clone();
    seen
}

async fn local_client() -> (BidirectionClient, TcpListener) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("ws://{}", listener.local_addr().unwrap());
    let client = BidirectionClient::new(
        Arc::new(WebSocketConnector::new()),
        Credentials {
            app_id: "app-42".to_string(),
            access_token: "token-42".to_string(),
        },
        ClientOptions {
            endpoint,
            receive_timeout: Duration::from_secs(5),
            ..Default::default()
        },
    );
    (client, listener)
}

#[tokio::test]
async fn synthesizes_over_a_real_websocket() {
    let (client, listener) = local_client().await;
    let server = tokio::spawn(serve_once(listener, vec![&b"A"[..], &b"B"[..], &b"C"[..]], false));

    let request = SynthesisRequest::new("你好世界", "S_abc123", AudioParams::default());
    let audio = client.synthesize(&request).await.unwrap();
    let seen = server.await.unwrap();

    assert_eq!(audio, b"ABC");
    assert_eq!(seen.header("X-Api-App-Key"), Some("app-42"));
    assert_eq!(seen.header("X-Api-Access-Key"), Some("token-42"));
    assert_eq!(seen.header("X-Api-Resource-Id"), Some("seed-icl-2.0"));
    assert!(seen.header("X-Api-Connect-Id").is_some_and(|id| !id.is_empty()));
    assert_eq!(seen.text.as_deref(), Some("你好世界"));
    assert_eq!(
        seen.events,
        vec![
            EventType::StartConnection,
            EventType::StartSession,
            EventType::TaskRequest,
            EventType::FinishSession,
            EventType::FinishConnection,
        ]
    );
}

#[tokio::test]
async fn server_errors_still_finish_the_connection() {
    let (client, listener) = local_client().await;
    let server = tokio::spawn(serve_once(listener, Vec::new(), true));

    let request = SynthesisRequest::new("你好", "zh_female_x", AudioParams::default());
    let err = client.synthesize(&request).await.unwrap_err();
    let seen = server.await.unwrap();

    assert!(matches!(err, TtsError::ServerRejected { code: Some(45_000_001), .. }));
    assert_eq!(seen.header("X-Api-Resource-Id"), Some("seed-tts-2.0"));
    assert_eq!(seen.events.last(), Some(&EventType::FinishConnection));
    assert_eq!(
        seen.events.iter().filter(|e| **e == EventType::FinishConnection).count(),
        1
    );
}
