//! # Upstream Translation Client
//!
//! Opens the WebSocket to the translation engine, sends the StartSession
//! frame, and splits the connection into a writer task and a reader task.
//! The connection actor talks to the writer through an [`UpstreamHandle`]
//! and receives decoded events as [`UpstreamSignal`]s on an unbounded
//! channel, in the exact order frames arrived on the socket.
//!
//! The writer never blocks the reader: outbound audio goes through its own
//! channel, so a slow socket shows up as channel depth, not as missed
//! inbound events.

use crate::config::{AudioConfig, UpstreamConfig};
use crate::error::BridgeError;
use crate::protocol::frames::{build_audio_chunk, build_finish, build_start_session};
use crate::protocol::TranslateResponse;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// What the reader task delivers to the connection actor.
#[derive(Debug)]
pub enum UpstreamSignal {
    /// One decoded engine event.
    Event(TranslateResponse),
    /// One inbound frame was dropped (framing error); the session stays
    /// alive.
    FrameDropped { reason: String },
    /// The socket closed. `reason` is set when the transport reported one.
    Closed { reason: Option<String> },
}

enum WriterCmd {
    Audio(Vec<u8>),
    Finish,
    Close,
}

/// Sender half owned by the connection actor. Cloneable and cheap; all
/// methods are fire-and-forget because the writer task owns the socket.
#[derive(Clone)]
pub struct UpstreamHandle {
    tx: mpsc::UnboundedSender<WriterCmd>,
}

impl UpstreamHandle {
    /// Forward one PCM16 block. Returns false once the writer is gone.
    pub fn send_audio(&self, pcm: Vec<u8>) -> bool {
        self.tx.send(WriterCmd::Audio(pcm)).is_ok()
    }

    /// Ask the engine to finish the session and flush pending results.
    pub fn finish(&self) -> bool {
        self.tx.send(WriterCmd::Finish).is_ok()
    }

    /// Close the socket without a finish handshake.
    pub fn close(&self) {
        let _ = self.tx.send(WriterCmd::Close);
    }
}

/// Connect, authenticate, and start a translation session.
///
/// On success the StartSession frame has already been written; the caller
/// waits for the SessionStarted event on the returned channel before
/// letting audio flow.
pub async fn connect(
    upstream: &UpstreamConfig,
    audio: &AudioConfig,
    session_id: &str,
    connect_id: &str,
    source_language: &str,
    target_language: &str,
) -> Result<(UpstreamHandle, mpsc::UnboundedReceiver<UpstreamSignal>), BridgeError> {
    let mut request = upstream
        .ws_url
        .as_str()
        .into_client_request()
        .map_err(|e| BridgeError::UpstreamUnavailable(format!("invalid upstream URL: {}", e)))?;

    let headers = request.headers_mut();
    headers.insert("X-Api-App-Key", header_value(&upstream.app_key)?);
    headers.insert("X-Api-Access-Key", header_value(&upstream.access_key)?);
    headers.insert("X-Api-Resource-Id", header_value(&upstream.resource_id)?);
    headers.insert("X-Api-Connect-Id", header_value(connect_id)?);

    let connect = tokio_tungstenite::connect_async(request);
    let (ws, response) = tokio::time::timeout(CONNECT_TIMEOUT, connect)
        .await
        .map_err(|_| BridgeError::UpstreamUnavailable("connect timed out".to_string()))?
        .map_err(|e| BridgeError::UpstreamUnavailable(e.to_string()))?;

    info!(
        session_id = %session_id,
        status = %response.status(),
        "Upstream websocket connected"
    );

    let (mut sink, mut stream) = ws.split();

    let start_frame = build_start_session(session_id, source_language, target_language, audio);
    sink.send(Message::Binary(start_frame))
        .await
        .map_err(|e| BridgeError::UpstreamUnavailable(format!("start frame rejected: {}", e)))?;

    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<WriterCmd>();
    let (signal_tx, signal_rx) = mpsc::unbounded_channel::<UpstreamSignal>();

    // Writer task: sole owner of the sink after the handshake.
    let writer_session = session_id.to_string();
    tokio::spawn(async move {
        while let Some(cmd) = cmd_rx.recv().await {
            let result = match cmd {
                WriterCmd::Audio(pcm) => {
                    sink.send(Message::Binary(build_audio_chunk(&writer_session, &pcm)))
                        .await
                }
                WriterCmd::Finish => {
                    debug!(session_id = %writer_session, "Sending finish frame upstream");
                    sink.send(Message::Binary(build_finish(&writer_session)))
                        .await
                }
                WriterCmd::Close => break,
            };
            if let Err(e) = result {
                warn!(session_id = %writer_session, error = %e, "Upstream write failed");
                break;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    });

    // Reader task: decodes frames in arrival order and forwards them. A
    // malformed frame is dropped; only transport failure ends the stream.
    let reader_session = session_id.to_string();
    tokio::spawn(async move {
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(frame))) => {
                    let signal = match TranslateResponse::parse(&frame) {
                        Ok(event) => {
                            if let Some(ev) = event.event_type() {
                                debug!(
                                    session_id = %reader_session,
                                    event = ev.name(),
                                    "Upstream event"
                                );
                            }
                            UpstreamSignal::Event(event)
                        }
                        Err(e) => {
                            warn!(
                                session_id = %reader_session,
                                error = %e,
                                "Dropping malformed upstream frame"
                            );
                            UpstreamSignal::FrameDropped {
                                reason: e.to_string(),
                            }
                        }
                    };
                    if signal_tx.send(signal).is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(close_frame))) => {
                    let reason = close_frame.map(|f| f.reason.to_string());
                    let _ = signal_tx.send(UpstreamSignal::Closed { reason });
                    break;
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Ok(other)) => {
                    debug!(
                        session_id = %reader_session,
                        "Ignoring non-binary upstream message: {:?}",
                        other
                    );
                }
                Some(Err(e)) => {
                    error!(session_id = %reader_session, error = %e, "Upstream read failed");
                    let _ = signal_tx.send(UpstreamSignal::Closed {
                        reason: Some(e.to_string()),
                    });
                    break;
                }
                None => {
                    let _ = signal_tx.send(UpstreamSignal::Closed { reason: None });
                    break;
                }
            }
        }
    });

    Ok((UpstreamHandle { tx: cmd_tx }, signal_rx))
}

// A credential that cannot form a header means the handshake can never be
// attempted, so this is an availability failure, not an engine rejection.
fn header_value(value: &str) -> Result<HeaderValue, BridgeError> {
    value.parse().map_err(|_| {
        BridgeError::UpstreamUnavailable("credential is not a valid header".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_value_rejects_control_characters() {
        assert!(header_value("app-key-123").is_ok());
        assert!(matches!(
            header_value("bad\nvalue"),
            Err(BridgeError::UpstreamUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_fails_fast_on_unreachable_endpoint() {
        let upstream = UpstreamConfig {
            ws_url: "ws://127.0.0.1:1/api/v4/ast/v2/translate".to_string(),
            app_key: "app".to_string(),
            access_key: "key".to_string(),
            resource_id: "volc.service_type.10053".to_string(),
        };
        let audio = AudioConfig::default();

        let result = connect(&upstream, &audio, "sid", "cid", "zh", "en").await;
        assert!(matches!(
            result.err(),
            Some(BridgeError::UpstreamUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_finish_without_acknowledgement_still_closes_transport() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Stub engine: accepts the session, swallows the finish frame and
        // never acknowledges it. The bridge must close the socket anyway.
        let stub = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            let start = ws.next().await.unwrap().unwrap();
            assert!(matches!(start, Message::Binary(_)));
            let finish = ws.next().await.unwrap().unwrap();
            assert!(matches!(finish, Message::Binary(_)));

            loop {
                match ws.next().await {
                    Some(Ok(Message::Close(_))) | None => return true,
                    Some(Ok(_)) => continue,
                    Some(Err(_)) => return false,
                }
            }
        });

        let upstream = UpstreamConfig {
            ws_url: format!("ws://{}/translate", addr),
            app_key: "app".to_string(),
            access_key: "key".to_string(),
            resource_id: "volc.service_type.10053".to_string(),
        };
        let (handle, _events) = connect(&upstream, &AudioConfig::default(), "sid", "cid", "zh", "en")
            .await
            .unwrap();

        assert!(handle.finish());
        handle.close();

        let transport_closed = tokio::time::timeout(Duration::from_secs(5), stub)
            .await
            .unwrap()
            .unwrap();
        assert!(transport_closed);
    }

    #[test]
    fn test_handle_reports_closed_writer() {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = UpstreamHandle { tx };
        drop(rx);
        assert!(!handle.send_audio(vec![0u8; 4]));
        assert!(!handle.finish());
    }
}
