//! # Bridge WebSocket Handler
//!
//! The per-connection heart of the service. Browsers connect to
//! `/ws/translate`, send a JSON `start` with a language pair, then stream
//! microphone audio (binary Float32 frames or base64 JSON envelopes). The
//! actor opens one upstream engine session per start, relays audio up, and
//! relays recognized text, translations and synthesized speech back down
//! as JSON envelopes.
//!
//! ## Ordering
//! Everything for one session funnels through this actor's mailbox: client
//! frames via the WebSocket stream, upstream events via `add_stream` of
//! the reader task's channel. The actor processes them one at a time, so
//! downstream consumers see events in exactly the order the upstream
//! connection emitted them.

use crate::audio::{ingress, PlaybackQueue};
use crate::error::BridgeError;
use crate::router::{Direction, EventRouter, RouterAction};
use crate::session::{SessionMachine, SessionState};
use crate::state::AppState;
use crate::upstream::{self, UpstreamHandle, UpstreamSignal};

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, info, warn};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Messages the browser sends.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Open a translation session for one language pair.
    #[serde(rename_all = "camelCase")]
    Start {
        source_language: String,
        target_language: String,
    },
    /// Base64-encoded PCM16 block (alternative to binary Float32 frames).
    Audio { data: String },
    /// No more audio; finish the session and flush pending results.
    Stop,
    /// Playback mute toggle; upstream audio keeps flowing.
    Mute { muted: bool },
}

/// Messages the browser receives.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Session lifecycle notification ("ready", "disconnected").
    Status {
        status: String,
    },
    /// Recognized source-language text, interim or final.
    #[serde(rename_all = "camelCase")]
    Asr {
        text: String,
        is_final: bool,
        sequence: i64,
    },
    /// Translated target-language text, interim or final.
    #[serde(rename_all = "camelCase")]
    Translation {
        text: String,
        language: String,
        is_final: bool,
        sequence: i64,
    },
    /// One base64-encoded synthesized speech fragment.
    #[serde(rename_all = "camelCase")]
    Audio {
        data: String,
        format: String,
        sample_rate: u32,
    },
    /// All text and audio for one utterance has been delivered.
    TurnComplete,
    Error {
        message: String,
    },
}

/// WebSocket actor bridging one browser connection to one upstream
/// translation session at a time.
pub struct TranslatorWebSocket {
    /// Shared application state: config, metrics, session registry.
    state: web::Data<AppState>,
    /// Lifecycle state and identity of the current session.
    machine: SessionMachine,
    /// Event classifier, present while a session is live.
    router: Option<EventRouter>,
    /// Turn-ordered queue for synthesized speech going to the client.
    playback: PlaybackQueue,
    /// Writer handle to the upstream engine connection.
    upstream: Option<UpstreamHandle>,
    /// Last ping/pong observed from the client.
    last_heartbeat: Instant,
    /// Grace timer armed by a client stop, cleared on acknowledgement.
    finish_timer: Option<SpawnHandle>,
    /// Whether this connection currently holds an active-session slot.
    counted_active: bool,
}

/// Result of the spawned upstream connect task.
#[derive(Message)]
#[rtype(result = "()")]
struct UpstreamConnected {
    session_id: String,
    handle: UpstreamHandle,
    events: mpsc::UnboundedReceiver<UpstreamSignal>,
}

#[derive(Message)]
#[rtype(result = "()")]
struct UpstreamConnectFailed {
    session_id: String,
    error: String,
}

impl TranslatorWebSocket {
    pub fn new(state: web::Data<AppState>) -> Self {
        Self {
            state,
            machine: SessionMachine::new(),
            router: None,
            playback: PlaybackQueue::new(),
            upstream: None,
            last_heartbeat: Instant::now(),
            finish_timer: None,
            counted_active: false,
        }
    }

    fn send(&self, ctx: &mut ws::WebsocketContext<Self>, msg: &ServerMessage) {
        match serde_json::to_string(msg) {
            Ok(json) => ctx.text(json),
            Err(e) => error!(error = %e, "Failed to serialize server message"),
        }
    }

    fn send_error(&self, ctx: &mut ws::WebsocketContext<Self>, message: &str) {
        warn!(session_id = %self.machine.session_id, "Session error: {}", message);
        self.send(
            ctx,
            &ServerMessage::Error {
                message: message.to_string(),
            },
        );
    }

    /// Handle a client `start`: drive the state machine, claim a registry
    /// slot, and connect upstream off-actor.
    fn handle_start(
        &mut self,
        source_language: String,
        target_language: String,
        ctx: &mut ws::WebsocketContext<Self>,
    ) {
        let config = self.state.get_config();
        if !config.upstream_configured() {
            self.send_error(ctx, "upstream credentials are not configured");
            return;
        }

        if let Err(e) = self.machine.begin_connect(&source_language, &target_language) {
            self.send_error(ctx, &e);
            return;
        }

        if let Err(e) = self.state.sessions.register(&self.machine) {
            // Roll the machine back so a later start can succeed.
            let _ = self.machine.fail(&e);
            self.machine.close();
            self.send_error(ctx, &e);
            return;
        }

        self.state.increment_active_sessions();
        self.counted_active = true;
        self.router = Some(EventRouter::new(&source_language, &target_language));

        info!(
            session_id = %self.machine.session_id,
            source = %source_language,
            target = %target_language,
            "Starting translation session"
        );

        let session_id = self.machine.session_id.clone();
        let connect_id = self.machine.connect_id.clone();
        let addr = ctx.address();

        tokio::spawn(async move {
            let result = upstream::connect(
                &config.upstream,
                &config.audio,
                &session_id,
                &connect_id,
                &source_language,
                &target_language,
            )
            .await;

            match result {
                Ok((handle, events)) => addr.do_send(UpstreamConnected {
                    session_id,
                    handle,
                    events,
                }),
                Err(e) => addr.do_send(UpstreamConnectFailed {
                    session_id,
                    error: e.to_string(),
                }),
            }
        });
    }

    /// Forward one PCM16 block upstream, or drop it (counted) when the
    /// session cannot accept audio yet.
    fn forward_audio(&mut self, pcm: Vec<u8>) {
        if !self.machine.can_accept_audio() {
            self.machine.note_dropped_block();
            self.state.record_audio_block_dropped();
            return;
        }
        if let Some(handle) = &self.upstream {
            debug!(
                session_id = %self.machine.session_id,
                bytes = pcm.len(),
                peak = ingress::peak_amplitude(&pcm),
                "Forwarding audio block"
            );
            if !handle.send_audio(pcm) {
                debug!(
                    session_id = %self.machine.session_id,
                    "Upstream writer gone, dropping audio block"
                );
                self.machine.note_dropped_block();
                self.state.record_audio_block_dropped();
            }
        }
    }

    /// Client `stop` or disconnect: ask upstream to finish and arm the
    /// grace timer that forces Closed if no acknowledgement arrives.
    fn handle_stop(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        if self.machine.begin_finish().is_err() {
            // Nothing in flight; stop on an idle connection is a no-op.
            return;
        }
        self.state.sessions.update(&self.machine);
        self.playback.stop();

        if let Some(handle) = &self.upstream {
            handle.finish();
        }

        let grace = self.state.get_config().finish_grace();
        self.finish_timer = Some(ctx.run_later(grace, |act, ctx| {
            act.finish_timer = None;
            if act.machine.expire_finish() {
                warn!(
                    session_id = %act.machine.session_id,
                    "{}, forcing session closed",
                    BridgeError::SessionTimeout
                );
                act.close_session(ctx, "disconnected");
            }
        }));
    }

    /// Transition to Closed, release the upstream transport and the
    /// active-session slot, and tell the client.
    fn close_session(&mut self, ctx: &mut ws::WebsocketContext<Self>, status: &str) {
        self.cancel_finish_timer(ctx);
        self.machine.close();
        self.teardown();
        self.send(
            ctx,
            &ServerMessage::Status {
                status: status.to_string(),
            },
        );
    }

    fn fail_session(&mut self, ctx: &mut ws::WebsocketContext<Self>, message: &str) {
        self.cancel_finish_timer(ctx);
        if self.machine.fail(message).is_ok() {
            self.state.sessions.update(&self.machine);
        }
        self.teardown();
        self.send_error(ctx, message);
    }

    fn cancel_finish_timer(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        if let Some(handle) = self.finish_timer.take() {
            ctx.cancel_future(handle);
        }
    }

    /// Release everything the session holds. Idempotent.
    fn teardown(&mut self) {
        if let Some(handle) = self.upstream.take() {
            handle.close();
        }
        self.playback.stop();
        self.router = None;
        if self.counted_active {
            self.counted_active = false;
            self.state.decrement_active_sessions();
        }
        if !self.machine.session_id.is_empty() {
            self.state.sessions.remove(&self.machine.session_id);
        }
    }

    /// Apply one batch of router actions in order.
    fn apply_actions(&mut self, actions: Vec<RouterAction>, ctx: &mut ws::WebsocketContext<Self>) {
        for action in actions {
            match action {
                RouterAction::SessionReady => {
                    if let Err(e) = self.machine.activate() {
                        debug!(
                            session_id = %self.machine.session_id,
                            "Ignoring session-started event: {}",
                            e
                        );
                        continue;
                    }
                    self.state.sessions.update(&self.machine);
                    info!(session_id = %self.machine.session_id, "Session active");
                    self.send(
                        ctx,
                        &ServerMessage::Status {
                            status: "ready".to_string(),
                        },
                    );
                }

                RouterAction::Segment(segment) => {
                    self.state.record_segment_sent();
                    let msg = match segment.direction {
                        Direction::Source => ServerMessage::Asr {
                            text: segment.text,
                            is_final: segment.is_final,
                            sequence: segment.sequence,
                        },
                        Direction::Target => ServerMessage::Translation {
                            text: segment.text,
                            language: segment.language,
                            is_final: segment.is_final,
                            sequence: segment.sequence,
                        },
                    };
                    self.send(ctx, &msg);
                }

                RouterAction::Fragment(fragment) => {
                    let released = self.playback.push(fragment);
                    self.send_fragments(released, ctx);
                }

                RouterAction::TurnComplete { turn_id } => {
                    self.send(ctx, &ServerMessage::TurnComplete);
                    // Retiring the turn may unblock buffered audio of the
                    // next one.
                    let released = self.playback.complete_turn(turn_id);
                    self.send_fragments(released, ctx);
                }

                RouterAction::SessionClosed => {
                    info!(session_id = %self.machine.session_id, "Session finished upstream");
                    if self.machine.state() != &SessionState::Finishing {
                        let _ = self.machine.begin_finish();
                    }
                    self.close_session(ctx, "disconnected");
                }

                RouterAction::SessionFailed { message } => {
                    self.fail_session(ctx, &message);
                }
            }
        }
    }

    fn send_fragments(
        &mut self,
        fragments: Vec<crate::router::AudioFragment>,
        ctx: &mut ws::WebsocketContext<Self>,
    ) {
        if fragments.is_empty() {
            return;
        }
        let audio_cfg = self.state.get_config().audio;
        for fragment in fragments {
            self.state.record_audio_fragment_sent();
            self.send(
                ctx,
                &ServerMessage::Audio {
                    data: general_purpose::STANDARD.encode(&fragment.bytes),
                    format: audio_cfg.target_format.clone(),
                    sample_rate: audio_cfg.target_rate,
                },
            );
        }
    }
}

impl Actor for TranslatorWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!("Client websocket connected");

        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!(
                    session_id = %act.machine.session_id,
                    "Client heartbeat timeout, closing connection"
                );
                ctx.stop();
            } else {
                ctx.ping(b"");
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!(
            session_id = %self.machine.session_id,
            "{}, tearing down session",
            BridgeError::ClientDisconnected
        );
        // Best-effort finish so the engine flushes and bills correctly,
        // then release the transport.
        if let Some(handle) = &self.upstream {
            handle.finish();
        }
        let _ = self.machine.begin_finish();
        self.machine.close();
        self.teardown();
    }
}

/// Upstream events, in the order the reader task decoded them.
impl StreamHandler<UpstreamSignal> for TranslatorWebSocket {
    fn handle(&mut self, signal: UpstreamSignal, ctx: &mut Self::Context) {
        match signal {
            UpstreamSignal::Event(event) => {
                let actions = match self.router.as_mut() {
                    Some(router) => router.handle(&event),
                    None => return,
                };
                self.apply_actions(actions, ctx);
            }
            UpstreamSignal::FrameDropped { reason } => {
                debug!(
                    session_id = %self.machine.session_id,
                    "Upstream frame dropped: {}",
                    reason
                );
                self.state.record_upstream_frame_dropped();
            }
            UpstreamSignal::Closed { reason } => {
                match self.machine.state() {
                    // Expected while finishing or already torn down.
                    SessionState::Finishing => self.close_session(ctx, "disconnected"),
                    SessionState::Closed | SessionState::Failed(_) | SessionState::Idle => {}
                    SessionState::Connecting | SessionState::Active => {
                        let message = reason
                            .unwrap_or_else(|| "upstream connection closed unexpectedly".into());
                        self.fail_session(ctx, &message);
                    }
                }
            }
        }
    }

    /// The upstream stream ending must not stop the actor; the client
    /// connection outlives the session and may start a new one.
    fn finished(&mut self, _ctx: &mut Self::Context) {
        debug!(
            session_id = %self.machine.session_id,
            "Upstream event stream ended"
        );
    }
}

impl Handler<UpstreamConnected> for TranslatorWebSocket {
    type Result = ();

    fn handle(&mut self, msg: UpstreamConnected, ctx: &mut Self::Context) {
        // The client may have stopped (or restarted) while we connected.
        if msg.session_id != self.machine.session_id
            || self.machine.state() != &SessionState::Connecting
        {
            debug!(
                session_id = %msg.session_id,
                "Discarding upstream connection for a superseded session"
            );
            msg.handle.close();
            return;
        }

        self.upstream = Some(msg.handle);
        ctx.add_stream(UnboundedReceiverStream::new(msg.events));
        // Activation waits for the engine's session-started event, which
        // arrives on the stream just added.
    }
}

impl Handler<UpstreamConnectFailed> for TranslatorWebSocket {
    type Result = ();

    fn handle(&mut self, msg: UpstreamConnectFailed, ctx: &mut Self::Context) {
        if msg.session_id != self.machine.session_id {
            return;
        }
        error!(
            session_id = %msg.session_id,
            error = %msg.error,
            "Upstream connection failed"
        );
        self.fail_session(ctx, &msg.error);
    }
}

/// Client frames.
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for TranslatorWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Start {
                    source_language,
                    target_language,
                }) => self.handle_start(source_language, target_language, ctx),
                Ok(ClientMessage::Audio { data }) => match ingress::decode_base64_pcm16(&data) {
                    Ok(pcm) => self.forward_audio(pcm),
                    Err(e) => self.send_error(ctx, &e.to_string()),
                },
                Ok(ClientMessage::Stop) => self.handle_stop(ctx),
                Ok(ClientMessage::Mute { muted }) => {
                    debug!(
                        session_id = %self.machine.session_id,
                        muted, "Playback mute toggled"
                    );
                    self.playback.set_muted(muted);
                }
                Err(e) => self.send_error(ctx, &format!("invalid message: {}", e)),
            },
            Ok(ws::Message::Binary(frame)) => {
                // Binary frames are raw Float32 sample blocks.
                match ingress::float_frame_to_pcm16(&frame) {
                    Ok(pcm) => self.forward_audio(pcm),
                    Err(e) => {
                        // Malformed block: drop it, keep the session.
                        debug!(
                            session_id = %self.machine.session_id,
                            "Dropping client audio frame: {}",
                            e
                        );
                        self.state.record_audio_block_dropped();
                    }
                }
            }
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!(
                    session_id = %self.machine.session_id,
                    "Client closed websocket: {:?}",
                    reason
                );
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("Unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(e) => {
                error!(error = %e, "Client websocket protocol error");
                ctx.stop();
            }
        }
    }
}

/// HTTP → WebSocket upgrade for `/ws/translate`.
pub async fn translate_websocket(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    info!(
        peer = ?req.connection_info().peer_addr(),
        "New translation websocket request"
    );
    ws::start(TranslatorWebSocket::new(app_state), &req, stream)
}
