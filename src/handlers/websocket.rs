use crate::game::manager::{
    Disconnect, GameManager, Identify, JoinQueue, ListActiveMatches, RequestCurrentRound, RequestRematch,
    RestartSession, RestoreSession, Spectate, StopSpectating, SubmitGuess,
};
use crate::game::state::{ClientHandle, SessionId};
use crate::models::{ClientMessage, GuessAck, RestoreResult, ServerMessage};
use actix::prelude::*;
use actix_web::{Error, HttpRequest, HttpResponse, web};
use actix_web_actors::ws;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// ハートビート送信間隔
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
/// 応答が無ければ切断とみなす時間
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);
/// 送信キューのポーリング間隔
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// WebSocketアクター
pub struct WsSession {
    /// ハートビート最終時刻
    hb: Instant,
    /// この接続の送信ハンドル（GameManagerに渡す）
    client: ClientHandle,
    /// 直近で扱ったセッションID（ログ用）
    session_id: Option<SessionId>,
    /// ゲームマネージャーアドレス
    game_manager: Addr<GameManager>,
    /// メッセージ受信チャンネル
    rx: Option<mpsc::UnboundedReceiver<ServerMessage>>,
}

impl WsSession {
    pub fn new(game_manager: Addr<GameManager>) -> Self {
        let (client, rx) = ClientHandle::channel();
        Self {
            hb: Instant::now(),
            client,
            session_id: None,
            game_manager,
            rx: Some(rx),
        }
    }

    /// ハートビート送信
    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                warn!("💔 Heartbeat timed out: client={}", act.client.id());
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    /// メッセージポーリング
    fn poll_messages(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(POLL_INTERVAL, |act, ctx| {
            if let Some(rx) = &mut act.rx {
                while let Ok(msg) = rx.try_recv() {
                    debug!("📤 Sending message to client (session_id={:?}): {:?}", act.session_id, msg);
                    match serde_json::to_string(&msg) {
                        Ok(json) => ctx.text(json),
                        Err(e) => warn!("❌ Failed to serialize message: {}", e),
                    }
                }
            }
        });
    }

    fn handle_client_message(&mut self, msg: ClientMessage, ctx: &mut ws::WebsocketContext<Self>) {
        match msg {
            ClientMessage::JoinQueue { modifier } => {
                let request = JoinQueue {
                    client: self.client.clone(),
                    modifier,
                };
                ctx.spawn(self.game_manager.send(request).into_actor(self).map(|res, act, _ctx| {
                    match res {
                        Ok(result) => act.session_id = Some(result.session_id),
                        Err(e) => act.reply_error(format!("Matchmaking unavailable: {}", e)),
                    }
                }));
            }
            ClientMessage::Identify { session_id } => {
                self.session_id = Some(session_id.clone());
                self.game_manager.do_send(Identify {
                    session_id,
                    client: self.client.clone(),
                });
            }
            ClientMessage::RestoreSession { session_id } => {
                self.session_id = Some(session_id.clone());
                let request = RestoreSession {
                    session_id,
                    client: self.client.clone(),
                };
                ctx.spawn(self.game_manager.send(request).into_actor(self).map(|res, act, _ctx| {
                    let result = res.unwrap_or_else(|e| {
                        warn!("❌ Restore request failed: {}", e);
                        RestoreResult::failed()
                    });
                    act.client.send(ServerMessage::SessionRestored(result));
                }));
            }
            ClientMessage::SubmitGuess {
                session_id,
                partner_id,
                x,
                y,
            } => {
                let request = SubmitGuess {
                    session_id,
                    partner_id,
                    x,
                    y,
                };
                ctx.spawn(self.game_manager.send(request).into_actor(self).map(|res, act, _ctx| {
                    let ack = match res {
                        Ok(Ok(outcome)) => GuessAck::from(outcome),
                        Ok(Err(e)) => GuessAck::from(e),
                        Err(e) => GuessAck {
                            success: false,
                            error: Some(format!("Game server unavailable: {}", e)),
                            ..Default::default()
                        },
                    };
                    act.client.send(ServerMessage::GuessAck(ack));
                }));
            }
            ClientMessage::RestartSession { session_id, partner_id } => {
                self.game_manager.do_send(RestartSession { session_id, partner_id });
            }
            ClientMessage::RequestCurrentRound { session_id } => {
                let request = RequestCurrentRound { session_id };
                ctx.spawn(self.game_manager.send(request).into_actor(self).map(|res, act, _ctx| {
                    let reply = match res {
                        Ok(Ok(round)) => ServerMessage::CurrentRound {
                            success: true,
                            round: Some(round),
                            error: None,
                        },
                        Ok(Err(e)) => ServerMessage::CurrentRound {
                            success: false,
                            round: None,
                            error: Some(e.to_string()),
                        },
                        Err(e) => ServerMessage::CurrentRound {
                            success: false,
                            round: None,
                            error: Some(format!("Game server unavailable: {}", e)),
                        },
                    };
                    act.client.send(reply);
                }));
            }
            ClientMessage::RequestRematch { session_id } => {
                let request = RequestRematch { session_id };
                ctx.spawn(self.game_manager.send(request).into_actor(self).map(|res, act, _ctx| {
                    let message = match res {
                        Ok(Ok(())) => return,
                        Ok(Err(e)) => e.to_string(),
                        Err(e) => format!("Game server unavailable: {}", e),
                    };
                    act.client.send(ServerMessage::RematchError { message });
                }));
            }
            ClientMessage::ListActiveMatches => {
                ctx.spawn(self.game_manager.send(ListActiveMatches).into_actor(self).map(|res, act, _ctx| {
                    match res {
                        Ok(matches) => {
                            act.client.send(ServerMessage::ActiveMatches { matches });
                        }
                        Err(e) => act.reply_error(format!("Game server unavailable: {}", e)),
                    }
                }));
            }
            ClientMessage::Spectate { match_id } => {
                let request = Spectate {
                    match_id,
                    client: self.client.clone(),
                };
                ctx.spawn(self.game_manager.send(request).into_actor(self).map(|res, act, _ctx| {
                    let reply = match res {
                        Ok(Ok(view)) => ServerMessage::Spectating {
                            success: true,
                            view: Some(view),
                            error: None,
                        },
                        Ok(Err(e)) => ServerMessage::Spectating {
                            success: false,
                            view: None,
                            error: Some(e.to_string()),
                        },
                        Err(e) => ServerMessage::Spectating {
                            success: false,
                            view: None,
                            error: Some(format!("Game server unavailable: {}", e)),
                        },
                    };
                    act.client.send(reply);
                }));
            }
            ClientMessage::StopSpectating { match_id } => {
                self.game_manager.do_send(StopSpectating {
                    match_id,
                    client_id: self.client.id(),
                });
            }
        }
    }

    fn reply_error(&self, message: String) {
        self.client.send(ServerMessage::Error { message });
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!("🔌 WebSocket connected: client={}", self.client.id());
        self.hb(ctx);
        self.poll_messages(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!(
            "👋 WebSocket closed: client={} session_id={:?}",
            self.client.id(),
            self.session_id
        );
        self.game_manager.do_send(Disconnect {
            client_id: self.client.id(),
        });
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                debug!("📨 Received WebSocket message: {}", text);
                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(client_msg) => self.handle_client_message(client_msg, ctx),
                    Err(e) => {
                        warn!("❌ Failed to deserialize ClientMessage: {}", e);
                        self.reply_error(format!("Invalid message format: {}", text));
                    }
                }
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Err(e) => {
                warn!("❌ WebSocket protocol error: {}", e);
                ctx.stop();
            }
            _ => {}
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// 指定があれば接続直後にIdentifyする
    pub session_id: Option<String>,
}

/// WebSocketエンドポイント
pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    game_manager: web::Data<Addr<GameManager>>,
    query: web::Query<WsQuery>,
) -> Result<HttpResponse, Error> {
    debug!("🔌 WebSocket connection attempt: query={:?}", query);

    let mut ws_session = WsSession::new(game_manager.get_ref().clone());
    if let Some(session_id) = query.into_inner().session_id {
        info!("👤 Identifying from query: session_id={}", session_id);
        ws_session.session_id = Some(session_id.clone());
        game_manager.do_send(Identify {
            session_id,
            client: ws_session.client.clone(),
        });
    }

    ws::start(ws_session, &req, stream)
}
