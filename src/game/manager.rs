use crate::config::GameConfig;
use crate::db::PhotoSource;
use crate::error::GameError;
use crate::game::matchmaker::JoinQueueResult;
use crate::game::scoring::{ScoringPolicy, TimeBonus};
use crate::game::state::{ClientHandle, MatchId, RoundPhase, SessionId};
use crate::game::store::SessionStore;
use crate::game::validator::GuessOutcome;
use crate::models::{MatchSummary, RestoreResult, RoundView, ServerMessage, SpectatorView};
use actix::prelude::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// 放置マッチの掃除間隔
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// ゲームマネージャーアクター
///
/// 全セッション状態を単独で保持する。メッセージは1件ずつ処理されるので、
/// 同じマッチへの同時回答やキューの奪い合いもここで直列化される。
pub struct GameManager {
    pub(crate) store: SessionStore,
    pub(crate) photos: Arc<dyn PhotoSource>,
    pub(crate) config: GameConfig,
    pub(crate) scoring: ScoringPolicy,
    pub(crate) time_bonus: TimeBonus,
}

impl GameManager {
    pub fn new(photos: Arc<dyn PhotoSource>, config: GameConfig) -> Self {
        Self {
            store: SessionStore::new(),
            photos,
            scoring: ScoringPolicy::from_config(&config),
            time_bonus: TimeBonus::from_config(&config),
            config,
        }
    }

    /// マッチを破棄（タイマー・ラウンド・スコア・索引もまとめて）
    pub(crate) fn teardown_match(&mut self, match_id: &str, ctx: &mut Context<Self>) {
        let Some(m) = self.store.remove_match(match_id) else {
            return;
        };
        if let Some(handle) = m.advance_timer {
            ctx.cancel_future(handle);
        }
        if let Some(round_id) = &m.round_id {
            self.discard_lock(round_id, ctx);
        }
        m.notify_spectators(&ServerMessage::MatchClosed {
            match_id: match_id.to_string(),
        });
        self.store.remove_round(match_id);
        self.store.remove_game_state(match_id);
        for seat in &m.seats {
            if self.store.match_id_for(&seat.session_id).map(String::as_str) == Some(match_id) {
                self.store.unindex_session(&seat.session_id);
            }
        }
        info!("🗑️ Match removed: match_id={}", match_id);
    }

    fn stats(&self) -> Stats {
        let queued_connected = self.store.queue().filter(|e| e.client.is_connected()).count();
        let seated_connected: usize = self
            .store
            .matches()
            .map(|m| m.seats.iter().filter(|s| s.is_connected()).count())
            .sum();
        Stats {
            queued_players: self.store.queue_len(),
            active_matches: self.store.match_count(),
            connected_players: queued_connected + seated_connected,
            round_locks: self.store.round_lock_count(),
            spectators: self.store.matches().map(|m| m.spectators.len()).sum(),
        }
    }

    fn snapshot(&self, session_id: &str) -> Option<MatchSnapshot> {
        let m = self.store.match_for_session(session_id)?;
        let partner = m.partner_of(session_id)?;
        let mine = self.store.player_state(&m.match_id, session_id).cloned().unwrap_or_default();
        let theirs = self
            .store
            .player_state(&m.match_id, &partner.session_id)
            .cloned()
            .unwrap_or_default();
        Some(MatchSnapshot {
            match_id: m.match_id.clone(),
            session_id: session_id.to_string(),
            partner_id: partner.session_id.clone(),
            modifier: m.modifier.clone(),
            phase: m.phase,
            round_number: m.round_number,
            total_points: mine.score,
            partner_points: theirs.score,
            has_submitted: mine.has_submitted,
            opponent_has_submitted: theirs.has_submitted,
            partner_connected: partner.is_connected(),
            created_at: m.created_at,
        })
    }
}

impl Actor for GameManager {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!("🎮 GameManager started");
        // 両者切断のまま放置されたマッチを掃除
        ctx.run_interval(SWEEP_INTERVAL, |act, ctx| {
            act.sweep_abandoned(ctx);
        });
    }
}

// 統計（ライブ表示用）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, MessageResponse)]
pub struct Stats {
    pub queued_players: usize,
    pub active_matches: usize,
    pub connected_players: usize,
    pub round_locks: usize,
    pub spectators: usize,
}

// セッションから見たマッチ状態（正解座標は含めない）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchSnapshot {
    pub match_id: MatchId,
    pub session_id: SessionId,
    pub partner_id: SessionId,
    pub modifier: String,
    pub phase: RoundPhase,
    pub round_number: u32,
    pub total_points: u32,
    pub partner_points: u32,
    pub has_submitted: bool,
    pub opponent_has_submitted: bool,
    pub partner_connected: bool,
    pub created_at: DateTime<Utc>,
}

// メッセージ: マッチング待ちに参加
#[derive(Message)]
#[rtype(result = "JoinQueueResult")]
pub struct JoinQueue {
    pub client: ClientHandle,
    pub modifier: Option<String>,
}

impl Handler<JoinQueue> for GameManager {
    type Result = JoinQueueResult;

    fn handle(&mut self, msg: JoinQueue, _ctx: &mut Self::Context) -> Self::Result {
        self.request_match(msg.client, msg.modifier)
    }
}

// メッセージ: 接続とセッションの紐付け
#[derive(Message)]
#[rtype(result = "()")]
pub struct Identify {
    pub session_id: SessionId,
    pub client: ClientHandle,
}

impl Handler<Identify> for GameManager {
    type Result = ();

    fn handle(&mut self, msg: Identify, ctx: &mut Self::Context) {
        self.identify(&msg.session_id, msg.client, ctx);
    }
}

// メッセージ: 再接続時のセッション復元
#[derive(Message)]
#[rtype(result = "RestoreResult")]
pub struct RestoreSession {
    pub session_id: SessionId,
    pub client: ClientHandle,
}

impl Handler<RestoreSession> for GameManager {
    type Result = RestoreResult;

    fn handle(&mut self, msg: RestoreSession, ctx: &mut Self::Context) -> Self::Result {
        self.reconnect(&msg.session_id, msg.client, ctx)
    }
}

// メッセージ: 回答送信
#[derive(Message)]
#[rtype(result = "Result<GuessOutcome, GameError>")]
pub struct SubmitGuess {
    pub session_id: SessionId,
    pub partner_id: Option<SessionId>,
    pub x: f64,
    pub y: f64,
}

impl Handler<SubmitGuess> for GameManager {
    type Result = Result<GuessOutcome, GameError>;

    fn handle(&mut self, msg: SubmitGuess, ctx: &mut Self::Context) -> Self::Result {
        self.submit_guess(&msg.session_id, msg.partner_id.as_deref(), msg.x, msg.y, ctx)
    }
}

// メッセージ: ラウンドのやり直し
#[derive(Message)]
#[rtype(result = "()")]
pub struct RestartSession {
    pub session_id: SessionId,
    pub partner_id: Option<SessionId>,
}

impl Handler<RestartSession> for GameManager {
    type Result = ();

    fn handle(&mut self, msg: RestartSession, ctx: &mut Self::Context) {
        self.restart_session(&msg.session_id, msg.partner_id.as_deref(), ctx);
    }
}

// メッセージ: 現在のラウンド情報
#[derive(Message)]
#[rtype(result = "Result<RoundView, GameError>")]
pub struct RequestCurrentRound {
    pub session_id: SessionId,
}

impl Handler<RequestCurrentRound> for GameManager {
    type Result = Result<RoundView, GameError>;

    fn handle(&mut self, msg: RequestCurrentRound, _ctx: &mut Self::Context) -> Self::Result {
        self.current_round(&msg.session_id)
    }
}

// メッセージ: 切断
#[derive(Message)]
#[rtype(result = "()")]
pub struct Disconnect {
    pub client_id: Uuid,
}

impl Handler<Disconnect> for GameManager {
    type Result = ();

    fn handle(&mut self, msg: Disconnect, _ctx: &mut Self::Context) {
        self.disconnect(msg.client_id);
    }
}

// メッセージ: 統計取得
#[derive(Message)]
#[rtype(result = "Stats")]
pub struct GetStats;

impl Handler<GetStats> for GameManager {
    type Result = Stats;

    fn handle(&mut self, _msg: GetStats, _ctx: &mut Self::Context) -> Self::Result {
        self.stats()
    }
}

// メッセージ: セッションのマッチ状態
#[derive(Message)]
#[rtype(result = "Option<MatchSnapshot>")]
pub struct InspectSession {
    pub session_id: SessionId,
}

impl Handler<InspectSession> for GameManager {
    type Result = Option<MatchSnapshot>;

    fn handle(&mut self, msg: InspectSession, _ctx: &mut Self::Context) -> Self::Result {
        self.snapshot(&msg.session_id)
    }
}

// メッセージ: 再戦希望
#[derive(Message)]
#[rtype(result = "Result<(), GameError>")]
pub struct RequestRematch {
    pub session_id: SessionId,
}

impl Handler<RequestRematch> for GameManager {
    type Result = Result<(), GameError>;

    fn handle(&mut self, msg: RequestRematch, ctx: &mut Self::Context) -> Self::Result {
        self.request_rematch(&msg.session_id, ctx)
    }
}

// メッセージ: 観戦可能なマッチ一覧
#[derive(Message)]
#[rtype(result = "Vec<MatchSummary>")]
pub struct ListActiveMatches;

impl Handler<ListActiveMatches> for GameManager {
    type Result = MessageResult<ListActiveMatches>;

    fn handle(&mut self, _msg: ListActiveMatches, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.active_matches())
    }
}

// メッセージ: 観戦開始
#[derive(Message)]
#[rtype(result = "Result<SpectatorView, GameError>")]
pub struct Spectate {
    pub match_id: MatchId,
    pub client: ClientHandle,
}

impl Handler<Spectate> for GameManager {
    type Result = Result<SpectatorView, GameError>;

    fn handle(&mut self, msg: Spectate, _ctx: &mut Self::Context) -> Self::Result {
        self.spectate(&msg.match_id, msg.client)
    }
}

// メッセージ: 観戦終了
#[derive(Message)]
#[rtype(result = "()")]
pub struct StopSpectating {
    pub match_id: MatchId,
    pub client_id: Uuid,
}

impl Handler<StopSpectating> for GameManager {
    type Result = ();

    fn handle(&mut self, msg: StopSpectating, _ctx: &mut Self::Context) {
        self.stop_spectating(&msg.match_id, msg.client_id);
    }
}
