use crate::game::state::{PlayerGameState, RoundPhase};
use actix::prelude::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ラウンド情報（クライアント公開用。正解座標は含めない）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundView {
    pub round_id: String,
    pub photo_ref: String,
    pub round_number: u32,
}

// 観戦可能なマッチの一覧項目
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchSummary {
    pub match_id: String,
    pub players: Vec<String>,
    pub modifier: String,
    pub round_number: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpectatedPlayer {
    pub session_id: String,
    pub points: u32,
    pub has_submitted: bool,
    pub connected: bool,
}

// 観戦者向けのマッチ状態（正解座標は含めない）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpectatorView {
    pub match_id: String,
    pub phase: RoundPhase,
    pub round_number: u32,
    pub round: Option<RoundView>,
    pub players: Vec<SpectatedPlayer>,
}

// セッション復元結果
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, MessageResponse)]
pub struct RestoreResult {
    pub success: bool,
    pub session_id: Option<String>,
    pub match_id: Option<String>,
    pub partner_id: Option<String>,
    pub round: Option<RoundView>,
    pub game_state: Option<PlayerGameState>,
    #[serde(default)]
    pub no_round_data: bool,
}

impl RestoreResult {
    pub fn failed() -> Self {
        Self::default()
    }
}

// 回答送信への応答
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GuessAck {
    pub success: bool,
    pub points: Option<u32>,
    pub total_points: Option<u32>,
    pub round_complete: Option<bool>,
    pub valid: Option<bool>,
    pub error: Option<String>,
}

// クライアント→サーバー
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientMessage {
    // マッチング待ちに参加
    JoinQueue {
        #[serde(default)]
        modifier: Option<String>,
    },
    // 接続とセッションIDを紐付け
    Identify {
        session_id: String,
    },
    // 再接続時のセッション復元
    RestoreSession {
        session_id: String,
    },
    SubmitGuess {
        session_id: String,
        #[serde(default)]
        partner_id: Option<String>,
        x: f64,
        y: f64,
    },
    // ラウンドをやり直す（デバッグ用）
    RestartSession {
        session_id: String,
        #[serde(default)]
        partner_id: Option<String>,
    },
    RequestCurrentRound {
        session_id: String,
    },
    // 終了後の再戦希望
    RequestRematch {
        session_id: String,
    },
    // 観戦
    ListActiveMatches,
    Spectate {
        match_id: String,
    },
    StopSpectating {
        match_id: String,
    },
}

// サーバー→クライアント
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum ServerMessage {
    QueueJoined {
        session_id: String,
    },
    QueueMatched {
        session_id: String,
        partner_id: String,
        match_id: String,
        #[serde(default)]
        is_reconnect: bool,
    },
    RoundStart {
        round_id: String,
        photo_ref: String,
        round_number: u32,
    },
    ValidationResult {
        valid: bool,
        points: u32,
        total_points: u32,
        opponent_points: Option<u32>,
        correct_x: f64,
        correct_y: f64,
        round_complete: bool,
        time_bonus: Option<u32>,
    },
    OpponentSubmitted {
        session_id: String,
        points: u32,
    },
    RestoreGameState {
        total_points: u32,
        partner_points: u32,
        has_submitted: bool,
        opponent_has_submitted: bool,
    },
    // 相手クライアントへ: UI状態を再送してほしい
    ResendRoundData {
        session_id: String,
    },
    RoundError {
        message: String,
    },
    GameOver {
        winner: Option<String>,
        tie: bool,
    },
    // 再戦を希望しているセッション
    RematchStatus {
        requested: Vec<String>,
    },
    RematchStarting,
    RematchError {
        message: String,
    },

    // 観戦者向け
    SpectatorUpdate(SpectatorView),
    RoundRevealed {
        round_id: String,
        correct_x: f64,
        correct_y: f64,
    },
    MatchClosed {
        match_id: String,
    },

    // 要求への直接応答
    SessionRestored(RestoreResult),
    GuessAck(GuessAck),
    CurrentRound {
        success: bool,
        round: Option<RoundView>,
        error: Option<String>,
    },
    ActiveMatches {
        matches: Vec<MatchSummary>,
    },
    Spectating {
        success: bool,
        view: Option<SpectatorView>,
        error: Option<String>,
    },

    // エラー
    Error {
        message: String,
    },
}
