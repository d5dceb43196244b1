use crate::db::GroundTruth;
use crate::models::{RoundView, ServerMessage};
use actix::SpawnHandle;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

pub type SessionId = String;
pub type MatchId = String;
pub type RoundId = String;

/// クライアント接続への送信ハンドル
///
/// 受信側（WebSocketセッション）が破棄されると切断扱いになる。
#[derive(Debug, Clone)]
pub struct ClientHandle {
    id: Uuid,
    tx: mpsc::UnboundedSender<ServerMessage>,
}

impl ClientHandle {
    pub fn new(id: Uuid, tx: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self { id, tx }
    }

    /// 新しい接続IDでチャンネルごと作成
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(Uuid::new_v4(), tx), rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }

    /// 送信（切断済みなら破棄。再接続時のリプレイで追いつく）
    pub fn send(&self, msg: ServerMessage) -> bool {
        match self.tx.send(msg) {
            Ok(()) => true,
            Err(e) => {
                debug!("📭 Dropped message for disconnected client {}: {:?}", self.id, e.0);
                false
            }
        }
    }
}

// マッチング待ちエントリ
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub session_id: SessionId,
    pub client: ClientHandle,
    pub modifier: String,
    pub queued_at: DateTime<Utc>,
}

impl QueueEntry {
    pub fn new(session_id: SessionId, client: ClientHandle, modifier: String) -> Self {
        Self {
            session_id,
            client,
            modifier,
            queued_at: Utc::now(),
        }
    }
}

// ラウンド状態
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    Idle,            // マッチ成立直後（ラウンド未開始）
    Pending,         // ロック作成済み、接続待ち
    AwaitingGuesses, // 配信済み、回答待ち
    Complete,        // 両者回答済み、次ラウンド待ち
    Ended,           // 終了
}

// マッチ内の参加者枠
#[derive(Debug, Clone)]
pub struct Seat {
    pub session_id: SessionId,
    pub client: Option<ClientHandle>,
    pub ready: bool,
    /// 終了後の再戦希望
    pub wants_rematch: bool,
}

impl Seat {
    pub fn is_connected(&self) -> bool {
        self.client.as_ref().is_some_and(ClientHandle::is_connected)
    }

    pub fn send(&self, msg: ServerMessage) -> bool {
        match &self.client {
            Some(client) => client.send(msg),
            None => {
                debug!("📭 No client attached to session {}", self.session_id);
                false
            }
        }
    }
}

// マッチ
#[derive(Debug)]
pub struct Match {
    pub match_id: MatchId,
    pub seats: [Seat; 2],
    pub modifier: String,
    pub round_number: u32,
    pub phase: RoundPhase,
    /// 現在のラウンドロックID
    pub round_id: Option<RoundId>,
    /// 次の進行タイマー（次ラウンド開始、終了後は部屋の破棄）
    pub advance_timer: Option<SpawnHandle>,
    /// 観戦者の接続
    pub spectators: Vec<ClientHandle>,
    pub created_at: DateTime<Utc>,
    /// 両者が切断した時刻
    pub abandoned_at: Option<DateTime<Utc>>,
}

impl Match {
    /// 先に待っていたエントリが先頭の枠になる
    pub fn new(match_id: MatchId, first: &QueueEntry, second: &QueueEntry) -> Self {
        let seat = |entry: &QueueEntry| Seat {
            session_id: entry.session_id.clone(),
            client: Some(entry.client.clone()),
            ready: false,
            wants_rematch: false,
        };
        Self {
            match_id,
            seats: [seat(first), seat(second)],
            modifier: first.modifier.clone(),
            round_number: 0,
            phase: RoundPhase::Idle,
            round_id: None,
            advance_timer: None,
            spectators: Vec::new(),
            created_at: Utc::now(),
            abandoned_at: None,
        }
    }

    pub fn seat(&self, session_id: &str) -> Option<&Seat> {
        self.seats.iter().find(|s| s.session_id == session_id)
    }

    pub fn seat_mut(&mut self, session_id: &str) -> Option<&mut Seat> {
        self.seats.iter_mut().find(|s| s.session_id == session_id)
    }

    pub fn partner_of(&self, session_id: &str) -> Option<&Seat> {
        if self.seat(session_id).is_none() {
            return None;
        }
        self.seats.iter().find(|s| s.session_id != session_id)
    }

    pub fn session_ids(&self) -> [SessionId; 2] {
        [self.seats[0].session_id.clone(), self.seats[1].session_id.clone()]
    }

    pub fn both_ready(&self) -> bool {
        self.seats.iter().all(|s| s.ready)
    }

    pub fn any_connected(&self) -> bool {
        self.seats.iter().any(Seat::is_connected)
    }

    pub fn is_timed(&self) -> bool {
        self.modifier == "timed"
    }

    /// 1ラウンド以上配信済みで、まだ終わっていない
    pub fn is_started(&self) -> bool {
        self.round_number > 0 && self.phase != RoundPhase::Ended
    }

    /// 観戦者を追加（同じ接続は1回だけ）
    pub fn add_spectator(&mut self, client: ClientHandle) -> bool {
        if self.spectators.iter().any(|c| c.id() == client.id()) {
            return false;
        }
        self.spectators.push(client);
        true
    }

    pub fn remove_spectator(&mut self, client_id: Uuid) -> bool {
        let before = self.spectators.len();
        self.spectators.retain(|c| c.id() != client_id);
        self.spectators.len() != before
    }

    /// 観戦者だけに送信
    pub fn notify_spectators(&self, msg: &ServerMessage) {
        for spectator in &self.spectators {
            spectator.send(msg.clone());
        }
    }

    /// 接続中の全員（観戦者を含む）に送信
    pub fn broadcast(&self, msg: &ServerMessage) {
        for seat in &self.seats {
            seat.send(msg.clone());
        }
        self.notify_spectators(msg);
    }
}

// ラウンドデータ（正解座標はサーバー内のみ）
#[derive(Debug, Clone, PartialEq)]
pub struct RoundData {
    pub round_id: RoundId,
    pub match_id: MatchId,
    pub photo_ref: String,
    pub truth_x: f64,
    pub truth_y: f64,
}

impl RoundData {
    pub fn new(round_id: RoundId, match_id: MatchId, record: GroundTruth) -> Self {
        Self {
            round_id,
            match_id,
            photo_ref: record.photo_ref,
            truth_x: record.x,
            truth_y: record.y,
        }
    }

    pub fn view(&self, round_number: u32) -> RoundView {
        RoundView {
            round_id: self.round_id.clone(),
            photo_ref: self.photo_ref.clone(),
            round_number,
        }
    }
}

// ラウンドロック（両者の接続が揃うまで配信を保留）
#[derive(Debug)]
pub struct RoundLock {
    pub round_id: RoundId,
    pub match_id: MatchId,
    pub round_data: Option<RoundData>,
    pub ready_set: HashSet<SessionId>,
    pub cleanup_timer: Option<SpawnHandle>,
}

impl RoundLock {
    pub fn new(round_id: RoundId, match_id: MatchId) -> Self {
        Self {
            round_id,
            match_id,
            round_data: None,
            ready_set: HashSet::new(),
            cleanup_timer: None,
        }
    }

    /// 準備完了を記録して現在の人数を返す（最大2人）
    pub fn mark_ready(&mut self, session_id: &str) -> usize {
        if self.ready_set.len() < 2 {
            self.ready_set.insert(session_id.to_string());
        }
        self.ready_set.len()
    }
}

// マッチ内のプレイヤー別状態
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlayerGameState {
    pub score: u32,
    pub has_submitted: bool,
    pub submitted_at: Option<DateTime<Utc>>,
    /// 直近ラウンドの獲得点
    pub round_points: u32,
    pub round_valid: bool,
    /// タイムアタック時のボーナス（通常モードは `None`）
    pub round_bonus: Option<u32>,
}

impl PlayerGameState {
    /// ラウンド終了時のリセット（累計スコアは残す）
    pub fn reset_submission(&mut self) {
        self.has_submitted = false;
        self.submitted_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str) -> (QueueEntry, mpsc::UnboundedReceiver<ServerMessage>) {
        let (client, rx) = ClientHandle::channel();
        (QueueEntry::new(id.to_string(), client, "default".to_string()), rx)
    }

    #[test]
    fn partner_lookup_is_by_session_id() {
        let (a, _rx_a) = entry("a");
        let (b, _rx_b) = entry("b");
        let m = Match::new("a_b".into(), &a, &b);

        assert_eq!(m.partner_of("a").unwrap().session_id, "b");
        assert_eq!(m.partner_of("b").unwrap().session_id, "a");
        assert!(m.partner_of("c").is_none());
    }

    #[test]
    fn dropped_receiver_means_disconnected() {
        let (a, rx_a) = entry("a");
        let (b, _rx_b) = entry("b");
        let m = Match::new("a_b".into(), &a, &b);
        assert!(m.seat("a").unwrap().is_connected());

        drop(rx_a);
        assert!(!m.seat("a").unwrap().is_connected());
        assert!(!m.seat("a").unwrap().send(ServerMessage::Error { message: "x".into() }));
        assert!(m.any_connected());
    }

    #[test]
    fn ready_set_never_exceeds_two() {
        let mut lock = RoundLock::new("r".into(), "m".into());
        assert_eq!(lock.mark_ready("a"), 1);
        assert_eq!(lock.mark_ready("a"), 1);
        assert_eq!(lock.mark_ready("b"), 2);
        assert_eq!(lock.mark_ready("c"), 2);
        assert!(!lock.ready_set.contains("c"));
    }

    #[test]
    fn spectators_are_added_once_and_receive_broadcasts() {
        let (a, _rx_a) = entry("a");
        let (b, _rx_b) = entry("b");
        let mut m = Match::new("a_b".into(), &a, &b);
        let (viewer, mut rx_viewer) = ClientHandle::channel();

        assert!(m.add_spectator(viewer.clone()));
        assert!(!m.add_spectator(viewer.clone()));
        m.broadcast(&ServerMessage::RoundError { message: "x".into() });
        assert!(rx_viewer.try_recv().is_ok());

        assert!(m.remove_spectator(viewer.id()));
        assert!(!m.remove_spectator(viewer.id()));
        assert!(m.spectators.is_empty());
    }
}
