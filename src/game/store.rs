//! セッションストア
//!
//! 待機キュー・マッチ・ラウンド・ロック・スコアの唯一の保持場所。
//! ゲームロジックもロックも持たない。呼び出し側（GameManagerアクター）が直列化する。

use crate::game::state::{
    Match, MatchId, PlayerGameState, QueueEntry, RoundData, RoundId, RoundLock, SessionId,
};
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Default)]
pub struct SessionStore {
    queue: VecDeque<QueueEntry>,
    matches: HashMap<MatchId, Match>,
    session_index: HashMap<SessionId, MatchId>,
    rounds: HashMap<MatchId, RoundData>,
    round_locks: HashMap<RoundId, RoundLock>,
    game_states: HashMap<MatchId, HashMap<SessionId, PlayerGameState>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    // --- 待機キュー ---

    pub fn enqueue(&mut self, entry: QueueEntry) {
        self.queue.push_back(entry);
    }

    /// 条件に合う最古のエントリを取り出す（検索と削除を一度に行う）
    pub fn claim_from_queue(&mut self, predicate: impl Fn(&QueueEntry) -> bool) -> Option<QueueEntry> {
        let index = self.queue.iter().position(|e| predicate(e))?;
        self.queue.remove(index)
    }

    /// 条件に合うエントリをすべて取り除く
    pub fn dequeue_where(&mut self, predicate: impl Fn(&QueueEntry) -> bool) -> Vec<QueueEntry> {
        let (removed, kept): (Vec<_>, Vec<_>) = self.queue.drain(..).partition(|e| predicate(e));
        self.queue = kept.into();
        removed
    }

    pub fn queue_entry_mut(&mut self, session_id: &str) -> Option<&mut QueueEntry> {
        self.queue.iter_mut().find(|e| e.session_id == session_id)
    }

    pub fn queue(&self) -> impl Iterator<Item = &QueueEntry> {
        self.queue.iter()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    // --- マッチ ---

    pub fn insert_match(&mut self, m: Match) {
        self.matches.insert(m.match_id.clone(), m);
    }

    pub fn get_match(&self, match_id: &str) -> Option<&Match> {
        self.matches.get(match_id)
    }

    pub fn get_match_mut(&mut self, match_id: &str) -> Option<&mut Match> {
        self.matches.get_mut(match_id)
    }

    pub fn remove_match(&mut self, match_id: &str) -> Option<Match> {
        self.matches.remove(match_id)
    }

    pub fn matches(&self) -> impl Iterator<Item = &Match> {
        self.matches.values()
    }

    pub fn matches_mut(&mut self) -> impl Iterator<Item = &mut Match> {
        self.matches.values_mut()
    }

    pub fn match_count(&self) -> usize {
        self.matches.len()
    }

    // --- セッション→マッチ索引 ---

    pub fn index_session(&mut self, session_id: SessionId, match_id: MatchId) {
        self.session_index.insert(session_id, match_id);
    }

    pub fn match_id_for(&self, session_id: &str) -> Option<&MatchId> {
        self.session_index.get(session_id)
    }

    pub fn unindex_session(&mut self, session_id: &str) -> Option<MatchId> {
        self.session_index.remove(session_id)
    }

    /// 索引経由でマッチを引く
    pub fn match_for_session(&self, session_id: &str) -> Option<&Match> {
        self.match_id_for(session_id).and_then(|id| self.matches.get(id))
    }

    // --- ラウンド ---

    pub fn set_round(&mut self, round: RoundData) {
        self.rounds.insert(round.match_id.clone(), round);
    }

    pub fn round(&self, match_id: &str) -> Option<&RoundData> {
        self.rounds.get(match_id)
    }

    pub fn remove_round(&mut self, match_id: &str) -> Option<RoundData> {
        self.rounds.remove(match_id)
    }

    // --- ラウンドロック ---

    pub fn set_round_lock(&mut self, lock: RoundLock) {
        self.round_locks.insert(lock.round_id.clone(), lock);
    }

    pub fn round_lock(&self, round_id: &str) -> Option<&RoundLock> {
        self.round_locks.get(round_id)
    }

    pub fn round_lock_mut(&mut self, round_id: &str) -> Option<&mut RoundLock> {
        self.round_locks.get_mut(round_id)
    }

    pub fn remove_round_lock(&mut self, round_id: &str) -> Option<RoundLock> {
        self.round_locks.remove(round_id)
    }

    pub fn round_lock_count(&self) -> usize {
        self.round_locks.len()
    }

    // --- スコア状態 ---

    pub fn player_state(&self, match_id: &str, session_id: &str) -> Option<&PlayerGameState> {
        self.game_states.get(match_id)?.get(session_id)
    }

    /// プレイヤー状態を更新して結果を返す（未登録なら初期値から）
    pub fn merge_player_state(
        &mut self,
        match_id: &str,
        session_id: &str,
        update: impl FnOnce(&mut PlayerGameState),
    ) -> PlayerGameState {
        let state = self
            .game_states
            .entry(match_id.to_string())
            .or_default()
            .entry(session_id.to_string())
            .or_default();
        update(state);
        state.clone()
    }

    pub fn game_state(&self, match_id: &str) -> Option<&HashMap<SessionId, PlayerGameState>> {
        self.game_states.get(match_id)
    }

    pub fn remove_game_state(&mut self, match_id: &str) -> Option<HashMap<SessionId, PlayerGameState>> {
        self.game_states.remove(match_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::ClientHandle;

    fn queued(store: &mut SessionStore, id: &str, modifier: &str) -> ClientHandle {
        let (client, _rx) = ClientHandle::channel();
        store.enqueue(QueueEntry::new(id.to_string(), client.clone(), modifier.to_string()));
        client
    }

    #[test]
    fn claim_takes_oldest_matching_entry() {
        let mut store = SessionStore::new();
        queued(&mut store, "a", "timed");
        queued(&mut store, "b", "default");
        queued(&mut store, "c", "default");

        let claimed = store.claim_from_queue(|e| e.modifier == "default").unwrap();
        assert_eq!(claimed.session_id, "b");
        assert_eq!(store.queue_len(), 2);
        assert!(store.queue().all(|e| e.session_id != "b"));
    }

    #[test]
    fn dequeue_where_keeps_order_of_rest() {
        let mut store = SessionStore::new();
        let client = queued(&mut store, "a", "default");
        queued(&mut store, "b", "default");
        store.enqueue(QueueEntry::new("c".into(), client.clone(), "default".into()));

        let removed = store.dequeue_where(|e| e.client.id() == client.id());
        assert_eq!(removed.len(), 2);
        let rest: Vec<_> = store.queue().map(|e| e.session_id.as_str()).collect();
        assert_eq!(rest, vec!["b"]);
    }

    #[test]
    fn merge_player_state_creates_and_updates() {
        let mut store = SessionStore::new();
        let state = store.merge_player_state("m", "a", |s| s.score += 10);
        assert_eq!(state.score, 10);

        let state = store.merge_player_state("m", "a", |s| {
            s.score += 5;
            s.has_submitted = true;
        });
        assert_eq!(state.score, 15);
        assert!(store.player_state("m", "a").unwrap().has_submitted);
        assert!(store.player_state("m", "b").is_none());

        assert!(store.remove_game_state("m").is_some());
        assert!(store.game_state("m").is_none());
    }

    #[test]
    fn session_index_resolves_match() {
        let mut store = SessionStore::new();
        let (a, _rx_a) = ClientHandle::channel();
        let (b, _rx_b) = ClientHandle::channel();
        let entry_a = QueueEntry::new("a".into(), a, "default".into());
        let entry_b = QueueEntry::new("b".into(), b, "default".into());
        store.insert_match(Match::new("a_b".into(), &entry_a, &entry_b));
        store.index_session("a".into(), "a_b".into());

        assert_eq!(store.match_for_session("a").unwrap().match_id, "a_b");
        assert!(store.match_for_session("b").is_none());
        assert_eq!(store.unindex_session("a").as_deref(), Some("a_b"));
        assert!(store.match_for_session("a").is_none());
    }
}
