//! 観戦
//!
//! 観戦者はマッチ全体への配信（RoundStart・GameOverなど）と、回答ごとの状態更新を受け取る。
//! 正解座標はラウンド完了後の RoundRevealed でのみ届く。

use crate::error::GameError;
use crate::game::manager::GameManager;
use crate::game::state::{ClientHandle, Match, RoundPhase};
use crate::models::{MatchSummary, ServerMessage, SpectatedPlayer, SpectatorView};
use tracing::{debug, info};
use uuid::Uuid;

impl GameManager {
    /// 観戦できる進行中マッチ（古い順）
    pub(crate) fn active_matches(&self) -> Vec<MatchSummary> {
        let mut matches: Vec<MatchSummary> = self
            .store
            .matches()
            .filter(|m| m.is_started())
            .map(|m| MatchSummary {
                match_id: m.match_id.clone(),
                players: m.session_ids().to_vec(),
                modifier: m.modifier.clone(),
                round_number: m.round_number,
                created_at: m.created_at,
            })
            .collect();
        matches.sort_by_key(|m| m.created_at);
        debug!("📋 {} active matches", matches.len());
        matches
    }

    pub(crate) fn spectate(&mut self, match_id: &str, client: ClientHandle) -> Result<SpectatorView, GameError> {
        let m = self.store.get_match_mut(match_id).ok_or(GameError::MatchNotFound)?;
        if m.round_number == 0 {
            return Err(GameError::MatchNotStarted);
        }
        let client_id = client.id();
        if m.add_spectator(client) {
            info!("👀 Client {} is spectating match {}", client_id, match_id);
        }
        self.store
            .get_match(match_id)
            .map(|m| self.spectator_view(m))
            .ok_or(GameError::MatchNotFound)
    }

    pub(crate) fn stop_spectating(&mut self, match_id: &str, client_id: Uuid) {
        let Some(m) = self.store.get_match_mut(match_id) else {
            debug!("❓ Stop spectating unknown match {}", match_id);
            return;
        };
        if m.remove_spectator(client_id) {
            info!("👋 Client {} stopped spectating match {}", client_id, match_id);
        }
    }

    pub(crate) fn spectator_view(&self, m: &Match) -> SpectatorView {
        let round = match m.phase {
            RoundPhase::AwaitingGuesses => self.store.round(&m.match_id).map(|r| r.view(m.round_number)),
            _ => None,
        };
        let players = m
            .seats
            .iter()
            .map(|seat| {
                let state = self
                    .store
                    .player_state(&m.match_id, &seat.session_id)
                    .cloned()
                    .unwrap_or_default();
                SpectatedPlayer {
                    session_id: seat.session_id.clone(),
                    points: state.score,
                    has_submitted: state.has_submitted,
                    connected: seat.is_connected(),
                }
            })
            .collect();
        SpectatorView {
            match_id: m.match_id.clone(),
            phase: m.phase,
            round_number: m.round_number,
            round,
            players,
        }
    }

    /// 観戦者へ最新の状態を送る
    pub(crate) fn update_spectators(&self, match_id: &str) {
        let Some(m) = self.store.get_match(match_id) else {
            return;
        };
        if m.spectators.is_empty() {
            return;
        }
        m.notify_spectators(&ServerMessage::SpectatorUpdate(self.spectator_view(m)));
    }
}
