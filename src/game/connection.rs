//! 接続・再接続の調整
//!
//! 接続が切れてもマッチは残る。同じセッションIDで戻ってきたクライアントに
//! 現在のマッチとラウンドを再送して追いつかせる。

use crate::game::manager::GameManager;
use crate::game::round::round_start;
use crate::game::state::{ClientHandle, MatchId, RoundPhase};
use crate::models::{RestoreResult, ServerMessage};
use actix::prelude::*;
use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

impl GameManager {
    /// 接続をセッションに紐付ける。マッチ中ならマッチIDを返す
    fn attach(&mut self, session_id: &str, client: ClientHandle) -> Option<MatchId> {
        if let Some(entry) = self.store.queue_entry_mut(session_id) {
            debug!("🔗 Queued session {} switched to client {}", session_id, client.id());
            entry.client = client;
            return None;
        }

        let Some(match_id) = self.store.match_id_for(session_id).cloned() else {
            warn!("❓ Unknown session {}", session_id);
            return None;
        };
        let m = self.store.get_match_mut(&match_id)?;
        let seat = m.seat_mut(session_id)?;
        seat.client = Some(client);
        seat.ready = true;
        m.abandoned_at = None;
        Some(match_id)
    }

    /// 接続の識別
    pub(crate) fn identify(&mut self, session_id: &str, client: ClientHandle, ctx: &mut Context<Self>) {
        info!("🔌 Client {} identified as session {}", client.id(), session_id);
        let Some(match_id) = self.attach(session_id, client.clone()) else {
            return;
        };

        let Some(m) = self.store.get_match(&match_id) else {
            return;
        };
        if m.phase == RoundPhase::AwaitingGuesses {
            // 配信済みのラウンドに途中から合流
            if let Some(round) = self.store.round(&match_id) {
                client.send(round_start(round.view(m.round_number)));
            }
            return;
        }
        self.drive_readiness(&match_id, ctx);
    }

    /// 再接続時のセッション復元
    pub(crate) fn reconnect(&mut self, session_id: &str, client: ClientHandle, ctx: &mut Context<Self>) -> RestoreResult {
        info!("🔄 Restoring session {} on client {}", session_id, client.id());
        let Some(match_id) = self.attach(session_id, client.clone()) else {
            return RestoreResult::failed();
        };
        let Some(m) = self.store.get_match(&match_id) else {
            return RestoreResult::failed();
        };
        let Some(partner_id) = m.partner_of(session_id).map(|s| s.session_id.clone()) else {
            return RestoreResult::failed();
        };

        client.send(ServerMessage::QueueMatched {
            session_id: session_id.to_string(),
            partner_id: partner_id.clone(),
            match_id: match_id.clone(),
            is_reconnect: true,
        });

        let round = match m.phase {
            RoundPhase::AwaitingGuesses => self.store.round(&match_id).map(|r| r.view(m.round_number)),
            _ => None,
        };
        let mine = self
            .store
            .player_state(&match_id, session_id)
            .cloned()
            .unwrap_or_default();
        let theirs = self
            .store
            .player_state(&match_id, &partner_id)
            .cloned()
            .unwrap_or_default();

        let Some(round) = round else {
            debug!("📭 No round in flight for match {}", match_id);
            self.drive_readiness(&match_id, ctx);
            return RestoreResult {
                success: true,
                session_id: Some(session_id.to_string()),
                match_id: Some(match_id),
                partner_id: Some(partner_id),
                round: None,
                game_state: Some(mine),
                no_round_data: true,
            };
        };

        client.send(round_start(round.clone()));
        client.send(ServerMessage::RestoreGameState {
            total_points: mine.score,
            partner_points: theirs.score,
            has_submitted: mine.has_submitted,
            opponent_has_submitted: theirs.has_submitted,
        });
        if let Some(partner) = m.seat(&partner_id) {
            partner.send(ServerMessage::ResendRoundData {
                session_id: session_id.to_string(),
            });
        }
        info!("✅ Session {} restored into round {}", session_id, round.round_id);

        RestoreResult {
            success: true,
            session_id: Some(session_id.to_string()),
            match_id: Some(match_id),
            partner_id: Some(partner_id),
            round: Some(round),
            game_state: Some(mine),
            no_round_data: false,
        }
    }

    /// 状態に応じてラウンド開始・配信を進める
    fn drive_readiness(&mut self, match_id: &str, ctx: &mut Context<Self>) {
        let Some(m) = self.store.get_match(match_id) else {
            return;
        };
        let (phase, both_ready, round_id) = (m.phase, m.both_ready(), m.round_id.clone());

        match phase {
            RoundPhase::Idle if both_ready => {
                info!("🎮 Both players ready in match {}", match_id);
                self.start_round(match_id, ctx);
            }
            RoundPhase::Idle => {
                debug!("⏳ Match {} waiting for the other player", match_id);
            }
            RoundPhase::Pending => {
                if let Some(round_id) = round_id {
                    self.check_readiness(&round_id, ctx);
                }
            }
            _ => {}
        }
    }

    /// 接続終了
    pub(crate) fn disconnect(&mut self, client_id: Uuid) {
        for entry in self.store.dequeue_where(|e| e.client.id() == client_id) {
            info!("🚪 Session {} left the queue", entry.session_id);
        }

        let now = Utc::now();
        let mut released = Vec::new();
        for m in self.store.matches_mut() {
            if m.remove_spectator(client_id) {
                debug!("👋 Spectator {} left match {}", client_id, m.match_id);
            }
            let mut touched = false;
            for seat in m.seats.iter_mut() {
                if seat.client.as_ref().is_some_and(|c| c.id() == client_id) {
                    seat.client = None;
                    seat.ready = false;
                    touched = true;
                    info!("🔌 Session {} disconnected from match {}", seat.session_id, m.match_id);
                    if let Some(round_id) = &m.round_id {
                        released.push((round_id.clone(), seat.session_id.clone()));
                    }
                }
            }
            if touched && !m.any_connected() && m.abandoned_at.is_none() {
                info!("💤 Match {} has no connected players", m.match_id);
                m.abandoned_at = Some(now);
            }
        }

        for (round_id, session_id) in released {
            if let Some(lock) = self.store.round_lock_mut(&round_id) {
                lock.ready_set.remove(&session_id);
            }
        }
    }

    /// 両者切断のまま一定時間経ったマッチを破棄
    pub(crate) fn sweep_abandoned(&mut self, ctx: &mut Context<Self>) {
        let cutoff = Utc::now() - self.config.abandon_after();
        let expired: Vec<MatchId> = self
            .store
            .matches()
            .filter(|m| m.abandoned_at.is_some_and(|at| at <= cutoff))
            .map(|m| m.match_id.clone())
            .collect();

        for match_id in expired {
            info!("🧹 Removing abandoned match {}", match_id);
            self.teardown_match(&match_id, ctx);
        }
    }
}
