//! ラウンド制御
//!
//! ロック作成 → 正解地点の取得 → 両者の接続確認 → 配信、の順で進める。
//! 取得は非同期なので、結果が返ってきた時点でまだ現在のラウンドか必ず確認する。

use crate::db::GroundTruth;
use crate::error::{GameError, PhotoError};
use crate::game::manager::GameManager;
use crate::game::state::{MatchId, PlayerGameState, RoundData, RoundId, RoundLock, RoundPhase, SessionId};
use crate::models::{RoundView, ServerMessage};
use crate::utils::generate_round_id;
use actix::prelude::*;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const NO_PHOTOS_MESSAGE: &str = "No photos available. Please try again.";
const FETCH_FAILED_MESSAGE: &str = "Failed to start round. Please try again.";

impl GameManager {
    /// 新しいラウンドを開始（前のロックは破棄）
    pub(crate) fn start_round(&mut self, match_id: &str, ctx: &mut Context<Self>) {
        let Some(m) = self.store.get_match_mut(match_id) else {
            warn!("⚠️ Cannot start round: match {} not found", match_id);
            return;
        };
        if m.phase == RoundPhase::Ended {
            return;
        }
        if let Some(handle) = m.advance_timer.take() {
            ctx.cancel_future(handle);
        }

        let round_id = generate_round_id();
        let stale = m.round_id.replace(round_id.clone());
        m.phase = RoundPhase::Pending;
        info!("🎲 Starting round {} for match {}", round_id, match_id);

        if let Some(stale) = stale {
            self.discard_lock(&stale, ctx);
        }
        self.store.remove_round(match_id);
        // 新しいラウンドは必ず未回答から
        self.reset_submissions(match_id);
        self.store
            .set_round_lock(RoundLock::new(round_id.clone(), match_id.to_string()));

        let photos = Arc::clone(&self.photos);
        let match_id = match_id.to_string();
        ctx.spawn(
            async move { photos.fetch_random_ground_truth().await }
                .into_actor(self)
                .map(move |result, act, ctx| act.on_ground_truth(match_id, round_id, result, ctx)),
        );
    }

    /// 正解地点の取得完了
    fn on_ground_truth(
        &mut self,
        match_id: MatchId,
        round_id: RoundId,
        result: Result<Option<GroundTruth>, PhotoError>,
        ctx: &mut Context<Self>,
    ) {
        let is_current = self
            .store
            .get_match(&match_id)
            .is_some_and(|m| m.phase == RoundPhase::Pending && m.round_id.as_ref() == Some(&round_id));
        if !is_current || self.store.round_lock(&round_id).is_none() {
            debug!("🗑️ Discarding content for superseded round {}", round_id);
            return;
        }

        let record = match result {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!("⚠️ No approved photos available for match {}", match_id);
                self.abort_round(&match_id, &round_id, NO_PHOTOS_MESSAGE, ctx);
                return;
            }
            Err(e) => {
                error!("❌ Failed to fetch ground truth for match {}: {}", match_id, e);
                self.abort_round(&match_id, &round_id, FETCH_FAILED_MESSAGE, ctx);
                return;
            }
        };

        let round = RoundData::new(round_id.clone(), match_id, record);
        info!("🖼️ Round {} uses photo {}", round_id, round.photo_ref);
        if let Some(lock) = self.store.round_lock_mut(&round_id) {
            lock.round_data = Some(round.clone());
        }
        self.store.set_round(round);

        self.check_readiness(&round_id, ctx);
    }

    /// 両者の接続が揃っていれば配信
    pub(crate) fn check_readiness(&mut self, round_id: &str, ctx: &mut Context<Self>) {
        let Some(lock) = self.store.round_lock(round_id) else {
            return;
        };
        if lock.round_data.is_none() {
            debug!("⏳ Round {} content not ready yet", round_id);
            return;
        }
        let match_id = lock.match_id.clone();

        let Some(m) = self.store.get_match(&match_id) else {
            return;
        };
        if m.phase != RoundPhase::Pending || m.round_id.as_deref() != Some(round_id) {
            return;
        }
        let connected: Vec<SessionId> = m
            .seats
            .iter()
            .filter(|s| s.is_connected())
            .map(|s| s.session_id.clone())
            .collect();

        let Some(lock) = self.store.round_lock_mut(round_id) else {
            return;
        };
        lock.ready_set.retain(|id| connected.contains(id));
        let mut ready = lock.ready_set.len();
        for id in &connected {
            ready = lock.mark_ready(id);
        }

        if ready < 2 {
            info!("⏳ Round {} waiting for connections ({}/2 ready)", round_id, ready);
            return;
        }
        self.broadcast_round(&match_id, round_id, ctx);
    }

    fn broadcast_round(&mut self, match_id: &str, round_id: &str, ctx: &mut Context<Self>) {
        let Some(round) = self
            .store
            .round_lock(round_id)
            .and_then(|lock| lock.round_data.clone())
        else {
            return;
        };

        let cleanup_id = round_id.to_string();
        let cleanup = ctx.run_later(self.config.round_lock_ttl(), move |act, _ctx| {
            act.expire_round_lock(&cleanup_id);
        });
        if let Some(lock) = self.store.round_lock_mut(round_id) {
            lock.ready_set.clear();
            if let Some(old) = lock.cleanup_timer.replace(cleanup) {
                ctx.cancel_future(old);
            }
        }

        let Some(m) = self.store.get_match_mut(match_id) else {
            return;
        };
        m.round_number += 1;
        m.phase = RoundPhase::AwaitingGuesses;
        let view = round.view(m.round_number);
        info!(
            "📸 Round {} (#{}) broadcast to match {}",
            view.round_id, view.round_number, match_id
        );
        m.broadcast(&round_start(view));
    }

    /// ロックの寿命切れ
    fn expire_round_lock(&mut self, round_id: &str) {
        let Some(lock) = self.store.remove_round_lock(round_id) else {
            return;
        };
        debug!("⌛ Round lock {} expired", round_id);

        let Some(m) = self.store.get_match_mut(&lock.match_id) else {
            return;
        };
        if m.round_id.as_deref() != Some(round_id) {
            return;
        }
        m.round_id = None;
        if m.phase == RoundPhase::AwaitingGuesses {
            m.phase = RoundPhase::Idle;
            self.store.remove_round(&lock.match_id);
            self.reset_submissions(&lock.match_id);
            info!("⌛ Round {} expired without completion", round_id);
        }
    }

    /// 両者の回答フラグを戻す（累計スコアは残す）
    pub(crate) fn reset_submissions(&mut self, match_id: &str) {
        let Some(ids) = self.store.get_match(match_id).map(|m| m.session_ids()) else {
            return;
        };
        for id in ids {
            self.store
                .merge_player_state(match_id, &id, PlayerGameState::reset_submission);
        }
    }

    /// ロックを破棄（タイマーも止める）
    pub(crate) fn discard_lock(&mut self, round_id: &str, ctx: &mut Context<Self>) {
        if let Some(lock) = self.store.remove_round_lock(round_id) {
            if let Some(handle) = lock.cleanup_timer {
                ctx.cancel_future(handle);
            }
            debug!("🧹 Round lock {} discarded", round_id);
        }
    }

    /// コンテンツが用意できなかったラウンドを取り消す
    fn abort_round(&mut self, match_id: &str, round_id: &str, message: &str, ctx: &mut Context<Self>) {
        self.discard_lock(round_id, ctx);
        let Some(m) = self.store.get_match_mut(match_id) else {
            return;
        };
        m.phase = RoundPhase::Idle;
        m.round_id = None;
        m.broadcast(&ServerMessage::RoundError {
            message: message.to_string(),
        });
    }

    /// ラウンドのやり直し（スコアは維持）
    pub(crate) fn restart_session(&mut self, session_id: &str, partner_hint: Option<&str>, ctx: &mut Context<Self>) {
        let Some(match_id) = self.store.match_id_for(session_id).cloned() else {
            debug!("❓ Restart for unknown session {}", session_id);
            return;
        };
        let Some(m) = self.store.get_match_mut(&match_id) else {
            return;
        };
        if let Some(hint) = partner_hint {
            if m.partner_of(session_id).map(|s| s.session_id.as_str()) != Some(hint) {
                warn!("⚠️ Restart from {} names a different partner ({})", session_id, hint);
                return;
            }
        }
        if m.phase == RoundPhase::Ended {
            return;
        }
        if let Some(handle) = m.advance_timer.take() {
            ctx.cancel_future(handle);
        }

        info!("🔁 Restarting round for match {}", match_id);
        self.start_round(&match_id, ctx);
    }

    /// 次ラウンドを遅延開始
    pub(crate) fn schedule_next_round(&mut self, match_id: &str, ctx: &mut Context<Self>) {
        let id = match_id.to_string();
        let handle = ctx.run_later(self.config.next_round_delay(), move |act, ctx| {
            let Some(m) = act.store.get_match_mut(&id) else {
                return;
            };
            m.advance_timer = None;
            if m.phase == RoundPhase::Complete {
                act.start_round(&id, ctx);
            }
        });
        if let Some(m) = self.store.get_match_mut(match_id) {
            if let Some(old) = m.advance_timer.replace(handle) {
                ctx.cancel_future(old);
            }
        }
    }

    /// 最終ラウンド後の結果通知
    ///
    /// マッチは再戦の受付期間だけ残し、期限が来たら破棄する。
    pub(crate) fn finish_match(&mut self, match_id: &str, ctx: &mut Context<Self>) {
        let Some(m) = self.store.get_match_mut(match_id) else {
            return;
        };
        m.phase = RoundPhase::Ended;
        let [a, b] = m.session_ids();
        if let Some(handle) = m.advance_timer.take() {
            ctx.cancel_future(handle);
        }
        if let Some(round_id) = m.round_id.take() {
            self.discard_lock(&round_id, ctx);
        }

        let score = |id: &str| self.store.player_state(match_id, id).map_or(0, |s| s.score);
        let (score_a, score_b) = (score(&a), score(&b));
        let (winner, tie) = match score_a.cmp(&score_b) {
            Ordering::Greater => (Some(a), false),
            Ordering::Less => (Some(b), false),
            Ordering::Equal => (None, true),
        };
        info!(
            "🏁 Match {} finished ({} - {}), winner: {:?}",
            match_id, score_a, score_b, winner
        );

        if let Some(m) = self.store.get_match(match_id) {
            m.broadcast(&ServerMessage::GameOver { winner, tie });
        }

        let id = match_id.to_string();
        let close = ctx.run_later(self.config.rematch_window(), move |act, ctx| {
            let Some(m) = act.store.get_match_mut(&id) else {
                return;
            };
            m.advance_timer = None;
            if m.phase == RoundPhase::Ended {
                info!("🚪 Rematch window closed for match {}", id);
                act.teardown_match(&id, ctx);
            }
        });
        if let Some(m) = self.store.get_match_mut(match_id) {
            m.advance_timer = Some(close);
        }
    }

    /// 再戦の希望を記録し、両者そろえば新しいゲームを始める
    pub(crate) fn request_rematch(&mut self, session_id: &str, ctx: &mut Context<Self>) -> Result<(), GameError> {
        let match_id = self
            .store
            .match_id_for(session_id)
            .cloned()
            .ok_or(GameError::SessionNotFound)?;
        let m = self
            .store
            .get_match_mut(&match_id)
            .ok_or(GameError::SessionNotFound)?;
        if m.phase != RoundPhase::Ended {
            return Err(GameError::MatchInProgress);
        }
        let seat = m.seat_mut(session_id).ok_or(GameError::SessionNotFound)?;
        seat.wants_rematch = true;
        info!("🔁 Rematch requested by {} in match {}", session_id, match_id);

        let requested: Vec<SessionId> = m
            .seats
            .iter()
            .filter(|s| s.wants_rematch)
            .map(|s| s.session_id.clone())
            .collect();
        let agreed = requested.len() == m.seats.len();
        m.broadcast(&ServerMessage::RematchStatus { requested });
        if !agreed {
            return Ok(());
        }

        if let Some(handle) = m.advance_timer.take() {
            ctx.cancel_future(handle);
        }
        m.round_number = 0;
        m.phase = RoundPhase::Idle;
        m.abandoned_at = None;
        for seat in m.seats.iter_mut() {
            seat.wants_rematch = false;
        }
        m.broadcast(&ServerMessage::RematchStarting);
        let ids = m.session_ids();

        for id in &ids {
            self.store
                .merge_player_state(&match_id, id, |s| *s = PlayerGameState::default());
        }
        info!("🎬 Rematch starting for match {}", match_id);
        self.start_round(&match_id, ctx);
        Ok(())
    }

    /// 配信中ラウンドの公開情報
    pub(crate) fn current_round(&self, session_id: &str) -> Result<RoundView, GameError> {
        let m = self
            .store
            .match_for_session(session_id)
            .ok_or(GameError::SessionNotFound)?;
        if m.phase != RoundPhase::AwaitingGuesses {
            return Err(GameError::NoActiveRound);
        }
        self.store
            .round(&m.match_id)
            .map(|round| round.view(m.round_number))
            .ok_or(GameError::NoActiveRound)
    }
}

pub(crate) fn round_start(view: RoundView) -> ServerMessage {
    ServerMessage::RoundStart {
        round_id: view.round_id,
        photo_ref: view.photo_ref,
        round_number: view.round_number,
    }
}
