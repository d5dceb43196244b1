use crate::error::GameError;
use crate::game::manager::GameManager;
use crate::game::state::{PlayerGameState, RoundData, RoundPhase};
use crate::models::{GuessAck, ServerMessage};
use actix::prelude::*;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

// 回答の採点結果（送信者向け）
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GuessOutcome {
    pub valid: bool,
    pub points: u32,
    pub total_points: u32,
    pub round_complete: bool,
    pub time_bonus: Option<u32>,
}

impl From<GuessOutcome> for GuessAck {
    fn from(outcome: GuessOutcome) -> Self {
        Self {
            success: true,
            points: Some(outcome.points),
            total_points: Some(outcome.total_points),
            round_complete: Some(outcome.round_complete),
            valid: Some(outcome.valid),
            error: None,
        }
    }
}

impl From<GameError> for GuessAck {
    fn from(err: GameError) -> Self {
        Self {
            success: false,
            error: Some(err.to_string()),
            ..Default::default()
        }
    }
}

impl GameManager {
    /// 回答を採点して記録
    ///
    /// 2人目の回答でラウンドが完了する。完了処理はここで一度だけ行われる。
    pub(crate) fn submit_guess(
        &mut self,
        session_id: &str,
        partner_hint: Option<&str>,
        x: f64,
        y: f64,
        ctx: &mut Context<Self>,
    ) -> Result<GuessOutcome, GameError> {
        let match_id = self
            .store
            .match_id_for(session_id)
            .cloned()
            .ok_or(GameError::PartnerNotFound)?;
        let m = self.store.get_match(&match_id).ok_or(GameError::PartnerNotFound)?;
        let partner_id = m
            .partner_of(session_id)
            .map(|s| s.session_id.clone())
            .ok_or(GameError::PartnerNotFound)?;
        if partner_hint.is_some_and(|hint| hint != partner_id) {
            return Err(GameError::PartnerNotFound);
        }
        if m.phase != RoundPhase::AwaitingGuesses {
            return Err(GameError::NoActiveRound);
        }
        let timed = m.is_timed();

        let round = self
            .store
            .round(&match_id)
            .cloned()
            .ok_or(GameError::NoActiveRound)?;
        let before = self
            .store
            .player_state(&match_id, session_id)
            .cloned()
            .unwrap_or_default();
        if before.has_submitted {
            debug!("🚫 Duplicate guess from {} in round {}", session_id, round.round_id);
            return Err(GameError::AlreadySubmitted);
        }
        let opponent = self
            .store
            .player_state(&match_id, &partner_id)
            .cloned()
            .unwrap_or_default();

        let score = self.scoring.score_guess(x, y, round.truth_x, round.truth_y);
        let now = Utc::now();
        let time_bonus = timed.then(|| {
            if score.valid {
                self.time_bonus.bonus(now, opponent.submitted_at)
            } else {
                0
            }
        });
        let points = score.points + time_bonus.unwrap_or(0);

        let mine = self.store.merge_player_state(&match_id, session_id, |s| {
            s.score += points;
            s.has_submitted = true;
            s.submitted_at = Some(now);
            s.round_points = points;
            s.round_valid = score.valid;
            s.round_bonus = time_bonus;
        });
        info!(
            "📍 Guess from {}: distance={:.4} valid={} points={} total={}",
            session_id, score.distance, score.valid, points, mine.score
        );

        let outcome = GuessOutcome {
            valid: score.valid,
            points,
            total_points: mine.score,
            round_complete: opponent.has_submitted,
            time_bonus,
        };

        // 送信者には常に暫定結果を先に返す
        if let Some(m) = self.store.get_match(&match_id) {
            if let Some(seat) = m.seat(session_id) {
                seat.send(validation_result(&mine, None, &round, false));
            }
            if !opponent.has_submitted {
                if let Some(seat) = m.seat(&partner_id) {
                    seat.send(ServerMessage::OpponentSubmitted {
                        session_id: session_id.to_string(),
                        points: mine.score,
                    });
                }
            }
        }
        if !opponent.has_submitted {
            self.update_spectators(&match_id);
            return Ok(outcome);
        }

        self.complete_round(&match_id, session_id, &partner_id, &round, ctx);
        Ok(outcome)
    }

    /// 両者回答済み: 結果をそれぞれの視点で送り、次へ進める
    fn complete_round(
        &mut self,
        match_id: &str,
        submitter: &str,
        partner_id: &str,
        round: &RoundData,
        ctx: &mut Context<Self>,
    ) {
        // 合計は必ずストアから読み直す
        let mine = self
            .store
            .player_state(match_id, submitter)
            .cloned()
            .unwrap_or_default();
        let theirs = self
            .store
            .player_state(match_id, partner_id)
            .cloned()
            .unwrap_or_default();

        let Some(m) = self.store.get_match(match_id) else {
            return;
        };
        if let Some(seat) = m.seat(submitter) {
            seat.send(validation_result(&mine, Some(theirs.score), round, true));
        }
        if let Some(seat) = m.seat(partner_id) {
            seat.send(validation_result(&theirs, Some(mine.score), round, true));
        }
        m.notify_spectators(&ServerMessage::RoundRevealed {
            round_id: round.round_id.clone(),
            correct_x: round.truth_x,
            correct_y: round.truth_y,
        });
        let finished = m.round_number >= self.config.max_rounds;
        info!(
            "🏆 Round {} complete for match {} ({} - {})",
            round.round_id, match_id, mine.score, theirs.score
        );

        self.reset_submissions(match_id);
        self.store.remove_round(match_id);
        if let Some(m) = self.store.get_match_mut(match_id) {
            m.phase = RoundPhase::Complete;
        }
        self.update_spectators(match_id);

        if finished {
            self.finish_match(match_id, ctx);
        } else {
            self.schedule_next_round(match_id, ctx);
        }
    }
}

fn validation_result(
    state: &PlayerGameState,
    opponent_points: Option<u32>,
    round: &RoundData,
    round_complete: bool,
) -> ServerMessage {
    ServerMessage::ValidationResult {
        valid: state.round_valid,
        points: state.round_points,
        total_points: state.score,
        opponent_points,
        correct_x: round.truth_x,
        correct_y: round.truth_y,
        round_complete,
        time_bonus: state.round_bonus,
    }
}
