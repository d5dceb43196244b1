//! 採点
//!
//! 正解地点からの距離を閾値半径で正規化する方式を採用している。
//! `points = floor(max_points * (1 - d / threshold))`、`d > threshold` は0点。

use crate::config::GameConfig;
use crate::utils::distance;
use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    pub distance: f64,
    pub valid: bool,
    pub points: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringPolicy {
    pub threshold: f64,
    pub max_points: u32,
}

impl ScoringPolicy {
    pub fn new(threshold: f64, max_points: u32) -> Self {
        Self { threshold, max_points }
    }

    pub fn from_config(config: &GameConfig) -> Self {
        Self::new(config.score_threshold, config.max_points)
    }

    pub fn score_distance(&self, d: f64) -> Score {
        let valid = d.is_finite() && d <= self.threshold;
        let points = if valid {
            (self.max_points as f64 * (1.0 - d / self.threshold)).floor().max(0.0) as u32
        } else {
            0
        };
        Score { distance: d, valid, points }
    }

    pub fn score_guess(&self, x: f64, y: f64, truth_x: f64, truth_y: f64) -> Score {
        self.score_distance(distance(x, y, truth_x, truth_y))
    }
}

/// timedモードの早押しボーナス
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeBonus {
    pub max_bonus: u32,
    pub window: Duration,
}

impl TimeBonus {
    pub fn from_config(config: &GameConfig) -> Self {
        Self {
            max_bonus: config.timed_bonus_max,
            window: config.timed_window(),
        }
    }

    /// 先に回答した側は満額、後から回答した側は遅れに応じて線形に減る
    pub fn bonus(&self, submitted_at: DateTime<Utc>, opponent_submitted_at: Option<DateTime<Utc>>) -> u32 {
        let Some(opponent_at) = opponent_submitted_at else {
            return self.max_bonus;
        };
        if submitted_at < opponent_at {
            return self.max_bonus;
        }
        let window_ms = self.window.num_milliseconds();
        if window_ms <= 0 {
            return 0;
        }
        let delay_ms = (submitted_at - opponent_at).num_milliseconds();
        let ratio = (1.0 - delay_ms as f64 / window_ms as f64).max(0.0);
        (self.max_bonus as f64 * ratio).round() as u32
    }
}
