mod common;

use async_trait::async_trait;
use common::{
    TestClient, identify, is_round_start, matched_pair, start_first_round, start_manager,
    start_manager_with, test_config,
};
use geoguess_versus::config::GameConfig;
use geoguess_versus::db::{GroundTruth, PhotoSource, StaticPhotoSource};
use geoguess_versus::error::{GameError, PhotoError};
use geoguess_versus::game::manager::{GetStats, InspectSession, RequestCurrentRound, RestartSession, SubmitGuess};
use geoguess_versus::game::state::{ClientHandle, RoundPhase};
use geoguess_versus::models::ServerMessage;
use std::sync::Arc;
use tokio::time::{Duration, sleep};

struct FailingPhotoSource;

#[async_trait]
impl PhotoSource for FailingPhotoSource {
    async fn fetch_random_ground_truth(&self) -> Result<Option<GroundTruth>, PhotoError> {
        Err(PhotoError::Database(sqlx::Error::PoolTimedOut))
    }
}

fn guess(session_id: &str, x: f64, y: f64) -> SubmitGuess {
    SubmitGuess {
        session_id: session_id.to_string(),
        partner_id: None,
        x,
        y,
    }
}

#[actix_rt::test]
async fn test_round_waits_until_both_identified() {
    let gm = start_manager(test_config());
    let mut pair = matched_pair(&gm, None).await;

    identify(&gm, &pair.a_id, &pair.a.handle).await;
    pair.a.assert_silent(Duration::from_millis(200)).await;

    identify(&gm, &pair.b_id, &pair.b.handle).await;
    let to_a = pair.a.wait_for(is_round_start).await;
    let to_b = pair.b.wait_for(is_round_start).await;
    assert_eq!(to_a, to_b);
    assert!(matches!(
        &to_a,
        ServerMessage::RoundStart { photo_ref, round_number: 1, .. } if photo_ref == "photos/harbor.jpg"
    ));
}

#[actix_rt::test]
async fn test_pending_round_is_released_by_reconnect() {
    let gm = start_manager(test_config());
    let mut pair = matched_pair(&gm, None).await;

    // bは接続が切れたハンドルでIdentifyする
    let (dead, dead_rx) = ClientHandle::channel();
    drop(dead_rx);
    identify(&gm, &pair.a_id, &pair.a.handle).await;
    identify(&gm, &pair.b_id, &dead).await;

    pair.a.assert_silent(Duration::from_millis(200)).await;
    let snapshot = gm
        .send(InspectSession {
            session_id: pair.a_id.clone(),
        })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.phase, RoundPhase::Pending);
    assert_eq!(gm.send(GetStats).await.unwrap().round_locks, 1);

    let mut fresh = TestClient::new();
    identify(&gm, &pair.b_id, &fresh.handle).await;
    let to_a = pair.a.wait_for(is_round_start).await;
    let to_b = fresh.wait_for(is_round_start).await;
    assert_eq!(to_a, to_b);
}

#[actix_rt::test]
async fn test_empty_catalog_reports_round_error() {
    let gm = start_manager_with(Arc::new(StaticPhotoSource::new(Vec::new())), test_config());
    let mut pair = matched_pair(&gm, None).await;

    identify(&gm, &pair.a_id, &pair.a.handle).await;
    identify(&gm, &pair.b_id, &pair.b.handle).await;

    let expected = ServerMessage::RoundError {
        message: "No photos available. Please try again.".into(),
    };
    assert_eq!(pair.a.next().await, expected);
    assert_eq!(pair.b.next().await, expected);

    let snapshot = gm
        .send(InspectSession {
            session_id: pair.b_id.clone(),
        })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.phase, RoundPhase::Idle);
    assert_eq!(snapshot.round_number, 0);
    assert_eq!(gm.send(GetStats).await.unwrap().round_locks, 0);

    let err = gm.send(guess(&pair.a_id, 0.5, 0.5)).await.unwrap().unwrap_err();
    assert_eq!(err, GameError::NoActiveRound);
}

#[actix_rt::test]
async fn test_fetch_failure_reports_round_error() {
    let gm = start_manager_with(Arc::new(FailingPhotoSource), test_config());
    let mut pair = matched_pair(&gm, None).await;

    identify(&gm, &pair.a_id, &pair.a.handle).await;
    identify(&gm, &pair.b_id, &pair.b.handle).await;

    let expected = ServerMessage::RoundError {
        message: "Failed to start round. Please try again.".into(),
    };
    assert_eq!(pair.a.next().await, expected);
    assert_eq!(pair.b.next().await, expected);
}

#[actix_rt::test]
async fn test_restart_issues_fresh_round_and_keeps_scores() {
    let gm = start_manager(test_config());
    let mut pair = matched_pair(&gm, None).await;
    let (first_round, _) = start_first_round(&gm, &mut pair).await;

    let outcome = gm.send(guess(&pair.a_id, 0.52, 0.51)).await.unwrap().unwrap();
    assert_eq!(outcome.points, 776);

    gm.send(RestartSession {
        session_id: pair.a_id.clone(),
        partner_id: Some(pair.b_id.clone()),
    })
    .await
    .unwrap();

    let restarted = pair.a.wait_for(is_round_start).await;
    let ServerMessage::RoundStart { round_id, photo_ref, .. } = &restarted else {
        panic!("unexpected message: {:?}", restarted);
    };
    assert_ne!(round_id, &first_round);
    assert_eq!(photo_ref, "photos/ridge.jpg");
    assert_eq!(pair.b.wait_for(is_round_start).await, restarted);

    let snapshot = gm
        .send(InspectSession {
            session_id: pair.a_id.clone(),
        })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.total_points, 776);
    assert!(!snapshot.has_submitted);

    // 新しいラウンドでは再び回答できる
    assert!(gm.send(guess(&pair.a_id, 0.25, 0.75)).await.unwrap().is_ok());
}

#[actix_rt::test]
async fn test_restart_with_wrong_partner_is_ignored() {
    let gm = start_manager(test_config());
    let mut pair = matched_pair(&gm, None).await;
    let (round_id, _) = start_first_round(&gm, &mut pair).await;

    gm.send(RestartSession {
        session_id: pair.a_id.clone(),
        partner_id: Some("someone-else".into()),
    })
    .await
    .unwrap();
    pair.a.assert_silent(Duration::from_millis(200)).await;

    let current = gm
        .send(RequestCurrentRound {
            session_id: pair.b_id.clone(),
        })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current.round_id, round_id);
}

#[actix_rt::test]
async fn test_next_round_starts_after_completion() {
    let gm = start_manager(test_config());
    let mut pair = matched_pair(&gm, None).await;
    start_first_round(&gm, &mut pair).await;

    gm.send(guess(&pair.a_id, 0.5, 0.5)).await.unwrap().unwrap();
    gm.send(guess(&pair.b_id, 0.55, 0.5)).await.unwrap().unwrap();

    let next = pair.a.wait_for(is_round_start).await;
    assert!(matches!(next, ServerMessage::RoundStart { round_number: 2, .. }));
    assert_eq!(pair.b.wait_for(is_round_start).await, next);
}

#[actix_rt::test]
async fn test_restart_cancels_pending_advance() {
    let config = GameConfig {
        next_round_delay_ms: 300,
        ..Default::default()
    };
    let gm = start_manager(config);
    let mut pair = matched_pair(&gm, None).await;
    start_first_round(&gm, &mut pair).await;

    gm.send(guess(&pair.a_id, 0.5, 0.5)).await.unwrap().unwrap();
    gm.send(guess(&pair.b_id, 0.5, 0.5)).await.unwrap().unwrap();
    gm.send(RestartSession {
        session_id: pair.b_id.clone(),
        partner_id: None,
    })
    .await
    .unwrap();

    let restarted = pair.a.wait_for(is_round_start).await;
    assert!(matches!(restarted, ServerMessage::RoundStart { round_number: 2, .. }));
    // 予約されていた次ラウンドは発火しない
    pair.a.assert_silent(Duration::from_millis(600)).await;
}

#[actix_rt::test]
async fn test_final_round_declares_winner() {
    let config = GameConfig {
        max_rounds: 1,
        ..test_config()
    };
    let gm = start_manager(config);
    let mut pair = matched_pair(&gm, None).await;
    start_first_round(&gm, &mut pair).await;

    gm.send(guess(&pair.a_id, 0.5, 0.5)).await.unwrap().unwrap();
    gm.send(guess(&pair.b_id, 0.9, 0.9)).await.unwrap().unwrap();

    let expected = ServerMessage::GameOver {
        winner: Some(pair.a_id.clone()),
        tie: false,
    };
    let is_game_over = |m: &ServerMessage| matches!(m, ServerMessage::GameOver { .. });
    assert_eq!(pair.a.wait_for(is_game_over).await, expected);
    assert_eq!(pair.b.wait_for(is_game_over).await, expected);

    // 再戦の受付中はマッチが残る
    let stats = gm.send(GetStats).await.unwrap();
    assert_eq!(stats.active_matches, 1);
    assert_eq!(stats.round_locks, 0);
    let snapshot = gm
        .send(InspectSession {
            session_id: pair.a_id.clone(),
        })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.phase, RoundPhase::Ended);
    assert_eq!(snapshot.total_points, 1000);

    let err = gm.send(guess(&pair.a_id, 0.5, 0.5)).await.unwrap().unwrap_err();
    assert_eq!(err, GameError::NoActiveRound);
}

#[actix_rt::test]
async fn test_final_round_can_tie() {
    let config = GameConfig {
        max_rounds: 1,
        ..test_config()
    };
    let gm = start_manager(config);
    let mut pair = matched_pair(&gm, None).await;
    start_first_round(&gm, &mut pair).await;

    gm.send(guess(&pair.a_id, 0.52, 0.51)).await.unwrap().unwrap();
    gm.send(guess(&pair.b_id, 0.48, 0.49)).await.unwrap().unwrap();

    let result = pair
        .b
        .wait_for(|m| matches!(m, ServerMessage::ValidationResult { round_complete: true, .. }))
        .await;
    assert!(matches!(
        result,
        ServerMessage::ValidationResult {
            round_complete: true,
            total_points: 776,
            opponent_points: Some(776),
            ..
        }
    ));
    let over = pair.b.next().await;
    assert_eq!(over, ServerMessage::GameOver { winner: None, tie: true });
}

#[actix_rt::test]
async fn test_expired_round_lock_resets_round() {
    let config = GameConfig {
        round_lock_ttl_secs: 1,
        ..test_config()
    };
    let gm = start_manager(config);
    let mut pair = matched_pair(&gm, None).await;
    start_first_round(&gm, &mut pair).await;

    let first = gm.send(guess(&pair.a_id, 0.52, 0.51)).await.unwrap().unwrap();
    assert!(!first.round_complete);
    sleep(Duration::from_millis(1500)).await;

    assert_eq!(gm.send(GetStats).await.unwrap().round_locks, 0);
    let snapshot = gm
        .send(InspectSession {
            session_id: pair.b_id.clone(),
        })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.phase, RoundPhase::Idle);
    assert!(!snapshot.has_submitted);
    assert!(!snapshot.opponent_has_submitted);
    assert_eq!(snapshot.partner_points, 776);
    let err = gm.send(guess(&pair.b_id, 0.5, 0.5)).await.unwrap().unwrap_err();
    assert_eq!(err, GameError::NoActiveRound);

    // 再接続で次のラウンドが始まり、通常どおり採点される
    identify(&gm, &pair.a_id, &pair.a.handle).await;
    let next = pair.a.wait_for(is_round_start).await;
    assert!(matches!(next, ServerMessage::RoundStart { round_number: 2, .. }));
    assert_eq!(pair.b.wait_for(is_round_start).await, next);

    let a = gm.send(guess(&pair.a_id, 0.25, 0.75)).await.unwrap().unwrap();
    assert!(!a.round_complete);
    assert_eq!(a.total_points, 1776);
    let b = gm.send(guess(&pair.b_id, 0.25, 0.75)).await.unwrap().unwrap();
    assert!(b.round_complete);
    assert_eq!(b.total_points, 1000);
}

#[actix_rt::test]
async fn test_current_round_lookup() {
    let gm = start_manager(test_config());
    let unknown = gm
        .send(RequestCurrentRound {
            session_id: "nobody".into(),
        })
        .await
        .unwrap();
    assert_eq!(unknown, Err(GameError::SessionNotFound));

    let mut pair = matched_pair(&gm, None).await;
    let before = gm
        .send(RequestCurrentRound {
            session_id: pair.a_id.clone(),
        })
        .await
        .unwrap();
    assert_eq!(before, Err(GameError::NoActiveRound));

    let (round_id, photo_ref) = start_first_round(&gm, &mut pair).await;
    let current = gm
        .send(RequestCurrentRound {
            session_id: pair.a_id.clone(),
        })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current.round_id, round_id);
    assert_eq!(current.photo_ref, photo_ref);
    assert_eq!(current.round_number, 1);
}
