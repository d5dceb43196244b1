#![allow(dead_code)]

use actix::{Actor, Addr};
use geoguess_versus::config::GameConfig;
use geoguess_versus::db::{GroundTruth, PhotoSource, StaticPhotoSource};
use geoguess_versus::game::GameManager;
use geoguess_versus::game::manager::{Identify, JoinQueue};
use geoguess_versus::game::state::ClientHandle;
use geoguess_versus::models::ServerMessage;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Duration, timeout};

pub const WAIT: Duration = Duration::from_secs(2);

/// テスト用設定（次ラウンドまでの待ちを短く）
pub fn test_config() -> GameConfig {
    GameConfig {
        next_round_delay_ms: 50,
        ..Default::default()
    }
}

/// 1枚目は (0.5, 0.5)、2枚目は (0.25, 0.75)
pub fn test_photos() -> Arc<StaticPhotoSource> {
    Arc::new(StaticPhotoSource::new(vec![
        GroundTruth::new("photos/harbor.jpg", 0.5, 0.5),
        GroundTruth::new("photos/ridge.jpg", 0.25, 0.75),
    ]))
}

pub fn start_manager(config: GameConfig) -> Addr<GameManager> {
    start_manager_with(test_photos(), config)
}

pub fn start_manager_with(photos: Arc<dyn PhotoSource>, config: GameConfig) -> Addr<GameManager> {
    GameManager::new(photos, config).start()
}

/// チャンネルの受信側を持つ疑似クライアント
pub struct TestClient {
    pub handle: ClientHandle,
    pub rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl TestClient {
    pub fn new() -> Self {
        let (handle, rx) = ClientHandle::channel();
        Self { handle, rx }
    }

    pub async fn next(&mut self) -> ServerMessage {
        timeout(WAIT, self.rx.recv())
            .await
            .expect("timed out waiting for server message")
            .expect("channel closed")
    }

    /// 条件に合うメッセージまで読み飛ばす
    pub async fn wait_for(&mut self, predicate: impl Fn(&ServerMessage) -> bool) -> ServerMessage {
        loop {
            let msg = self.next().await;
            if predicate(&msg) {
                return msg;
            }
        }
    }

    /// 指定時間メッセージが来ないこと
    pub async fn assert_silent(&mut self, duration: Duration) {
        if let Ok(Some(msg)) = timeout(duration, self.rx.recv()).await {
            panic!("unexpected message: {:?}", msg);
        }
    }
}

pub fn is_round_start(msg: &ServerMessage) -> bool {
    matches!(msg, ServerMessage::RoundStart { .. })
}

pub fn is_validation_result(msg: &ServerMessage) -> bool {
    matches!(msg, ServerMessage::ValidationResult { .. })
}

pub struct Pair {
    pub a: TestClient,
    pub b: TestClient,
    pub a_id: String,
    pub b_id: String,
    pub match_id: String,
}

/// 2人をキューに入れてマッチさせる（通知は読み捨てる）
pub async fn matched_pair(gm: &Addr<GameManager>, modifier: Option<&str>) -> Pair {
    let mut a = TestClient::new();
    let mut b = TestClient::new();

    let first = gm
        .send(JoinQueue {
            client: a.handle.clone(),
            modifier: modifier.map(str::to_string),
        })
        .await
        .unwrap();
    let second = gm
        .send(JoinQueue {
            client: b.handle.clone(),
            modifier: modifier.map(str::to_string),
        })
        .await
        .unwrap();
    let match_id = second.match_id.clone().expect("second join should match");

    assert!(matches!(a.next().await, ServerMessage::QueueJoined { .. }));
    assert!(matches!(a.next().await, ServerMessage::QueueMatched { .. }));
    assert!(matches!(b.next().await, ServerMessage::QueueMatched { .. }));

    Pair {
        a,
        b,
        a_id: first.session_id,
        b_id: second.session_id,
        match_id,
    }
}

/// 両者をIdentifyして最初のラウンドを受け取る
pub async fn start_first_round(gm: &Addr<GameManager>, pair: &mut Pair) -> (String, String) {
    identify(gm, &pair.a_id, &pair.a.handle).await;
    identify(gm, &pair.b_id, &pair.b.handle).await;

    let round_a = pair.a.wait_for(is_round_start).await;
    let round_b = pair.b.wait_for(is_round_start).await;
    assert_eq!(round_a, round_b);
    match round_a {
        ServerMessage::RoundStart { round_id, photo_ref, .. } => (round_id, photo_ref),
        other => panic!("unexpected message: {:?}", other),
    }
}

pub async fn identify(gm: &Addr<GameManager>, session_id: &str, client: &ClientHandle) {
    gm.send(Identify {
        session_id: session_id.to_string(),
        client: client.clone(),
    })
    .await
    .unwrap();
}
