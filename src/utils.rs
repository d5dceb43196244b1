use uuid::Uuid;

/// 2点間の距離（正規化マップ座標）
pub fn distance(x1: f64, y1: f64, x2: f64, y2: f64) -> f64 {
    let dx = x2 - x1;
    let dy = y2 - y1;
    (dx * dx + dy * dy).sqrt()
}

/// 新しいセッションIDを生成
pub fn generate_session_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// 新しいラウンドIDを生成
pub fn generate_round_id() -> String {
    Uuid::new_v4().to_string()
}

/// 2つのセッションIDからマッチIDを生成（順序に依存しない）
pub fn create_match_id(session_a: &str, session_b: &str) -> String {
    let mut ids = [session_a, session_b];
    ids.sort_unstable();
    ids.join("_")
}

/// マッチング設定を正規化（未指定・空文字はデフォルト扱い）
pub fn normalize_modifier(modifier: Option<&str>, default: &str) -> String {
    match modifier.map(str::trim) {
        Some(m) if !m.is_empty() => m.to_lowercase(),
        _ => default.to_string(),
    }
}
