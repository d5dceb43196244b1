use crate::game::manager::GameManager;
use crate::game::state::{ClientHandle, Match, MatchId, PlayerGameState, QueueEntry, SessionId};
use crate::models::ServerMessage;
use crate::utils::{create_match_id, generate_session_id, normalize_modifier};
use actix::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

// マッチング要求の結果
#[derive(Debug, Clone, Serialize, PartialEq, MessageResponse)]
pub struct JoinQueueResult {
    pub session_id: SessionId,
    pub partner_id: Option<SessionId>,
    pub match_id: Option<MatchId>,
}

impl GameManager {
    /// マッチング要求
    ///
    /// 同じモディファイアで待っている最古の相手を取り出してペアにする。
    /// 相手がいなければキューに積む。
    pub(crate) fn request_match(&mut self, client: ClientHandle, modifier: Option<String>) -> JoinQueueResult {
        let session_id = generate_session_id();
        let modifier = normalize_modifier(modifier.as_deref(), &self.config.default_modifier);
        let client_id = client.id();

        info!("🔍 Match request: session={} modifier={}", session_id, modifier);

        let entry = QueueEntry::new(session_id.clone(), client, modifier);
        let partner = self
            .store
            .claim_from_queue(|e| e.modifier == entry.modifier && e.client.id() != client_id);

        let Some(partner) = partner else {
            entry.client.send(ServerMessage::QueueJoined {
                session_id: session_id.clone(),
            });
            self.store.enqueue(entry);
            info!(
                "⏳ Waiting for partner: session={} (queue size: {})",
                session_id,
                self.store.queue_len()
            );
            return JoinQueueResult {
                session_id,
                partner_id: None,
                match_id: None,
            };
        };

        let waited = entry.queued_at - partner.queued_at;
        debug!(
            "⏱️ Partner {} waited {}ms in queue",
            partner.session_id,
            waited.num_milliseconds()
        );
        if !partner.client.is_connected() {
            // ペアは作る。相手は再接続時に復元する
            warn!("⚠️ Partner {} is not connected, pairing anyway", partner.session_id);
        }

        let match_id = create_match_id(&partner.session_id, &entry.session_id);
        let m = Match::new(match_id.clone(), &partner, &entry);

        for (me, other) in [(&partner, &entry), (&entry, &partner)] {
            me.client.send(ServerMessage::QueueMatched {
                session_id: me.session_id.clone(),
                partner_id: other.session_id.clone(),
                match_id: match_id.clone(),
                is_reconnect: false,
            });
            self.store.index_session(me.session_id.clone(), match_id.clone());
            self.store
                .merge_player_state(&match_id, &me.session_id, |s| *s = PlayerGameState::default());
        }
        self.store.insert_match(m);

        info!(
            "✅ Match created: {} vs {} (match_id={})",
            partner.session_id, entry.session_id, match_id
        );

        JoinQueueResult {
            session_id,
            partner_id: Some(partner.session_id),
            match_id: Some(match_id),
        }
    }
}
