use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use lru::LruCache;

use crate::config::SessionConfig;
use crate::error::{Result, TallyError};
use crate::models::ConversationTurn;

/// Most-recent-N turns of one conversation.
#[derive(Debug, Clone)]
pub struct SessionContext {
    user_id: String,
    session_id: String,
    turns: VecDeque<ConversationTurn>,
    max_turns: usize,
}

impl SessionContext {
    pub fn new(user_id: &str, session_id: &str, max_turns: usize) -> Self {
        let max_turns = max_turns.max(1);
        Self {
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            turns: VecDeque::with_capacity(max_turns),
            max_turns,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Append a turn, evicting the oldest once full.
    pub fn push(&mut self, turn: ConversationTurn) {
        if self.turns.len() == self.max_turns {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
    }

    /// Up to `n` latest turns, oldest first.
    pub fn recent(&self, n: usize) -> Vec<ConversationTurn> {
        let skip = self.turns.len().saturating_sub(n);
        self.turns.iter().skip(skip).cloned().collect()
    }

    pub fn turns(&self) -> Vec<ConversationTurn> {
        self.turns.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

pub type SessionLane = Arc<tokio::sync::Mutex<SessionContext>>;

/// One serialised lane per `(user_id, session_id)`.
///
/// Holding a lane's lock while a command runs keeps commands within a
/// session in arrival order (tokio's mutex is fair), while different
/// sessions proceed concurrently.
///
/// At most `max_sessions` lanes are kept. Only idle lanes (ones nobody but
/// the registry holds) are evicted, least recently used first; when every
/// lane is busy the registry grows past the bound until some are released.
#[derive(Clone)]
pub struct SessionLanes {
    lanes: Arc<Mutex<LruCache<(String, String), SessionLane>>>,
    max_sessions: usize,
    max_turns: usize,
}

impl SessionLanes {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            lanes: Arc::new(Mutex::new(LruCache::unbounded())),
            max_sessions: config.max_sessions.max(1),
            max_turns: config.max_turns,
        }
    }

    pub fn lane(&self, user_id: &str, session_id: &str) -> Result<SessionLane> {
        let mut lanes = self
            .lanes
            .lock()
            .map_err(|e| TallyError::Internal(format!("Session registry poisoned: {e}")))?;

        let key = (user_id.to_string(), session_id.to_string());
        if let Some(lane) = lanes.get(&key) {
            return Ok(Arc::clone(lane));
        }

        let lane = Arc::new(tokio::sync::Mutex::new(SessionContext::new(
            user_id,
            session_id,
            self.max_turns,
        )));
        while lanes.len() >= self.max_sessions {
            if !Self::evict_idle(&mut lanes) {
                tracing::warn!(sessions = lanes.len(), "All sessions busy, exceeding max_sessions");
                break;
            }
        }
        lanes.put(key, Arc::clone(&lane));
        Ok(lane)
    }

    /// Drop the least recently used lane that no command is holding.
    fn evict_idle(lanes: &mut LruCache<(String, String), SessionLane>) -> bool {
        let idle = lanes
            .iter()
            .rev()
            .find(|(_, lane)| Arc::strong_count(lane) == 1)
            .map(|(key, _)| key.clone());

        match idle {
            Some(key) => {
                tracing::debug!(user_id = %key.0, session_id = %key.1, "Evicting idle session");
                lanes.pop(&key);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.lanes.lock().map(|lanes| lanes.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
