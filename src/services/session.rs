// src/services/session.rs
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::editor::CanvasEditor;
use crate::errors::MontageError;
use crate::models::ComparisonResult;

/// One user's working state: the canvas plus the latest generation output.
/// Nothing here survives the process; sessions are deliberately ephemeral.
pub struct Session {
    pub id: Uuid,
    pub editor: CanvasEditor,
    /// Only the latest result is kept; edits replace it.
    pub enhanced_result: Option<String>,
    pub suggestions: Vec<String>,
    pub comparison: Option<ComparisonResult>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    fn new(id: Uuid) -> Self {
        Self {
            id,
            editor: CanvasEditor::new(),
            enhanced_result: None,
            suggestions: Vec::new(),
            comparison: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub layer_count: usize,
    pub has_result: bool,
    pub created_at: DateTime<Utc>,
}

/// In-memory session registry keyed by id.
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn create(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.sessions.write().await.insert(id, Session::new(id));
        id
    }

    /// Runs a closure against the mutable session. The lock is held only for
    /// the closure, never across external calls.
    pub async fn update<R>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Session) -> Result<R, MontageError>,
    ) -> Result<R, MontageError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&id)
            .ok_or(MontageError::SessionNotFound(id))?;
        f(session)
    }

    pub async fn read<R>(
        &self,
        id: Uuid,
        f: impl FnOnce(&Session) -> R,
    ) -> Result<R, MontageError> {
        let sessions = self.sessions.read().await;
        let session = sessions.get(&id).ok_or(MontageError::SessionNotFound(id))?;
        Ok(f(session))
    }

    pub async fn list(&self) -> Vec<SessionSummary> {
        self.sessions
            .read()
            .await
            .values()
            .map(|s| SessionSummary {
                id: s.id,
                layer_count: s.editor.layers().len(),
                has_result: s.enhanced_result.is_some(),
                created_at: s.created_at,
            })
            .collect()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
