//! Session Registry - the set of open shell sessions and which one is active
//!
//! Owned by the assistant and mutated through `&mut`; there is no global
//! registry. Ids carry a sequence number that is never reused, even after
//! the session it named has been closed.

use std::collections::HashMap;
use std::path::Path;

use tracing::{info, warn};

use crate::error::Result;
use crate::shell::{LaunchMode, SessionId, SessionStatus, ShellConfig, ShellKind, ShellSession};

/// Open sessions keyed by id, plus the active pointer
pub struct SessionRegistry {
    sessions: HashMap<SessionId, ShellSession>,
    /// Creation order, for stable listing
    order: Vec<SessionId>,
    active: Option<SessionId>,
    next_sequence: u64,
    config: ShellConfig,
}

impl SessionRegistry {
    pub fn new(config: ShellConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            order: Vec::new(),
            active: None,
            next_sequence: 1,
            config,
        }
    }

    /// Open a session and make it active
    ///
    /// Failures are logged and reported as `None`; nothing is registered.
    pub async fn create(
        &mut self,
        kind: ShellKind,
        working_dir: Option<&Path>,
        mode: LaunchMode,
    ) -> Option<SessionId> {
        match self.try_create(kind, working_dir, mode).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(shell = kind.as_str(), mode = mode.as_str(), error = %e, "failed to open session");
                None
            }
        }
    }

    /// Like [`create`](Self::create), but returns the error
    pub async fn try_create(
        &mut self,
        kind: ShellKind,
        working_dir: Option<&Path>,
        mode: LaunchMode,
    ) -> Result<SessionId> {
        let id = SessionId::new(self.next_sequence, kind);
        // Consumed even on failure so ids are never reused
        self.next_sequence += 1;

        let session =
            ShellSession::open(id.clone(), kind, working_dir, mode, self.config.clone()).await?;

        self.sessions.insert(id.clone(), session);
        self.order.push(id.clone());
        self.active = Some(id.clone());
        Ok(id)
    }

    pub fn get(&self, id: &SessionId) -> Option<&ShellSession> {
        self.sessions.get(id)
    }

    pub fn get_mut(&mut self, id: &SessionId) -> Option<&mut ShellSession> {
        self.sessions.get_mut(id)
    }

    /// The active session, if the pointer is set and still resolves
    pub fn get_active(&self) -> Option<&ShellSession> {
        self.active.as_ref().and_then(|id| self.sessions.get(id))
    }

    pub fn get_active_mut(&mut self) -> Option<&mut ShellSession> {
        match self.active.as_ref() {
            Some(id) => self.sessions.get_mut(id),
            None => None,
        }
    }

    pub fn active_id(&self) -> Option<&SessionId> {
        self.active.as_ref()
    }

    /// Point the registry at an existing session
    pub fn set_active(&mut self, id: &SessionId) -> bool {
        if self.sessions.contains_key(id) {
            self.active = Some(id.clone());
            true
        } else {
            false
        }
    }

    /// Close and forget the active session
    ///
    /// Returns `false` when there was nothing to close.
    pub async fn close_active(&mut self) -> bool {
        let Some(id) = self.active.take() else {
            return false;
        };
        self.order.retain(|o| o != &id);

        match self.sessions.remove(&id) {
            Some(mut session) => {
                if let Err(e) = session.close().await {
                    warn!(session = %id, error = %e, "error while closing session");
                }
                true
            }
            None => false,
        }
    }

    /// Close every session, continuing past failures, and clear the registry
    ///
    /// Returns how many sessions were closed.
    pub async fn close_all(&mut self) -> usize {
        let count = self.sessions.len();
        self.active = None;

        for id in self.order.drain(..) {
            if let Some(mut session) = self.sessions.remove(&id) {
                if let Err(e) = session.close().await {
                    warn!(session = %id, error = %e, "error while closing session");
                }
            }
        }
        // Anything not tracked in `order` is released on drop
        self.sessions.clear();

        if count > 0 {
            info!(count, "closed all sessions");
        }
        count
    }

    /// Status of every session, oldest first
    pub fn list(&self) -> Vec<SessionStatus> {
        self.order
            .iter()
            .filter_map(|id| self.sessions.get(id))
            .map(ShellSession::status)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(ShellConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_registry() {
        let mut registry = SessionRegistry::default();
        assert!(registry.get_active().is_none());
        assert!(registry.get_active_mut().is_none());
        assert!(!registry.close_active().await);
        assert_eq!(registry.close_all().await, 0);
        assert!(registry.list().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_create_registers_nothing() {
        let mut registry = SessionRegistry::default();
        let id = registry
            .create(ShellKind::Cmd, None, LaunchMode::Background)
            .await;
        assert!(id.is_none());
        assert!(registry.is_empty());
        assert!(registry.active_id().is_none());

        // the failed attempt still consumed a sequence number
        let id = registry
            .create(ShellKind::Sh, None, LaunchMode::Background)
            .await
            .unwrap();
        assert_eq!(id.as_str(), "session_2_sh");
        registry.close_all().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_newest_session_becomes_active() {
        let mut registry = SessionRegistry::default();
        let first = registry
            .create(ShellKind::Sh, None, LaunchMode::Background)
            .await
            .unwrap();
        let second = registry
            .create(ShellKind::Sh, None, LaunchMode::Background)
            .await
            .unwrap();

        assert_eq!(registry.active_id(), Some(&second));
        assert!(registry.set_active(&first));
        assert_eq!(registry.get_active().unwrap().id(), &first);
        assert!(!registry.set_active(&SessionId::new(99, ShellKind::Sh)));

        let listed: Vec<_> = registry.list().into_iter().map(|s| s.id).collect();
        assert_eq!(listed, vec![first.clone(), second.clone()]);

        assert!(registry.close_active().await);
        assert!(registry.active_id().is_none());
        assert_eq!(registry.len(), 1);
        assert!(registry.get(&second).is_some());

        registry.close_all().await;
        assert!(registry.is_empty());
    }
}
