//! User registry
//!
//! The single source of truth for who is online. Every read and mutation
//! goes through one `RwLock`; callers only ever get owned snapshots
//! (names, outbox clones), never references into the map.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::event::{EventSender, UserEvent, UserEventKind};
use crate::types::ConnectionId;
use crate::user::{Outbox, User};

/// Shared connection → user map
#[derive(Debug, Clone)]
pub struct Registry {
    users: Arc<RwLock<HashMap<ConnectionId, User>>>,
    events: EventSender,
}

impl Registry {
    pub fn new(events: EventSender) -> Self {
        Self {
            users: Arc::new(RwLock::new(HashMap::new())),
            events,
        }
    }

    /// Register a user; emits a join event
    pub async fn add(&self, user: User) {
        let event = Self::event(UserEventKind::Join, &user);
        let mut users = self.users.write().await;
        users.insert(user.id, user);
        debug!("Total users: {}", users.len());
        drop(users);
        self.events.emit(event);
    }

    /// Unregister a connection
    ///
    /// Idempotent: an unknown id returns `None` and emits nothing. The
    /// user's idle timer is stopped before the entry goes away.
    pub async fn remove(&self, id: ConnectionId) -> Option<User> {
        let mut users = self.users.write().await;
        if let Some(user) = users.get(&id) {
            user.idle().stop();
        }
        let user = users.remove(&id)?;
        debug!("Total users: {}", users.len());
        drop(users);
        self.events.emit(Self::event(UserEventKind::Leave, &user));
        Some(user)
    }

    /// Change a user's display name, returning the old one
    ///
    /// Names are not required to be unique.
    pub async fn rename(&self, id: ConnectionId, name: &str) -> Option<String> {
        let mut users = self.users.write().await;
        let user = users.get_mut(&id)?;
        let old = user.set_name(name.to_string());
        let event = Self::event(UserEventKind::Rename, user);
        drop(users);
        self.events.emit(event);
        Some(old)
    }

    /// Names of everyone online, sorted
    pub async fn list(&self) -> Vec<String> {
        let users = self.users.read().await;
        let mut names: Vec<String> = users.values().map(|u| u.name().to_string()).collect();
        names.sort();
        names
    }

    /// Outboxes of everyone online except `exclude`
    pub async fn recipients(&self, exclude: Option<ConnectionId>) -> Vec<Outbox> {
        let users = self.users.read().await;
        users
            .values()
            .filter(|u| Some(u.id) != exclude)
            .map(|u| u.outbox().clone())
            .collect()
    }

    /// First user currently displaying `name`
    pub async fn find_by_name(&self, name: &str) -> Option<Outbox> {
        let users = self.users.read().await;
        users
            .values()
            .find(|u| u.name() == name)
            .map(|u| u.outbox().clone())
    }

    pub async fn outbox(&self, id: ConnectionId) -> Option<Outbox> {
        let users = self.users.read().await;
        users.get(&id).map(|u| u.outbox().clone())
    }

    /// Record an event about a registered user (message, list)
    pub async fn note(&self, id: ConnectionId, kind: UserEventKind) {
        let users = self.users.read().await;
        if let Some(user) = users.get(&id) {
            self.events.emit(Self::event(kind, user));
        }
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }

    fn event(kind: UserEventKind, user: &User) -> UserEvent {
        UserEvent {
            kind,
            id: user.id,
            name: user.name().to_string(),
            address: user.address(),
        }
    }
}
