//! Per-role call state

use loopcall_core::{ConnectionEndpoint, Direction, Role};
use loopcall_media::{RoleStream, StreamRegistry};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// Everything one participant owns in a call: its endpoint and its two
/// streams. Built once per role and handed to whichever task needs it.
#[derive(Debug, Clone)]
pub struct RoleContext {
    role: Role,
    endpoint: Arc<ConnectionEndpoint>,
    local: Arc<RoleStream>,
    remote: Arc<RoleStream>,
    outgoing: Arc<Mutex<()>>,
}

impl RoleContext {
    pub(crate) fn new(endpoint: Arc<ConnectionEndpoint>, registry: &StreamRegistry) -> Self {
        let role = endpoint.role();
        Self {
            role,
            endpoint,
            local: registry.stream(role, Direction::Local).clone(),
            remote: registry.stream(role, Direction::Remote).clone(),
            outgoing: Arc::new(Mutex::new(())),
        }
    }

    /// Serializes changes to what this role sends. A sender swap and the
    /// matching local slot swap happen under one guard.
    pub(crate) async fn lock_outgoing(&self) -> MutexGuard<'_, ()> {
        self.outgoing.lock().await
    }

    /// Participant role
    pub fn role(&self) -> Role {
        self.role
    }

    /// Connection endpoint of this role
    pub fn endpoint(&self) -> &Arc<ConnectionEndpoint> {
        &self.endpoint
    }

    /// Outgoing stream
    pub fn local(&self) -> &Arc<RoleStream> {
        &self.local
    }

    /// Incoming stream
    pub fn remote(&self) -> &Arc<RoleStream> {
        &self.remote
    }

    /// Stream in `direction`
    pub fn stream(&self, direction: Direction) -> &Arc<RoleStream> {
        match direction {
            Direction::Local => &self.local,
            Direction::Remote => &self.remote,
        }
    }
}
