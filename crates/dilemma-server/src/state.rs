use std::sync::Arc;

use tokio::sync::watch;

use crate::auth::AuthHandler;
use crate::db::Database;
use crate::matchmaking::MatchQueue;
use crate::registry::{ActiveUsers, PlayingUsers};

/// Shared handles every task works against. Cheap to clone; all fields are
/// Arc-backed.
#[derive(Clone)]
pub struct ServerState {
    pub active: ActiveUsers,
    pub playing: PlayingUsers,
    pub queue: MatchQueue,
    pub auth: Arc<AuthHandler>,
    pub db: Database,
    pub shutdown: Shutdown,
}

impl ServerState {
    pub fn new(auth: Arc<AuthHandler>, db: Database, shutdown: Shutdown) -> Self {
        Self {
            active: ActiveUsers::default(),
            playing: PlayingUsers::default(),
            queue: MatchQueue::default(),
            auth,
            db,
            shutdown,
        }
    }
}

/// Create the process-wide running flag.
pub fn shutdown_channel() -> (ShutdownHandle, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx }, Shutdown { rx })
}

/// Held by `main`; flipping it wakes every task blocked on [`Shutdown::recv`].
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

/// A task's view of the running flag.
#[derive(Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Resolves once shutdown has been requested (or the handle is gone,
    /// which can only happen when the process is already tearing down).
    pub async fn recv(&mut self) {
        let _ = self.rx.wait_for(|&stopping| stopping).await;
    }
}
