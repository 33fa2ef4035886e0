use std::sync::Arc;

use crate::auth::AuthHandler;
use crate::db::Database;
use crate::password::PasswordPolicy;
use crate::state::{shutdown_channel, ServerState, ShutdownHandle};

/// A fresh server over an in-memory database, plus the handle that triggers
/// its shutdown.
pub fn test_state() -> (ShutdownHandle, ServerState) {
    let db = Database::open_in_memory().unwrap();
    let auth = Arc::new(AuthHandler::new(db.clone(), PasswordPolicy::standard()));
    let (handle, shutdown) = shutdown_channel();
    (handle, ServerState::new(auth, db, shutdown))
}
