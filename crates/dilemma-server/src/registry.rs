//! The two username registries the handler tasks coordinate through.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

/// Usernames with a live authenticated connection. At most one connection
/// holds a claim on a username at any instant; check-then-insert happens
/// under a single lock acquisition.
#[derive(Clone, Default)]
pub struct ActiveUsers {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl ActiveUsers {
    /// Claim a username for the calling connection. Returns `None` when the
    /// account already has a live session. The claim is released when the
    /// returned guard drops.
    pub fn try_claim(&self, username: &str) -> Option<UserClaim> {
        let mut users = self.inner.lock().unwrap();
        if !users.insert(username.to_owned()) {
            return None;
        }
        Some(UserClaim {
            users: self.clone(),
            username: username.to_owned(),
        })
    }

    fn release(&self, username: &str) {
        // Removal is a no-op if the name is already gone.
        self.inner.lock().unwrap().remove(username);
    }

    pub fn contains(&self, username: &str) -> bool {
        self.inner.lock().unwrap().contains(username)
    }
}

/// RAII claim on a username in [`ActiveUsers`].
pub struct UserClaim {
    users: ActiveUsers,
    username: String,
}

impl UserClaim {
    pub fn username(&self) -> &str {
        &self.username
    }
}

impl Drop for UserClaim {
    fn drop(&mut self) {
        tracing::info!(user = %self.username, "user logged out");
        self.users.release(&self.username);
    }
}

/// Usernames currently inside a running match. Handlers block on
/// [`PlayingUsers::wait_released`] until their game session removes them.
#[derive(Clone, Default)]
pub struct PlayingUsers {
    inner: Arc<Mutex<HashSet<String>>>,
    notify: Arc<Notify>,
}

impl PlayingUsers {
    pub fn insert_pair(&self, a: &str, b: &str) {
        let mut playing = self.inner.lock().unwrap();
        playing.insert(a.to_owned());
        playing.insert(b.to_owned());
    }

    /// Remove both players of a finished match and wake every waiter.
    pub fn release_pair(&self, a: &str, b: &str) {
        {
            let mut playing = self.inner.lock().unwrap();
            playing.remove(a);
            playing.remove(b);
        }
        self.notify.notify_waiters();
    }

    pub fn contains(&self, username: &str) -> bool {
        self.inner.lock().unwrap().contains(username)
    }

    /// Wait until `username` is no longer in the registry.
    pub async fn wait_released(&self, username: &str) {
        loop {
            // Register interest before checking so a release between the
            // check and the await cannot be missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if !self.contains(username) {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::{ActiveUsers, PlayingUsers};

    #[test]
    fn claim_is_exclusive_until_dropped() {
        let active = ActiveUsers::default();

        let claim = active.try_claim("alice").expect("first claim succeeds");
        assert!(active.try_claim("alice").is_none());
        assert!(active.contains("alice"));

        drop(claim);
        assert!(!active.contains("alice"));
        assert!(active.try_claim("alice").is_some());
    }

    #[tokio::test]
    async fn concurrent_claims_grant_exactly_one() {
        let active = ActiveUsers::default();

        let attempts: Vec<_> = (0..16)
            .map(|_| {
                let active = active.clone();
                tokio::spawn(async move { active.try_claim("alice").is_some() })
            })
            .collect();

        let mut granted = 0;
        for attempt in attempts {
            if attempt.await.unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 1);
    }

    #[tokio::test]
    async fn wait_released_returns_immediately_when_absent() {
        let playing = PlayingUsers::default();
        timeout(Duration::from_secs(1), playing.wait_released("alice"))
            .await
            .expect("waiter should not block for an absent user");
    }

    #[tokio::test]
    async fn release_wakes_both_waiters() {
        let playing = PlayingUsers::default();
        playing.insert_pair("alice", "bob");

        let waiters: Vec<_> = ["alice", "bob"]
            .into_iter()
            .map(|user| {
                let playing = playing.clone();
                tokio::spawn(async move { playing.wait_released(user).await })
            })
            .collect();

        playing.release_pair("alice", "bob");
        for waiter in waiters {
            timeout(Duration::from_secs(1), waiter)
                .await
                .expect("waiter was not woken")
                .unwrap();
        }
        assert!(!playing.contains("alice"));
        assert!(!playing.contains("bob"));
    }
}
