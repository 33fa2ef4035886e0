//! The matchmaking queue and the pairing loop that drains it.
//!
//! A player requesting a match hands their connection over to the queue and
//! waits on a reply channel. The pairing loop pops the two oldest entries,
//! marks both players as in-game and spawns a [`GameSession`] task which owns
//! both connections until the match concludes and hands them back.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dilemma_lib::net::Connection;
use rand::{thread_rng, Rng};
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinSet;
use tokio::time::timeout;

use crate::session::{GameSession, Player, ROUNDS};
use crate::state::ServerState;

/// How long a player waits in the queue before giving up.
pub const MATCHMAKING_WAIT: Duration = Duration::from_secs(30);

/// Sent to a queued player the moment the pairing loop matches them.
/// `conn_back` resolves with the player's own connection once the match is
/// over and the session is done talking on it.
pub struct Paired {
    pub opponent: String,
    pub conn_back: oneshot::Receiver<Connection>,
}

struct Entry {
    username: String,
    conn: Connection,
    reply: oneshot::Sender<Paired>,
}

/// FIFO of players awaiting an opponent. A username leaves the queue exactly
/// once: either popped by the pairing loop or removed by its own handler on
/// timeout, always under the single queue lock.
#[derive(Clone, Default)]
pub struct MatchQueue {
    inner: Arc<Mutex<VecDeque<Entry>>>,
    notify: Arc<Notify>,
}

impl MatchQueue {
    pub fn enqueue(&self, username: String, conn: Connection) -> oneshot::Receiver<Paired> {
        let (reply, rx) = oneshot::channel();
        self.inner.lock().unwrap().push_back(Entry {
            username,
            conn,
            reply,
        });
        self.notify.notify_waiters();
        rx
    }

    /// Timeout path: a waiter removes its own entry and takes its connection
    /// back. `None` means the pairing loop already popped the entry, in which
    /// case the caller was in fact paired and must not treat this as a
    /// timeout.
    pub fn remove(&self, username: &str) -> Option<Connection> {
        let mut queue = self.inner.lock().unwrap();
        let idx = queue.iter().position(|e| e.username == username)?;
        queue.remove(idx).map(|e| e.conn)
    }

    fn pop_pair(&self) -> Option<(Entry, Entry)> {
        let mut queue = self.inner.lock().unwrap();
        if queue.len() < 2 {
            return None;
        }
        let first = queue.pop_front().unwrap();
        let second = queue.pop_front().unwrap();
        Some((first, second))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves once at least two players are queued.
    async fn ready(&self) {
        loop {
            // Register interest before checking the length so an enqueue
            // between the check and the await cannot be missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.len() >= 2 {
                return;
            }
            notified.await;
        }
    }
}

/// Runs for the server's lifetime: waits for two queued players, pairs the
/// two oldest, spawns the match task, repeats. On shutdown, every running
/// match is joined before this task returns.
pub async fn pairing_loop(state: ServerState) {
    tracing::info!("matchmaking loop started");
    let mut sessions = JoinSet::new();
    let mut shutdown = state.shutdown.clone();
    loop {
        tokio::select! {
            _ = state.queue.ready() => {}
            _ = shutdown.recv() => break,
        }
        while let Some((first, second)) = state.queue.pop_pair() {
            start_match(&state, first, second, &mut sessions);
        }
        // Reap sessions that already finished so the set stays small.
        while sessions.try_join_next().is_some() {}
    }
    while sessions.join_next().await.is_some() {}
    tracing::info!("matchmaking loop stopped");
}

fn start_match(state: &ServerState, first: Entry, second: Entry, sessions: &mut JoinSet<()>) {
    let rounds = thread_rng().gen_range(ROUNDS);
    tracing::info!(p1 = %first.username, p2 = %second.username, rounds, "starting match");

    // Both players are in-game before either waiter learns about the pairing,
    // so a woken waiter always finds itself in the playing registry.
    state.playing.insert_pair(&first.username, &second.username);

    let (give1, back1) = oneshot::channel();
    let (give2, back2) = oneshot::channel();
    if first
        .reply
        .send(Paired {
            opponent: second.username.clone(),
            conn_back: back1,
        })
        .is_err()
    {
        tracing::warn!(user = %first.username, "waiter gone before pairing notice");
    }
    if second
        .reply
        .send(Paired {
            opponent: first.username.clone(),
            conn_back: back2,
        })
        .is_err()
    {
        tracing::warn!(user = %second.username, "waiter gone before pairing notice");
    }

    let session = GameSession::new(
        Player::new(first.username, first.conn, give1),
        Player::new(second.username, second.conn, give2),
        rounds,
    );
    sessions.spawn(session.run(state.clone()));
}

/// Queue up for a match and wait for it to conclude. Returns the player's
/// connection for the trip back to the main menu, or `None` when the session
/// is over (shutdown, or the connection was lost along the way).
pub async fn matchmake(state: &ServerState, username: &str, conn: Connection) -> Option<Connection> {
    tracing::debug!(user = %username, "joining matchmaking queue");
    let mut reply = state.queue.enqueue(username.to_owned(), conn);

    match timeout(MATCHMAKING_WAIT, &mut reply).await {
        Ok(Ok(paired)) => await_match_end(state, username, paired).await,
        // The queue was dropped without pairing us; server teardown.
        Ok(Err(_)) => None,
        Err(_elapsed) => match state.queue.remove(username) {
            Some(mut conn) => {
                tracing::debug!(user = %username, "matchmaking timed out");
                let _ = conn.send("Matchmaking timeout. Try again.\n").await;
                Some(conn)
            }
            // The pairing loop popped our entry in the instant the timeout
            // fired: we were paired, never report a timeout.
            None => match (&mut reply).await {
                Ok(paired) => await_match_end(state, username, paired).await,
                Err(_) => None,
            },
        },
    }
}

async fn await_match_end(state: &ServerState, username: &str, paired: Paired) -> Option<Connection> {
    tracing::debug!(user = %username, opponent = %paired.opponent, "paired");
    state.playing.wait_released(username).await;
    paired.conn_back.await.ok()
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use dilemma_lib::net::Connection;
    use tokio::io::{duplex, AsyncReadExt};
    use tokio::sync::oneshot;
    use tokio::time::timeout;

    use crate::test_util::test_state;

    use super::{matchmake, pairing_loop, Paired};

    #[tokio::test]
    async fn pairing_is_fifo() {
        let (handle, state) = test_state();

        let mut replies = Vec::new();
        let mut client_sides = Vec::new();
        for name in ["a", "b", "c", "d"] {
            let (server_side, client_side) = duplex(1024);
            client_sides.push(client_side);
            replies.push(
                state
                    .queue
                    .enqueue(name.to_owned(), Connection::new(server_side)),
            );
        }

        let pairing = tokio::spawn(pairing_loop(state.clone()));

        let mut opponents = Vec::new();
        for reply in replies {
            let paired = timeout(Duration::from_secs(5), reply)
                .await
                .expect("waiter was never paired")
                .unwrap();
            opponents.push(paired.opponent);
        }
        // Earliest two enqueued pair with each other, then the next two.
        assert_eq!(opponents, ["b", "a", "d", "c"]);
        assert!(state.queue.is_empty());

        handle.trigger();
        drop(client_sides);
        timeout(Duration::from_secs(5), pairing)
            .await
            .expect("pairing loop did not stop on shutdown")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn lone_waiter_times_out_and_dequeues_itself() {
        let (_handle, state) = test_state();
        let (server_side, mut client_side) = duplex(1024);

        // No pairing loop running and no opponent: the waiter must dequeue
        // itself and get its connection back.
        let conn = matchmake(&state, "alice", Connection::new(server_side)).await;
        assert!(conn.is_some());
        assert!(state.queue.is_empty());

        let mut notice = [0u8; 32];
        client_side.read_exact(&mut notice).await.unwrap();
        assert_eq!(&notice, b"Matchmaking timeout. Try again.\n");
    }

    #[tokio::test]
    async fn popped_waiter_resolves_as_paired_not_timeout() {
        let (_handle, state) = test_state();

        let (server_a, _client_a) = duplex(1024);
        let (server_b, _client_b) = duplex(1024);
        let mut reply_a = state
            .queue
            .enqueue("alice".to_owned(), Connection::new(server_a));
        let _reply_b = state
            .queue
            .enqueue("bob".to_owned(), Connection::new(server_b));

        // The pairing loop pops the pair right as alice's timeout fires...
        let (alice, bob) = state.queue.pop_pair().unwrap();
        assert_eq!(alice.username, "alice");

        // ...so her self-removal finds nothing, which means "paired".
        assert!(state.queue.remove("alice").is_none());

        let (give_back, conn_back) = oneshot::channel();
        alice
            .reply
            .send(Paired {
                opponent: bob.username.clone(),
                conn_back,
            })
            .map_err(|_| ())
            .unwrap();
        give_back.send(alice.conn).map_err(|_| ()).unwrap();

        let paired = (&mut reply_a).await.unwrap();
        assert_eq!(paired.opponent, "bob");
        assert!(paired.conn_back.await.is_ok());
    }
}
