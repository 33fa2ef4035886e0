//! The per-match task: plays one multi-round match between two paired
//! players, reports the result, persists it and releases both players.

use std::ops::RangeInclusive;

use dilemma_lib::game::{Choice, Verdict};
use dilemma_lib::net::Connection;
use tokio::sync::oneshot;
use tracing::instrument;

use crate::db::MatchRecord;
use crate::state::ServerState;

/// Bounds for the per-match round count, drawn once when a pair is formed.
pub const ROUNDS: RangeInclusive<u32> = 3..=5;

const ROUND_PROMPT: &str = "Do you want to split or steal? (SPLIT/STEAL): ";

/// One side of a match. Owns the player's connection for the duration of the
/// match and hands it back to the connection handler when the match is over.
pub struct Player {
    username: String,
    conn: Connection,
    score: u32,
    give_back: oneshot::Sender<Connection>,
}

impl Player {
    pub fn new(username: String, conn: Connection, give_back: oneshot::Sender<Connection>) -> Self {
        Self {
            username,
            conn,
            score: 0,
            give_back,
        }
    }
}

pub struct GameSession {
    p1: Player,
    p2: Player,
    rounds: u32,
}

impl GameSession {
    pub fn new(p1: Player, p2: Player, rounds: u32) -> Self {
        Self { p1, p2, rounds }
    }

    /// Play the match to its conclusion, racing against server shutdown.
    /// Both players leave the playing registry exactly once, on every path.
    #[instrument(skip_all, fields(p1 = %self.p1.username, p2 = %self.p2.username))]
    pub async fn run(self, state: ServerState) {
        let users = (self.p1.username.clone(), self.p2.username.clone());
        let mut shutdown = state.shutdown.clone();
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("match abandoned by server shutdown");
            }
            _ = self.play(&state) => {}
        }
        state.playing.release_pair(&users.0, &users.1);
    }

    async fn play(mut self, state: &ServerState) {
        tracing::info!(rounds = self.rounds, "match started");
        let _ = self
            .p1
            .conn
            .send(&format!("Paired with {}! Get Ready!\n", self.p2.username))
            .await;
        let _ = self
            .p2
            .conn
            .send(&format!("Paired with {}! Get Ready!\n", self.p1.username))
            .await;

        for round in 1..=self.rounds {
            let (c1, c2) = self.play_round().await;
            tracing::debug!(round, p1_choice = %c1, p2_choice = %c2, "round finished");
        }

        let verdict1 = Verdict::of(self.p1.score, self.p2.score);
        let avg1 = f64::from(self.p1.score) / f64::from(self.rounds);
        let avg2 = f64::from(self.p2.score) / f64::from(self.rounds);
        let _ = self
            .p1
            .conn
            .send(&format!(
                "Final score: you {} (avg {:.2}), opponent {} (avg {:.2})\n{}",
                self.p1.score,
                avg1,
                self.p2.score,
                avg2,
                verdict1.message()
            ))
            .await;
        let _ = self
            .p2
            .conn
            .send(&format!(
                "Final score: you {} (avg {:.2}), opponent {} (avg {:.2})\n{}",
                self.p2.score,
                avg2,
                self.p1.score,
                avg1,
                verdict1.reversed().message()
            ))
            .await;
        tracing::info!(
            score1 = self.p1.score,
            score2 = self.p2.score,
            "match finished"
        );

        // Best effort only: a failed write never holds up releasing the
        // players.
        let record = MatchRecord {
            user1: self.p1.username.clone(),
            score1: f64::from(self.p1.score),
            user2: self.p2.username.clone(),
            score2: f64::from(self.p2.score),
        };
        if let Err(e) = state.db.add_match(&record) {
            tracing::error!(%e, "failed to record match");
        }

        // Hand the connections back to their handlers before `run` releases
        // the playing registry, so a woken handler always finds its
        // connection waiting.
        let GameSession { p1, p2, .. } = self;
        let _ = p1.give_back.send(p1.conn);
        let _ = p2.give_back.send(p2.conn);
    }

    /// Prompt both players at once and score the round. A disconnected or
    /// garbled player counts as choosing SPLIT.
    async fn play_round(&mut self) -> (Choice, Choice) {
        let GameSession { p1, p2, .. } = self;
        let (r1, r2) = tokio::join!(p1.conn.prompt(ROUND_PROMPT), p2.conn.prompt(ROUND_PROMPT));
        let c1 = Choice::from_reply(r1.ok().flatten().as_deref());
        let c2 = Choice::from_reply(r2.ok().flatten().as_deref());

        p1.score += c1.payoff(c2);
        p2.score += c2.payoff(c1);

        let _ = p1
            .conn
            .send(&format!(
                "Opponent chose {c2}. Score: you {}, opponent {}\n",
                p1.score, p2.score
            ))
            .await;
        let _ = p2
            .conn
            .send(&format!(
                "Opponent chose {c1}. Score: you {}, opponent {}\n",
                p2.score, p1.score
            ))
            .await;
        (c1, c2)
    }
}
