//! Per-connection handler: authentication dialogue, main menu and the trip
//! through matchmaking.

use dilemma_lib::net::Connection;
use tokio::net::TcpStream;
use tracing::instrument;

use crate::matchmaking::matchmake;
use crate::registry::UserClaim;
use crate::state::ServerState;

/// Take a socket for a newly connected client and begin serving it.
///
/// The whole handler races against the shutdown flag, so a shutdown request
/// cancels any blocking read or wait and the task proceeds straight to
/// cleanup: the claim guard drops and the socket closes.
pub async fn handle_new_connection(state: ServerState, socket: TcpStream) {
    let mut shutdown = state.shutdown.clone();
    let conn = Connection::new(socket);
    tokio::select! {
        _ = shutdown.recv() => {
            tracing::debug!("connection closed by server shutdown");
        }
        _ = serve(state.clone(), conn) => {}
    }
}

pub(crate) async fn serve(state: ServerState, conn: Connection) {
    let client = match ConnectingClient::new(state, conn).authenticate().await {
        Some(client) => client,
        None => return,
    };
    client.run().await;
}

/// A client that connected but has not logged in yet.
struct ConnectingClient {
    state: ServerState,
    conn: Connection,
}

enum LoginFlow {
    LoggedIn(UserClaim),
    Rejected,
    Disconnected,
}

impl ConnectingClient {
    fn new(state: ServerState, conn: Connection) -> Self {
        Self { state, conn }
    }

    /// Loop on the REG/LOG/EXIT dialogue until the client logs in, leaves or
    /// disconnects.
    async fn authenticate(mut self) -> Option<AuthedClient> {
        loop {
            let reply = match self.conn.prompt("Enter command (REG/LOG/EXIT): ").await {
                Ok(Some(reply)) => reply,
                Ok(None) => return None,
                Err(e) => {
                    tracing::debug!(%e, "client lost during authentication");
                    return None;
                }
            };
            match reply.as_str() {
                "REG" => {
                    if !self.register().await {
                        return None;
                    }
                }
                "LOG" => match self.login().await {
                    LoginFlow::LoggedIn(claim) => {
                        return Some(AuthedClient {
                            state: self.state,
                            conn: self.conn,
                            claim,
                        });
                    }
                    LoginFlow::Rejected => {}
                    LoginFlow::Disconnected => return None,
                },
                "EXIT" => {
                    let _ = self.conn.send("Goodbye!").await;
                    return None;
                }
                other => {
                    let _ = self.conn.send(&format!("unknown command: {other}")).await;
                }
            }
        }
    }

    /// The three-prompt registration dialogue. Returns `false` when the
    /// client disconnected mid-dialogue.
    async fn register(&mut self) -> bool {
        let mut answers = Vec::with_capacity(3);
        for prompt in ["Enter username: ", "Enter password: ", "Repeat password: "] {
            match self.conn.prompt(prompt).await {
                Ok(Some(answer)) => answers.push(answer),
                _ => return false,
            }
        }

        let message = match self.state.auth.register(&answers[0], &answers[1], &answers[2]) {
            Ok(()) => format!("User {} registered successfully.", answers[0]),
            Err(e) => e.to_string(),
        };
        let _ = self.conn.send(&message).await;
        true
    }

    /// The two-prompt login dialogue, ending in a claim on the username.
    async fn login(&mut self) -> LoginFlow {
        let mut answers = Vec::with_capacity(2);
        for prompt in ["Enter username: ", "Enter password: "] {
            match self.conn.prompt(prompt).await {
                Ok(Some(answer)) => answers.push(answer),
                _ => return LoginFlow::Disconnected,
            }
        }
        let (username, password) = (&answers[0], &answers[1]);

        if let Err(e) = self.state.auth.login(username, password) {
            let _ = self.conn.send(&e.to_string()).await;
            return LoginFlow::Rejected;
        }

        // Credentials are good, but the account may already have a live
        // session; the claim decides atomically.
        match self.state.active.try_claim(username) {
            Some(claim) => {
                tracing::info!(user = %username, "user logged in");
                let _ = self
                    .conn
                    .send(&format!("User {username} logged in successfully"))
                    .await;
                LoginFlow::LoggedIn(claim)
            }
            None => {
                let _ = self.conn.send("You are already logged in.").await;
                LoginFlow::Rejected
            }
        }
    }
}

/// A logged-in client at the main menu. Dropping it (on any exit path)
/// releases the username claim.
struct AuthedClient {
    state: ServerState,
    conn: Connection,
    claim: UserClaim,
}

impl AuthedClient {
    #[instrument(skip_all, fields(user = %self.claim.username()))]
    async fn run(mut self) {
        loop {
            let reply = match self.conn.prompt("play/exit (P/X): ").await {
                Ok(Some(reply)) => reply,
                _ => return,
            };
            match reply.as_str() {
                "P" => {
                    // The connection moves into the queue and comes back only
                    // after the match (or timeout) resolves.
                    let AuthedClient { state, conn, claim } = self;
                    match matchmake(&state, claim.username(), conn).await {
                        Some(conn) => self = AuthedClient { state, conn, claim },
                        None => return,
                    }
                }
                "X" => {
                    let _ = self.conn.send("Goodbye!").await;
                    return;
                }
                other => {
                    let _ = self.conn.send(&format!("unknown command: {other}")).await;
                }
            }
        }
    }
}
