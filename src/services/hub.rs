//! Hub: the single sequential owner of players, sessions, and the queue.
//!
//! ARCHITECTURE
//! ============
//! One task drains a bounded command channel and handles one command at a
//! time. Every table lives inside that task, so mutation is race-free
//! without locks. Connections talk to it only through `HubHandle`.
//!
//! DESIGN
//! ======
//! - Handling a command is synchronous: outbound fan-out uses non-blocking
//!   sends into each player's bounded buffers (see `PlayerLink`), so the
//!   hub never waits on a client.
//! - A move that wins or fills the board is answered with `ended` alone;
//!   `played` and the mover's confirmation only follow a continuing move.
//! - A session is removed as soon as its `ended` broadcast goes out, whether
//!   it was won, drawn, or abandoned.
//! - Unregister is idempotent; a second one for the same player finds
//!   nothing and returns.
//!
//! ERROR HANDLING
//! ==============
//! Failures are reported to the requesting player only. Lookup misses on
//! the unregister path are absorbed.

use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::HubConfig;
use crate::frame::{EndReason, Ended, ErrorCode, ErrorKind, Event, Joined, Outbound, Played};
use crate::games::{Game, GameError, GameKind, Mark, Move, PlayOutcome};
use crate::services::player::PlayerLink;
use crate::services::wait_queue::{QueueError, WaitQueue};
use crate::state::{PlayerId, SessionId};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug)]
pub enum Command {
    Register(PlayerLink),
    Unregister(PlayerId),
    RequestMatch { player: PlayerId, name: String },
    PlayMove { player: PlayerId, session: SessionId, mv: Move },
    ExitSession { player: PlayerId, session: SessionId },
    LeaveQueue(PlayerId),
    Stats(oneshot::Sender<HubStats>),
}

/// Point-in-time table sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct HubStats {
    pub players: usize,
    pub sessions: usize,
    pub waiting: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    #[error("game not found")]
    SessionNotFound(SessionId),
    #[error("already in a game")]
    AlreadyInSession(SessionId),
    #[error(transparent)]
    Game(#[from] GameError),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl ErrorCode for HubError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::SessionNotFound(_) => "E_SESSION_NOT_FOUND",
            Self::AlreadyInSession(_) => "E_ALREADY_PLAYING",
            Self::Game(e) => e.error_code(),
            Self::Queue(e) => e.error_code(),
        }
    }

    fn kind(&self) -> ErrorKind {
        match self {
            Self::SessionNotFound(_) => ErrorKind::NotFound,
            Self::AlreadyInSession(_) => ErrorKind::StateConflict,
            Self::Game(e) => e.kind(),
            Self::Queue(e) => e.kind(),
        }
    }
}

/// The hub task has stopped and its command channel is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("game hub is not running")]
pub struct HubUnavailable;

impl ErrorCode for HubUnavailable {
    fn error_code(&self) -> &'static str {
        "E_HUB_UNAVAILABLE"
    }

    fn kind(&self) -> ErrorKind {
        ErrorKind::Unavailable
    }
}

// =============================================================================
// HANDLE
// =============================================================================

/// Cloneable sender side of the hub's command channel.
#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<Command>,
}

impl HubHandle {
    #[must_use]
    pub fn new(tx: mpsc::Sender<Command>) -> Self {
        Self { tx }
    }

    /// Enqueue a command, waiting for channel capacity.
    ///
    /// # Errors
    ///
    /// Returns `HubUnavailable` if the hub task has stopped.
    pub async fn send(&self, cmd: Command) -> Result<(), HubUnavailable> {
        self.tx.send(cmd).await.map_err(|_| HubUnavailable)
    }

    pub async fn register(&self, link: PlayerLink) -> Result<(), HubUnavailable> {
        self.send(Command::Register(link)).await
    }

    pub async fn unregister(&self, player: PlayerId) -> Result<(), HubUnavailable> {
        self.send(Command::Unregister(player)).await
    }

    pub async fn request_match(&self, player: PlayerId, name: String) -> Result<(), HubUnavailable> {
        self.send(Command::RequestMatch { player, name }).await
    }

    pub async fn play_move(&self, player: PlayerId, session: SessionId, mv: Move) -> Result<(), HubUnavailable> {
        self.send(Command::PlayMove { player, session, mv }).await
    }

    pub async fn exit_session(&self, player: PlayerId, session: SessionId) -> Result<(), HubUnavailable> {
        self.send(Command::ExitSession { player, session }).await
    }

    pub async fn leave_queue(&self, player: PlayerId) -> Result<(), HubUnavailable> {
        self.send(Command::LeaveQueue(player)).await
    }

    /// Table sizes, consistent with every command enqueued before this one.
    ///
    /// # Errors
    ///
    /// Returns `HubUnavailable` if the hub task has stopped.
    pub async fn stats(&self) -> Result<HubStats, HubUnavailable> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Stats(reply)).await?;
        rx.await.map_err(|_| HubUnavailable)
    }
}

/// Spawn the hub task. The task ends when every `HubHandle` is dropped.
#[must_use]
pub fn spawn_hub(config: HubConfig) -> (HubHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(config.command_capacity.max(1));
    info!(
        command_capacity = config.command_capacity,
        outbound_capacity = config.outbound_capacity,
        reward_score = config.reward_score,
        "hub configured"
    );
    let hub = Hub::new(config);
    (HubHandle::new(tx), tokio::spawn(hub.run(rx)))
}

// =============================================================================
// HUB STATE
// =============================================================================

struct PlayerEntry {
    link: PlayerLink,
    name: String,
}

struct Session {
    game: Box<dyn Game>,
}

pub struct Hub {
    config: HubConfig,
    players: HashMap<PlayerId, PlayerEntry>,
    sessions: HashMap<SessionId, Session>,
    queue: WaitQueue,
}

impl Hub {
    #[must_use]
    pub fn new(config: HubConfig) -> Self {
        Self { config, players: HashMap::new(), sessions: HashMap::new(), queue: WaitQueue::new() }
    }

    /// Drain commands until every sender is gone.
    pub async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(cmd) = rx.recv().await {
            self.handle(cmd);
        }
        info!("hub: command channel closed, stopping");
    }

    /// Apply one command.
    pub fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Register(link) => self.register(link),
            Command::Unregister(player) => self.unregister(player),
            Command::RequestMatch { player, name } => self.request_match(player, name),
            Command::PlayMove { player, session, mv } => self.play_move(player, session, mv),
            Command::ExitSession { player, session } => self.exit_session(player, session),
            Command::LeaveQueue(player) => self.leave_queue(player),
            Command::Stats(reply) => {
                let _ = reply.send(self.stats());
            }
        }
    }

    #[must_use]
    pub fn stats(&self) -> HubStats {
        HubStats { players: self.players.len(), sessions: self.sessions.len(), waiting: self.queue.len() }
    }

    // =========================================================================
    // REGISTRATION
    // =========================================================================

    fn register(&mut self, link: PlayerLink) {
        let player_id = link.id();
        info!(%player_id, "hub: player registered");
        self.players.insert(player_id, PlayerEntry { link, name: String::new() });
    }

    fn unregister(&mut self, player_id: PlayerId) {
        if !self.players.contains_key(&player_id) {
            debug!(%player_id, "hub: unregister for unknown player ignored");
            return;
        }

        let _ = self.queue.remove(&player_id);

        let occupied: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|(_, s)| s.game.contains(&player_id))
            .map(|(id, _)| *id)
            .collect();
        for session_id in occupied {
            self.exit_session(player_id, session_id);
        }

        // Dropping the entry drops the link, closing all four outbound channels.
        self.players.remove(&player_id);
        info!(%player_id, "hub: player unregistered");
    }

    // =========================================================================
    // MATCHMAKING
    // =========================================================================

    fn request_match(&mut self, player_id: PlayerId, name: String) {
        if !self.players.contains_key(&player_id) {
            warn!(%player_id, "hub: match request from unregistered player");
            return;
        }

        if let Some(session_id) = self.session_of(&player_id) {
            self.report(player_id, &HubError::AlreadyInSession(session_id));
            return;
        }
        if self.queue.contains(&player_id) {
            self.report(player_id, &HubError::Queue(QueueError::AlreadyQueued(player_id)));
            return;
        }

        // A rejected request must not rename a player mid-session.
        if let Some(entry) = self.players.get_mut(&player_id) {
            entry.name = name;
        }

        let Some(opponent_id) = self.pop_live_opponent() else {
            if let Err(e) = self.queue.add(player_id) {
                self.report(player_id, &HubError::Queue(e));
            } else {
                debug!(%player_id, "hub: player queued");
            }
            return;
        };

        self.start_session(player_id, opponent_id);
    }

    /// Pop the oldest waiting player that is still registered.
    fn pop_live_opponent(&mut self) -> Option<PlayerId> {
        while let Ok(candidate) = self.queue.pop() {
            if self.players.contains_key(&candidate) {
                return Some(candidate);
            }
            warn!(player_id = %candidate, "hub: dropped stale queue entry");
        }
        None
    }

    /// Requester plays first (X); the queued opponent plays O.
    fn start_session(&mut self, requester: PlayerId, opponent: PlayerId) {
        let session_id = SessionId::new();
        let game = GameKind::default().create([requester, opponent]);

        for (player_id, other_id) in [(requester, opponent), (opponent, requester)] {
            let joined = Joined {
                session_id,
                opponent: self.name_of(&other_id),
                tile: game.participant_mark(&player_id),
            };
            if let Some(entry) = self.players.get(&player_id) {
                entry.link.joined(joined);
            }
        }

        info!(%session_id, x = %requester, o = %opponent, kind = ?game.kind(), "hub: match made");
        self.sessions.insert(session_id, Session { game });
    }

    fn leave_queue(&mut self, player_id: PlayerId) {
        if let Err(e) = self.queue.remove(&player_id) {
            self.report(player_id, &HubError::Queue(e));
        } else {
            debug!(%player_id, "hub: player left queue");
        }
    }

    // =========================================================================
    // SESSIONS
    // =========================================================================

    fn play_move(&mut self, player_id: PlayerId, session_id: SessionId, mv: Move) {
        let Some(session) = self.sessions.get_mut(&session_id) else {
            self.report(player_id, &HubError::SessionNotFound(session_id));
            return;
        };

        let outcome = match session.game.play(&player_id, mv) {
            Ok(outcome) => outcome,
            Err(e) => {
                debug!(%player_id, %session_id, error = %e, "hub: move rejected");
                self.report(player_id, &HubError::Game(e));
                return;
            }
        };

        match outcome {
            PlayOutcome::Continue { next } => {
                debug!(%player_id, %session_id, %mv, %next, "hub: move applied");
                let played = Played { player: self.name_of(&player_id), mv };
                if let Some(opponent_id) = self.opponent_in(session_id, &player_id) {
                    self.send_to(&opponent_id, Outbound::Event(Event::Played(played)));
                }
                self.send_to(&player_id, Outbound::notice(format!("you played {mv}")));
            }
            PlayOutcome::Won(winner) => self.end_session(session_id, EndReason::Won, Some(winner)),
            PlayOutcome::Draw => self.end_session(session_id, EndReason::Draw, None),
        }
    }

    fn exit_session(&mut self, player_id: PlayerId, session_id: SessionId) {
        let Some(session) = self.sessions.get(&session_id) else {
            debug!(%player_id, %session_id, "hub: exit for unknown session ignored");
            return;
        };
        let Ok(winner) = session.game.exit(&player_id) else {
            debug!(%player_id, %session_id, "hub: exit from non-participant ignored");
            return;
        };
        self.end_session(session_id, EndReason::Abandoned, Some(winner));
    }

    /// Broadcast `ended` to both participants and drop the session.
    fn end_session(&mut self, session_id: SessionId, reason: EndReason, winner: Option<Mark>) {
        let Some(session) = self.sessions.remove(&session_id) else {
            return;
        };

        for player_id in session.game.participants() {
            if let Some(entry) = self.players.get(&player_id) {
                entry.link.ended(Ended { session_id, reason, winner, score: self.config.reward_score });
            }
        }
        info!(%session_id, kind = ?session.game.kind(), ?reason, winner = ?winner, "hub: session ended");
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    fn session_of(&self, player_id: &PlayerId) -> Option<SessionId> {
        self.sessions
            .iter()
            .find(|(_, s)| s.game.contains(player_id))
            .map(|(id, _)| *id)
    }

    fn opponent_in(&self, session_id: SessionId, player_id: &PlayerId) -> Option<PlayerId> {
        let session = self.sessions.get(&session_id)?;
        session
            .game
            .participants()
            .into_iter()
            .find(|p| p != player_id)
    }

    fn name_of(&self, player_id: &PlayerId) -> String {
        self.players
            .get(player_id)
            .map(|e| e.name.clone())
            .unwrap_or_default()
    }

    fn send_to(&self, player_id: &PlayerId, msg: Outbound) {
        if let Some(entry) = self.players.get(player_id) {
            entry.link.send(msg);
        }
    }

    fn report(&self, player_id: PlayerId, err: &HubError) {
        if let Some(entry) = self.players.get(&player_id) {
            entry.link.error(err);
        }
    }
}

#[cfg(test)]
#[path = "hub_test.rs"]
mod tests;
