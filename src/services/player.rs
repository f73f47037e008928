//! Player actor: the per-connection concurrency boundary.
//!
//! ARCHITECTURE
//! ============
//! Each connection runs two tasks that share one `PlayerInfo` behind a
//! per-player `RwLock` and otherwise talk only through channels:
//!
//! - inbound: `Player` decodes client requests, checks local status, and
//!   forwards commands to the hub (a bounded, awaited send, so a slow hub
//!   back-pressures the socket reader instead of dropping commands).
//! - outbound: `PlayerMailbox` waits on four sources (generic sends, errors,
//!   joined, ended) and yields wire messages, updating status on
//!   joined/ended.
//!
//! Every message is stamped from one per-player counter when it is sent.
//! The mailbox holds at most one pending message per source and always
//! yields the lowest stamp, so the client sees messages in the order they
//! were produced even though they travel on separate channels.
//!
//! The hub holds the `PlayerLink` (the sending halves). Removing the link
//! from the hub's table drops the senders, which is what closes the
//! mailbox; a dropped sender cannot be closed twice.
//!
//! STATUS MACHINE
//! ==============
//! Connected → Waiting (start) → Playing (joined) → Connected (ended/exit).
//! Waiting → Connected (exit from queue).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};

use crate::frame::{Ended, ErrorCode, ErrorKind, ErrorReport, Event, FrameError, Joined, Outbound, Request};
use crate::games::Move;
use crate::services::hub::{HubHandle, HubUnavailable};
use crate::state::{PlayerId, SessionId};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerStatus {
    #[default]
    Connected,
    Waiting,
    Playing,
}

/// Mutable per-player record guarded by the player's own lock.
#[derive(Debug, Clone, Default)]
pub struct PlayerInfo {
    pub name: String,
    pub status: PlayerStatus,
    pub session: Option<SessionId>,
}

pub type SharedInfo = Arc<RwLock<PlayerInfo>>;

#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error("already in a waiting list")]
    AlreadyWaiting,
    #[error("already in a game")]
    AlreadyPlaying,
    #[error("you don't have a game")]
    NoActiveGame,
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Hub(#[from] HubUnavailable),
}

impl ErrorCode for PlayerError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::AlreadyWaiting => "E_ALREADY_WAITING",
            Self::AlreadyPlaying => "E_ALREADY_PLAYING",
            Self::NoActiveGame => "E_NO_ACTIVE_GAME",
            Self::Frame(e) => e.error_code(),
            Self::Hub(e) => e.error_code(),
        }
    }

    fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyWaiting | Self::AlreadyPlaying | Self::NoActiveGame => ErrorKind::StateConflict,
            Self::Frame(e) => e.kind(),
            Self::Hub(e) => e.kind(),
        }
    }
}

// =============================================================================
// CHANNELS
// =============================================================================

/// Hub-side handle: the sending halves of a player's four outbound channels.
///
/// Sends never block. A full or closed buffer drops the message with a log
/// line so one stalled client cannot stall the hub.
#[derive(Debug)]
pub struct PlayerLink {
    id: PlayerId,
    seq: Arc<AtomicU64>,
    send: mpsc::Sender<Stamped<Outbound>>,
    errors: mpsc::Sender<Stamped<ErrorReport>>,
    join: mpsc::Sender<Stamped<Joined>>,
    end: mpsc::Sender<Stamped<Ended>>,
}

impl PlayerLink {
    #[must_use]
    pub fn id(&self) -> PlayerId {
        self.id
    }

    pub fn send(&self, msg: Outbound) {
        deliver(&self.send, self.id, "send", stamp(&self.seq, msg));
    }

    pub fn error(&self, err: &(impl ErrorCode + ?Sized)) {
        deliver(&self.errors, self.id, "error", stamp(&self.seq, ErrorReport::from_error(err)));
    }

    pub fn joined(&self, joined: Joined) {
        deliver(&self.join, self.id, "join", stamp(&self.seq, joined));
    }

    pub fn ended(&self, ended: Ended) {
        deliver(&self.end, self.id, "end", stamp(&self.seq, ended));
    }
}

/// A message tagged with its position in the player's outbound order.
#[derive(Debug)]
struct Stamped<T> {
    seq: u64,
    msg: T,
}

fn stamp<T>(seq: &AtomicU64, msg: T) -> Stamped<T> {
    Stamped { seq: seq.fetch_add(1, Ordering::Relaxed), msg }
}

fn deliver<T>(tx: &mpsc::Sender<Stamped<T>>, player_id: PlayerId, channel: &'static str, msg: Stamped<T>) {
    match tx.try_send(msg) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
            warn!(%player_id, channel, "player: outbound buffer full, message dropped");
        }
        Err(TrySendError::Closed(_)) => {
            debug!(%player_id, channel, "player: outbound closed, message dropped");
        }
    }
}

/// One receiving half plus at most one message taken off it but not yet
/// yielded.
struct Source<T> {
    rx: mpsc::Receiver<Stamped<T>>,
    pending: Option<Stamped<T>>,
    closed: bool,
}

impl<T> Source<T> {
    fn new(rx: mpsc::Receiver<Stamped<T>>) -> Self {
        Self { rx, pending: None, closed: false }
    }

    /// True when nothing is pending and the channel may still deliver.
    fn idle(&self) -> bool {
        self.pending.is_none() && !self.closed
    }

    /// Take whatever is already buffered without waiting.
    fn refill(&mut self) {
        if !self.idle() {
            return;
        }
        match self.rx.try_recv() {
            Ok(msg) => self.pending = Some(msg),
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => self.closed = true,
        }
    }

    async fn wait(&mut self) {
        match self.rx.recv().await {
            Some(msg) => self.pending = Some(msg),
            None => self.closed = true,
        }
    }

    fn head(&self) -> Option<u64> {
        self.pending.as_ref().map(|m| m.seq)
    }

    fn take_if(&mut self, seq: u64) -> Option<T> {
        if self.head() == Some(seq) { self.pending.take().map(|m| m.msg) } else { None }
    }
}

/// Outbound side: receiving halves plus the shared status record.
pub struct PlayerMailbox {
    send: Source<Outbound>,
    errors: Source<ErrorReport>,
    join: Source<Joined>,
    end: Source<Ended>,
    info: SharedInfo,
}

/// Create a player's four outbound channels with a fresh status record.
#[must_use]
pub fn channel(id: PlayerId, capacity: usize) -> (PlayerLink, PlayerMailbox) {
    let capacity = capacity.max(1);
    let (send_tx, send_rx) = mpsc::channel(capacity);
    let (err_tx, err_rx) = mpsc::channel(capacity);
    let (join_tx, join_rx) = mpsc::channel(capacity);
    let (end_tx, end_rx) = mpsc::channel(capacity);

    let link = PlayerLink {
        id,
        seq: Arc::new(AtomicU64::new(0)),
        send: send_tx,
        errors: err_tx,
        join: join_tx,
        end: end_tx,
    };
    let mailbox = PlayerMailbox {
        send: Source::new(send_rx),
        errors: Source::new(err_rx),
        join: Source::new(join_rx),
        end: Source::new(end_rx),
        info: Arc::new(RwLock::new(PlayerInfo::default())),
    };
    (link, mailbox)
}

/// Build both halves of a player actor for a new connection. The returned
/// `PlayerLink` must be registered with the hub.
#[must_use]
pub fn connect(id: PlayerId, hub: HubHandle, capacity: usize) -> (Player, PlayerLink, PlayerMailbox) {
    let (link, mailbox) = channel(id, capacity);
    let player = Player {
        id,
        info: mailbox.info.clone(),
        hub,
        seq: link.seq.clone(),
        send: link.send.clone(),
        errors: link.errors.clone(),
    };
    (player, link, mailbox)
}

impl PlayerMailbox {
    #[must_use]
    pub fn info(&self) -> &SharedInfo {
        &self.info
    }

    /// Wait for the next wire message. Returns `None` once all four sources
    /// are closed and drained.
    pub async fn next(&mut self) -> Option<Outbound> {
        let Self { send, errors, join, end, info } = self;

        loop {
            send.refill();
            errors.refill();
            join.refill();
            end.refill();

            let lowest = [send.head(), errors.head(), join.head(), end.head()].into_iter().flatten().min();
            if let Some(seq) = lowest {
                if let Some(msg) = send.take_if(seq) {
                    return Some(msg);
                }
                if let Some(report) = errors.take_if(seq) {
                    return Some(Outbound::error(report));
                }
                if let Some(joined) = join.take_if(seq) {
                    let mut info = info.write().await;
                    info.status = PlayerStatus::Playing;
                    info.session = Some(joined.session_id);
                    return Some(Outbound::Event(Event::Started(joined)));
                }
                if let Some(ended) = end.take_if(seq) {
                    let mut info = info.write().await;
                    // A stale end for a session the player already left must not
                    // clobber a newer Waiting/Playing status.
                    if info.session == Some(ended.session_id) {
                        info.status = PlayerStatus::Connected;
                        info.session = None;
                    }
                    return Some(Outbound::Event(Event::Ended(ended)));
                }
            }

            tokio::select! {
                () = send.wait(), if send.idle() => {}
                () = errors.wait(), if errors.idle() => {}
                () = join.wait(), if join.idle() => {}
                () = end.wait(), if end.idle() => {}
                else => return None,
            }
        }
    }
}

// =============================================================================
// INBOUND
// =============================================================================

/// Inbound side of a player: validates requests and forwards them to the hub.
pub struct Player {
    id: PlayerId,
    info: SharedInfo,
    hub: HubHandle,
    seq: Arc<AtomicU64>,
    send: mpsc::Sender<Stamped<Outbound>>,
    errors: mpsc::Sender<Stamped<ErrorReport>>,
}

enum ExitTarget {
    Queue,
    Session(SessionId),
}

impl Player {
    #[must_use]
    pub fn id(&self) -> PlayerId {
        self.id
    }

    pub async fn name(&self) -> String {
        self.info.read().await.name.clone()
    }

    pub async fn status(&self) -> PlayerStatus {
        self.info.read().await.status
    }

    /// Decode and dispatch one text frame.
    ///
    /// # Errors
    ///
    /// Returns decode failures and status conflicts; both are reportable to
    /// the client. `PlayerError::Hub` means the hub is gone.
    pub async fn handle_text(&self, text: &str) -> Result<(), PlayerError> {
        let req = Request::parse(text)?;
        debug!(player_id = %self.id, kind = req.kind(), "player: request");
        self.dispatch(req).await
    }

    /// Dispatch one decoded request.
    ///
    /// # Errors
    ///
    /// See [`Player::handle_text`].
    pub async fn dispatch(&self, req: Request) -> Result<(), PlayerError> {
        match req {
            Request::Start { name } => self.handle_start(name).await,
            Request::Play { mv } => self.handle_play(mv).await,
            Request::Exit => self.handle_exit().await,
        }
    }

    async fn handle_start(&self, name: String) -> Result<(), PlayerError> {
        {
            let mut info = self.info.write().await;
            match info.status {
                PlayerStatus::Waiting => return Err(PlayerError::AlreadyWaiting),
                PlayerStatus::Playing => return Err(PlayerError::AlreadyPlaying),
                PlayerStatus::Connected => {}
            }
            info.status = PlayerStatus::Waiting;
            info.name.clone_from(&name);
        }

        self.hub.request_match(self.id, name).await?;
        self.notify(Outbound::notice(format!("Id: {}", self.id))).await;
        Ok(())
    }

    async fn handle_play(&self, mv: Move) -> Result<(), PlayerError> {
        let session = {
            let info = self.info.read().await;
            match (info.status, info.session) {
                (PlayerStatus::Playing, Some(session)) => session,
                _ => return Err(PlayerError::NoActiveGame),
            }
        };

        self.hub.play_move(self.id, session, mv).await?;
        Ok(())
    }

    async fn handle_exit(&self) -> Result<(), PlayerError> {
        let target = {
            let mut info = self.info.write().await;
            let target = match (info.status, info.session) {
                (PlayerStatus::Waiting, _) => ExitTarget::Queue,
                (PlayerStatus::Playing, Some(session)) => ExitTarget::Session(session),
                _ => return Err(PlayerError::NoActiveGame),
            };
            info.status = PlayerStatus::Connected;
            info.session = None;
            target
        };

        match target {
            ExitTarget::Queue => self.hub.leave_queue(self.id).await?,
            ExitTarget::Session(session) => self.hub.exit_session(self.id, session).await?,
        }
        self.notify(Outbound::notice("deleted")).await;
        Ok(())
    }

    /// Surface an error to this player's outbound context.
    pub async fn report(&self, err: &PlayerError) {
        let _ = self.errors.send(stamp(&self.seq, ErrorReport::from_error(err))).await;
    }

    async fn notify(&self, msg: Outbound) {
        let _ = self.send.send(stamp(&self.seq, msg)).await;
    }

    /// Ask the hub to tear this player down. Consumes the inbound half so
    /// its sender clones are released.
    pub async fn disconnect(self) {
        if self.hub.unregister(self.id).await.is_err() {
            debug!(player_id = %self.id, "player: hub gone before unregister");
        }
    }
}

#[cfg(test)]
#[path = "player_test.rs"]
mod tests;
