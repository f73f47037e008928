//! Matchmaking and session services behind the websocket route.
//!
//! ARCHITECTURE
//! ============
//! `hub` owns all cross-player state and is the only writer of it.
//! `player` is the per-connection actor that feeds the hub commands and
//! relays its events back to the socket. `wait_queue` is the hub's FIFO of
//! players looking for an opponent.

pub mod hub;
pub mod player;
pub mod wait_queue;
