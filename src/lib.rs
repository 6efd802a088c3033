// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # sessionwire
//!
//! A client-side runtime for a session-oriented game networking protocol:
//! login, channel pub/sub, and clean or abrupt disconnect, all driven by a
//! single non-blocking stream socket that the host owns.
//!
//! `sessionwire` does not own a thread, a timer, or an event loop. The host
//! application polls its own file descriptors (via `epoll`/`kqueue`/`mio`/
//! whatever it already uses) and calls [`Connection::drive`] whenever this
//! crate's fd becomes readable, writable, or errored. Everything else -
//! framing, the compact id codec, the login/logout state machine, and
//! channel dispatch - happens inside that call.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use sessionwire::{Connection, ContextBuilder, Interest};
//!
//! let ctx = ContextBuilder::new("game.example.com", 4460)
//!     .on_logged_in(|_conn| println!("logged in"))
//!     .on_session_message(|_conn, data| println!("got {} bytes", data.len()))
//!     .build();
//!
//! let mut conn = Connection::connect("game.example.com", 4460, "alice", "hunter2", ctx)?;
//! // host event loop: whenever conn.raw_fd() is readable/writable/errored...
//! let fd = conn.raw_fd().unwrap();
//! conn.drive(fd, Interest::READ)?;
//! # Ok::<(), sessionwire::Error>(())
//! ```
//!
//! ## Modules
//!
//! - [`ids`] - the variable-width `CompactId` codec
//! - [`ring_buffer`] - the fixed-capacity circular I/O buffer
//! - [`message`] - framed message (de)serialization
//! - [`session`] - the login/logout protocol state machine
//! - [`channel`] - the joined-channel registry
//! - [`connection`] - the non-blocking socket driver
//! - [`context`] - host-supplied event callbacks
//! - [`error`] - the crate's error taxonomy

/// Wire and buffer size constants - single source of truth.
pub mod config;
/// Error taxonomy and the crate's `Result` alias.
pub mod error;
/// Bytes <-> hex-string conversions.
pub mod hex;
/// Variable-width compact identifier codec.
pub mod ids;
/// Fixed-capacity circular buffer used for both inbound and outbound I/O.
pub mod ring_buffer;
/// Framed message (de)serialization.
pub mod message;
/// Login/logout protocol state machine.
pub mod session;
/// Joined-channel registry.
pub mod channel;
/// Non-blocking socket driver.
pub mod connection;
/// Host-supplied event callbacks.
pub mod context;

pub use channel::{Channel, ChannelRegistry};
pub use connection::{Connection, ConnectionId};
pub use context::{Context, ContextBuilder, Interest};
pub use error::{Error, Result};
pub use ids::CompactId;
pub use session::SessionState;

/// Crate version string, surfaced for diagnostics and handshake logging.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
