// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The login/logout protocol state machine and sequence-numbered send path.
//!
//! `Session` owns the data the wire protocol cares about: identity
//! (`session_id`, `reconnect_key`), the monotonic send sequence number, the
//! [`crate::channel::ChannelRegistry`], and the current [`SessionState`]. It
//! builds outbound messages and interprets inbound ones, but it never
//! touches a socket - that's [`crate::connection::Connection`]'s job, one
//! layer up.

use crate::channel::ChannelRegistry;
use crate::config::SGS_MSG_MAX_LENGTH;
use crate::error::{Error, Result};
use crate::ids::CompactId;
use crate::message::{Message, MessageBuilder, Opcode, Service};
use crate::ring_buffer::RingBuffer;

/// Where a [`Session`] sits in the login/logout lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    LoggedIn,
    LoggingOut,
    Failed,
}

/// An inbound opcode's effect, for [`crate::connection::Connection`] to
/// relay to the host's [`crate::context::Context`] callbacks.
///
/// `Session::dispatch` already applied any state change and channel
/// registry update this opcode implies; the event only carries what the
/// host still needs to be told.
#[derive(Debug)]
pub enum SessionEvent<'a> {
    LoggedIn,
    LoginFailed { reason: &'a [u8] },
    RecvMessage { data: &'a [u8] },
    Reconnected,
    /// The connection must be torn down now, not just marked for a quiet
    /// close on the next peer-initiated disconnect.
    ForceDisconnect,
    /// A clean server-initiated close is coming; the next peer close
    /// should not fire the host's `disconnected` callback.
    ExpectingDisconnect,
    ChannelJoined { channel_id: CompactId, name: &'a [u8] },
    ChannelLeft { channel_id: CompactId },
    ChannelMessage {
        channel_id: CompactId,
        sender: Option<CompactId>,
        data: &'a [u8],
    },
}

/// Reads the big-endian `u16` length header at `data[0..2]`.
fn read_len_header(data: &[u8]) -> Result<u16> {
    if data.len() < 2 {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "truncated length header",
        )));
    }
    Ok(u16::from_be_bytes([data[0], data[1]]))
}

/// Reads a `[u16 len][bytes]` field and returns `(bytes, total consumed)`.
fn read_prefixed(data: &[u8]) -> Result<(&[u8], usize)> {
    let len = read_len_header(data)? as usize;
    let total = 2 + len;
    if data.len() < total {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "truncated length-prefixed field",
        )));
    }
    Ok((&data[2..total], total))
}

/// Session identity, sequence counter, joined channels, and protocol state.
pub struct Session {
    session_id: Option<CompactId>,
    reconnect_key: Option<CompactId>,
    seq_hi: u32,
    seq_lo: u32,
    state: SessionState,
    channels: ChannelRegistry,
    /// Reused scratch buffer for building outbound messages, mirroring the
    /// original client's per-session `msg_buf` member - one allocation for
    /// the lifetime of the session rather than one per send.
    scratch: Vec<u8>,
}

impl Session {
    /// A fresh, not-yet-connected session.
    pub fn new() -> Self {
        Session {
            session_id: None,
            reconnect_key: None,
            seq_hi: 0,
            seq_lo: 0,
            state: SessionState::Disconnected,
            channels: ChannelRegistry::new(),
            scratch: vec![0u8; SGS_MSG_MAX_LENGTH],
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }

    pub fn session_id(&self) -> Option<&CompactId> {
        self.session_id.as_ref()
    }

    pub fn reconnect_key(&self) -> Option<&CompactId> {
        self.reconnect_key.as_ref()
    }

    /// Current `(seq_hi, seq_lo)` pair. The 64-bit sequence number is
    /// `(seq_hi << 32) | seq_lo`.
    pub fn seq(&self) -> (u32, u32) {
        (self.seq_hi, self.seq_lo)
    }

    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    pub fn channels_mut(&mut self) -> &mut ChannelRegistry {
        &mut self.channels
    }

    fn increment_seq(&mut self) {
        if self.seq_lo == u32::MAX {
            self.seq_hi += 1;
            self.seq_lo = 0;
        } else {
            self.seq_lo += 1;
        }
    }

    fn enqueue(&self, built: usize, outbuf: &mut RingBuffer) -> Result<()> {
        outbuf.write(&self.scratch[..built]).map_err(|_| Error::NoBufferSpace)
    }

    /// Build and enqueue a `LOGIN_REQUEST`. Callable before the socket has
    /// even connected - the original client pre-queues this so it is the
    /// first thing sent once the socket becomes writable.
    pub fn login(&mut self, user: &str, password: &str, outbuf: &mut RingBuffer) -> Result<()> {
        let mut msg = MessageBuilder::init(&mut self.scratch, Service::Application, Opcode::LoginRequest)?;
        msg.add_prefixed(user.as_bytes())?;
        msg.add_prefixed(password.as_bytes())?;
        let built = msg.size();
        self.enqueue(built, outbuf)
    }

    /// Build and enqueue a `RECONNECT_REQUEST` carrying `reconnect_key`.
    ///
    /// The wire defines this opcode but the original client never emits it
    /// (spec §9, open question); nothing in this crate calls it
    /// automatically either - it's here for a host that wants to resume a
    /// prior session after a transport-level reconnect of its own.
    pub fn reconnect(&mut self, reconnect_key: &CompactId, outbuf: &mut RingBuffer) -> Result<()> {
        let mut msg = MessageBuilder::init(&mut self.scratch, Service::Application, Opcode::ReconnectRequest)?;
        msg.add_raw(&reconnect_key.encode())?;
        let built = msg.size();
        self.enqueue(built, outbuf)
    }

    /// Build and enqueue a `LOGOUT_REQUEST`. Requires `LoggedIn`; transitions
    /// to `LoggingOut`.
    pub fn logout(&mut self, outbuf: &mut RingBuffer) -> Result<()> {
        if self.state != SessionState::LoggedIn {
            return Err(Error::IllegalState);
        }
        let msg = MessageBuilder::init(&mut self.scratch, Service::Application, Opcode::LogoutRequest)?;
        let built = msg.size();
        self.enqueue(built, outbuf)?;
        self.state = SessionState::LoggingOut;
        Ok(())
    }

    /// Build and enqueue a `SESSION_MESSAGE`, then advance the sequence
    /// number. Requires `LoggedIn`.
    pub fn direct_send(&mut self, data: &[u8], outbuf: &mut RingBuffer) -> Result<()> {
        if self.state != SessionState::LoggedIn {
            return Err(Error::IllegalState);
        }
        let (seq_hi, seq_lo) = (self.seq_hi, self.seq_lo);
        let mut msg = MessageBuilder::init(&mut self.scratch, Service::Application, Opcode::SessionMessage)?;
        msg.add_u32(seq_hi)?;
        msg.add_u32(seq_lo)?;
        msg.add_prefixed(data)?;
        let built = msg.size();
        self.enqueue(built, outbuf)?;
        self.increment_seq();
        Ok(())
    }

    /// Build and enqueue a `CHANNEL_SEND_REQUEST`, then advance the
    /// sequence number. An empty `recipients` means "send to all members".
    /// Requires `LoggedIn`.
    pub fn channel_send(
        &mut self,
        channel_id: &CompactId,
        data: &[u8],
        recipients: &[CompactId],
        outbuf: &mut RingBuffer,
    ) -> Result<()> {
        if self.state != SessionState::LoggedIn {
            return Err(Error::IllegalState);
        }
        if recipients.len() > u16::MAX as usize {
            return Err(Error::SizeArgTooLarge);
        }
        let (seq_hi, seq_lo) = (self.seq_hi, self.seq_lo);
        let channel_compact = channel_id.encode();
        let recipient_compacts: Vec<Vec<u8>> = recipients.iter().map(CompactId::encode).collect();

        let mut msg = MessageBuilder::init(&mut self.scratch, Service::Channel, Opcode::ChannelSendRequest)?;
        msg.add_raw(&channel_compact)?;
        msg.add_u32(seq_hi)?;
        msg.add_u32(seq_lo)?;
        msg.add_u16(recipients.len() as u16)?;
        for r in &recipient_compacts {
            msg.add_raw(r)?;
        }
        msg.add_prefixed(data)?;
        let built = msg.size();
        self.enqueue(built, outbuf)?;
        self.increment_seq();
        Ok(())
    }

    /// Interpret one already-framed, version-checked inbound message,
    /// updating session state and the channel registry as its opcode
    /// requires, and return the event the host still needs to hear about.
    ///
    /// # Errors
    /// [`Error::BadMsgOpcode`] for an opcode not in the closed dispatch
    /// table; [`Error::UnknownChannel`] if a `CHANNEL_LEAVE`/
    /// `CHANNEL_MESSAGE` names a channel this session never joined;
    /// otherwise an `Io` error for a field that doesn't fit in the payload.
    pub fn dispatch<'a>(&mut self, msg: &Message<'a>) -> Result<SessionEvent<'a>> {
        let payload = msg.payload();
        match msg.service()? {
            Service::Application => self.dispatch_application(msg.opcode()?, payload),
            Service::Channel => self.dispatch_channel(msg.opcode()?, payload),
        }
    }

    fn dispatch_application<'a>(&mut self, opcode: Opcode, payload: &'a [u8]) -> Result<SessionEvent<'a>> {
        match opcode {
            Opcode::LoginSuccess => {
                let (session_id, consumed) = CompactId::decode(payload)?;
                let (reconnect_key, _) = CompactId::decode(&payload[consumed..])?;
                self.session_id = Some(session_id);
                self.reconnect_key = Some(reconnect_key);
                self.state = SessionState::LoggedIn;
                Ok(SessionEvent::LoggedIn)
            }
            Opcode::LoginFailure => {
                let (reason, _) = read_prefixed(payload)?;
                Ok(SessionEvent::LoginFailed { reason })
            }
            Opcode::SessionMessage => {
                // First 8 bytes are a sequence number; not validated on
                // ingress (noted gap, left unenforced per design).
                let (data, _) = read_prefixed(&payload[8..])?;
                Ok(SessionEvent::RecvMessage { data })
            }
            Opcode::ReconnectSuccess => Ok(SessionEvent::Reconnected),
            Opcode::ReconnectFailure => {
                self.state = SessionState::Disconnected;
                Ok(SessionEvent::ForceDisconnect)
            }
            Opcode::LogoutSuccess => Ok(SessionEvent::ExpectingDisconnect),
            _ => Err(Error::BadMsgOpcode),
        }
    }

    fn dispatch_channel<'a>(&mut self, opcode: Opcode, payload: &'a [u8]) -> Result<SessionEvent<'a>> {
        match opcode {
            Opcode::ChannelJoin => {
                let (name, consumed) = read_prefixed(payload)?;
                let (channel_id, _) = CompactId::decode(&payload[consumed..])?;
                self.channels.join_named(channel_id, name.to_vec());
                Ok(SessionEvent::ChannelJoined { channel_id, name })
            }
            Opcode::ChannelLeave => {
                let (channel_id, _) = CompactId::decode(payload)?;
                if self.channels.leave(&channel_id).is_none() {
                    return Err(Error::UnknownChannel);
                }
                Ok(SessionEvent::ChannelLeft { channel_id })
            }
            Opcode::ChannelMessage => {
                let (channel_id, consumed) = CompactId::decode(payload)?;
                if !self.channels.contains(&channel_id) {
                    return Err(Error::UnknownChannel);
                }
                // 8-byte sequence number, unvalidated, same as SESSION_MESSAGE.
                let offset = consumed + 8;
                let (sender_id, sender_consumed) = CompactId::decode(&payload[offset..])?;
                let (data, _) = read_prefixed(&payload[offset + sender_consumed..])?;
                let sender = if sender_id.equals_server() { None } else { Some(sender_id) };
                Ok(SessionEvent::ChannelMessage { channel_id, sender, data })
            }
            _ => Err(Error::BadMsgOpcode),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
