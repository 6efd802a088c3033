// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Host-supplied event callbacks and fd-registration hooks.
//!
//! A [`Context`] is passed to [`crate::connection::Connection::connect`] and
//! outlives it. It carries the target host/port, up to eight event sinks
//! (all start unset - the core null-checks before every call), and the two
//! hooks [`crate::connection::Connection::drive`] uses to ask the host to
//! watch or stop watching its socket for readiness.

use crate::connection::ConnectionId;
use crate::ids::CompactId;
use std::os::unix::io::RawFd;

bitflags::bitflags! {
    /// The readiness events a host I/O reactor reports to
    /// [`crate::connection::Connection::drive`], and that
    /// [`Context`]'s registration hooks ask the host to watch for.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Interest: u8 {
        const READ  = 0b001;
        const WRITE = 0b010;
        const ERR   = 0b100;
    }
}

type LoggedIn = Box<dyn FnMut(ConnectionId)>;
type LoginFailed = Box<dyn FnMut(ConnectionId, &[u8])>;
type RecvMessage = Box<dyn FnMut(ConnectionId, &[u8])>;
type Reconnected = Box<dyn FnMut(ConnectionId)>;
type Disconnected = Box<dyn FnMut(ConnectionId)>;
type ChannelJoined = Box<dyn FnMut(ConnectionId, &CompactId, &[u8])>;
type ChannelLeft = Box<dyn FnMut(ConnectionId, &CompactId)>;
type ChannelRecvMsg = Box<dyn FnMut(ConnectionId, &CompactId, Option<&CompactId>, &[u8])>;
type RegisterInterest = Box<dyn FnMut(ConnectionId, RawFd, Interest)>;

/// Host configuration and event sinks for one or more connections.
///
/// Built with [`ContextBuilder`]. Every sink is optional; a connection
/// dispatching an event whose sink is unset simply does nothing.
pub struct Context {
    pub(crate) host: String,
    pub(crate) port: u16,
    logged_in: Option<LoggedIn>,
    login_failed: Option<LoginFailed>,
    recv_message: Option<RecvMessage>,
    reconnected: Option<Reconnected>,
    disconnected: Option<Disconnected>,
    channel_joined: Option<ChannelJoined>,
    channel_left: Option<ChannelLeft>,
    channel_recv_msg: Option<ChannelRecvMsg>,
    register_interest: Option<RegisterInterest>,
    unregister_interest: Option<RegisterInterest>,
}

impl Context {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub(crate) fn fire_logged_in(&mut self, id: ConnectionId) {
        if let Some(cb) = &mut self.logged_in {
            cb(id);
        }
    }

    pub(crate) fn fire_login_failed(&mut self, id: ConnectionId, reason: &[u8]) {
        if let Some(cb) = &mut self.login_failed {
            cb(id, reason);
        }
    }

    pub(crate) fn fire_recv_message(&mut self, id: ConnectionId, data: &[u8]) {
        if let Some(cb) = &mut self.recv_message {
            cb(id, data);
        }
    }

    pub(crate) fn fire_reconnected(&mut self, id: ConnectionId) {
        if let Some(cb) = &mut self.reconnected {
            cb(id);
        }
    }

    pub(crate) fn fire_disconnected(&mut self, id: ConnectionId) {
        if let Some(cb) = &mut self.disconnected {
            cb(id);
        }
    }

    pub(crate) fn fire_channel_joined(&mut self, id: ConnectionId, channel_id: &CompactId, name: &[u8]) {
        if let Some(cb) = &mut self.channel_joined {
            cb(id, channel_id, name);
        }
    }

    pub(crate) fn fire_channel_left(&mut self, id: ConnectionId, channel_id: &CompactId) {
        if let Some(cb) = &mut self.channel_left {
            cb(id, channel_id);
        }
    }

    pub(crate) fn fire_channel_recv_msg(
        &mut self,
        id: ConnectionId,
        channel_id: &CompactId,
        sender: Option<&CompactId>,
        data: &[u8],
    ) {
        if let Some(cb) = &mut self.channel_recv_msg {
            cb(id, channel_id, sender, data);
        }
    }

    pub(crate) fn register_interest(&mut self, id: ConnectionId, fd: RawFd, interest: Interest) {
        if let Some(cb) = &mut self.register_interest {
            cb(id, fd, interest);
        }
    }

    pub(crate) fn unregister_interest(&mut self, id: ConnectionId, fd: RawFd, interest: Interest) {
        if let Some(cb) = &mut self.unregister_interest {
            cb(id, fd, interest);
        }
    }
}

/// Builds a [`Context`] by registering whichever event sinks the host
/// cares about.
#[derive(Default)]
pub struct ContextBuilder {
    host: String,
    port: u16,
    logged_in: Option<LoggedIn>,
    login_failed: Option<LoginFailed>,
    recv_message: Option<RecvMessage>,
    reconnected: Option<Reconnected>,
    disconnected: Option<Disconnected>,
    channel_joined: Option<ChannelJoined>,
    channel_left: Option<ChannelLeft>,
    channel_recv_msg: Option<ChannelRecvMsg>,
    register_interest: Option<RegisterInterest>,
    unregister_interest: Option<RegisterInterest>,
}

impl ContextBuilder {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        ContextBuilder {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn on_logged_in(mut self, cb: impl FnMut(ConnectionId) + 'static) -> Self {
        self.logged_in = Some(Box::new(cb));
        self
    }

    pub fn on_login_failed(mut self, cb: impl FnMut(ConnectionId, &[u8]) + 'static) -> Self {
        self.login_failed = Some(Box::new(cb));
        self
    }

    pub fn on_session_message(mut self, cb: impl FnMut(ConnectionId, &[u8]) + 'static) -> Self {
        self.recv_message = Some(Box::new(cb));
        self
    }

    pub fn on_reconnected(mut self, cb: impl FnMut(ConnectionId) + 'static) -> Self {
        self.reconnected = Some(Box::new(cb));
        self
    }

    pub fn on_disconnected(mut self, cb: impl FnMut(ConnectionId) + 'static) -> Self {
        self.disconnected = Some(Box::new(cb));
        self
    }

    pub fn on_channel_joined(mut self, cb: impl FnMut(ConnectionId, &CompactId, &[u8]) + 'static) -> Self {
        self.channel_joined = Some(Box::new(cb));
        self
    }

    pub fn on_channel_left(mut self, cb: impl FnMut(ConnectionId, &CompactId) + 'static) -> Self {
        self.channel_left = Some(Box::new(cb));
        self
    }

    pub fn on_channel_message(
        mut self,
        cb: impl FnMut(ConnectionId, &CompactId, Option<&CompactId>, &[u8]) + 'static,
    ) -> Self {
        self.channel_recv_msg = Some(Box::new(cb));
        self
    }

    pub fn on_register_interest(mut self, cb: impl FnMut(ConnectionId, RawFd, Interest) + 'static) -> Self {
        self.register_interest = Some(Box::new(cb));
        self
    }

    pub fn on_unregister_interest(mut self, cb: impl FnMut(ConnectionId, RawFd, Interest) + 'static) -> Self {
        self.unregister_interest = Some(Box::new(cb));
        self
    }

    pub fn build(self) -> Context {
        Context {
            host: self.host,
            port: self.port,
            logged_in: self.logged_in,
            login_failed: self.login_failed,
            recv_message: self.recv_message,
            reconnected: self.reconnected,
            disconnected: self.disconnected,
            channel_joined: self.channel_joined,
            channel_left: self.channel_left,
            channel_recv_msg: self.channel_recv_msg,
            register_interest: self.register_interest,
            unregister_interest: self.unregister_interest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn unset_sinks_are_a_no_op() {
        let mut ctx = ContextBuilder::new("example.com", 4460).build();
        ctx.fire_logged_in(ConnectionId(1));
        ctx.fire_disconnected(ConnectionId(1));
    }

    #[test]
    fn registered_sink_fires_with_expected_args() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen2 = seen.clone();
        let mut ctx = ContextBuilder::new("example.com", 4460)
            .on_session_message(move |id, data| seen2.borrow_mut().push((id, data.to_vec())))
            .build();
        ctx.fire_recv_message(ConnectionId(7), b"payload");
        assert_eq!(seen.borrow()[0], (ConnectionId(7), b"payload".to_vec()));
    }

    #[test]
    fn interest_flags_combine() {
        let both = Interest::READ | Interest::WRITE;
        assert!(both.contains(Interest::READ));
        assert!(both.contains(Interest::WRITE));
        assert!(!both.contains(Interest::ERR));
    }
}
