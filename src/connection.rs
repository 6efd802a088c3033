// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The non-blocking socket driver.
//!
//! `Connection` is the one stateful object an application holds: it owns
//! the socket, the inbound/outbound [`RingBuffer`]s, and the [`Session`].
//! It never blocks and never loops waiting for readiness - the host calls
//! [`Connection::drive`] exactly once per readiness notification, and every
//! `drive` call does a bounded amount of work before returning.
//!
//! ```text
//!      Disconnected --connect()--> Connecting --writable--> Connected
//! ```
//!
//! This is a *transport* state (`fsm_state`), distinct from the *protocol*
//! state in [`crate::session::SessionState`] - a connection can be
//! `Connected` at the TCP level while its session is still waiting on
//! `LOGIN_SUCCESS`.

use crate::config::{IO_BUFFER_CAPACITY, READ_BLOCK, SGS_MSG_MAX_LENGTH, WRITE_BLOCK};
use crate::context::{Context, Interest};
use crate::error::{Error, Result};
use crate::ring_buffer::RingBuffer;
use crate::session::{Session, SessionEvent, SessionState};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque handle a host stores to tell connections apart in callbacks.
///
/// Assigned once per `Connection` at construction time; never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub(crate) u64);

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

impl ConnectionId {
    fn next() -> Self {
        ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Transport-level connection state, independent of the login/logout
/// protocol state tracked by [`SessionState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransportState {
    Disconnected,
    Connecting,
    Connected,
}

/// Owns the socket, both ring buffers, and the session for one logical
/// connection to the server.
pub struct Connection {
    id: ConnectionId,
    stream: Option<TcpStream>,
    inbuf: RingBuffer,
    outbuf: RingBuffer,
    session: Session,
    context: Context,
    state: TransportState,
    expecting_disconnect: bool,
}

impl Connection {
    /// Resolve `context.host():context.port()`, open a non-blocking stream
    /// socket, pre-queue a `LOGIN_REQUEST`, and begin connecting.
    ///
    /// The login request is queued into the outbound buffer before the
    /// socket is even known to be connected - as long as write-interest
    /// isn't registered until the connect completes, it simply waits there,
    /// matching the original client's "trick" of writing it immediately.
    ///
    /// # Errors
    /// [`Error::CheckDnsError`] if the host can't be resolved;
    /// otherwise an `Io` error from socket creation or `connect()`.
    pub fn connect(addr: &str, port: u16, user: &str, password: &str, mut context: Context) -> Result<Self> {
        let id = ConnectionId::next();
        let mut session = Session::new();
        let mut outbuf = RingBuffer::new(IO_BUFFER_CAPACITY);
        session.login(user, password, &mut outbuf)?;

        let socket_addr = Self::resolve(addr, port)?;
        let socket = socket2::Socket::new(socket2::Domain::for_address(socket_addr), socket2::Type::STREAM, None)?;
        socket.set_nonblocking(true)?;

        let mut state = TransportState::Connecting;
        match socket.connect(&socket_addr.into()) {
            Ok(()) => state = TransportState::Connected,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            // POSIX connect() on a non-blocking socket reports "in progress"
            // as EINPROGRESS, which std surfaces as WouldBlock above; some
            // platforms report it through the raw errno instead.
            Err(e) if e.raw_os_error() == Some(libc::EINPROGRESS) => {}
            Err(e) => return Err(e.into()),
        }

        let stream: TcpStream = socket.into();
        let fd = stream.as_raw_fd();

        log::info!("connection {}: connecting to {}:{}", id.0, addr, port);
        context.register_interest(id, fd, Interest::WRITE);

        Ok(Connection {
            id,
            stream: Some(stream),
            inbuf: RingBuffer::new(IO_BUFFER_CAPACITY),
            outbuf,
            session,
            context,
            state,
            expecting_disconnect: false,
        })
    }

    fn resolve(addr: &str, port: u16) -> Result<SocketAddr> {
        (addr, port)
            .to_socket_addrs()
            .map_err(|_| Error::CheckDnsError)?
            .next()
            .ok_or(Error::CheckDnsError)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// The underlying socket's raw fd, for the host to register with its
    /// own reactor. `None` once disconnected.
    pub fn raw_fd(&self) -> Option<RawFd> {
        self.stream.as_ref().map(AsRawFd::as_raw_fd)
    }

    /// Process one readiness notification for this connection's fd.
    ///
    /// Reads at most [`READ_BLOCK`] bytes and writes at most [`WRITE_BLOCK`]
    /// bytes per call; never blocks. After handling the requested events,
    /// re-registers or unregisters read/write interest based on remaining
    /// buffer space, so the host's next poll only wakes this connection
    /// when there's real work to do.
    ///
    /// # Errors
    /// [`Error::NotConnected`] if called while disconnected;
    /// [`Error::BadFd`] if `fd` isn't this connection's own.
    pub fn drive(&mut self, fd: RawFd, events: Interest) -> Result<()> {
        if self.state == TransportState::Disconnected {
            return Err(Error::NotConnected);
        }
        let owned_fd = self.stream.as_ref().map(AsRawFd::as_raw_fd).ok_or(Error::NotConnected)?;
        if fd != owned_fd {
            return Err(Error::BadFd);
        }

        if events.contains(Interest::READ) {
            self.drive_read()?;
        }
        if events.contains(Interest::WRITE) {
            self.drive_write()?;
        }
        if events.contains(Interest::ERR) {
            self.drive_err();
            return Ok(());
        }

        self.update_interest();
        Ok(())
    }

    fn drive_read(&mut self) -> Result<()> {
        let stream = match &mut self.stream {
            Some(s) => s,
            None => return Ok(()),
        };
        match self.inbuf.read_from(stream, READ_BLOCK) {
            Ok(0) => {
                // `read_from` only returns 0 on a real EOF given a non-empty
                // request; we only get here when READ was signalled.
                self.handle_peer_close();
                return Ok(());
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
        self.consume_frames()
    }

    fn consume_frames(&mut self) -> Result<()> {
        loop {
            if self.inbuf.size() == 0 || !self.inbuf.can_read(4) {
                break;
            }
            let len = u32::from_be_bytes(self.inbuf.head()[..4].try_into().unwrap());
            let total = 4 + len as usize;
            if total > SGS_MSG_MAX_LENGTH {
                log::warn!("connection {}: declared frame length {} exceeds max, tearing down", self.id.0, total);
                return Err(Error::MessageTooLarge);
            }
            if !self.inbuf.can_read(total) {
                break;
            }
            let frame = self.inbuf.head()[..total].to_vec();
            let parsed = match crate::message::Message::parse(&frame) {
                Ok(m) => m,
                Err(e) => {
                    log::warn!("connection {}: malformed frame: {}", self.id.0, e);
                    return Err(e);
                }
            };
            let event = self.session.dispatch(&parsed);
            self.inbuf.read_update(total).expect("span checked by can_read above");
            self.apply_dispatch(event)?;
        }
        Ok(())
    }

    fn apply_dispatch(&mut self, event: Result<SessionEvent<'_>>) -> Result<()> {
        let id = self.id;
        match event? {
            SessionEvent::LoggedIn => {
                log::info!("connection {}: logged in", id.0);
                self.context.fire_logged_in(id)
            }
            SessionEvent::LoginFailed { reason } => {
                log::warn!("connection {}: login failed: {}", id.0, String::from_utf8_lossy(reason));
                self.context.fire_login_failed(id, reason)
            }
            SessionEvent::RecvMessage { data } => self.context.fire_recv_message(id, data),
            SessionEvent::Reconnected => self.context.fire_reconnected(id),
            SessionEvent::ForceDisconnect => {
                log::warn!("connection {}: reconnect failed, forcing disconnect", id.0);
                self.teardown()
            }
            SessionEvent::ExpectingDisconnect => self.expecting_disconnect = true,
            SessionEvent::ChannelJoined { channel_id, name } => {
                self.context.fire_channel_joined(id, &channel_id, name)
            }
            SessionEvent::ChannelLeft { channel_id } => self.context.fire_channel_left(id, &channel_id),
            SessionEvent::ChannelMessage { channel_id, sender, data } => {
                self.context.fire_channel_recv_msg(id, &channel_id, sender.as_ref(), data)
            }
        }
        Ok(())
    }

    fn drive_write(&mut self) -> Result<()> {
        if self.state == TransportState::Connecting {
            self.state = TransportState::Connected;
        }
        let stream = match &mut self.stream {
            Some(s) => s,
            None => return Ok(()),
        };
        match self.outbuf.write_to(stream, WRITE_BLOCK) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn drive_err(&mut self) {
        if let Some(stream) = &self.stream {
            let _ = stream.take_error();
        }
        self.handle_peer_close();
    }

    fn handle_peer_close(&mut self) {
        let id = self.id;
        let expecting = self.expecting_disconnect;
        self.teardown();
        if !expecting {
            log::info!("connection {}: peer closed unexpectedly", id.0);
            self.context.fire_disconnected(id);
        } else {
            log::debug!("connection {}: clean close after logout", id.0);
        }
    }

    fn update_interest(&mut self) {
        let id = self.id;
        let fd = match self.stream.as_ref().map(AsRawFd::as_raw_fd) {
            Some(fd) => fd,
            None => return,
        };
        if self.inbuf.remaining_capacity() > 0 {
            self.context.register_interest(id, fd, Interest::READ);
        } else {
            self.context.unregister_interest(id, fd, Interest::READ);
        }
        if self.outbuf.size() > 0 {
            self.context.register_interest(id, fd, Interest::WRITE);
        } else {
            self.context.unregister_interest(id, fd, Interest::WRITE);
        }
    }

    /// Send a `LOGOUT_REQUEST` and wait for the server to close cleanly, or
    /// (`force`) close the socket immediately without telling the server.
    pub fn logout(&mut self, force: bool) -> Result<()> {
        if force {
            self.teardown();
            return Ok(());
        }
        self.expecting_disconnect = true;
        let mut outbuf = std::mem::replace(&mut self.outbuf, RingBuffer::new(0));
        let result = self.session.logout(&mut outbuf);
        self.outbuf = outbuf;
        result?;
        if self.state == TransportState::Connected {
            if let Some(fd) = self.raw_fd() {
                self.context.register_interest(self.id, fd, Interest::WRITE);
            }
        }
        Ok(())
    }

    /// Unregister interest, close the socket, and reset to `Disconnected`.
    /// Buffered data is dropped.
    pub fn disconnect(&mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if let Some(stream) = self.stream.take() {
            let fd = stream.as_raw_fd();
            self.context.unregister_interest(self.id, fd, Interest::READ | Interest::WRITE | Interest::ERR);
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        self.state = TransportState::Disconnected;
        self.expecting_disconnect = false;
        self.session.set_state(SessionState::Disconnected);
    }

    /// Send application data once logged in. See
    /// [`Session::direct_send`].
    pub fn send(&mut self, data: &[u8]) -> Result<()> {
        self.session.direct_send(data, &mut self.outbuf)?;
        self.register_write_interest();
        Ok(())
    }

    /// Send to a channel once logged in. An empty `recipients` means "all
    /// members". See [`Session::channel_send`].
    pub fn channel_send(&mut self, channel_id: &crate::ids::CompactId, data: &[u8], recipients: &[crate::ids::CompactId]) -> Result<()> {
        self.session.channel_send(channel_id, data, recipients, &mut self.outbuf)?;
        self.register_write_interest();
        Ok(())
    }

    /// Send a `RECONNECT_REQUEST` carrying `reconnect_key`. Left to the host
    /// to trigger - see [`Session::reconnect`].
    pub fn reconnect(&mut self, reconnect_key: &crate::ids::CompactId) -> Result<()> {
        self.session.reconnect(reconnect_key, &mut self.outbuf)?;
        self.register_write_interest();
        Ok(())
    }

    fn register_write_interest(&mut self) {
        if self.state == TransportState::Connected {
            if let Some(fd) = self.raw_fd() {
                self.context.register_interest(self.id, fd, Interest::WRITE);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextBuilder;
    use crate::ids::CompactId;
    use crate::message::{MessageBuilder, Opcode, Service};
    use std::cell::RefCell;
    use std::io::{Read as _, Write as _};
    use std::net::TcpListener;
    use std::rc::Rc;
    use std::time::Duration;

    fn connect_pair() -> (Connection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let ctx = ContextBuilder::new(addr.ip().to_string(), addr.port()).build();
        let conn = Connection::connect(&addr.ip().to_string(), addr.port(), "alice", "pw", ctx).unwrap();
        let (server, _) = listener.accept().unwrap();
        server.set_nonblocking(false).unwrap();
        (conn, server)
    }

    fn build_login_success(session_id: &[u8], reconnect_key: &[u8]) -> Vec<u8> {
        let mut backing = [0u8; 64];
        let size = {
            let mut msg = MessageBuilder::init(&mut backing, Service::Application, Opcode::LoginSuccess).unwrap();
            msg.add_raw(&CompactId::from_bytes(session_id).unwrap().encode()).unwrap();
            msg.add_raw(&CompactId::from_bytes(reconnect_key).unwrap().encode()).unwrap();
            msg.size()
        };
        backing[..size].to_vec()
    }

    #[test]
    fn connect_sends_login_request_on_first_writable_drive() {
        let (mut conn, mut server) = connect_pair();
        let fd = conn.raw_fd().unwrap();
        conn.drive(fd, Interest::WRITE).unwrap();

        server.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let mut header = [0u8; 7];
        server.read_exact(&mut header).unwrap();
        assert_eq!(header[5], 0x01); // APPLICATION
        assert_eq!(header[6], 0x10); // LOGIN_REQUEST
    }

    #[test]
    fn login_success_fires_logged_in_callback() {
        let fired = Rc::new(RefCell::new(false));
        let fired2 = fired.clone();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let ctx = ContextBuilder::new(addr.ip().to_string(), addr.port())
            .on_logged_in(move |_id| *fired2.borrow_mut() = true)
            .build();
        let mut conn = Connection::connect(&addr.ip().to_string(), addr.port(), "alice", "pw", ctx).unwrap();
        let (mut server, _) = listener.accept().unwrap();
        server.set_nonblocking(false).unwrap();

        let fd = conn.raw_fd().unwrap();
        conn.drive(fd, Interest::WRITE).unwrap();
        let mut drain = [0u8; 64];
        let _ = server.read(&mut drain);

        let frame = build_login_success(&[0x7a], &[0x01, 0x02]);
        server.write_all(&frame).unwrap();
        std::thread::sleep(Duration::from_millis(50));

        conn.drive(fd, Interest::READ).unwrap();
        assert!(*fired.borrow());
        assert_eq!(conn.session().state(), SessionState::LoggedIn);
    }

    #[test]
    fn frame_split_across_two_reads_fires_once() {
        let fired = Rc::new(RefCell::new(0u32));
        let fired2 = fired.clone();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let ctx = ContextBuilder::new(addr.ip().to_string(), addr.port())
            .on_logged_in(move |_id| *fired2.borrow_mut() += 1)
            .build();
        let mut conn = Connection::connect(&addr.ip().to_string(), addr.port(), "alice", "pw", ctx).unwrap();
        let (mut server, _) = listener.accept().unwrap();
        server.set_nonblocking(false).unwrap();

        let fd = conn.raw_fd().unwrap();
        conn.drive(fd, Interest::WRITE).unwrap();
        let mut drain = [0u8; 64];
        let _ = server.read(&mut drain);

        let frame = build_login_success(&[0x7a], &[0x01, 0x02]);
        server.write_all(&frame[..3]).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        conn.drive(fd, Interest::READ).unwrap();
        assert_eq!(*fired.borrow(), 0, "callback must not fire on a partial frame");

        server.write_all(&frame[3..]).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        conn.drive(fd, Interest::READ).unwrap();
        assert_eq!(*fired.borrow(), 1, "callback must fire exactly once once the frame completes");
    }

    #[test]
    fn oversized_declared_length_errors_instead_of_wedging() {
        let (mut conn, mut server) = connect_pair();
        let fd = conn.raw_fd().unwrap();
        conn.drive(fd, Interest::WRITE).unwrap();
        let mut drain = [0u8; 64];
        let _ = server.read(&mut drain);

        // Declared payload_len alone already exceeds SGS_MSG_MAX_LENGTH;
        // the extractor must reject this before waiting on more bytes.
        server.write_all(&[0xFF, 0xFF, 0xFF, 0xFF]).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert!(matches!(conn.drive(fd, Interest::READ), Err(Error::MessageTooLarge)));
    }

    #[test]
    fn drive_on_foreign_fd_is_rejected() {
        let (mut conn, _server) = connect_pair();
        assert!(matches!(conn.drive(99999, Interest::READ), Err(Error::BadFd)));
    }

    #[test]
    fn drive_after_disconnect_is_rejected() {
        let (mut conn, _server) = connect_pair();
        conn.disconnect();
        assert!(matches!(conn.drive(1, Interest::READ), Err(Error::NotConnected)));
    }

    #[test]
    fn peer_close_without_logout_fires_disconnected() {
        let fired = Rc::new(RefCell::new(false));
        let fired2 = fired.clone();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let ctx = ContextBuilder::new(addr.ip().to_string(), addr.port())
            .on_disconnected(move |_id| *fired2.borrow_mut() = true)
            .build();
        let mut conn = Connection::connect(&addr.ip().to_string(), addr.port(), "alice", "pw", ctx).unwrap();
        let (server, _) = listener.accept().unwrap();
        drop(server);

        let fd = conn.raw_fd().unwrap();
        std::thread::sleep(Duration::from_millis(50));
        conn.drive(fd, Interest::READ).unwrap();
        assert!(*fired.borrow());
    }
}
