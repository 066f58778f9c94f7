//! # UDP Multicast Adapter
//!
//! Production heartbeat transport over an IPv4 multicast group.
//!
//! The socket is bound with `SO_REUSEADDR` (and `SO_REUSEPORT` on Unix) so
//! several instances on one host can share the group port, and multicast
//! loopback is enabled so co-located instances hear each other.

use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use shared_types::ConfigProvider;
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, warn};

use crate::domain::HeartbeatTransportError;
use crate::ports::HeartbeatTransport;

/// Default multicast group address.
pub const DEFAULT_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);

/// Default multicast port.
pub const DEFAULT_PORT: u16 = 4213;

/// Config key for the group address.
pub const GROUP_KEY: &str = "MF_DISCOVERY_GROUP";

/// Config key for the group port.
pub const PORT_KEY: &str = "MF_DISCOVERY_PORT";

const RECV_BUFFER_BYTES: usize = 8 * 1024;

/// Heartbeat transport on a UDP multicast socket.
pub struct UdpMulticastTransport {
    socket: UdpSocket,
    group: SocketAddrV4,
    interface: Ipv4Addr,
    joined: AtomicBool,
    read_timeout: Mutex<Option<Duration>>,
}

impl UdpMulticastTransport {
    /// Bind the group port on all interfaces.
    ///
    /// # Errors
    ///
    /// Returns error if the socket cannot be created or bound.
    pub fn bind(group: Ipv4Addr, port: u16, interface: Ipv4Addr) -> std::io::Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        #[cfg(unix)]
        socket.set_reuse_port(true)?;
        socket.set_multicast_loop_v4(true)?;
        socket.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port).into())?;

        debug!(group = %group, port, "Heartbeat socket bound");
        Ok(Self {
            socket: socket.into(),
            group: SocketAddrV4::new(group, port),
            interface,
            joined: AtomicBool::new(false),
            read_timeout: Mutex::new(None),
        })
    }

    /// Bind using `MF_DISCOVERY_GROUP` / `MF_DISCOVERY_PORT`, falling back to
    /// `239.255.255.250:4213`.
    ///
    /// # Errors
    ///
    /// Returns error if the socket cannot be created or bound.
    pub fn from_config(config: &dyn ConfigProvider) -> std::io::Result<Self> {
        let group = config
            .get_as_string(GROUP_KEY)
            .and_then(|g| g.parse().ok())
            .unwrap_or(DEFAULT_GROUP);
        let port = config
            .get_as_long(PORT_KEY)
            .and_then(|p| u16::try_from(p).ok())
            .unwrap_or(DEFAULT_PORT);
        Self::bind(group, port, Ipv4Addr::UNSPECIFIED)
    }

    #[must_use]
    pub fn group(&self) -> SocketAddrV4 {
        self.group
    }
}

impl HeartbeatTransport for UdpMulticastTransport {
    fn join(&self) -> Result<(), HeartbeatTransportError> {
        self.socket
            .join_multicast_v4(self.group.ip(), &self.interface)?;
        self.joined.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn leave(&self) {
        if !self.joined.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self
            .socket
            .leave_multicast_v4(self.group.ip(), &self.interface)
        {
            warn!(error = %e, "Failed to leave multicast group");
        }
    }

    fn send(&self, frame: &[u8]) -> Result<(), HeartbeatTransportError> {
        if !self.joined.load(Ordering::SeqCst) {
            return Err(HeartbeatTransportError::NotJoined);
        }
        self.socket.send_to(frame, self.group)?;
        Ok(())
    }

    fn recv(&self, timeout: Duration) -> Result<Option<Vec<u8>>, HeartbeatTransportError> {
        if !self.joined.load(Ordering::SeqCst) {
            return Err(HeartbeatTransportError::NotJoined);
        }
        // A zero timeout would mean "block forever".
        let timeout = timeout.max(Duration::from_millis(1));
        {
            let mut current = self.read_timeout.lock();
            if *current != Some(timeout) {
                self.socket.set_read_timeout(Some(timeout))?;
                *current = Some(timeout);
            }
        }

        let mut buf = [0u8; RECV_BUFFER_BYTES];
        match self.socket.recv_from(&mut buf) {
            Ok((n, _from)) => Ok(Some(buf[..n].to_vec())),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
