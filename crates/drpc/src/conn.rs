//! Packet connections — `AF_UNIX` / `SOCK_SEQPACKET` sockets on tokio.
//!
//! Each `send_packet` is delivered to the peer as exactly one
//! `recv_packet`, which is what the chunk framing relies on. The sockets are
//! non-blocking socket2 handles driven by tokio's `AsyncFd` readiness.

use std::future::Future;
use std::io::{self, Read};
use std::net::Shutdown;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use socket2::{Domain, SockAddr, Socket, Type};
use tokio::io::unix::AsyncFd;

/// A message-oriented duplex connection.
///
/// The transport layer is generic over this so the framing can run over
/// anything that preserves datagram boundaries.
pub trait PacketConn: Send + Sync {
    /// Send one datagram.
    fn send_packet(&self, buf: &[u8]) -> impl Future<Output = io::Result<()>> + Send;

    /// Receive one datagram into `buf`. Returns 0 when the peer has closed.
    fn recv_packet(&self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send;
}

/// Credentials of the process on the other end of a connection,
/// as reported by the kernel when the connection was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerCredentials {
    pub pid: i32,
    pub uid: u32,
    pub gid: u32,
}

/// One connected seqpacket socket.
#[derive(Debug)]
pub struct SeqPacketConn {
    fd: AsyncFd<Socket>,
}

impl SeqPacketConn {
    /// Dial the listener bound at `path`.
    pub async fn connect(path: &Path) -> io::Result<Self> {
        let addr = SockAddr::unix(path)?;
        // A local connect completes or fails immediately unless the backlog is
        // full; run it off the reactor so a full backlog cannot stall a worker.
        let socket = tokio::task::spawn_blocking(move || -> io::Result<Socket> {
            let socket = Socket::new(Domain::UNIX, Type::SEQPACKET, None)?;
            socket.connect(&addr)?;
            Ok(socket)
        })
        .await
        .map_err(io::Error::other)??;

        Self::from_socket(socket)
    }

    /// A connected pair, both ends in this process.
    pub fn pair() -> io::Result<(Self, Self)> {
        let (a, b) = Socket::pair(Domain::UNIX, Type::SEQPACKET, None)?;
        Ok((Self::from_socket(a)?, Self::from_socket(b)?))
    }

    fn from_socket(socket: Socket) -> io::Result<Self> {
        socket.set_nonblocking(true)?;
        Ok(Self {
            fd: AsyncFd::new(socket)?,
        })
    }

    /// Shut down both directions. Pending and future reads on either end
    /// observe end-of-stream.
    pub fn shutdown(&self) -> io::Result<()> {
        self.fd.get_ref().shutdown(Shutdown::Both)
    }

    /// Credentials of the connected peer (`SO_PEERCRED`).
    #[cfg(target_os = "linux")]
    pub fn peer_credentials(&self) -> io::Result<PeerCredentials> {
        let mut cred = libc::ucred {
            pid: 0,
            uid: 0,
            gid: 0,
        };
        let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;
        let rc = unsafe {
            libc::getsockopt(
                self.fd.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_PEERCRED,
                &mut cred as *mut libc::ucred as *mut libc::c_void,
                &mut len,
            )
        };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(PeerCredentials {
            pid: cred.pid,
            uid: cred.uid,
            gid: cred.gid,
        })
    }

    #[cfg(not(target_os = "linux"))]
    pub fn peer_credentials(&self) -> io::Result<PeerCredentials> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "SO_PEERCRED is only available on Linux",
        ))
    }
}

impl PacketConn for SeqPacketConn {
    async fn send_packet(&self, buf: &[u8]) -> io::Result<()> {
        loop {
            let mut guard = self.fd.writable().await?;
            match guard.try_io(|inner| inner.get_ref().send_with_flags(buf, libc::MSG_NOSIGNAL)) {
                Ok(result) => {
                    let sent = result?;
                    if sent != buf.len() {
                        return Err(io::Error::new(
                            io::ErrorKind::WriteZero,
                            format!("partial datagram write: {sent} of {} bytes", buf.len()),
                        ));
                    }
                    return Ok(());
                }
                Err(_would_block) => continue,
            }
        }
    }

    async fn recv_packet(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let mut guard = self.fd.readable().await?;
            match guard.try_io(|inner| {
                let mut socket: &Socket = inner.get_ref();
                socket.read(buf)
            }) {
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }
}

/// A bound, listening seqpacket socket.
#[derive(Debug)]
pub struct SeqPacketListener {
    fd: AsyncFd<Socket>,
    path: PathBuf,
}

impl SeqPacketListener {
    /// Bind and listen at `path`. The path must not exist.
    pub fn bind(path: &Path, backlog: i32) -> io::Result<Self> {
        let socket = Socket::new(Domain::UNIX, Type::SEQPACKET, None)?;
        socket.bind(&SockAddr::unix(path)?)?;
        socket.listen(backlog)?;
        socket.set_nonblocking(true)?;
        Ok(Self {
            fd: AsyncFd::new(socket)?,
            path: path.to_path_buf(),
        })
    }

    pub async fn accept(&self) -> io::Result<SeqPacketConn> {
        loop {
            let mut guard = self.fd.readable().await?;
            match guard.try_io(|inner| inner.get_ref().accept()) {
                Ok(result) => {
                    let (socket, _addr) = result?;
                    return SeqPacketConn::from_socket(socket);
                }
                Err(_would_block) => continue,
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Outcome of probing a socket path before binding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    /// Nothing exists at the path.
    Absent,
    /// A file exists but nothing accepts connections on it.
    Stale,
    /// A listener answered.
    Live,
}

/// Find out whether something is listening at `path`. Never blocks: a
/// listener whose backlog is full still counts as live.
pub fn probe(path: &Path) -> io::Result<ProbeResult> {
    if std::fs::symlink_metadata(path).is_err() {
        return Ok(ProbeResult::Absent);
    }
    let socket = Socket::new(Domain::UNIX, Type::SEQPACKET, None)?;
    socket.set_nonblocking(true)?;
    match socket.connect(&SockAddr::unix(path)?) {
        Ok(()) => Ok(ProbeResult::Live),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(ProbeResult::Live),
        Err(e) if e.raw_os_error() == Some(libc::EINPROGRESS) => Ok(ProbeResult::Live),
        Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => Ok(ProbeResult::Stale),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(ProbeResult::Absent),
        Err(e) => Err(e),
    }
}
