//! Netlink channel to the kernel's process event connector
//!
//! The socket is bound to this process's pid and to the `CN_IDX_PROC`
//! multicast group. Nothing is delivered until a LISTEN control message has
//! been sent with [`EventChannel::set_listening`].

use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

use log::{debug, trace};
use nix::errno::Errno;
use nix::sys::socket::{bind, recv, send, MsgFlags, NetlinkAddr};
use nix::unistd::getpid;

use crate::codec::{self, CN_IDX_PROC};
use crate::error::ProcwatchError;

/// Outcome of one successful receive call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    /// A datagram of this many bytes was written to the buffer
    Frame(usize),
    /// Zero-length read: the kernel closed the channel
    EndOfChannel,
}

/// Source of raw frames for the dispatch loop
pub trait FrameSource {
    /// Block until one datagram arrives
    ///
    /// Interruption by a signal is never reported; the read is restarted.
    fn receive_raw(&mut self, buf: &mut [u8]) -> Result<Received, ProcwatchError>;
}

/// Full channel contract used by the lifecycle controller
pub trait EventChannel: FrameSource {
    /// Send LISTEN (`true`) or IGNORE (`false`) to the connector
    fn set_listening(&mut self, enable: bool) -> Result<(), ProcwatchError>;

    /// Release the channel
    fn close(self);
}

/// Netlink connector socket subscribed to process events
#[derive(Debug)]
pub struct NetlinkChannel {
    fd: OwnedFd,
    pid: u32,
    subscribed: bool,
}

impl NetlinkChannel {
    /// Create the socket and bind it to the process event multicast group
    pub fn open() -> Result<Self, ProcwatchError> {
        // SAFETY: plain syscall with constant arguments; the result is checked below.
        let raw = unsafe {
            libc::socket(
                libc::PF_NETLINK,
                libc::SOCK_DGRAM | libc::SOCK_CLOEXEC,
                libc::NETLINK_CONNECTOR,
            )
        };
        let raw = Errno::result(raw).map_err(|e| ProcwatchError::from_open("socket", e))?;
        // SAFETY: `raw` is a freshly created descriptor owned by nobody else.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        let pid = getpid().as_raw() as u32;
        let addr = NetlinkAddr::new(pid, CN_IDX_PROC);
        bind(fd.as_raw_fd(), &addr).map_err(|e| ProcwatchError::from_open("bind", e))?;

        debug!("bound netlink connector socket (fd {}) for pid {}", raw, pid);
        Ok(Self {
            fd,
            pid,
            subscribed: false,
        })
    }

    /// Port id the socket is bound to
    pub fn pid(&self) -> u32 {
        self.pid
    }
}

impl FrameSource for NetlinkChannel {
    fn receive_raw(&mut self, buf: &mut [u8]) -> Result<Received, ProcwatchError> {
        loop {
            match recv(self.fd.as_raw_fd(), buf, MsgFlags::empty()) {
                Ok(0) => return Ok(Received::EndOfChannel),
                Ok(len) => return Ok(Received::Frame(len)),
                Err(Errno::EINTR) => trace!("receive interrupted by signal, restarting"),
                Err(e) => return Err(ProcwatchError::Receive(e)),
            }
        }
    }
}

impl EventChannel for NetlinkChannel {
    fn set_listening(&mut self, enable: bool) -> Result<(), ProcwatchError> {
        let op = if enable {
            "subscribe to"
        } else {
            "unsubscribe from"
        };
        if enable && self.subscribed {
            return Err(ProcwatchError::Subscription {
                op,
                reason: "channel was already subscribed once".to_string(),
            });
        }

        let msg = codec::encode_subscribe(enable, self.pid);
        let sent = send(self.fd.as_raw_fd(), &msg, MsgFlags::empty()).map_err(|e| {
            ProcwatchError::Subscription {
                op,
                reason: e.to_string(),
            }
        })?;
        if sent != msg.len() {
            return Err(ProcwatchError::Subscription {
                op,
                reason: format!("short write of {} of {} bytes", sent, msg.len()),
            });
        }

        if enable {
            self.subscribed = true;
        }
        debug!("sent {} control message", if enable { "LISTEN" } else { "IGNORE" });
        Ok(())
    }

    fn close(self) {
        debug!("closing netlink connector socket");
        drop(self.fd);
    }
}
