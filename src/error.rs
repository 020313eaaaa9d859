//! Error types and exit codes for procwatch
//!
//! Setup, subscription and receive failures carry the operation that failed
//! and the underlying errno so the diagnostic points at the exact call.

use std::io;
use std::process::ExitCode;

use nix::errno::Errno;
use thiserror::Error;

/// Exit codes for the procwatch command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcwatchExitCode {
    /// Clean shutdown
    Success = 0,
    /// Channel could not be opened or shutdown handling could not be installed
    SetupFailed = 1,
    /// Insufficient privilege for the process event channel
    PermissionDenied = 2,
    /// Configuration file error
    ConfigError = 3,
    /// The listen loop stopped on a receive failure
    ReceiveFailed = 4,
    /// General/other error
    GeneralError = 255,
}

impl From<ProcwatchExitCode> for ExitCode {
    fn from(code: ProcwatchExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Error types for procwatch operations
#[derive(Error, Debug)]
pub enum ProcwatchError {
    // Setup errors
    /// Socket creation or bind failed
    #[error("Failed to open process event channel ({op}): {source}")]
    ChannelOpen {
        op: &'static str,
        #[source]
        source: Errno,
    },

    /// Socket creation or bind was refused for lack of privilege
    #[error("Permission denied opening process event channel ({op}); run as root or grant CAP_NET_ADMIN")]
    PermissionDenied { op: &'static str },

    /// Shutdown signal handler could not be registered
    #[error("Failed to install shutdown handler: {0}")]
    SignalSetup(String),

    // Channel errors
    /// LISTEN/IGNORE control message could not be delivered
    #[error("Failed to {op} process events: {reason}")]
    Subscription { op: &'static str, reason: String },

    /// Blocking receive failed with something other than EINTR
    #[error("Failed to receive process event: {0}")]
    Receive(#[source] Errno),

    // Output errors
    /// An event line could not be written (e.g. the reader closed the pipe)
    #[error("Failed to write event: {0}")]
    Output(#[source] io::Error),

    // User input errors
    /// Conflicting or incomplete command line arguments
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    /// Configuration file parse error
    #[error("Config parse error: {0}")]
    ConfigError(String),

    /// Configuration file could not be written
    #[error("Config creation error: {0}")]
    ConfigCreationError(String),
}

impl ProcwatchError {
    /// Get the appropriate exit code for this error
    pub fn exit_code(&self) -> ProcwatchExitCode {
        match self {
            ProcwatchError::ChannelOpen { .. } | ProcwatchError::SignalSetup(_) => {
                ProcwatchExitCode::SetupFailed
            }
            ProcwatchError::PermissionDenied { .. } => ProcwatchExitCode::PermissionDenied,
            ProcwatchError::ConfigError(_) | ProcwatchError::ConfigCreationError(_) => {
                ProcwatchExitCode::ConfigError
            }
            ProcwatchError::Receive(_) => ProcwatchExitCode::ReceiveFailed,
            _ => ProcwatchExitCode::GeneralError,
        }
    }

    /// Map a failed setup call, surfacing privilege problems separately
    pub fn from_open(op: &'static str, errno: Errno) -> Self {
        match errno {
            Errno::EPERM | Errno::EACCES => ProcwatchError::PermissionDenied { op },
            source => ProcwatchError::ChannelOpen { op, source },
        }
    }
}

/// Reasons a received frame could not be decoded
///
/// These never stop the listen loop; the frame is dropped and logged.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Frame is too short for the header or for its kind's payload
    #[error("frame truncated reading {field}: need {needed} bytes, got {actual}")]
    Truncated {
        field: &'static str,
        needed: usize,
        actual: usize,
    },

    /// Netlink length field disagrees with the received datagram
    #[error("netlink length {declared} does not fit received frame of {actual} bytes")]
    LengthMismatch { declared: usize, actual: usize },

    /// Connector id is not the process event connector
    #[error("frame from foreign connector idx={idx} val={val}")]
    ForeignChannel { idx: u32, val: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ProcwatchExitCode::Success as u8, 0);
        assert_eq!(ProcwatchExitCode::SetupFailed as u8, 1);
        assert_eq!(ProcwatchExitCode::PermissionDenied as u8, 2);
        assert_eq!(ProcwatchExitCode::ConfigError as u8, 3);
        assert_eq!(ProcwatchExitCode::ReceiveFailed as u8, 4);
        assert_eq!(ProcwatchExitCode::GeneralError as u8, 255);
    }

    #[test]
    fn test_channel_open_error_message() {
        let err = ProcwatchError::ChannelOpen {
            op: "bind",
            source: Errno::EADDRINUSE,
        };
        let msg = err.to_string();
        assert!(msg.starts_with("Failed to open process event channel (bind): "));
        assert!(msg.contains("EADDRINUSE"));
    }

    #[test]
    fn test_permission_denied_error_message() {
        let err = ProcwatchError::PermissionDenied { op: "socket" };
        assert!(err.to_string().contains("(socket)"));
        assert!(err.to_string().contains("CAP_NET_ADMIN"));
    }

    #[test]
    fn test_subscription_error_message() {
        let err = ProcwatchError::Subscription {
            op: "subscribe to",
            reason: "ENOBUFS: No buffer space available".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to subscribe to process events: ENOBUFS: No buffer space available"
        );
    }

    #[test]
    fn test_from_open_maps_privilege_errors() {
        assert!(matches!(
            ProcwatchError::from_open("bind", Errno::EPERM),
            ProcwatchError::PermissionDenied { op: "bind" }
        ));
        assert!(matches!(
            ProcwatchError::from_open("socket", Errno::EACCES),
            ProcwatchError::PermissionDenied { op: "socket" }
        ));
        assert!(matches!(
            ProcwatchError::from_open("socket", Errno::EPROTONOSUPPORT),
            ProcwatchError::ChannelOpen {
                op: "socket",
                source: Errno::EPROTONOSUPPORT
            }
        ));
    }

    #[test]
    fn test_error_to_exit_code() {
        assert_eq!(
            ProcwatchError::from_open("bind", Errno::EINVAL).exit_code(),
            ProcwatchExitCode::SetupFailed
        );
        assert_eq!(
            ProcwatchError::PermissionDenied { op: "bind" }.exit_code(),
            ProcwatchExitCode::PermissionDenied
        );
        assert_eq!(
            ProcwatchError::SignalSetup("x".to_string()).exit_code(),
            ProcwatchExitCode::SetupFailed
        );
        assert_eq!(
            ProcwatchError::Receive(Errno::ENOBUFS).exit_code(),
            ProcwatchExitCode::ReceiveFailed
        );
        assert_eq!(
            ProcwatchError::ConfigError("bad".to_string()).exit_code(),
            ProcwatchExitCode::ConfigError
        );
        assert_eq!(
            ProcwatchError::ConfigCreationError("bad".to_string()).exit_code(),
            ProcwatchExitCode::ConfigError
        );
        assert_eq!(
            ProcwatchError::Output(io::Error::from(io::ErrorKind::BrokenPipe)).exit_code(),
            ProcwatchExitCode::GeneralError
        );
        assert_eq!(
            ProcwatchError::InvalidArgs("x".to_string()).exit_code(),
            ProcwatchExitCode::GeneralError
        );
    }

    #[test]
    fn test_decode_error_messages() {
        assert_eq!(
            DecodeError::Truncated {
                field: "what",
                needed: 40,
                actual: 12
            }
            .to_string(),
            "frame truncated reading what: need 40 bytes, got 12"
        );
        assert_eq!(
            DecodeError::ForeignChannel { idx: 3, val: 1 }.to_string(),
            "frame from foreign connector idx=3 val=1"
        );
    }
}
