//! Shutdown signal handling for procwatch
//!
//! SIGINT only sets an atomic flag. The handler is registered through
//! signal-hook, which installs it with `SA_RESTART`, so a blocking `recv`
//! interrupted by the signal is restarted by the kernel instead of failing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use signal_hook::consts::SIGINT;
use signal_hook::SigId;

use crate::error::ProcwatchError;

/// Cooperative cancellation handle shared by the signal handler and the loop
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    flag: Arc<AtomicBool>,
}

impl ShutdownToken {
    /// Create a token with no shutdown requested
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the listen loop to stop before its next receive
    ///
    /// In the binary only the SIGINT handler sets the flag.
    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether shutdown has been requested
    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Register SIGINT so that it requests shutdown on `token`
///
/// The returned id can be passed to `signal_hook::low_level::unregister`.
pub fn install_shutdown_handler(token: &ShutdownToken) -> Result<SigId, ProcwatchError> {
    signal_hook::flag::register(SIGINT, Arc::clone(&token.flag))
        .map_err(|e| ProcwatchError::SignalSetup(format!("SIGINT: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_starts_clear() {
        let token = ShutdownToken::new();
        assert!(!token.is_requested());
    }

    #[test]
    fn test_request_is_visible_through_clones() {
        let token = ShutdownToken::new();
        let loop_side = token.clone();
        token.request();
        assert!(loop_side.is_requested());
    }

    #[test]
    fn test_sigint_sets_the_flag() {
        let token = ShutdownToken::new();
        let id = install_shutdown_handler(&token).unwrap();

        signal_hook::low_level::raise(SIGINT).unwrap();
        assert!(token.is_requested());

        assert!(signal_hook::low_level::unregister(id));
    }
}
