//! Event dispatch loop
//!
//! Receives one frame at a time, decodes it and hands the event to the
//! caller before the next receive. Shutdown is checked only at the top of
//! each iteration, so a frame that arrives while shutdown is being requested
//! is still delivered.
//!
//! The event callback returns [`ControlFlow`]; a `Break` carries the output
//! error that ends the loop. The shutdown token is left untouched.

use std::ops::ControlFlow;

use log::{debug, warn};

use crate::channel::{FrameSource, Received};
use crate::codec;
use crate::error::ProcwatchError;
use crate::signal::ShutdownToken;

/// Why the loop stopped
#[derive(Debug)]
pub enum Termination {
    /// The shutdown token was set
    RequestedShutdown,
    /// The kernel closed the channel
    ChannelClosed,
    /// A receive failed; the error is fatal
    Failed(ProcwatchError),
    /// The event callback could not deliver an event
    OutputFailed(ProcwatchError),
}

impl Termination {
    /// Whether the loop ended without a failure
    pub fn is_clean(&self) -> bool {
        matches!(
            self,
            Termination::RequestedShutdown | Termination::ChannelClosed
        )
    }
}

/// Run until shutdown, channel closure, a receive failure or a callback break
pub fn run<S, F>(
    source: &mut S,
    shutdown: &ShutdownToken,
    buffer_len: usize,
    mut on_event: F,
) -> Termination
where
    S: FrameSource + ?Sized,
    F: FnMut(codec::ProcessEvent) -> ControlFlow<ProcwatchError>,
{
    let mut buffer = vec![0u8; buffer_len];

    loop {
        if shutdown.is_requested() {
            debug!("shutdown requested, leaving listen loop");
            return Termination::RequestedShutdown;
        }

        let len = match source.receive_raw(&mut buffer) {
            Ok(Received::Frame(len)) => len,
            Ok(Received::EndOfChannel) => {
                debug!("kernel closed the channel");
                return Termination::ChannelClosed;
            }
            Err(e) => return Termination::Failed(e),
        };

        match codec::decode_event(&buffer[..len]) {
            Ok(event) => {
                if let ControlFlow::Break(e) = on_event(event) {
                    return Termination::OutputFailed(e);
                }
            }
            Err(e) => warn!("dropping malformed frame: {}", e),
        }
    }
}
