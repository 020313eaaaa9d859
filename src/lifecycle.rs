//! Subscription lifecycle around the dispatch loop
//!
//! Opening the channel and installing the shutdown handler happen before
//! [`observe`] is called; everything from LISTEN to close happens here.

use std::ops::ControlFlow;

use log::{info, warn};

use crate::channel::EventChannel;
use crate::codec::ProcessEvent;
use crate::dispatch::{self, Termination};
use crate::error::ProcwatchError;
use crate::signal::ShutdownToken;

/// Result of a clean observation run
#[derive(Debug)]
pub struct Outcome {
    /// `RequestedShutdown` or `ChannelClosed`
    pub reason: Termination,
    /// The LISTEN message could not be sent, events may never have arrived
    pub subscription_failed: bool,
}

/// Subscribe, run the dispatch loop, then unsubscribe and close
///
/// A failed subscribe is logged and observation proceeds. A receive failure
/// closes the channel without sending IGNORE and is returned as the error.
/// An output failure from `on_event` still unsubscribes, since the channel
/// itself is healthy, and is then returned as the error.
pub fn observe<C, F>(
    mut channel: C,
    shutdown: &ShutdownToken,
    buffer_len: usize,
    on_event: F,
) -> Result<Outcome, ProcwatchError>
where
    C: EventChannel,
    F: FnMut(ProcessEvent) -> ControlFlow<ProcwatchError>,
{
    let subscription_failed = match channel.set_listening(true) {
        Ok(()) => false,
        Err(e) => {
            warn!("{}; listening anyway", e);
            true
        }
    };

    let reason = dispatch::run(&mut channel, shutdown, buffer_len, on_event);

    if let Termination::Failed(e) = reason {
        channel.close();
        return Err(e);
    }

    info!("listen loop ended: {:?}", reason);
    if let Err(e) = channel.set_listening(false) {
        warn!("{}", e);
    }
    channel.close();

    if let Termination::OutputFailed(e) = reason {
        return Err(e);
    }
    Ok(Outcome {
        reason,
        subscription_failed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{FrameSource, Received};
    use crate::codec::encode_event;
    use nix::errno::Errno;
    use std::cell::RefCell;
    use std::io;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Listen(bool),
        Receive,
        Close,
    }

    struct FakeChannel {
        calls: Rc<RefCell<Vec<Call>>>,
        frames: Vec<Vec<u8>>,
        fail_listen: bool,
        fail_receive: bool,
    }

    impl FakeChannel {
        fn new(calls: &Rc<RefCell<Vec<Call>>>) -> Self {
            Self {
                calls: Rc::clone(calls),
                frames: Vec::new(),
                fail_listen: false,
                fail_receive: false,
            }
        }
    }

    impl FrameSource for FakeChannel {
        fn receive_raw(&mut self, buf: &mut [u8]) -> Result<Received, ProcwatchError> {
            self.calls.borrow_mut().push(Call::Receive);
            if !self.frames.is_empty() {
                let frame = self.frames.remove(0);
                buf[..frame.len()].copy_from_slice(&frame);
                return Ok(Received::Frame(frame.len()));
            }
            if self.fail_receive {
                Err(ProcwatchError::Receive(Errno::EBADF))
            } else {
                Ok(Received::EndOfChannel)
            }
        }
    }

    impl EventChannel for FakeChannel {
        fn set_listening(&mut self, enable: bool) -> Result<(), ProcwatchError> {
            self.calls.borrow_mut().push(Call::Listen(enable));
            if self.fail_listen {
                Err(ProcwatchError::Subscription {
                    op: "subscribe to",
                    reason: "ECONNREFUSED".to_string(),
                })
            } else {
                Ok(())
            }
        }

        fn close(self) {
            self.calls.borrow_mut().push(Call::Close);
        }
    }

    #[test]
    fn test_clean_run_unsubscribes_and_closes() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut channel = FakeChannel::new(&calls);
        channel.frames.push(encode_event(&ProcessEvent::ConnectionAck));
        let mut seen = Vec::new();

        let outcome = observe(channel, &ShutdownToken::new(), 128, |e| {
            seen.push(e);
            ControlFlow::Continue(())
        })
        .unwrap();

        assert!(matches!(outcome.reason, Termination::ChannelClosed));
        assert!(!outcome.subscription_failed);
        assert_eq!(seen, vec![ProcessEvent::ConnectionAck]);
        assert_eq!(
            *calls.borrow(),
            vec![
                Call::Listen(true),
                Call::Receive,
                Call::Receive,
                Call::Listen(false),
                Call::Close
            ]
        );
    }

    #[test]
    fn test_failed_subscribe_still_observes() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut channel = FakeChannel::new(&calls);
        channel.fail_listen = true;

        let outcome =
            observe(channel, &ShutdownToken::new(), 128, |_| ControlFlow::Continue(())).unwrap();

        assert!(outcome.subscription_failed);
        assert!(calls.borrow().contains(&Call::Receive));
        assert_eq!(calls.borrow().last(), Some(&Call::Close));
    }

    #[test]
    fn test_receive_failure_closes_without_unsubscribe() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut channel = FakeChannel::new(&calls);
        channel.fail_receive = true;

        let result =
            observe(channel, &ShutdownToken::new(), 128, |_| ControlFlow::Continue(()));

        assert!(matches!(
            result,
            Err(ProcwatchError::Receive(Errno::EBADF))
        ));
        assert_eq!(
            *calls.borrow(),
            vec![Call::Listen(true), Call::Receive, Call::Close]
        );
    }

    #[test]
    fn test_requested_shutdown_is_clean() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let channel = FakeChannel::new(&calls);
        let token = ShutdownToken::new();
        token.request();

        let outcome = observe(channel, &token, 128, |_| ControlFlow::Continue(())).unwrap();

        assert!(matches!(outcome.reason, Termination::RequestedShutdown));
        assert_eq!(
            *calls.borrow(),
            vec![Call::Listen(true), Call::Listen(false), Call::Close]
        );
    }

    #[test]
    fn test_output_failure_unsubscribes_then_returns_error() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut channel = FakeChannel::new(&calls);
        channel.frames.push(encode_event(&ProcessEvent::ConnectionAck));
        channel.frames.push(encode_event(&ProcessEvent::ConnectionAck));
        let token = ShutdownToken::new();

        let result = observe(channel, &token, 128, |_| {
            ControlFlow::Break(ProcwatchError::Output(io::Error::from(
                io::ErrorKind::BrokenPipe,
            )))
        });

        assert!(matches!(result, Err(ProcwatchError::Output(_))));
        assert!(!token.is_requested());
        assert_eq!(
            *calls.borrow(),
            vec![
                Call::Listen(true),
                Call::Receive,
                Call::Listen(false),
                Call::Close
            ]
        );
    }
}
