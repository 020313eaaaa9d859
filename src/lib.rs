//! procwatch: process lifecycle observer for Linux
//!
//! This library subscribes to the kernel's process event connector over
//! netlink and decodes fork, exec, credential change and exit notifications.

#[cfg(not(target_os = "linux"))]
compile_error!("procwatch requires the Linux proc connector");

pub mod channel;
pub mod cli;
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod init;
pub mod lifecycle;
pub mod output;
pub mod signal;
