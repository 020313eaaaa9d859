//! procwatch: print Linux process lifecycle events
//!
//! Subscribes to the kernel's process event connector and prints one line
//! per event until interrupted with SIGINT.

use std::io;
use std::ops::ControlFlow;
use std::process::ExitCode;

use log::{info, warn, LevelFilter};

use procwatch::channel::NetlinkChannel;
use procwatch::cli::{CliArgs, ExecutionMode};
use procwatch::config::effective_buffer_len;
use procwatch::error::ProcwatchError;
use procwatch::init::InitCommand;
use procwatch::lifecycle;
use procwatch::output::EventWriter;
use procwatch::signal::{self, ShutdownToken};

fn main() -> ExitCode {
    let args = CliArgs::parse_args();
    init_logging(args.log_level());

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("procwatch: {}", e);
            e.exit_code().into()
        }
    }
}

/// Log to stderr; RUST_LOG overrides the -v level
fn init_logging(level: LevelFilter) {
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

/// Main execution logic
fn run(args: &CliArgs) -> Result<(), ProcwatchError> {
    match args.validate()? {
        ExecutionMode::InitConfig { force } => {
            let path = InitCommand::execute(force)?;
            println!("Created: {}", path.display());
            Ok(())
        }
        ExecutionMode::Listen => listen(args),
    }
}

/// Open, subscribe, print events until shutdown, then unsubscribe and close
fn listen(args: &CliArgs) -> Result<(), ProcwatchError> {
    let config = args.load_config()?;
    let format = args.output_format(&config);
    let buffer_len = effective_buffer_len(args.buffer_size(&config));

    let channel = NetlinkChannel::open()?;
    let shutdown = ShutdownToken::new();
    signal::install_shutdown_handler(&shutdown)?;
    info!("listening for process events as pid {}", channel.pid());

    let mut writer = EventWriter::new(io::stdout().lock(), format);
    let outcome = lifecycle::observe(channel, &shutdown, buffer_len, |event| {
        match writer.write_event(&event) {
            Ok(()) => ControlFlow::Continue(()),
            Err(e) => ControlFlow::Break(ProcwatchError::Output(e)),
        }
    })?;

    if outcome.subscription_failed {
        warn!("subscription was never confirmed; events may have been missed");
    }
    info!("stopped: {:?}", outcome.reason);
    Ok(())
}
