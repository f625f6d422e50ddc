// Part of camwatchd. SPDX-License-Identifier: Apache-2.0

mod child;
mod config;
mod core;
mod discovery;
mod encoder;
mod events;
mod onvif;
mod recorder;
mod rpc;
mod schedule;
mod source;
mod supervisor;
mod uvc;

mod cmds;

use bpaf::Bpaf;
use std::path::PathBuf;

#[derive(Debug, Clone, Bpaf)]
struct CommonOpts {
    /// Path to the camwatchd.toml configuration file.
    #[bpaf(long, argument("PATH"), fallback(PathBuf::from("/etc/camwatchd.toml")))]
    config: PathBuf,
}

/// camwatchd: ONVIF/RTSP/UVC camera streaming and recording daemon.
#[derive(Debug, Clone, Bpaf)]
#[bpaf(options, version)]
enum Args {
    /// Create the app-data root and an empty, migrated database.
    #[bpaf(command)]
    Init(#[bpaf(external(common_opts))] CommonOpts),

    /// Open the database read-only and report integrity issues.
    #[bpaf(command)]
    Check(#[bpaf(external(common_opts))] CommonOpts),

    /// Run the daemon: bind the media/RPC server, register schedules, and
    /// block until a shutdown signal.
    #[bpaf(command)]
    Run(#[bpaf(external(common_opts))] CommonOpts),
}

fn main() {
    // Confirm the monotonic clock is usable before anything else runs;
    // some container runtimes lack it entirely, and every timeout/retry
    // in this program assumes it works.
    if nix::time::clock_gettime(nix::time::ClockId::CLOCK_MONOTONIC).is_err() {
        eprintln!("fatal: CLOCK_MONOTONIC is unavailable on this host");
        std::process::exit(1);
    }

    base::tracing_setup::install();

    let args = args().run();
    let rt = tokio::runtime::Runtime::new().expect("building the tokio runtime");
    let result = match args {
        Args::Init(opts) => rt.block_on(cmds::init::run(&opts.config)),
        Args::Check(opts) => rt.block_on(cmds::check::run(&opts.config)),
        Args::Run(opts) => rt.block_on(cmds::run::run(&opts.config)),
    };

    if let Err(e) = result {
        tracing::error!(err = %e.chain(), "camwatchd exiting with an error");
        std::process::exit(1);
    }
}
