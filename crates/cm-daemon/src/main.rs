//! Container manager daemon entry point.
//!
//! `argv[1]` is checked for a helper flag before any async runtime starts —
//! [`cm_devices::mknod`] and [`cm_devices::netif_inject`] both re-exec this
//! same binary into a single-threaded helper process to call `chroot`/`setns`
//! safely, the same two-hats-one-binary shape as the teacher's own
//! `boxlite-shim` (one binary, dispatched by its first argument, rather than
//! a second crate to build and ship).

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(author, version, about = "AGL container manager daemon")]
struct Args {
    /// Path to the host-level JSON config file.
    #[arg(long, default_value = "/etc/cm/host.json")]
    config: PathBuf,

    /// Directory lxc per-guest config/state is rendered into.
    #[arg(long, default_value = "/var/lib/cm")]
    state_dir: PathBuf,
}

fn main() -> ExitCode {
    let argv: Vec<String> = std::env::args().collect();

    if argv.len() > 1 && argv[1] == cm_devices::mknod::HELPER_FLAG {
        cm_shared::log::init();
        return ExitCode::from(cm_devices::mknod::run_as_helper(&argv[2..]) as u8);
    }
    if argv.len() > 1 && argv[1] == cm_devices::netif_inject::HELPER_FLAG {
        cm_shared::log::init();
        return ExitCode::from(cm_devices::netif_inject::run_as_helper(&argv[2..]) as u8);
    }

    cm_shared::log::init();
    let args = Args::parse();

    // current-thread: the reactor is one `tokio::select!` loop on one thread;
    // workqueue/dispatcher workers are plain `std::thread`, not tokio tasks.
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            cm_shared::log::critical_error(format!("failed to start tokio runtime: {e}"));
            return ExitCode::FAILURE;
        }
    };

    // anyhow only at this outermost boundary: everything below propagates
    // typed `CmError`, `?`-converted into `anyhow::Error` for the one spot
    // that just needs to log and pick an exit code.
    match runtime.block_on(run(args)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            cm_shared::log::critical_error(format!("daemon exiting on fatal error: {e:#}"));
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let host_config = cm_config::load_host_config(&args.config).map_err(|e| {
        cm_shared::CmError::Invariant(format!("failed to load host config {}: {e}", args.config.display()))
    })?;

    let (guests, roles) = cm_config::load_fleet(&host_config.config_dir).map_err(|e| {
        cm_shared::CmError::Invariant(format!("failed to load guest fleet: {e}"))
    })?;

    tracing::info!(guests = guests.len(), "fleet loaded");

    let exe_path = std::env::current_exe().map_err(cm_shared::CmError::Io)?;
    let lxc_runtime = cm_runtime::lxc::LxcRuntime::new(args.state_dir);

    let (workqueue_tx, workqueue_rx) = cm_supervisor::spawn_workqueue_bridge();
    let supervisor =
        cm_supervisor::Supervisor::new(guests, roles, host_config, lxc_runtime, exe_path, workqueue_tx);

    let uevent_socket = cm_devices::UeventSocket::open().map_err(cm_shared::CmError::Io)?;

    let (rtnl, rtnl_conn) = cm_devices::rtnl::connect().await?;
    tokio::spawn(rtnl_conn);

    let ipc_listener = cm_ipc::IpcListener::bind().map_err(cm_shared::CmError::Io)?;

    let reactor = cm_supervisor::Reactor::new(supervisor, uevent_socket, rtnl, ipc_listener, workqueue_rx);

    tracing::info!("container manager daemon starting");
    reactor.run().await;
    tracing::info!("container manager daemon exiting cleanly");

    Ok(())
}
