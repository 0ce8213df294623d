// uimirror - client runtime for a server-driven UI
//
// Connects to the server socket, then runs one page session on a
// current-thread runtime until a fatal fault ends it.

use std::process::ExitCode;
use std::rc::Rc;

use log::{error, info};
use tokio::task::LocalSet;

use uimirror::Fault;
use uimirror::class::ClassTable;
use uimirror::config::{ClientEnvironment, RuntimeConfig};
use uimirror::processor::StaticModules;
use uimirror::session::Session;
use uimirror::widgets;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Optional first argument overrides the socket path
    let mut config = RuntimeConfig::from_env();
    if let Some(path) = std::env::args().nth(1) {
        config.socket_path = path;
    }
    info!("[Main] uimirror starting, socket {}", config.socket_path);

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!("[Main] failed to build tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let local = LocalSet::new();
    match local.block_on(&rt, run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(fault) => {
            error!("[Main] session ended: {fault}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(unix)]
async fn run(config: RuntimeConfig) -> Result<(), Fault> {
    let (channel, inbound) = uimirror::ipc::socket::connect(&config.socket_path)
        .await
        .map_err(|e| Fault::Transport(format!("cannot connect to {}: {e}", config.socket_path)))?;

    let mut classes = ClassTable::new();
    widgets::register_builtins(&mut classes)
        .map_err(|e| Fault::bad_argument("register_builtins", e.to_string()))?;

    let session = Session::start(
        config,
        classes,
        Rc::new(StaticModules::new()),
        Box::new(channel),
        inbound,
        &ClientEnvironment::detect(),
    );
    session.run().await
}

#[cfg(not(unix))]
async fn run(config: RuntimeConfig) -> Result<(), Fault> {
    Err(Fault::Transport(format!(
        "unix domain sockets are unavailable on this platform ({})",
        config.socket_path
    )))
}
