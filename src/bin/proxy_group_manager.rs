//! Runs the proxy group manager as a standalone process.
//!
//! Usage:
//!
//! ```text
//! proxy_group_manager <config-path>
//! ```
//!
//! The configuration file is described in [`proxy_groups::config`]. SIGINT
//! and SIGTERM request shutdown; the manager then stops its update service,
//! releases the cache and the process exits, or parks forever when
//! `park_after_shutdown` is set.

#[cfg(unix)]
use camino::Utf8PathBuf;
#[cfg(unix)]
use diesel::pg::PgConnection;
#[cfg(unix)]
use diesel::r2d2::{ConnectionManager, Pool};
#[cfg(unix)]
use mockable::DefaultClock;
#[cfg(unix)]
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
#[cfg(unix)]
use proxy_groups::{
    config::{ConfigError, ManagerConfig},
    ipc::UnixSocketEndpoint,
    proxy_group::{
        adapters::{activity::ActivityMonitor, postgres::PostgresProxyGroupStore},
        services::{ManagerError, ManagerPorts, ProxyGroupManager, ShutdownSignal},
    },
    telemetry,
};
#[cfg(unix)]
use std::env;
#[cfg(unix)]
use std::sync::Arc;
#[cfg(unix)]
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(unix)]
use std::time::Duration;
#[cfg(unix)]
use thiserror::Error;
#[cfg(unix)]
use tracing::{error, info};

/// Boxed error type for the main result.
type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[cfg(unix)]
static SIGNALLED: AtomicBool = AtomicBool::new(false);

#[cfg(unix)]
const SIGNAL_POLL: Duration = Duration::from_millis(100);

/// Errors that end the process.
#[cfg(unix)]
#[derive(Debug, Error)]
enum ProcessError {
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cannot install tracing subscriber: {0}")]
    Telemetry(#[from] tracing_subscriber::util::TryInitError),
    #[error("cannot install signal handlers: {0}")]
    Signal(#[from] nix::Error),
    #[error("cannot start signal watcher: {0}")]
    SignalWatcher(#[source] std::io::Error),
    #[error("cannot create database pool: {0}")]
    Pool(#[source] diesel::r2d2::PoolError),
    #[error(transparent)]
    Manager(#[from] ManagerError),
}

#[cfg(unix)]
fn main() -> Result<(), BoxError> {
    let config_path = config_path_from_args()?;
    let config = ManagerConfig::load(&config_path)?;
    telemetry::init(&config.log_filter)?;

    let shutdown = ShutdownSignal::new();
    install_signal_handlers(&shutdown)?;

    let span = config.process.span();
    let result = span.in_scope(|| run(&config, shutdown));
    if let Err(err) = &result {
        error!(error = %err, "proxy group manager failed");
    }
    if config.park_after_shutdown {
        info!("proxy group manager parked after shutdown");
        loop {
            std::thread::park();
        }
    }
    result.map_err(Into::into)
}

#[cfg(unix)]
fn config_path_from_args() -> Result<Utf8PathBuf, ProcessError> {
    let mut args = env::args_os().skip(1);
    let (Some(path), None) = (args.next(), args.next()) else {
        return Err(ProcessError::InvalidArgs(
            "usage: proxy_group_manager <config-path>".to_owned(),
        ));
    };
    let utf8 = path
        .into_string()
        .map_err(|_| ProcessError::InvalidArgs("config path is not valid UTF-8".to_owned()))?;
    Ok(Utf8PathBuf::from(utf8))
}

#[cfg(unix)]
extern "C" fn record_signal(_: nix::libc::c_int) {
    SIGNALLED.store(true, Ordering::Release);
}

#[cfg(unix)]
fn install_signal_handlers(shutdown: &ShutdownSignal) -> Result<(), ProcessError> {
    let action = SigAction::new(
        SigHandler::Handler(record_signal),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    for signal in [Signal::SIGINT, Signal::SIGTERM] {
        // SAFETY: the handler only stores to an atomic.
        unsafe { sigaction(signal, &action) }?;
    }

    let watcher = shutdown.clone();
    std::thread::Builder::new()
        .name("pg-signal-watch".to_owned())
        .spawn(move || {
            while !watcher.is_requested() {
                if SIGNALLED.load(Ordering::Acquire) {
                    info!("shutdown requested by signal");
                    watcher.request();
                    break;
                }
                std::thread::sleep(SIGNAL_POLL);
            }
        })
        .map_err(ProcessError::SignalWatcher)?;
    Ok(())
}

#[cfg(unix)]
fn run(config: &ManagerConfig, shutdown: ShutdownSignal) -> Result<(), ProcessError> {
    let settings = config.manager_settings()?;
    let pool = Pool::builder()
        .max_size(config.pool_max_size)
        .build(ConnectionManager::<PgConnection>::new(&config.database_url))
        .map_err(ProcessError::Pool)?;
    let store = Arc::new(PostgresProxyGroupStore::new(pool));
    let endpoint = UnixSocketEndpoint::bind(&config.ipc_socket).map_err(ManagerError::from)?;

    let ports = ManagerPorts {
        store: Arc::clone(&store),
        topology: store,
        macros: Arc::new(config.user_macros()),
        activity: Arc::new(ActivityMonitor::new()),
    };
    let manager =
        ProxyGroupManager::start(ports, Arc::new(DefaultClock), settings, shutdown, endpoint)?;
    manager.run()?;
    Ok(())
}

#[cfg(not(unix))]
fn main() -> Result<(), BoxError> {
    Err("proxy_group_manager is not supported on non-Unix platforms".into())
}
