use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, RwLock};

use keeper_core::config::{self, keys};
use keeper_core::{ConfigStore, DaemonError, DaemonIdentity, SyncStatus};

use crate::error::{io_err, ProxyError};
use crate::paths::{daemon_dir, pid_path, socket_path, READY_LINE};
use crate::protocol::{DaemonRequest, DaemonResponse};
use crate::proxy::pong;
use crate::update::check_release_feed;

/// State the daemon host exposes through the proxy surface.
#[derive(Debug, Clone)]
pub struct HostState {
    pub status: SyncStatus,
    pub paused: bool,
    pub errors: Vec<DaemonError>,
    pub config: ConfigStore,
}

impl HostState {
    fn new(config: ConfigStore) -> Self {
        Self {
            status: SyncStatus::Idle,
            paused: false,
            errors: Vec::new(),
            config,
        }
    }
}

type SharedState = Arc<RwLock<HostState>>;

struct HostContext {
    home: PathBuf,
    identity: DaemonIdentity,
    state: SharedState,
    shutdown_tx: broadcast::Sender<()>,
}

/// Start the daemon host for `identity` and block the current thread until it exits.
///
/// Prints [`READY_LINE`] on stdout once the socket is bound.
pub fn start_blocking(home: &Path, identity: &DaemonIdentity) -> Result<(), ProxyError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;

    let (shutdown_tx, _) = broadcast::channel::<()>(16);
    let (ready_tx, ready_rx) = mpsc::sync_channel::<()>(1);
    runtime.block_on(async move {
        tokio::task::spawn_blocking(move || {
            if ready_rx.recv().is_ok() {
                println!("{READY_LINE}");
                use std::io::Write;
                let _ = std::io::stdout().flush();
            }
        });
        run(home.to_path_buf(), identity.clone(), shutdown_tx, Some(ready_tx)).await
    })
}

/// A daemon host running on a worker thread inside the front-end process.
#[derive(Debug)]
pub struct InProcessDaemon {
    identity: DaemonIdentity,
    shutdown_tx: broadcast::Sender<()>,
    handle: Option<std::thread::JoinHandle<Result<(), ProxyError>>>,
}

impl InProcessDaemon {
    pub fn identity(&self) -> &DaemonIdentity {
        &self.identity
    }

    /// Signal the host to exit and join its thread.
    pub fn stop(mut self) -> Result<(), ProxyError> {
        let _ = self.shutdown_tx.send(());
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| ProxyError::Protocol("in-process daemon thread panicked".into()))?,
            None => Ok(()),
        }
    }
}

/// Run the daemon host on a dedicated thread with its own runtime.
///
/// Returns once the socket accepts connections, or with the startup error.
/// Safe to call from inside a tokio runtime: the wait is a plain channel
/// receive, not a runtime block.
pub fn spawn_in_thread(home: &Path, identity: &DaemonIdentity) -> Result<InProcessDaemon, ProxyError> {
    let (shutdown_tx, _) = broadcast::channel::<()>(16);
    let (ready_tx, ready_rx) = mpsc::sync_channel::<()>(1);

    let thread_home = home.to_path_buf();
    let thread_identity = identity.clone();
    let thread_shutdown = shutdown_tx.clone();
    let handle = std::thread::Builder::new()
        .name(format!("keeper-daemon-{identity}"))
        .spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| io_err("tokio-runtime", e))?;
            runtime.block_on(run(
                thread_home,
                thread_identity,
                thread_shutdown,
                Some(ready_tx),
            ))
        })
        .map_err(|e| io_err("daemon-thread", e))?;

    if ready_rx.recv().is_err() {
        // The host dropped the ready signal: it failed before binding.
        let outcome = handle
            .join()
            .map_err(|_| ProxyError::Protocol("in-process daemon thread panicked".into()))?;
        return Err(match outcome {
            Ok(()) => ProxyError::Launch("in-process daemon exited before becoming ready".into()),
            Err(err) => err,
        });
    }

    Ok(InProcessDaemon {
        identity: identity.clone(),
        shutdown_tx,
        handle: Some(handle),
    })
}

/// Run the daemon host until a `shutdown` request, ctrl-c, or a send on `shutdown_tx`.
pub async fn run(
    home: PathBuf,
    identity: DaemonIdentity,
    shutdown_tx: broadcast::Sender<()>,
    ready: Option<mpsc::SyncSender<()>>,
) -> Result<(), ProxyError> {
    config::ensure_identity_dir_at(&home, &identity)?;
    let store = config::load_config_at(&home, &identity)?;
    let ctx = Arc::new(HostContext {
        home: home.clone(),
        identity: identity.clone(),
        state: Arc::new(RwLock::new(HostState::new(store))),
        shutdown_tx: shutdown_tx.clone(),
    });

    let socket_handle = {
        let ctx = ctx.clone();
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            let result = socket_server_task(ctx, shutdown_rx, ready).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(ProxyError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    tracing::info!(identity = %identity, pid = std::process::id(), "daemon host starting");
    let (socket_result, signal_result) = tokio::join!(socket_handle, signal_handle);

    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    tracing::info!(identity = %identity, "daemon host stopped");
    Ok(())
}

async fn socket_server_task(
    ctx: Arc<HostContext>,
    mut shutdown_rx: broadcast::Receiver<()>,
    ready: Option<mpsc::SyncSender<()>>,
) -> Result<(), ProxyError> {
    let dir = daemon_dir(&ctx.home, &ctx.identity);
    if !dir.exists() {
        fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
    }

    let socket = socket_path(&ctx.home, &ctx.identity);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;

    let pid_file = pid_path(&ctx.home, &ctx.identity);
    fs::write(&pid_file, std::process::id().to_string()).map_err(|e| io_err(&pid_file, e))?;

    if let Some(ready) = ready {
        let _ = ready.send(());
    }

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, ctx).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    let _ = fs::remove_file(&socket);
    let _ = fs::remove_file(&pid_file);
    Ok(())
}

async fn handle_socket_client(stream: UnixStream, ctx: Arc<HostContext>) -> Result<(), ProxyError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: DaemonRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let stopping = request == DaemonRequest::Shutdown;
        let response = dispatch(&ctx, request).await;
        write_response(&mut writer, &response).await?;
        if stopping {
            let _ = ctx.shutdown_tx.send(());
            break;
        }
    }

    Ok(())
}

async fn dispatch(ctx: &HostContext, request: DaemonRequest) -> DaemonResponse {
    match request {
        DaemonRequest::Ping => DaemonResponse::ok(pong(std::process::id())),
        DaemonRequest::GetConfig { section, key } => {
            let state = ctx.state.read().await;
            DaemonResponse::ok(
                state
                    .config
                    .get(&section, &key)
                    .cloned()
                    .unwrap_or(Value::Null),
            )
        }
        DaemonRequest::SetConfig {
            section,
            key,
            value,
        } => {
            let mut state = ctx.state.write().await;
            state.config.set(&section, &key, value);
            match config::save_config_at(&ctx.home, &ctx.identity, &state.config) {
                Ok(()) => DaemonResponse::ok(Value::Null),
                Err(err) => DaemonResponse::error(format!("failed to persist config: {err}")),
            }
        }
        DaemonRequest::Status => DaemonResponse::ok(json!(ctx.state.read().await.status)),
        DaemonRequest::Paused => DaemonResponse::ok(json!(ctx.state.read().await.paused)),
        DaemonRequest::PendingErrors => DaemonResponse::ok(json!(ctx.state.read().await.errors)),
        DaemonRequest::ClearErrors => {
            ctx.state.write().await.errors.clear();
            DaemonResponse::ok(Value::Null)
        }
        DaemonRequest::StartSync | DaemonRequest::ResumeSync => {
            set_sync_state(ctx, SyncStatus::Idle, false).await
        }
        DaemonRequest::PauseSync => set_sync_state(ctx, SyncStatus::Paused, true).await,
        DaemonRequest::StopSync => set_sync_state(ctx, SyncStatus::Stopped, false).await,
        DaemonRequest::RebuildIndex => {
            tracing::info!(identity = %ctx.identity, "index rebuild requested");
            set_sync_state(ctx, SyncStatus::Idle, false).await
        }
        DaemonRequest::DropboxPath => {
            let state = ctx.state.read().await;
            let (section, key) = keys::MAIN_PATH;
            DaemonResponse::ok(json!(state.config.get_str(section, key)))
        }
        DaemonRequest::ToLocalPath { path } => {
            let state = ctx.state.read().await;
            let (section, key) = keys::MAIN_PATH;
            let root = PathBuf::from(state.config.get_str(section, key));
            DaemonResponse::ok(json!(to_local_path(&root, &path)))
        }
        DaemonRequest::CheckForUpdates => {
            let feed_url = {
                let state = ctx.state.read().await;
                let (section, key) = keys::RELEASE_FEED_URL;
                state.config.get_str(section, key).to_owned()
            };
            let checked = tokio::task::spawn_blocking(move || {
                check_release_feed(&feed_url, env!("CARGO_PKG_VERSION"))
            })
            .await;
            match checked {
                Ok(info) => DaemonResponse::ok(json!(info)),
                Err(err) => DaemonResponse::error(format!("update check join error: {err}")),
            }
        }
        DaemonRequest::ReportError { error } => {
            tracing::warn!(kind = %error.kind, title = %error.title, "sync error reported");
            let mut state = ctx.state.write().await;
            if error.kind.halts_sync() {
                state.status = SyncStatus::SyncError;
            }
            state.errors.push(error);
            DaemonResponse::ok(Value::Null)
        }
        DaemonRequest::Shutdown => DaemonResponse::ok(json!({ "stopping": true })),
    }
}

async fn set_sync_state(ctx: &HostContext, status: SyncStatus, paused: bool) -> DaemonResponse {
    let mut state = ctx.state.write().await;
    state.status = status;
    state.paused = paused;
    tracing::debug!(status = ?status, paused, "sync state changed");
    DaemonResponse::ok(Value::Null)
}

/// Map a remote (mirror-relative) path onto the local mirror root.
fn to_local_path(root: &Path, remote: &str) -> PathBuf {
    root.join(remote.trim_start_matches('/'))
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), ProxyError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(ProxyError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), ProxyError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), ProxyError>, tokio::task::JoinError>,
) -> Result<(), ProxyError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(ProxyError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

/// Install the `tracing` subscriber for a keeper binary; logs go to stderr.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), ProxyError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), ProxyError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    use keeper_core::DaemonErrorKind;

    fn context(home: &TempDir) -> HostContext {
        let (shutdown_tx, _) = broadcast::channel(1);
        HostContext {
            home: home.path().to_path_buf(),
            identity: DaemonIdentity::from("test"),
            state: Arc::new(RwLock::new(HostState::new(ConfigStore::default()))),
            shutdown_tx,
        }
    }

    #[tokio::test]
    async fn pause_resume_and_stop_drive_status() {
        let home = TempDir::new().expect("home");
        let ctx = context(&home);

        dispatch(&ctx, DaemonRequest::PauseSync).await;
        {
            let state = ctx.state.read().await;
            assert_eq!(state.status, SyncStatus::Paused);
            assert!(state.paused);
        }

        dispatch(&ctx, DaemonRequest::ResumeSync).await;
        assert!(!ctx.state.read().await.paused);

        dispatch(&ctx, DaemonRequest::StopSync).await;
        assert_eq!(ctx.state.read().await.status, SyncStatus::Stopped);
    }

    #[tokio::test]
    async fn reported_errors_queue_until_cleared() {
        let home = TempDir::new().expect("home");
        let ctx = context(&home);

        let error = DaemonError::new(DaemonErrorKind::RevFileError, "Bad rev", "corrupt");
        dispatch(&ctx, DaemonRequest::ReportError { error }).await;
        assert_eq!(ctx.state.read().await.status, SyncStatus::SyncError);

        let listed = dispatch(&ctx, DaemonRequest::PendingErrors)
            .await
            .into_data()
            .expect("data");
        assert_eq!(listed.as_array().map(Vec::len), Some(1));

        dispatch(&ctx, DaemonRequest::ClearErrors).await;
        let listed = dispatch(&ctx, DaemonRequest::PendingErrors)
            .await
            .into_data()
            .expect("data");
        assert_eq!(listed, json!([]));
    }

    #[tokio::test]
    async fn set_config_persists_to_identity_dir() {
        let home = TempDir::new().expect("home");
        let ctx = context(&home);

        let response = dispatch(
            &ctx,
            DaemonRequest::SetConfig {
                section: "account".into(),
                key: "usage".into(),
                value: json!("1 GB of 2 GB used"),
            },
        )
        .await;
        assert!(response.ok);

        let reloaded =
            config::load_config_at(home.path(), &DaemonIdentity::from("test")).expect("load");
        assert_eq!(reloaded.get_str("account", "usage"), "1 GB of 2 GB used");
    }

    #[test]
    fn remote_paths_map_under_mirror_root() {
        assert_eq!(
            to_local_path(Path::new("/home/u/Mirror"), "/docs/a.txt"),
            PathBuf::from("/home/u/Mirror/docs/a.txt")
        );
    }

    #[test]
    fn live_socket_is_not_replaced() {
        let home = TempDir::new().expect("home");
        let socket = home.path().join("daemon.sock");
        let _listener = std::os::unix::net::UnixListener::bind(&socket).expect("bind");

        let err = prepare_socket_for_bind(&socket).unwrap_err();
        assert!(err.to_string().contains("already in use"));
    }
}
