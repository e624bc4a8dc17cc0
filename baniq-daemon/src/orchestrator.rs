//! Daemon orchestration -- bootstrap, jail guard lifecycle, and shutdown.
//!
//! The [`Orchestrator`] is the central coordinator of `baniq-daemon`.
//! It loads configuration, prepares the fail2ban directories, checks that
//! fail2ban and Docker are reachable, builds the [`JailGuard`], and runs the
//! main loop until a shutdown signal or a fatal dispatcher error.
//!
//! # Startup Order
//!
//! 1. Create `jail_dir` and `filter_dir`
//! 2. `fail2ban-client ping`
//! 3. Connect to the Docker socket
//! 4. Install the Prometheus recorder (optional)
//! 5. Write the PID file (optional)
//! 6. Start the jail guard (subscribe, then reconcile running containers)

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use baniq_core::config::BaniqConfig;
use baniq_core::pipeline::Pipeline;
use baniq_jail_manager::{
    BollardDockerClient, DockerClient, Fail2banClient, Fail2banControl, JailGuard,
    JailGuardBuilder, JailManagerConfig, JailManagerError,
};

use crate::health::{DaemonHealth, HEALTH_CHECK_INTERVAL_SECS, HealthMonitor};
use crate::metrics_server;

/// The main daemon orchestrator.
///
/// Generic over the Docker and fail2ban seams so the lifecycle can be
/// exercised without a real Docker daemon. Production code uses the
/// defaults built by [`Orchestrator::build`].
pub struct Orchestrator<D: DockerClient = BollardDockerClient, F: Fail2banControl = Fail2banClient>
{
    /// Loaded and validated configuration.
    config: BaniqConfig,
    /// Event dispatcher pipeline.
    guard: JailGuard<D, F>,
    /// Fatal dispatcher errors (consumed by `run`).
    fatal_rx: Option<oneshot::Receiver<JailManagerError>>,
    /// Daemon start time (for uptime reporting).
    start_time: Instant,
}

impl Orchestrator {
    /// Load configuration and build the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded or any
    /// bootstrap step fails.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = BaniqConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config).await
    }

    /// Build from an already-loaded configuration.
    ///
    /// Performs every fatal startup check: directory creation, fail2ban
    /// reachability, and the Docker connection.
    pub async fn build_from_config(config: BaniqConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        let jail_config = JailManagerConfig::from_core(&config);
        bootstrap_directories(&jail_config).await?;

        let fail2ban = Arc::new(Fail2banClient::from_config(&jail_config));
        fail2ban
            .ping()
            .await
            .map_err(|e| anyhow::anyhow!("fail2ban is not running: {}", e))?;
        tracing::info!(client = %jail_config.client_path, "fail2ban is reachable");

        let docker = Arc::new(
            BollardDockerClient::connect_with_socket(&jail_config.docker_socket)
                .map_err(|e| anyhow::anyhow!("failed to create docker client: {}", e))?
                .with_event_buffer(jail_config.event_buffer),
        );

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
            tracing::info!(port = config.metrics.port, "metrics endpoint enabled");
        }

        Self::with_components(config, docker, fail2ban)
    }
}

impl<D: DockerClient, F: Fail2banControl> Orchestrator<D, F> {
    /// Build around caller-supplied Docker and fail2ban implementations.
    ///
    /// No bootstrap checks run here; the guard still pings Docker on start.
    pub fn with_components(config: BaniqConfig, docker: Arc<D>, fail2ban: Arc<F>) -> Result<Self> {
        let (guard, fatal_rx) = JailGuardBuilder::new()
            .config(JailManagerConfig::from_core(&config))
            .docker_client(docker)
            .fail2ban(fail2ban)
            .cancellation_token(CancellationToken::new())
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build jail guard: {}", e))?;

        tracing::info!(
            jail_dir = %config.fail2ban.jail_dir,
            filter_dir = %config.fail2ban.filter_dir,
            "orchestrator initialized"
        );

        Ok(Self {
            config,
            guard,
            fatal_rx: Some(fatal_rx),
            start_time: Instant::now(),
        })
    }

    /// Start the jail guard and block until SIGTERM or SIGINT.
    ///
    /// # Errors
    ///
    /// Returns an error if startup fails or the event dispatcher dies.
    pub async fn run(&mut self) -> Result<()> {
        self.run_until(wait_for_shutdown_signal()).await
    }

    /// Start the jail guard and block until `shutdown` resolves.
    ///
    /// `shutdown` yields the name of the trigger for logging. A fatal
    /// dispatcher error ends the loop early and is returned as `Err` after
    /// the guard has been stopped and the PID file removed.
    pub async fn run_until<S>(&mut self, shutdown: S) -> Result<()>
    where
        S: Future<Output = Result<&'static str>>,
    {
        let fatal_rx = self
            .fatal_rx
            .take()
            .ok_or_else(|| anyhow::anyhow!("orchestrator has already run; rebuild it to restart"))?;

        let pid_path = self.pid_path();
        if let Some(path) = &pid_path {
            write_pid_file(path)?;
        }

        if let Err(e) = self.guard.start().await {
            if let Some(path) = &pid_path {
                remove_pid_file(path);
            }
            return Err(anyhow::anyhow!("failed to start jail guard: {}", e));
        }

        let outcome = self.main_loop(shutdown, fatal_rx).await;

        self.shutdown().await;
        if let Some(path) = &pid_path {
            remove_pid_file(path);
        }

        outcome
    }

    async fn main_loop<S>(
        &self,
        shutdown: S,
        mut fatal_rx: oneshot::Receiver<JailManagerError>,
    ) -> Result<()>
    where
        S: Future<Output = Result<&'static str>>,
    {
        tokio::pin!(shutdown);

        let mut interval = tokio::time::interval(Duration::from_secs(HEALTH_CHECK_INTERVAL_SECS));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut monitor = HealthMonitor::new();

        tracing::info!("entering main event loop");
        loop {
            tokio::select! {
                signal = &mut shutdown => {
                    let signal = signal?;
                    tracing::info!(signal, "shutdown signal received");
                    return Ok(());
                }
                fatal = &mut fatal_rx => {
                    return Err(match fatal {
                        Ok(e) => anyhow::anyhow!("event dispatcher failed: {}", e),
                        Err(_) => anyhow::anyhow!("event dispatcher exited unexpectedly"),
                    });
                }
                _ = interval.tick() => {
                    let report = self.health().await;
                    monitor.observe(&report);
                }
            }
        }
    }

    /// Stop the jail guard. Errors are logged, never returned.
    async fn shutdown(&mut self) {
        tracing::info!("stopping jail guard");
        if let Err(e) = self.guard.stop().await {
            tracing::error!(error = %e, "failed to stop jail guard");
        }
    }

    /// Current daemon health report.
    pub async fn health(&self) -> DaemonHealth {
        let status = self.guard.health_check().await;
        let uptime_secs = self.start_time.elapsed().as_secs();

        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!(baniq_core::metrics::DAEMON_UPTIME_SECONDS).set(uptime_secs as f64);

        DaemonHealth {
            status,
            uptime_secs,
            tracked_containers: self.guard.tracked_container_count().await,
        }
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &BaniqConfig {
        &self.config
    }

    /// Get a reference to the jail guard.
    pub fn guard(&self) -> &JailGuard<D, F> {
        &self.guard
    }

    fn pid_path(&self) -> Option<PathBuf> {
        let pid_file = &self.config.general.pid_file;
        (!pid_file.is_empty()).then(|| PathBuf::from(pid_file))
    }
}

/// Create the jail and filter directories (recursive, mode 0755).
///
/// # Errors
///
/// Returns an error naming the directory that could not be created.
pub async fn bootstrap_directories(config: &JailManagerConfig) -> Result<()> {
    for dir in [&config.jail_dir, &config.filter_dir] {
        let mut builder = tokio::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(0o755);

        builder.create(dir).await.map_err(|e| {
            anyhow::anyhow!("failed to create directory {}: {}", dir.display(), e)
        })?;
        tracing::debug!(path = %dir.display(), "directory ready");
    }
    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
///
/// # Errors
///
/// Returns an error if signal handlers cannot be installed.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Write the current process PID to a file.
///
/// Used to prevent duplicate daemon instances.
///
/// # Security
///
/// - Uses `create_new(true)` to atomically create file (prevents TOCTOU races)
/// - Verifies the created file is a regular file (prevents symlink attacks)
/// - Creates parent directory with restrictive permissions (0o700)
///
/// # Errors
///
/// Returns an error if the PID file cannot be written.
fn write_pid_file(path: &Path) -> Result<()> {
    use std::fs::{self, OpenOptions};
    use std::io::{ErrorKind, Write};

    if let Some(parent) = path.parent() {
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            let mut builder = fs::DirBuilder::new();
            builder.mode(0o700).recursive(true);
            builder.create(parent)?;
        }
        #[cfg(not(unix))]
        {
            fs::create_dir_all(parent)?;
        }
    }

    let pid = std::process::id();

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            let existing_pid = fs::read_to_string(path).unwrap_or_else(|_| "unknown".to_string());
            return Err(anyhow::anyhow!(
                "PID file {} already exists with PID: {}. Is another instance running?",
                path.display(),
                existing_pid.trim()
            ));
        }
        Err(e) => return Err(e.into()),
    };

    let metadata = file.metadata()?;
    if !metadata.is_file() {
        let _ = fs::remove_file(path);
        return Err(anyhow::anyhow!(
            "PID file {} is not a regular file (possible symlink attack)",
            path.display()
        ));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }

    writeln!(file, "{}", pid)?;

    tracing::info!(pid = pid, path = %path.display(), "PID file written");
    Ok(())
}

/// Remove the PID file on daemon shutdown.
///
/// Logs a warning but does not fail if the file cannot be removed.
fn remove_pid_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(
            path = %path.display(),
            error = %e,
            "failed to remove PID file"
        );
    } else {
        tracing::info!(path = %path.display(), "PID file removed");
    }
}
