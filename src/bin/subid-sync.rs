//! subid-sync binary
//!
//! Keeps `/etc/subuid` and `/etc/subgid` in step with a user directory.
//! Every user gets a fixed-width range of subordinate ids that stays the
//! same across runs for as long as the user exists.
//!
//! # Examples
//!
//! ```bash
//! # One run against /etc/passwd, users with uid >= 1000 under /home
//! subid-sync --user-base /home
//!
//! # One run against LDAP
//! subid-sync --ldap-url ldap://ldap.example.com --ldap-user-base-dn ou=People,dc=example,dc=com
//!
//! # Settings file, metrics textfile for node_exporter
//! subid-sync --config /etc/subid-sync.toml --metrics-path /var/lib/node_exporter/subid.prom
//!
//! # Daemon, refresh every 10 minutes, metrics on :8085/metrics
//! subid-sync --daemon --update-interval 600
//! ```

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use subid_sync::config::Source;
use subid_sync::directory::{Directory, LdapDirectory, PasswdDirectory, StaticDirectory};
use subid_sync::runner::Runner;
use subid_sync::server::start_metrics_server;
use subid_sync::{metrics, Settings};
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// subid-sync - subordinate id ranges from a user directory
#[derive(Parser, Debug)]
#[command(name = "subid-sync")]
#[command(version = subid_sync::VERSION)]
#[command(about = "Keeps /etc/subuid and /etc/subgid in sync with a user directory", long_about = None)]
struct Cli {
    /// Settings file (TOML, YAML or JSON by extension)
    #[arg(long, env = "SUBID_CONFIG")]
    config: Option<PathBuf>,

    /// Path to subuid file
    #[arg(long, env = "SUBID_SUBUID")]
    subuid: Option<PathBuf>,

    /// Path to subgid file
    #[arg(long, env = "SUBID_SUBGID")]
    subgid: Option<PathBuf>,

    /// Start ID of subuid/subgid
    #[arg(long, env = "SUBID_START")]
    start: Option<u64>,

    /// Range for each entry
    #[arg(long, env = "SUBID_RANGE")]
    range: Option<u64>,

    /// passwd formatted user database
    #[arg(long, env = "SUBID_PASSWD")]
    passwd: Option<PathBuf>,

    /// Home directory prefix for passwd, user base DN for LDAP
    #[arg(long, visible_alias = "ldap-user-base-dn", env = "LDAP_USER_BASE_DN")]
    user_base: Option<String>,

    /// LDAP URL, selects the LDAP source
    #[arg(long, env = "LDAP_URL")]
    ldap_url: Option<String>,

    /// LDAP Bind DN
    #[arg(long, env = "LDAP_BIND_DN")]
    ldap_bind_dn: Option<String>,

    /// LDAP Bind Password
    #[arg(long, env = "LDAP_BIND_PASSWORD", hide_env_values = true)]
    ldap_bind_password: Option<String>,

    /// LDAP user filter
    #[arg(long, env = "LDAP_USER_FILTER")]
    ldap_user_filter: Option<String>,

    /// LDAP user UID attribute
    #[arg(long, env = "LDAP_USER_UID_ATTR")]
    ldap_user_uid_attr: Option<String>,

    /// Enable LDAP paged searching
    #[arg(long, env = "LDAP_PAGED_SEARCH")]
    ldap_paged_search: bool,

    /// LDAP paged search size
    #[arg(long, env = "LDAP_PAGED_SEARCH_SIZE")]
    ldap_paged_search_size: Option<i32>,

    /// Lowest uid to manage
    #[arg(long, env = "SUBID_MIN_UID")]
    min_uid: Option<u32>,

    /// Highest uid to manage
    #[arg(long, env = "SUBID_MAX_UID")]
    max_uid: Option<u32>,

    /// Fixed comma separated user list, replaces the passwd lookup
    #[arg(long, env = "SUBID_USERS", value_delimiter = ',')]
    users: Option<Vec<String>>,

    /// Run application as a daemon
    #[arg(long, env = "DAEMON")]
    daemon: bool,

    /// Seconds between updates in daemon mode
    #[arg(long, env = "DAEMON_UPDATE_INTERVAL")]
    update_interval: Option<u64>,

    /// Address to listen on for daemon metrics
    #[arg(long, env = "METRICS_LISTEN_ADDRESS")]
    listen_address: Option<String>,

    /// Path to save Prometheus metrics when not a daemon
    #[arg(long, env = "METRICS_PATH")]
    metrics_path: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Also write daily rotated logs to this directory
    #[arg(long, env = "SUBID_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

impl Cli {
    /// Overlay flags and environment onto file settings
    fn apply(&self, settings: &mut Settings) {
        if let Some(subuid) = &self.subuid {
            settings.subid.subuid = subuid.clone();
        }
        if let Some(subgid) = &self.subgid {
            settings.subid.subgid = subgid.clone();
        }
        if let Some(start) = self.start {
            settings.subid.start = start;
        }
        if let Some(range) = self.range {
            settings.subid.range = range;
        }
        if let Some(passwd) = &self.passwd {
            settings.directory.passwd = passwd.clone();
        }
        if let Some(base) = &self.user_base {
            settings.directory.base = base.clone();
        }
        if let Some(url) = &self.ldap_url {
            settings.directory.ldap.url = Some(url.clone());
        }
        if let Some(dn) = &self.ldap_bind_dn {
            settings.directory.ldap.bind_dn = Some(dn.clone());
        }
        if let Some(password) = &self.ldap_bind_password {
            settings.directory.ldap.bind_password = Some(password.clone());
        }
        if let Some(filter) = &self.ldap_user_filter {
            settings.directory.filter = filter.clone();
        }
        if let Some(attr) = &self.ldap_user_uid_attr {
            settings.directory.ldap.uid_attr = attr.clone();
        }
        if self.ldap_paged_search {
            settings.directory.ldap.paged_search = true;
        }
        if let Some(size) = self.ldap_paged_search_size {
            settings.directory.ldap.paged_search_size = size;
        }
        if let Some(min_uid) = self.min_uid {
            settings.directory.min_uid = min_uid;
        }
        if self.max_uid.is_some() {
            settings.directory.max_uid = self.max_uid;
        }
        if let Some(users) = &self.users {
            settings.directory.users = Some(users.clone());
        }
        if self.daemon {
            settings.daemon.enabled = true;
        }
        if let Some(interval) = self.update_interval {
            settings.daemon.update_interval_secs = interval;
        }
        if let Some(addr) = &self.listen_address {
            settings.daemon.listen_address = addr.clone();
        }
        if let Some(path) = &self.metrics_path {
            settings.metrics.path = Some(path.clone());
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    setup_logging(&cli)?;

    let mut settings = Settings::load(cli.config.as_deref())?;
    cli.apply(&mut settings);
    if let Err(e) = settings.validate() {
        error!(error = %e, "Invalid settings");
        return Err(e.into());
    }

    info!(version = %subid_sync::VERSION, "Starting {}", subid_sync::APP_NAME);
    metrics::init_metrics();

    let directory: Arc<dyn Directory> = match settings.directory.source() {
        Source::Static => Arc::new(StaticDirectory::new(
            settings.directory.users.clone().unwrap_or_default(),
        )),
        Source::Ldap => Arc::new(LdapDirectory::new(settings.directory.ldap.clone())),
        Source::Passwd => Arc::new(PasswdDirectory::new(&settings.directory.passwd)),
    };
    info!(
        directory = directory.name(),
        subuid = %settings.subid.subuid.display(),
        subgid = %settings.subid.subgid.display(),
        start = settings.subid.start,
        range = settings.subid.range,
        "Configuration loaded"
    );

    let daemon = settings.daemon.clone();
    let runner = Runner::new(directory, settings);

    if !daemon.enabled {
        runner.run_oneshot().await?;
        return Ok(());
    }

    let addr = daemon.listen_address.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = start_metrics_server(&addr).await {
            error!(error = %e, "Error starting HTTP server");
            std::process::exit(1);
        }
    });

    runner.run_daemon(shutdown_signal()).await;
    server.abort();
    Ok(())
}

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Unable to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

/// Setup logging to stderr and, optionally, rolling files
fn setup_logging(cli: &Cli) -> anyhow::Result<()> {
    let log_level = cli
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);

    let console = match cli.log_format {
        LogFormat::Json => fmt::layer().json().with_writer(std::io::stderr).boxed(),
        LogFormat::Text => fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(!cli.no_color)
            .boxed(),
    };

    let file = match &cli.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, "subid-sync.log");
            Some(fmt::layer().with_writer(appender).with_ansi(false))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .init();

    Ok(())
}
