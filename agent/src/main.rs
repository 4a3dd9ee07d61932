#[macro_use]
extern crate tracing;

use std::env;
use std::error::Error;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use agent::{AgentCfg, AgentLogConfig};
use anyhow::Context as _;
use camino::Utf8PathBuf;
use proxy_log::LoggerGuard;
use seahorse::{App, Context, Flag, FlagType};
use tokio::runtime;

fn main() {
    let args: Vec<String> = env::args().collect();

    let app = App::new(env!("CARGO_PKG_NAME"))
        .description(env!("CARGO_PKG_DESCRIPTION"))
        .author(env!("CARGO_PKG_AUTHORS"))
        .version(env!("CARGO_PKG_VERSION"))
        .usage(format!(
            "{command} [flags]\n\n\tExample: tunnel everything behind a restricted-domains list\n\n\t  {command} --peers /etc/tunnel-agent/peers.list --restricted-domains /etc/tunnel-agent/restricted.list",
            command = env!("CARGO_PKG_NAME"),
        ))
        .flag(Flag::new("peers", FlagType::String).description("Path to the peer list file (required)"))
        .flag(Flag::new("restricted-domains", FlagType::String).description("Path to the restricted-domains file"))
        .flag(Flag::new("glob", FlagType::String).description("Comma-separated list of glob patterns classified as restricted"))
        .flag(Flag::new("tunnel-all", FlagType::Bool).description("Classify every destination as restricted"))
        .flag(Flag::new("store", FlagType::String).description("Path to the peer-health key-value store file"))
        .flag(Flag::new("socks5-bind", FlagType::String).description("SOCKS5 listener address [default: 127.0.0.1:38250]"))
        .flag(Flag::new("http-bind", FlagType::String).description("HTTP/CONNECT listener address [default: 127.0.0.1:38251]"))
        .flag(Flag::new("ui-bind", FlagType::String).description("Settings-UI listener address [default: 127.0.0.1:38252]"))
        .flag(Flag::new("dial-timeout", FlagType::String).description("Overall racing-dial timeout [default: 10s]"))
        .flag(Flag::new("log-file", FlagType::String).description("Specify filepath for log file"))
        .flag(Flag::new("log-term", FlagType::Bool).description("Print logs to stdout instead of log file"))
        .action(run_action);

    app.run(args);
}

fn run_action(c: &Context) {
    let res = Args::parse(c).and_then(|args| {
        let (_log_guard, rotator) = setup_logger(&args.logging).context("couldn't set up logging")?;
        let rotator = std::sync::Arc::new(rotator);

        run(async move {
            install_signal_handlers(rotator);
            agent::run_agent(args.agent_cfg).await
        })
    });
    exit(res);
}

fn run<F: Future<Output = anyhow::Result<()>>>(f: F) -> anyhow::Result<()> {
    let rt = runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("runtime build failed")?;

    match rt.block_on(async {
        tokio::select! {
            res = f => res,
            res = tokio::signal::ctrl_c() => res.context("ctrl-c event"),
        }
    }) {
        Ok(()) => info!("Terminated successfully"),
        Err(e) => {
            error!("{:#}", e);
            return Err(e);
        }
    }

    rt.shutdown_timeout(Duration::from_millis(100));

    Ok(())
}

fn exit(res: anyhow::Result<()>) -> ! {
    match res {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("{e:?}");
            std::process::exit(1);
        }
    }
}

/// Installs the HUP-rotates-log, TERM/QUIT-requests-shutdown signal handlers.
///
/// `ctrl_c()` already covers INT in [`run`]; `TERM` and `QUIT` are folded in here since
/// `tokio::signal::ctrl_c` only maps to `SIGINT` on Unix.
#[cfg(unix)]
fn install_signal_handlers(rotator: std::sync::Arc<proxy_log::LogRotator<AgentLogConfig>>) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut hup = signal(SignalKind::hangup()).expect("SIGHUP handler installation never fails");
        loop {
            hup.recv().await;
            if let Err(error) = rotator.rotate() {
                error!(%error, "Log rotation failed");
            }
        }
    });

    tokio::spawn(async {
        let mut term = signal(SignalKind::terminate()).expect("SIGTERM handler installation never fails");
        term.recv().await;
        info!("Received SIGTERM, shutting down");
        std::process::exit(0);
    });

    tokio::spawn(async {
        let mut quit = signal(SignalKind::quit()).expect("SIGQUIT handler installation never fails");
        quit.recv().await;
        info!("Received SIGQUIT, shutting down");
        std::process::exit(0);
    });
}

#[cfg(not(unix))]
fn install_signal_handlers(_rotator: std::sync::Arc<proxy_log::LogRotator<AgentLogConfig>>) {}

struct Args {
    agent_cfg: AgentCfg,
    logging: Logging,
}

#[derive(Debug, PartialEq)]
enum Logging {
    Term,
    File { filepath: Utf8PathBuf },
}

impl Args {
    fn parse(c: &Context) -> anyhow::Result<Self> {
        let peers_path = opt_string_flag(c, "peers")?.context("--peers is required")?.into();

        let restricted_domains_path = opt_string_flag(c, "restricted-domains")?.map(Utf8PathBuf::from);

        let extra_globs = opt_string_flag(c, "glob")?
            .map(|raw| raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned).collect())
            .unwrap_or_default();

        let tunnel_all = c.bool_flag("tunnel-all");

        let store_path = match opt_string_flag(c, "store")? {
            Some(path) => Utf8PathBuf::from(path),
            None => default_store_path()?,
        };

        let socks5_bind = parse_bind_addr(opt_string_flag(c, "socks5-bind")?, "127.0.0.1:38250")?;
        let http_bind = parse_bind_addr(opt_string_flag(c, "http-bind")?, "127.0.0.1:38251")?;
        let ui_bind = parse_bind_addr(opt_string_flag(c, "ui-bind")?, "127.0.0.1:38252")?;

        let dial_timeout = match opt_string_flag(c, "dial-timeout")? {
            Some(value) => humantime::parse_duration(&value).context("invalid value for dial timeout")?,
            None => Duration::from_secs(10),
        };

        let logging = if c.bool_flag("log-term") {
            Logging::Term
        } else if let Some(filepath) = opt_string_flag(c, "log-file")? {
            Logging::File {
                filepath: Utf8PathBuf::from(filepath),
            }
        } else if let Some(data_dir) = dirs_next::data_dir() {
            let mut filepath = Utf8PathBuf::from_path_buf(data_dir).map_err(|_| anyhow::anyhow!("non-UTF-8 data directory"))?;
            filepath.push("tunnel-agent");
            Logging::File { filepath }
        } else {
            eprintln!("Couldn't retrieve data directory for log files; logging to stdout instead.");
            Logging::Term
        };

        Ok(Self {
            agent_cfg: AgentCfg {
                peers_path,
                restricted_domains_path,
                extra_globs,
                tunnel_all,
                store_path,
                socks5_bind,
                http_bind,
                ui_bind,
                dial_timeout,
            },
            logging,
        })
    }
}

fn parse_bind_addr(flag: Option<String>, default: &str) -> anyhow::Result<SocketAddr> {
    flag.as_deref().unwrap_or(default).parse().context("invalid bind address")
}

fn default_store_path() -> anyhow::Result<Utf8PathBuf> {
    let data_dir = dirs_next::data_dir().context("couldn't retrieve data directory")?;
    let mut path = Utf8PathBuf::from_path_buf(data_dir).map_err(|_| anyhow::anyhow!("non-UTF-8 data directory"))?;
    path.push("tunnel-agent");
    path.push("state.json");
    Ok(path)
}

fn setup_logger(logging: &Logging) -> anyhow::Result<(LoggerGuard, proxy_log::LogRotator<AgentLogConfig>)> {
    let log_filter = env::var("TUNNEL_AGENT_LOG").unwrap_or_else(|_| "info".to_owned());

    // `proxy_log::init` always wants a file path, so term-only logging still writes a rolling
    // file in the data directory alongside whatever the stdio layer prints.
    let path = match logging {
        Logging::Term => default_store_path()?.parent().context("invalid store path")?.to_owned(),
        Logging::File { filepath } => filepath.clone(),
    };

    match logging {
        Logging::Term => std::fs::create_dir_all(&path).context("couldn't create log directory")?,
        Logging::File { .. } => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).context("couldn't create log directory")?;
            }
        }
    }

    proxy_log::init::<AgentLogConfig>(&path, &log_filter, None)
}

#[expect(deprecated, reason = "seahorse uses description() for the human readable description")]
fn opt_string_flag(c: &Context, name: &str) -> anyhow::Result<Option<String>> {
    match c.string_flag(name) {
        Ok(value) => Ok(Some(value)),
        Err(seahorse::error::FlagError::NotFound) => Ok(None),
        Err(e) => Err(anyhow::Error::msg(e.description().to_owned()).context(format!("invalid '{name}'"))),
    }
}
