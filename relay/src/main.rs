#[macro_use]
extern crate tracing;

use std::env;
use std::error::Error;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context as _;
use camino::Utf8PathBuf;
use proxy_log::LoggerGuard;
use relay::{RelayCfg, RelayLogConfig};
use seahorse::{App, Context, Flag, FlagType};
use tokio::runtime;

fn main() {
    let args: Vec<String> = env::args().collect();

    let app = App::new(env!("CARGO_PKG_NAME"))
        .description(env!("CARGO_PKG_DESCRIPTION"))
        .author(env!("CARGO_PKG_AUTHORS"))
        .version(env!("CARGO_PKG_VERSION"))
        .usage(format!(
            "{command} [flags]\n\n\tExample: relay polling traffic out through a local SOCKS5 egress\n\n\t  {command} --egress 127.0.0.1:1080 --http-bind 0.0.0.0:80",
            command = env!("CARGO_PKG_NAME"),
        ))
        .flag(Flag::new("egress", FlagType::String).description("SOCKS5 address every tunneled channel is dialed through (required)"))
        .flag(Flag::new("http-bind", FlagType::String).description("Plain-HTTP listener address [default: 0.0.0.0:80]"))
        .flag(Flag::new("https-bind", FlagType::String).description("TLS listener address; requires --tls-cert and --tls-key"))
        .flag(Flag::new("tls-cert", FlagType::String).description("PEM certificate chain for --https-bind"))
        .flag(Flag::new("tls-key", FlagType::String).description("PEM private key for --https-bind"))
        .flag(Flag::new("poll-path", FlagType::String).description("HTTP path the polling transport is served on [default: /poll]"))
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
            relay::run_relay(args.relay_cfg).await
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

#[cfg(unix)]
fn install_signal_handlers(rotator: std::sync::Arc<proxy_log::LogRotator<RelayLogConfig>>) {
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
fn install_signal_handlers(_rotator: std::sync::Arc<proxy_log::LogRotator<RelayLogConfig>>) {}

struct Args {
    relay_cfg: RelayCfg,
    logging: Logging,
}

#[derive(Debug, PartialEq)]
enum Logging {
    Term,
    File { filepath: Utf8PathBuf },
}

impl Args {
    fn parse(c: &Context) -> anyhow::Result<Self> {
        let egress_addr: SocketAddr = opt_string_flag(c, "egress")?
            .context("--egress is required")?
            .parse()
            .context("invalid value for --egress")?;

        let http_bind = parse_bind_addr(opt_string_flag(c, "http-bind")?, "0.0.0.0:80")?;

        let https_bind = opt_string_flag(c, "https-bind")?
            .map(|value| value.parse())
            .transpose()
            .context("invalid value for --https-bind")?;

        let tls_cert_path = opt_string_flag(c, "tls-cert")?.map(Utf8PathBuf::from);
        let tls_key_path = opt_string_flag(c, "tls-key")?.map(Utf8PathBuf::from);

        let poll_path = opt_string_flag(c, "poll-path")?.unwrap_or_else(|| "/poll".to_owned());

        let logging = if c.bool_flag("log-term") {
            Logging::Term
        } else if let Some(filepath) = opt_string_flag(c, "log-file")? {
            Logging::File {
                filepath: Utf8PathBuf::from(filepath),
            }
        } else if let Some(data_dir) = dirs_next_data_dir() {
            let mut filepath = data_dir;
            filepath.push("tunnel-relay");
            Logging::File { filepath }
        } else {
            eprintln!("Couldn't retrieve data directory for log files; logging to stdout instead.");
            Logging::Term
        };

        Ok(Self {
            relay_cfg: RelayCfg {
                http_bind,
                https_bind,
                tls_cert_path,
                tls_key_path,
                poll_path,
                egress_addr,
            },
            logging,
        })
    }
}

fn dirs_next_data_dir() -> Option<Utf8PathBuf> {
    dirs_next::data_dir().and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
}

fn parse_bind_addr(flag: Option<String>, default: &str) -> anyhow::Result<SocketAddr> {
    flag.as_deref().unwrap_or(default).parse().context("invalid bind address")
}

fn setup_logger(logging: &Logging) -> anyhow::Result<(LoggerGuard, proxy_log::LogRotator<RelayLogConfig>)> {
    let log_filter = env::var("TUNNEL_RELAY_LOG").unwrap_or_else(|_| "info".to_owned());

    // `proxy_log::init` always wants a file path, so term-only logging still writes a rolling
    // file in the data directory alongside whatever the stdio layer prints.
    let path = match logging {
        Logging::Term => dirs_next_data_dir()
            .map(|mut path| {
                path.push("tunnel-relay");
                path
            })
            .context("couldn't retrieve data directory")?,
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

    proxy_log::init::<RelayLogConfig>(&path, &log_filter, None)
}

#[expect(deprecated, reason = "seahorse uses description() for the human readable description")]
fn opt_string_flag(c: &Context, name: &str) -> anyhow::Result<Option<String>> {
    match c.string_flag(name) {
        Ok(value) => Ok(Some(value)),
        Err(seahorse::error::FlagError::NotFound) => Ok(None),
        Err(e) => Err(anyhow::Error::msg(e.description().to_owned()).context(format!("invalid '{name}'"))),
    }
}
