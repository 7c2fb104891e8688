mod collectors;
mod config;
mod daemon;
mod http;
mod metrics;
mod state;

use axum::serve;
use clap::Parser;
use collectors::probe::SysinfoProbe;
use collectors::system::{CollectorOptions, MetricsCollector};
use config::{Config, LogFormat, LoggingConfig};
use daemon::{Daemon, ShutdownOutcome};
use metrics::Metrics;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "syswatchd")]
#[command(version)]
struct Cli {
    #[arg(long, default_value = "./config.yaml")]
    config: PathBuf,
    #[arg(long)]
    print_default_config: bool,
    #[arg(long, value_name = "PATH")]
    write_default_config: Option<PathBuf>,
    /// Collection interval in seconds.
    #[arg(long)]
    interval: Option<u64>,
    #[arg(long, conflicts_with = "dashboard_off")]
    dashboard_on: bool,
    #[arg(long, conflicts_with = "dashboard_on")]
    dashboard_off: bool,
    /// Stop deadline, e.g. `10s` or `1m`.
    #[arg(long, value_parser = humantime::parse_duration)]
    shutdown_timeout: Option<Duration>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }
    if let Some(path) = &cli.write_default_config {
        if let Err(err) = Config::default().save(path) {
            eprintln!("{err}");
            std::process::exit(1);
        }
        println!("конфигурация по умолчанию записана в {}", path.display());
        return;
    }

    let (mut cfg, from_file) = match Config::load_or_default(&cli.config) {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("не удалось загрузить конфигурацию: {err}");
            std::process::exit(1);
        }
    };
    apply_overrides(&mut cfg, &cli);
    // Before tracing init: a bad logging.level would hide the error.
    if let Err(err) = cfg.validate() {
        eprintln!("некорректная конфигурация: {err}");
        std::process::exit(1);
    }

    init_tracing(&cfg.logging);
    if from_file {
        info!(path = %cli.config.display(), "конфигурация загружена");
    } else {
        info!(path = %cli.config.display(), "файл конфигурации не найден, используются значения по умолчанию");
    }

    info!(
        name = %cfg.daemon.name,
        interval_secs = cfg.metrics.interval_secs,
        dashboard = cfg.dashboard.enabled,
        "запуск syswatchd"
    );

    let metrics = match Metrics::new() {
        Ok(m) => m,
        Err(err) => {
            error!(error = %err, "не удалось инициализировать метрики");
            std::process::exit(1);
        }
    };

    let collector = MetricsCollector::new(
        SysinfoProbe::new(cfg.metrics.cpu_sample_window()),
        CollectorOptions::from(&cfg.metrics),
    )
    .with_span(info_span!("collector", name = %cfg.daemon.name))
    .into_shared();

    let daemon = Daemon::new(collector.clone(), metrics.clone(), cfg.metrics.interval())
        .with_span(info_span!("daemon", name = %cfg.daemon.name));

    let shutdown = CancellationToken::new();
    if let Err(err) = daemon.start(shutdown.child_token()).await {
        error!(error = %err, "не удалось запустить демон");
        std::process::exit(1);
    }

    let http_task = if cfg.dashboard.enabled {
        let addr = match cfg.dashboard_addr() {
            Ok(addr) => addr,
            Err(err) => {
                error!(error = %err, "некорректный адрес dashboard");
                daemon.stop(Instant::now() + cfg.daemon.shutdown_timeout()).await;
                std::process::exit(1);
            }
        };
        let state = http::HttpAppState {
            metrics: metrics.clone(),
            collector,
            service: cfg.daemon.name.clone(),
        };
        let shutdown = shutdown.clone();
        Some(tokio::spawn(async move {
            let listener = match TcpListener::bind(addr).await {
                Ok(l) => l,
                Err(err) => {
                    error!(error = %err, %addr, "не удалось запустить HTTP-сервер");
                    return;
                }
            };
            info!(%addr, "dashboard доступен");

            let server = serve(listener, http::build_router(state))
                .with_graceful_shutdown(async move { shutdown.cancelled().await });
            if let Err(err) = server.await {
                error!(error = %err, "ошибка HTTP-сервера");
            }
        }))
    } else {
        None
    };

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "не удалось дождаться Ctrl+C");
    }
    info!("получен Ctrl+C, выполняется остановка");

    let timeout = cfg.daemon.shutdown_timeout();
    match daemon.stop(Instant::now() + timeout).await {
        ShutdownOutcome::Forced => warn!(
            timeout = %humantime::format_duration(timeout),
            "остановка выполнена принудительно"
        ),
        outcome => info!(outcome = ?outcome, "остановка завершена"),
    }

    shutdown.cancel();
    if let Some(task) = http_task {
        let _ = task.await;
    }
}

fn apply_overrides(cfg: &mut Config, cli: &Cli) {
    if let Some(secs) = cli.interval {
        cfg.metrics.interval_secs = secs;
    }
    if cli.dashboard_on {
        cfg.dashboard.enabled = true;
    } else if cli.dashboard_off {
        cfg.dashboard.enabled = false;
    }
    if let Some(timeout) = cli.shutdown_timeout {
        cfg.daemon.shutdown_timeout_secs = timeout.as_secs();
    }
}

fn init_tracing(cfg: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match cfg.format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_config() {
        let cli = Cli::parse_from([
            "syswatchd",
            "--interval",
            "30",
            "--dashboard-off",
            "--shutdown-timeout",
            "1m",
        ]);
        let mut cfg = Config::default();
        apply_overrides(&mut cfg, &cli);

        assert_eq!(cfg.metrics.interval_secs, 30);
        assert!(!cfg.dashboard.enabled);
        assert_eq!(cfg.daemon.shutdown_timeout_secs, 60);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn cli_override_repairs_out_of_range_file_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "metrics:\n  interval_secs: 0\n").unwrap();

        let (mut cfg, found) = Config::load_or_default(&path).expect("загрузка");
        assert!(found);
        assert!(cfg.validate().is_err());

        let cli = Cli::parse_from(["syswatchd", "--interval", "10"]);
        apply_overrides(&mut cfg, &cli);
        assert_eq!(cfg.metrics.interval_secs, 10);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn dashboard_flags_conflict() {
        let result = Cli::try_parse_from(["syswatchd", "--dashboard-on", "--dashboard-off"]);
        assert!(result.is_err());
    }
}
