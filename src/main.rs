mod assemble;
mod collectors;
mod config;
mod evaluate;
mod platform;
mod report;
mod sink;

use assemble::assemble;
use chrono::Local;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use collectors::command::SystemRunner;
use collectors::plan::ProbePlan;
use collectors::HostProbes;
use config::{Config, ConfigError};
use evaluate::ThresholdRules;
use platform::Platform;
use report::ReportKind;
use sink::ReportSink;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const LOG_FILE: &str = "sysreport.log";

#[derive(Parser, Debug)]
#[command(name = "sysreport")]
#[command(version, about = "Collects host metrics and writes a health report")]
struct Cli {
    /// YAML config; built-in defaults are used when omitted.
    #[arg(long)]
    config: Option<String>,
    #[arg(long)]
    report_dir: Option<PathBuf>,
    #[arg(long)]
    log_dir: Option<PathBuf>,
    #[arg(long)]
    print_default_config: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Short health check: CPU, memory, disk, load, network, uptime.
    HealthCheck,
    /// Full report including interfaces, processes, packages and logins.
    FullReport,
}

impl Command {
    fn report_kind(self) -> ReportKind {
        match self {
            Self::HealthCheck => ReportKind::HealthCheck,
            Self::FullReport => ReportKind::FullReport,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }
    let command = match required_command(&cli) {
        Ok(command) => command,
        Err(err) => err.exit(),
    };

    let loaded = load_config(&cli);
    let log_dir = match &loaded {
        Ok(cfg) => cfg.log_dir.clone(),
        Err(_) => cli
            .log_dir
            .clone()
            .unwrap_or_else(|| Config::default().log_dir),
    };
    let guard = init_tracing(&log_dir);

    let cfg = match loaded {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "не удалось загрузить конфигурацию");
            exit_with_failure(guard);
        }
    };

    let kind = command.report_kind();
    let platform = Platform::detect();
    info!(
        report = kind.slug(),
        platform = %platform,
        report_dir = %cfg.report_dir.display(),
        "запуск sysreport"
    );

    let plan = ProbePlan::for_platform(platform, &cfg.timeouts);
    let mut probes = HostProbes::new(SystemRunner, plan, cfg.network_targets.clone());
    let rules = ThresholdRules::from_config(&cfg.thresholds);

    let report = assemble(kind, &mut probes, &rules, Local::now()).await;

    if let Err(err) = ReportSink::new(&cfg.report_dir).write(&report) {
        error!(error = %err, "отчёт не сохранён");
        exit_with_failure(guard);
    }
}

/// A report sub-command is mandatory unless only the default config is printed.
fn required_command(cli: &Cli) -> Result<Command, clap::Error> {
    cli.command.ok_or_else(|| {
        Cli::command().error(
            ErrorKind::MissingSubcommand,
            "укажите подкоманду: health-check или full-report",
        )
    })
}

fn load_config(cli: &Cli) -> Result<Config, ConfigError> {
    let mut cfg = match &cli.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::default(),
    };
    if let Some(dir) = &cli.report_dir {
        cfg.report_dir = dir.clone();
    }
    if let Some(dir) = &cli.log_dir {
        cfg.log_dir = dir.clone();
    }
    cfg.validate()?;
    Ok(cfg)
}

/// Console output plus a daily-rolling file in `log_dir`. Falls back to the
/// console alone when the directory cannot be created.
fn init_tracing(log_dir: &Path) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard, dir_error) = match std::fs::create_dir_all(log_dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard), None)
        }
        Err(err) => (None, None, Some(err)),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    if let Some(err) = dir_error {
        warn!(
            log_dir = %log_dir.display(),
            error = %err,
            "каталог логов недоступен, пишем только в консоль"
        );
    }
    guard
}

fn exit_with_failure(guard: Option<WorkerGuard>) -> ! {
    // Flush the file writer; process::exit skips destructors.
    drop(guard);
    std::process::exit(1);
}
