//! Informational probes whose output goes into the report as bounded text.

use super::command::{CommandRunner, CommandSpec, ProbeError};
use super::plan::PackageManager;
use super::PackageCount;
use tracing::{debug, warn};

pub const MAX_PROCESSES: usize = 10;
pub const MAX_LOGINS: usize = 20;
pub const MAX_INTERFACE_LINES: usize = 40;

pub async fn collect_interfaces<R: CommandRunner>(
    runner: &R,
    commands: &[CommandSpec],
) -> Option<Vec<String>> {
    let text = first_output(runner, "interfaces", commands).await?;
    let lines = bounded_lines(&text, MAX_INTERFACE_LINES);
    (!lines.is_empty()).then_some(lines)
}

/// Header plus the top processes by CPU, in the order `ps` sorted them.
pub async fn collect_processes<R: CommandRunner>(
    runner: &R,
    commands: &[CommandSpec],
) -> Option<Vec<String>> {
    let text = first_output(runner, "processes", commands).await?;
    let lines = bounded_lines(&text, MAX_PROCESSES + 1);
    (lines.len() > 1).then_some(lines)
}

pub async fn collect_packages<R: CommandRunner>(
    runner: &R,
    managers: &[PackageManager],
) -> Option<Vec<PackageCount>> {
    let mut counts = Vec::new();
    for pm in managers {
        match runner.run(&pm.command).await {
            Ok(out) => counts.push(PackageCount {
                manager: pm.name.to_string(),
                count: count_packages(&out, pm.header_lines),
            }),
            Err(err) if err.is_missing_tool() => {
                debug!(manager = pm.name, "пакетный менеджер не установлен");
            }
            Err(err) => {
                warn!(manager = pm.name, error = %err, "не удалось посчитать пакеты");
            }
        }
    }
    (!counts.is_empty()).then_some(counts)
}

pub async fn collect_logins<R: CommandRunner>(
    runner: &R,
    commands: &[CommandSpec],
) -> Option<Vec<String>> {
    let text = first_output(runner, "logins", commands).await?;
    let lines = parse_login_records(&text);
    (!lines.is_empty()).then_some(lines)
}

async fn first_output<R: CommandRunner>(
    runner: &R,
    probe: &str,
    commands: &[CommandSpec],
) -> Option<String> {
    for spec in commands {
        match runner.run(spec).await {
            Ok(out) => return Some(out),
            Err(err) => log_failure(probe, spec, &err),
        }
    }
    if !commands.is_empty() {
        warn!(probe, "ни одна команда не вернула данные");
    }
    None
}

fn log_failure(probe: &str, spec: &CommandSpec, err: &ProbeError) {
    if err.is_missing_tool() {
        debug!(probe, command = %spec, error = %err, "команда недоступна");
    } else {
        warn!(probe, command = %spec, error = %err, "команда не дала данных");
    }
}

fn bounded_lines(text: &str, limit: usize) -> Vec<String> {
    text.lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .take(limit)
        .map(str::to_string)
        .collect()
}

/// Non-empty lines minus the manager's fixed header rows.
pub fn count_packages(text: &str, header_lines: usize) -> u64 {
    let lines = text.lines().filter(|l| !l.trim().is_empty()).count();
    lines.saturating_sub(header_lines) as u64
}

/// `last` output without the trailing `wtmp begins ...` footer.
pub fn parse_login_records(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .filter(|l| !l.starts_with("wtmp begins") && !l.starts_with("btmp begins"))
        .take(MAX_LOGINS)
        .map(str::to_string)
        .collect()
}
