use super::command::{CommandRunner, ProbeError};
use super::plan::{CpuStrategy, DiskStrategy, LoadStrategy, MemoryStrategy, UptimeStrategy};
use super::{DiskUsage, LoadAverage, MemoryStats, Metric, SystemInfo, CPU_USAGE};
use std::collections::HashMap;
use std::fmt::Display;
use std::time::Duration;
use sysinfo::{CpuExt, DiskExt, System, SystemExt};
use tokio::time;
use tracing::{debug, warn};

const DEFAULT_PAGE_SIZE: u64 = 4096;
const CPU_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

pub fn collect_system_info(system: Option<&mut System>) -> SystemInfo {
    let machine = Some(std::env::consts::ARCH.to_string());
    let Some(system) = system else {
        return SystemInfo {
            os_name: Some(std::env::consts::OS.to_string()),
            machine,
            ..SystemInfo::default()
        };
    };

    system.refresh_cpu();
    let cpu_brand = system
        .cpus()
        .first()
        .map(|c| c.brand().trim().to_string())
        .filter(|b| !b.is_empty());

    SystemInfo {
        host_name: system.host_name(),
        os_name: system.name(),
        kernel_version: system.kernel_version(),
        os_version: system.long_os_version().or_else(|| system.os_version()),
        machine,
        cpu_brand,
    }
}

pub async fn collect_cpu<R: CommandRunner>(
    runner: &R,
    system: &mut Option<System>,
    strategies: &[CpuStrategy],
) -> Metric {
    for strategy in strategies {
        let result = match strategy {
            CpuStrategy::TopIdle(spec) => runner
                .run(spec)
                .await
                .and_then(|out| parse_top_idle(&out).ok_or_else(|| ProbeError::parse(spec.program, "нет поля idle")))
                .map(|idle| (100.0 - idle).clamp(0.0, 100.0)),
            CpuStrategy::LoadPerCpu(load) => {
                let cpus = logical_cpus(system);
                read_load(runner, system, load)
                    .await
                    .map(|avg| (avg.one / cpus as f64 * 100.0).clamp(0.0, 100.0))
            }
            CpuStrategy::Sysinfo => sysinfo_cpu_usage(system).await,
        };
        match result {
            Ok(percent) => return Metric::percent(CPU_USAGE, Some(percent)),
            Err(err) => log_strategy_failure("cpu", strategy, &err),
        }
    }

    warn!(probe = "cpu", "не удалось определить загрузку CPU");
    Metric::percent(CPU_USAGE, None)
}

pub async fn collect_memory<R: CommandRunner>(
    runner: &R,
    system: &mut Option<System>,
    strategies: &[MemoryStrategy],
) -> Option<MemoryStats> {
    for strategy in strategies {
        let result = match strategy {
            MemoryStrategy::Free(spec) => runner.run(spec).await.and_then(|out| {
                parse_free(&out).ok_or_else(|| ProbeError::parse(spec.program, "нет строки Mem:"))
            }),
            MemoryStrategy::VmStat(spec) => runner.run(spec).await.and_then(|out| {
                parse_vm_stat(&out).ok_or_else(|| ProbeError::parse(spec.program, "нет счётчиков страниц"))
            }),
            MemoryStrategy::Sysinfo => sysinfo_memory(system),
        };
        match result {
            Ok(stats) => return Some(stats),
            Err(err) => log_strategy_failure("memory", strategy, &err),
        }
    }

    warn!(probe = "memory", "не удалось определить использование памяти");
    None
}

pub async fn collect_disks<R: CommandRunner>(
    runner: &R,
    system: &mut Option<System>,
    strategies: &[DiskStrategy],
) -> Option<Vec<DiskUsage>> {
    for strategy in strategies {
        let result = match strategy {
            DiskStrategy::Df(spec) => runner.run(spec).await.and_then(|out| {
                parse_df(&out).ok_or_else(|| ProbeError::parse(spec.program, "нет строк с файловыми системами"))
            }),
            DiskStrategy::Sysinfo => sysinfo_disks(system),
        };
        match result {
            Ok(disks) => return Some(disks),
            Err(err) => log_strategy_failure("disk", strategy, &err),
        }
    }

    warn!(probe = "disk", "не удалось получить использование дисков");
    None
}

pub async fn collect_load<R: CommandRunner>(
    runner: &R,
    system: &mut Option<System>,
    strategies: &[LoadStrategy],
) -> Option<LoadAverage> {
    for strategy in strategies {
        match read_load(runner, system, strategy).await {
            Ok(avg) => return Some(avg),
            Err(err) => log_strategy_failure("load", strategy, &err),
        }
    }

    warn!(probe = "load", "не удалось получить среднюю нагрузку");
    None
}

pub async fn collect_uptime<R: CommandRunner>(
    runner: &R,
    system: &mut Option<System>,
    strategies: &[UptimeStrategy],
) -> Option<String> {
    for strategy in strategies {
        let result = match strategy {
            UptimeStrategy::Command(spec) => runner.run(spec).await.and_then(|out| {
                let line = out.trim();
                if line.is_empty() {
                    Err(ProbeError::parse(spec.program, "пустой вывод"))
                } else {
                    Ok(line.to_string())
                }
            }),
            UptimeStrategy::Sysinfo => sysinfo_uptime(system),
        };
        match result {
            Ok(text) => return Some(text),
            Err(err) => log_strategy_failure("uptime", strategy, &err),
        }
    }

    warn!(probe = "uptime", "не удалось получить время работы системы");
    None
}

async fn read_load<R: CommandRunner>(
    runner: &R,
    system: &mut Option<System>,
    strategy: &LoadStrategy,
) -> Result<LoadAverage, ProbeError> {
    match strategy {
        LoadStrategy::File(path) => runner
            .read_file(path)
            .and_then(|text| parse_load_average(&text).ok_or_else(|| ProbeError::parse(*path, "ожидалось три числа"))),
        LoadStrategy::Sysctl(spec) => runner.run(spec).await.and_then(|out| {
            parse_load_average(&out).ok_or_else(|| ProbeError::parse(spec.program, "ожидалось три числа"))
        }),
        LoadStrategy::Sysinfo => {
            let system = system
                .as_mut()
                .ok_or_else(|| ProbeError::NoData("sysinfo отключён".to_string()))?;
            let avg = system.load_average();
            Ok(LoadAverage {
                one: avg.one,
                five: avg.five,
                fifteen: avg.fifteen,
            })
        }
    }
}

async fn sysinfo_cpu_usage(system: &mut Option<System>) -> Result<f64, ProbeError> {
    let system = system
        .as_mut()
        .ok_or_else(|| ProbeError::NoData("sysinfo отключён".to_string()))?;

    // Usage is a delta between two refreshes.
    system.refresh_cpu();
    time::sleep(CPU_SAMPLE_INTERVAL).await;
    system.refresh_cpu();

    if system.cpus().is_empty() {
        return Err(ProbeError::NoData("sysinfo не вернул список CPU".to_string()));
    }
    let sum: f32 = system.cpus().iter().map(|c| c.cpu_usage()).sum();
    Ok((sum / system.cpus().len() as f32) as f64)
}

fn sysinfo_memory(system: &mut Option<System>) -> Result<MemoryStats, ProbeError> {
    let system = system
        .as_mut()
        .ok_or_else(|| ProbeError::NoData("sysinfo отключён".to_string()))?;
    system.refresh_memory();

    let total_bytes = system.total_memory();
    if total_bytes == 0 {
        return Err(ProbeError::NoData("sysinfo вернул нулевой объём памяти".to_string()));
    }
    Ok(MemoryStats {
        total_bytes,
        used_bytes: system.used_memory(),
        available_bytes: system.available_memory(),
    })
}

fn sysinfo_disks(system: &mut Option<System>) -> Result<Vec<DiskUsage>, ProbeError> {
    let system = system
        .as_mut()
        .ok_or_else(|| ProbeError::NoData("sysinfo отключён".to_string()))?;
    system.refresh_disks_list();
    system.refresh_disks();

    let disks: Vec<DiskUsage> = system
        .disks()
        .iter()
        .filter_map(|d| {
            let filesystem = d.name().to_string_lossy().to_string();
            let total = d.total_space();
            if !is_device_backed(&filesystem) || total == 0 {
                return None;
            }
            let used = total.saturating_sub(d.available_space());
            Some(DiskUsage {
                filesystem,
                mount_point: d.mount_point().to_string_lossy().to_string(),
                usage_percent: (used as f64 / total as f64 * 100.0).round(),
            })
        })
        .collect();

    if disks.is_empty() {
        return Err(ProbeError::NoData("sysinfo не нашёл дисков с устройствами".to_string()));
    }
    Ok(disks)
}

fn sysinfo_uptime(system: &mut Option<System>) -> Result<String, ProbeError> {
    let system = system
        .as_mut()
        .ok_or_else(|| ProbeError::NoData("sysinfo отключён".to_string()))?;
    let secs = system.uptime();
    if secs == 0 {
        return Err(ProbeError::NoData("sysinfo вернул нулевой uptime".to_string()));
    }
    Ok(format!(
        "up {}",
        humantime::format_duration(Duration::from_secs(secs))
    ))
}

/// Logical CPUs known to the OS. `available_parallelism` follows cgroup quotas
/// and affinity, so it is only used when sysinfo is unavailable.
fn logical_cpus(system: &mut Option<System>) -> usize {
    if let Some(system) = system.as_mut() {
        system.refresh_cpu();
        let count = system.cpus().len();
        if count > 0 {
            return count;
        }
    }
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn log_strategy_failure(probe: &str, strategy: &impl Display, err: &ProbeError) {
    if err.is_missing_tool() {
        debug!(probe, strategy = %strategy, error = %err, "источник недоступен, пробуем следующий");
    } else {
        warn!(probe, strategy = %strategy, error = %err, "источник не дал данных, пробуем следующий");
    }
}

/// Mounts backed by a block device. Loop devices are read-only images and
/// always report full.
pub fn is_device_backed(filesystem: &str) -> bool {
    filesystem.starts_with("/dev/") && !filesystem.starts_with("/dev/loop")
}

/// Idle percentage from Linux `top -bn1` (`%Cpu(s): ... 96.5 id, ...`) or
/// macOS `top -l 1` (`CPU usage: ... 84.61% idle`).
pub fn parse_top_idle(text: &str) -> Option<f64> {
    let line = text
        .lines()
        .find(|l| l.contains("Cpu(s)") || l.contains("CPU usage"))?;
    let body = line.split_once(':').map(|(_, rest)| rest).unwrap_or(line);
    // Fields are separated by ", " so a decimal comma stays inside its token.
    let tokens: Vec<&str> = body
        .split_whitespace()
        .map(|t| t.trim_end_matches(','))
        .collect();

    let raw = tokens.iter().enumerate().find_map(|(i, token)| match *token {
        "id" | "idle" => i.checked_sub(1).map(|prev| tokens[prev]),
        _ => token
            .strip_suffix("%id")
            .or_else(|| token.strip_suffix("%idle")),
    })?;
    let idle = leading_number(raw)?;
    (0.0..=100.0).contains(&idle).then_some(idle)
}

/// `{ 1.23 1.45 1.67 }` (sysctl) or `0.52 0.48 0.40 1/523 12345` (/proc/loadavg).
pub fn parse_load_average(text: &str) -> Option<LoadAverage> {
    let mut values = text
        .split(|c: char| c.is_whitespace() || c == '{' || c == '}')
        .filter(|t| !t.is_empty())
        .map(|t| t.replace(',', ".").parse::<f64>());
    let one = values.next()?.ok()?;
    let five = values.next()?.ok()?;
    let fifteen = values.next()?.ok()?;
    Some(LoadAverage { one, five, fifteen })
}

/// `free -b`: `Mem: total used free shared buff/cache available`.
pub fn parse_free(text: &str) -> Option<MemoryStats> {
    let line = text.lines().find(|l| l.trim_start().starts_with("Mem:"))?;
    let parts: Vec<&str> = line.split_whitespace().collect();
    let total_bytes = parts.get(1)?.parse::<u64>().ok()?;
    let used_bytes = parts.get(2)?.parse::<u64>().ok()?;
    let available_bytes = parts
        .get(6)
        .or_else(|| parts.get(3))?
        .parse::<u64>()
        .ok()?;
    if total_bytes == 0 {
        return None;
    }
    Some(MemoryStats {
        total_bytes,
        used_bytes,
        available_bytes,
    })
}

pub fn parse_vm_stat(text: &str) -> Option<MemoryStats> {
    let mut page_size = DEFAULT_PAGE_SIZE;
    let mut pages: HashMap<&str, u64> = HashMap::new();

    for line in text.lines() {
        if let Some(rest) = line.split("page size of ").nth(1) {
            if let Some(size) = rest.split_whitespace().next().and_then(|v| v.parse().ok()) {
                page_size = size;
            }
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        if let Ok(v) = value.trim().trim_end_matches('.').parse::<u64>() {
            pages.insert(key.trim(), v);
        }
    }

    let free = *pages.get("Pages free")?;
    let active = pages.get("Pages active").copied().unwrap_or(0);
    let inactive = pages.get("Pages inactive").copied().unwrap_or(0);
    let wired = pages.get("Pages wired down").copied().unwrap_or(0);

    let used_pages = active + inactive + wired;
    let total_pages = free + used_pages;
    if total_pages == 0 {
        return None;
    }
    Some(MemoryStats {
        total_bytes: total_pages.saturating_mul(page_size),
        used_bytes: used_pages.saturating_mul(page_size),
        available_bytes: free.saturating_mul(page_size),
    })
}

/// POSIX `df -P` output. Returns `None` when no row has the expected shape;
/// an empty list means the output parsed but held no device-backed mounts.
pub fn parse_df(text: &str) -> Option<Vec<DiskUsage>> {
    let mut saw_row = false;
    let mut disks = Vec::new();

    for line in text.lines().skip(1) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 6 {
            continue;
        }
        let Ok(usage) = parts[4].trim_end_matches('%').parse::<f64>() else {
            continue;
        };
        saw_row = true;
        if !is_device_backed(parts[0]) {
            continue;
        }
        disks.push(DiskUsage {
            filesystem: parts[0].to_string(),
            mount_point: parts[5..].join(" "),
            usage_percent: usage,
        });
    }

    saw_row.then_some(disks)
}

fn leading_number(input: &str) -> Option<f64> {
    input
        .trim()
        .split(|c: char| !(c.is_ascii_digit() || c == '.' || c == ','))
        .find(|t| !t.is_empty())
        .and_then(|t| t.replace(',', ".").parse::<f64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::command::CommandSpec;
    use crate::collectors::plan::PROC_LOADAVG;
    use crate::collectors::testing::FakeRunner;

    const TOP_LINUX: &str = "top - 10:00:01 up 3 days,  2:11,  1 user,  load average: 0.52, 0.48, 0.40\n\
Tasks: 231 total,   1 running, 230 sleeping,   0 stopped,   0 zombie\n\
%Cpu(s):  2.0 us,  1.0 sy,  0.0 ni, 96.5 id,  0.5 wa,  0.0 hi,  0.0 si,  0.0 st\n\
MiB Mem :  15886.9 total,   1021.3 free,   6187.2 used,   8678.4 buff/cache\n";

    const TOP_MACOS: &str = "Processes: 512 total, 2 running, 510 sleeping, 2345 threads\n\
Load Avg: 1.52, 1.71, 1.80\n\
CPU usage: 5.12% user, 10.25% sys, 84.63% idle\n";

    const FREE_B: &str = "               total        used        free      shared  buff/cache   available\n\
Mem:      16658845696  6487736320  1070829568   512000000  9100279808  9771671552\n\
Swap:      2147479552           0  2147479552\n";

    const VM_STAT: &str = "Mach Virtual Memory Statistics: (page size of 16384 bytes)\n\
Pages free:                               10000.\n\
Pages active:                             20000.\n\
Pages inactive:                           5000.\n\
Pages speculative:                        1000.\n\
Pages wired down:                         15000.\n";

    const DF_P: &str = "Filesystem     1024-blocks      Used Available Capacity Mounted on\n\
udev               8108812         0   8108812       0% /dev\n\
tmpfs              1626888      2100   1624788       1% /run\n\
/dev/nvme0n1p2   490617784 220000000 245617784      48% /\n\
/dev/loop3           64768     64768         0     100% /snap/core20/2105\n\
/dev/sdb1        960302804 800000000 111447164      88% /mnt/Backup Drive\n";

    fn cmd(program: &'static str, args: &[&'static str]) -> CommandSpec {
        CommandSpec::new(program, args, Duration::from_secs(2))
    }

    #[test]
    fn parses_linux_top_idle() {
        assert_eq!(parse_top_idle(TOP_LINUX), Some(96.5));
    }

    #[test]
    fn parses_legacy_top_idle() {
        let text = "Cpu(s):  3.1%us,  1.2%sy,  0.0%ni, 95.2%id,  0.4%wa\n";
        assert_eq!(parse_top_idle(text), Some(95.2));
    }

    #[test]
    fn parses_decimal_comma_top_idle() {
        let text = "%Cpu(s):  2,0 us,  1,0 sy,  0,0 ni, 96,5 id,  0,5 wa,  0,0 hi,  0,0 si,  0,0 st\n";
        assert_eq!(parse_top_idle(text), Some(96.5));
    }

    #[test]
    fn parses_macos_top_idle() {
        assert_eq!(parse_top_idle(TOP_MACOS), Some(84.63));
    }

    #[test]
    fn top_without_cpu_line_is_none() {
        assert_eq!(parse_top_idle("Tasks: 1 total\n"), None);
        assert_eq!(parse_top_idle(""), None);
    }

    #[test]
    fn parses_proc_loadavg_and_sysctl() {
        let proc = parse_load_average("0.52 0.48 0.40 1/523 12345\n").unwrap();
        assert_eq!((proc.one, proc.five, proc.fifteen), (0.52, 0.48, 0.40));

        let sysctl = parse_load_average("{ 1.23 1.45 1.67 }\n").unwrap();
        assert_eq!((sysctl.one, sysctl.five, sysctl.fifteen), (1.23, 1.45, 1.67));

        let comma = parse_load_average("{ 1,50 2,00 2,50 }").unwrap();
        assert_eq!(comma.one, 1.5);

        assert!(parse_load_average("garbage").is_none());
        assert!(parse_load_average("1.0 2.0").is_none());
    }

    #[test]
    fn parses_free_with_available_column() {
        let mem = parse_free(FREE_B).unwrap();
        assert_eq!(mem.total_bytes, 16_658_845_696);
        assert_eq!(mem.used_bytes, 6_487_736_320);
        assert_eq!(mem.available_bytes, 9_771_671_552);
    }

    #[test]
    fn free_without_available_column_uses_free() {
        let text = "             total       used       free     shared    buffers     cached\n\
Mem:          1000        900        100          0\n";
        let mem = parse_free(text).unwrap();
        assert_eq!(mem.available_bytes, 100);
        assert_eq!(mem.percent(), Some(90.0));
    }

    #[test]
    fn free_garbage_is_none() {
        assert!(parse_free("no memory here").is_none());
        assert!(parse_free("Mem: abc def").is_none());
    }

    #[test]
    fn parses_vm_stat_with_header_page_size() {
        let mem = parse_vm_stat(VM_STAT).unwrap();
        assert_eq!(mem.total_bytes, 50_000 * 16_384);
        assert_eq!(mem.used_bytes, 40_000 * 16_384);
        assert_eq!(mem.available_bytes, 10_000 * 16_384);
        assert_eq!(mem.percent(), Some(80.0));
    }

    #[test]
    fn vm_stat_defaults_page_size() {
        let mem = parse_vm_stat("Pages free: 1.\nPages active: 3.\n").unwrap();
        assert_eq!(mem.total_bytes, 4 * DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn parses_df_keeping_device_backed_mounts() {
        let disks = parse_df(DF_P).unwrap();
        assert_eq!(
            disks,
            vec![
                DiskUsage {
                    filesystem: "/dev/nvme0n1p2".to_string(),
                    mount_point: "/".to_string(),
                    usage_percent: 48.0,
                },
                DiskUsage {
                    filesystem: "/dev/sdb1".to_string(),
                    mount_point: "/mnt/Backup Drive".to_string(),
                    usage_percent: 88.0,
                },
            ]
        );
    }

    #[test]
    fn df_without_device_rows_is_empty_not_none() {
        let text = "Filesystem 1024-blocks Used Available Capacity Mounted on\n\
overlay 100 50 50 50% /\n";
        assert_eq!(parse_df(text), Some(Vec::new()));
        assert_eq!(parse_df("df: unrecognized option\n"), None);
    }

    #[tokio::test]
    async fn cpu_uses_first_successful_strategy() {
        let runner = FakeRunner::default().with_output("top -bn1", TOP_LINUX);
        let strategies = vec![
            CpuStrategy::TopIdle(cmd("top", &["-bn1"])),
            CpuStrategy::LoadPerCpu(LoadStrategy::File(PROC_LOADAVG)),
        ];
        let metric = collect_cpu(&runner, &mut None, &strategies).await;
        assert_eq!(metric.name, CPU_USAGE);
        assert_eq!(metric.unit, "%");
        assert!((metric.value.unwrap() - 3.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn cpu_falls_back_to_load_per_cpu() {
        let runner = FakeRunner::default()
            .with_timeout("top -bn1")
            .with_file(PROC_LOADAVG, "0.00 0.10 0.20 1/100 42\n");
        let strategies = vec![
            CpuStrategy::TopIdle(cmd("top", &["-bn1"])),
            CpuStrategy::LoadPerCpu(LoadStrategy::File(PROC_LOADAVG)),
        ];
        let metric = collect_cpu(&runner, &mut None, &strategies).await;
        assert_eq!(metric.value, Some(0.0));
    }

    #[tokio::test]
    async fn cpu_is_absent_when_every_strategy_fails() {
        let runner = FakeRunner::default().with_output("top -bn1", "unexpected");
        let strategies = vec![
            CpuStrategy::TopIdle(cmd("top", &["-bn1"])),
            CpuStrategy::LoadPerCpu(LoadStrategy::File(PROC_LOADAVG)),
            CpuStrategy::Sysinfo,
        ];
        let metric = collect_cpu(&runner, &mut None, &strategies).await;
        assert_eq!(metric.value, None);
    }

    #[tokio::test]
    async fn memory_falls_back_from_free_to_vm_stat() {
        let runner = FakeRunner::default().with_output("vm_stat", VM_STAT);
        let strategies = vec![
            MemoryStrategy::Free(cmd("free", &["-b"])),
            MemoryStrategy::VmStat(cmd("vm_stat", &[])),
        ];
        let mem = collect_memory(&runner, &mut None, &strategies).await.unwrap();
        assert_eq!(mem.percent(), Some(80.0));
    }

    #[tokio::test]
    async fn disks_absent_on_timeout() {
        let runner = FakeRunner::default().with_timeout("df -P -k");
        let strategies = vec![DiskStrategy::Df(cmd("df", &["-P", "-k"])), DiskStrategy::Sysinfo];
        assert!(collect_disks(&runner, &mut None, &strategies).await.is_none());
    }

    #[tokio::test]
    async fn uptime_trims_command_output() {
        let runner = FakeRunner::default()
            .with_output("uptime", " 10:00:01 up 3 days,  2:11,  1 user,  load average: 0.52, 0.48, 0.40\n");
        let strategies = vec![UptimeStrategy::Command(cmd("uptime", &[])), UptimeStrategy::Sysinfo];
        let text = collect_uptime(&runner, &mut None, &strategies).await.unwrap();
        assert!(text.starts_with("10:00:01 up 3 days"));
    }

    #[test]
    fn logical_cpus_prefer_sysinfo_count() {
        let mut system = Some(System::new());
        let count = logical_cpus(&mut system);
        let listed = system.as_ref().map(|s| s.cpus().len()).unwrap_or(0);
        if listed > 0 {
            assert_eq!(count, listed);
        }
        assert!(count >= 1);
        assert!(logical_cpus(&mut None) >= 1);
    }

    #[test]
    fn system_info_without_sysinfo_still_names_platform() {
        let info = collect_system_info(None);
        assert_eq!(info.machine.as_deref(), Some(std::env::consts::ARCH));
        assert_eq!(info.os_name.as_deref(), Some(std::env::consts::OS));
        assert!(info.host_name.is_none());
    }
}
