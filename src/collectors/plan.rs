use super::command::CommandSpec;
use crate::config::TimeoutsConfig;
use crate::platform::Platform;
use std::fmt;

pub const PROC_LOADAVG: &str = "/proc/loadavg";

#[derive(Debug, Clone, PartialEq)]
pub enum LoadStrategy {
    File(&'static str),
    Sysctl(CommandSpec),
    Sysinfo,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CpuStrategy {
    /// `100 - idle%` from a `top` snapshot.
    TopIdle(CommandSpec),
    /// One-minute load divided by logical CPUs.
    LoadPerCpu(LoadStrategy),
    Sysinfo,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MemoryStrategy {
    Free(CommandSpec),
    VmStat(CommandSpec),
    Sysinfo,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DiskStrategy {
    Df(CommandSpec),
    Sysinfo,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UptimeStrategy {
    Command(CommandSpec),
    Sysinfo,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PackageManager {
    pub name: &'static str,
    pub command: CommandSpec,
    pub header_lines: usize,
}

/// Ordered strategies per probe. The first strategy that yields data wins.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbePlan {
    pub cpu: Vec<CpuStrategy>,
    pub memory: Vec<MemoryStrategy>,
    pub disk: Vec<DiskStrategy>,
    pub load: Vec<LoadStrategy>,
    pub interfaces: Vec<CommandSpec>,
    pub processes: Vec<CommandSpec>,
    pub packages: Vec<PackageManager>,
    pub uptime: Vec<UptimeStrategy>,
    pub logins: Vec<CommandSpec>,
}

impl ProbePlan {
    pub fn for_platform(platform: Platform, timeouts: &TimeoutsConfig) -> Self {
        let cmd = timeouts.command();
        match platform {
            Platform::Linux => Self {
                cpu: vec![
                    CpuStrategy::TopIdle(CommandSpec::new("top", &["-bn1"], cmd)),
                    CpuStrategy::LoadPerCpu(LoadStrategy::File(PROC_LOADAVG)),
                    CpuStrategy::Sysinfo,
                ],
                memory: vec![
                    MemoryStrategy::Free(CommandSpec::new("free", &["-b"], cmd)),
                    MemoryStrategy::Sysinfo,
                ],
                disk: vec![
                    DiskStrategy::Df(CommandSpec::new("df", &["-P", "-k"], cmd)),
                    DiskStrategy::Sysinfo,
                ],
                load: vec![LoadStrategy::File(PROC_LOADAVG), LoadStrategy::Sysinfo],
                interfaces: vec![
                    CommandSpec::new("ip", &["addr", "show"], timeouts.interfaces()),
                    CommandSpec::new("ifconfig", &[], timeouts.interfaces()),
                ],
                processes: vec![CommandSpec::new(
                    "ps",
                    &["aux", "--sort=-%cpu"],
                    timeouts.processes(),
                )],
                packages: vec![
                    PackageManager {
                        name: "dpkg",
                        command: CommandSpec::new("dpkg", &["-l"], timeouts.packages()),
                        header_lines: 5,
                    },
                    PackageManager {
                        name: "rpm",
                        command: CommandSpec::new("rpm", &["-qa"], timeouts.packages()),
                        header_lines: 0,
                    },
                    PackageManager {
                        name: "pacman",
                        command: CommandSpec::new("pacman", &["-Q"], timeouts.packages()),
                        header_lines: 0,
                    },
                ],
                uptime: vec![
                    UptimeStrategy::Command(CommandSpec::new("uptime", &[], cmd)),
                    UptimeStrategy::Sysinfo,
                ],
                logins: vec![CommandSpec::new("last", &["-n", "20"], timeouts.logins())],
            },
            Platform::MacOs => {
                let sysctl = LoadStrategy::Sysctl(CommandSpec::new("sysctl", &["-n", "vm.loadavg"], cmd));
                Self {
                    cpu: vec![
                        CpuStrategy::TopIdle(CommandSpec::new("top", &["-l", "1", "-n", "0"], cmd)),
                        CpuStrategy::LoadPerCpu(sysctl.clone()),
                        CpuStrategy::Sysinfo,
                    ],
                    memory: vec![
                        MemoryStrategy::VmStat(CommandSpec::new("vm_stat", &[], cmd)),
                        MemoryStrategy::Sysinfo,
                    ],
                    disk: vec![
                        DiskStrategy::Df(CommandSpec::new("df", &["-P", "-k"], cmd)),
                        DiskStrategy::Sysinfo,
                    ],
                    load: vec![sysctl, LoadStrategy::Sysinfo],
                    interfaces: vec![CommandSpec::new("ifconfig", &[], timeouts.interfaces())],
                    processes: vec![CommandSpec::new("ps", &["aux", "-r"], timeouts.processes())],
                    packages: vec![PackageManager {
                        name: "brew",
                        command: CommandSpec::new("brew", &["list", "-1"], timeouts.packages()),
                        header_lines: 0,
                    }],
                    uptime: vec![
                        UptimeStrategy::Command(CommandSpec::new("uptime", &[], cmd)),
                        UptimeStrategy::Sysinfo,
                    ],
                    logins: vec![CommandSpec::new("last", &["-n", "20"], timeouts.logins())],
                }
            }
            Platform::Other => Self {
                cpu: vec![CpuStrategy::Sysinfo],
                memory: vec![MemoryStrategy::Sysinfo],
                disk: vec![DiskStrategy::Sysinfo],
                load: vec![LoadStrategy::Sysinfo],
                interfaces: Vec::new(),
                processes: Vec::new(),
                packages: Vec::new(),
                uptime: vec![UptimeStrategy::Sysinfo],
                logins: Vec::new(),
            },
        }
    }
}

impl fmt::Display for LoadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => f.write_str(path),
            Self::Sysctl(spec) => write!(f, "{spec}"),
            Self::Sysinfo => f.write_str("sysinfo"),
        }
    }
}

impl fmt::Display for CpuStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TopIdle(spec) => write!(f, "{spec}"),
            Self::LoadPerCpu(load) => write!(f, "{load} / cpus"),
            Self::Sysinfo => f.write_str("sysinfo"),
        }
    }
}

impl fmt::Display for MemoryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Free(spec) | Self::VmStat(spec) => write!(f, "{spec}"),
            Self::Sysinfo => f.write_str("sysinfo"),
        }
    }
}

impl fmt::Display for DiskStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Df(spec) => write!(f, "{spec}"),
            Self::Sysinfo => f.write_str("sysinfo"),
        }
    }
}

impl fmt::Display for UptimeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command(spec) => write!(f, "{spec}"),
            Self::Sysinfo => f.write_str("sysinfo"),
        }
    }
}
