pub mod checks;
pub mod command;
pub mod listings;
pub mod plan;
pub mod system;

use crate::config::TcpCheckConfig;
use command::CommandRunner;
use plan::ProbePlan;
use sysinfo::{System, SystemExt};

pub const CPU_USAGE: &str = "cpu_usage";
pub const MEMORY_USAGE: &str = "memory_usage";
pub const DISK_USAGE: &str = "disk_usage";

/// A single normalized measurement. `value` is `None` when the probe could not
/// obtain data this run.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub name: String,
    pub value: Option<f64>,
    pub unit: String,
}

impl Metric {
    pub fn new(name: impl Into<String>, value: Option<f64>, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.filter(|v| v.is_finite()),
            unit: unit.into(),
        }
    }

    pub fn percent(name: impl Into<String>, value: Option<f64>) -> Self {
        Self::new(name, value, "%")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStats {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub available_bytes: u64,
}

impl MemoryStats {
    pub fn percent(&self) -> Option<f64> {
        if self.total_bytes == 0 {
            return None;
        }
        Some(self.used_bytes as f64 / self.total_bytes as f64 * 100.0)
    }

    pub fn metric(&self) -> Metric {
        Metric::percent(MEMORY_USAGE, self.percent())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiskUsage {
    pub filesystem: String,
    pub mount_point: String,
    pub usage_percent: f64,
}

impl DiskUsage {
    pub fn metric(&self) -> Metric {
        Metric::percent(DISK_USAGE, Some(self.usage_percent))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reachability {
    pub name: String,
    pub address: String,
    pub reachable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageCount {
    pub manager: String,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemInfo {
    pub host_name: Option<String>,
    pub os_name: Option<String>,
    pub kernel_version: Option<String>,
    pub os_version: Option<String>,
    pub machine: Option<String>,
    pub cpu_brand: Option<String>,
}

/// Everything the report assembler can ask the host for. Each call performs
/// one read-only collection and never fails: missing data comes back as `None`
/// or an absent metric value.
pub trait Probes {
    async fn system_info(&mut self) -> SystemInfo;
    async fn cpu(&mut self) -> Metric;
    async fn memory(&mut self) -> Option<MemoryStats>;
    async fn disks(&mut self) -> Option<Vec<DiskUsage>>;
    async fn load(&mut self) -> Option<LoadAverage>;
    async fn network(&mut self) -> Vec<Reachability>;
    async fn interfaces(&mut self) -> Option<Vec<String>>;
    async fn processes(&mut self) -> Option<Vec<String>>;
    async fn packages(&mut self) -> Option<Vec<PackageCount>>;
    async fn uptime(&mut self) -> Option<String>;
    async fn logins(&mut self) -> Option<Vec<String>>;
}

/// Probes backed by external commands, pseudo-files and, as the last resort,
/// the `sysinfo` crate.
pub struct HostProbes<R> {
    runner: R,
    plan: ProbePlan,
    network_targets: Vec<TcpCheckConfig>,
    system: Option<System>,
}

impl<R: CommandRunner> HostProbes<R> {
    pub fn new(runner: R, plan: ProbePlan, network_targets: Vec<TcpCheckConfig>) -> Self {
        Self {
            runner,
            plan,
            network_targets,
            system: Some(System::new()),
        }
    }

    /// Probes that only use the command runner. Sysinfo strategies report no data.
    #[cfg(test)]
    pub fn without_sysinfo(
        runner: R,
        plan: ProbePlan,
        network_targets: Vec<TcpCheckConfig>,
    ) -> Self {
        Self {
            runner,
            plan,
            network_targets,
            system: None,
        }
    }
}

impl<R: CommandRunner> Probes for HostProbes<R> {
    async fn system_info(&mut self) -> SystemInfo {
        system::collect_system_info(self.system.as_mut())
    }

    async fn cpu(&mut self) -> Metric {
        system::collect_cpu(&self.runner, &mut self.system, &self.plan.cpu).await
    }

    async fn memory(&mut self) -> Option<MemoryStats> {
        system::collect_memory(&self.runner, &mut self.system, &self.plan.memory).await
    }

    async fn disks(&mut self) -> Option<Vec<DiskUsage>> {
        system::collect_disks(&self.runner, &mut self.system, &self.plan.disk).await
    }

    async fn load(&mut self) -> Option<LoadAverage> {
        system::collect_load(&self.runner, &mut self.system, &self.plan.load).await
    }

    async fn network(&mut self) -> Vec<Reachability> {
        checks::collect_reachability(&self.network_targets).await
    }

    async fn interfaces(&mut self) -> Option<Vec<String>> {
        listings::collect_interfaces(&self.runner, &self.plan.interfaces).await
    }

    async fn processes(&mut self) -> Option<Vec<String>> {
        listings::collect_processes(&self.runner, &self.plan.processes).await
    }

    async fn packages(&mut self) -> Option<Vec<PackageCount>> {
        listings::collect_packages(&self.runner, &self.plan.packages).await
    }

    async fn uptime(&mut self) -> Option<String> {
        system::collect_uptime(&self.runner, &mut self.system, &self.plan.uptime).await
    }

    async fn logins(&mut self) -> Option<Vec<String>> {
        listings::collect_logins(&self.runner, &self.plan.logins).await
    }
}
