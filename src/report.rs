use crate::collectors::Metric;
use crate::evaluate::Classification;
use chrono::{DateTime, Local};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    HealthCheck,
    FullReport,
}

impl ReportKind {
    pub fn slug(self) -> &'static str {
        match self {
            Self::HealthCheck => "health-check",
            Self::FullReport => "full-report",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::HealthCheck => "System Health Check Report",
            Self::FullReport => "Comprehensive System Report",
        }
    }

    /// Sections of this report, in output order.
    pub fn layout(self) -> &'static [SectionKind] {
        use SectionKind::*;
        match self {
            Self::HealthCheck => &[SystemInfo, Cpu, Memory, Disk, Load, Network, Uptime],
            Self::FullReport => &[
                SystemInfo, Cpu, Memory, Disk, Load, Network, Interfaces, Processes, Packages,
                Uptime, Logins,
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    SystemInfo,
    Cpu,
    Memory,
    Disk,
    Load,
    Network,
    Interfaces,
    Processes,
    Packages,
    Uptime,
    Logins,
}

impl SectionKind {
    pub fn title(self) -> &'static str {
        match self {
            Self::SystemInfo => "System Information",
            Self::Cpu => "CPU Information",
            Self::Memory => "Memory Information",
            Self::Disk => "Disk Usage",
            Self::Load => "Load Average",
            Self::Network => "Network Connectivity",
            Self::Interfaces => "Network Interfaces",
            Self::Processes => "Top 10 Processes by CPU",
            Self::Packages => "Installed Packages",
            Self::Uptime => "System Uptime",
            Self::Logins => "Recent Logins",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportSection {
    pub title: String,
    pub lines: Vec<String>,
}

impl ReportSection {
    pub fn new(kind: SectionKind) -> Self {
        Self {
            title: kind.title().to_string(),
            lines: Vec::new(),
        }
    }

    pub fn header(&self) -> String {
        format!("--- {} ---", self.title)
    }
}

/// Outcome of classifying one metric line of the report.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub label: String,
    pub metric: Metric,
    pub classification: Classification,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub kind: ReportKind,
    pub generated_at: DateTime<Local>,
    pub hostname: String,
    pub sections: Vec<ReportSection>,
    pub evaluations: Vec<Evaluation>,
    pub unreachable: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportSummary {
    pub ok: usize,
    pub warnings: usize,
    pub unknown: usize,
    pub unreachable: usize,
}

impl fmt::Display for ReportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} OK, {} WARNING, {} UNKNOWN, {} unreachable network target(s)",
            self.ok, self.warnings, self.unknown, self.unreachable
        )
    }
}

impl Report {
    pub fn file_name(&self) -> String {
        format!(
            "{}-{}.txt",
            self.kind.slug(),
            self.generated_at.format("%Y%m%d-%H%M%S")
        )
    }

    pub fn section(&self, title: &str) -> Option<&ReportSection> {
        self.sections.iter().find(|s| s.title == title)
    }

    pub fn summary(&self) -> ReportSummary {
        let mut summary = ReportSummary {
            unreachable: self.unreachable.len(),
            ..ReportSummary::default()
        };
        for eval in &self.evaluations {
            match eval.classification {
                Classification::Ok => summary.ok += 1,
                Classification::Warning => summary.warnings += 1,
                Classification::Unknown => summary.unknown += 1,
            }
        }
        summary
    }

    /// The section blocks only, without the timestamped header.
    pub fn render_body(&self) -> String {
        let mut out = String::new();
        for section in &self.sections {
            out.push_str(&section.header());
            out.push('\n');
            for line in &section.lines {
                out.push_str(line);
                out.push('\n');
            }
            out.push('\n');
        }
        out
    }

    pub fn render(&self) -> String {
        format!(
            "=== {} ===\nGenerated: {}\nHostname: {}\n\n{}",
            self.kind.title(),
            self.generated_at.format("%Y-%m-%d %H:%M:%S"),
            self.hostname,
            self.render_body()
        )
    }
}
