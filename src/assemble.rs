use crate::collectors::{Metric, Probes, SystemInfo};
use crate::evaluate::{classify, Classification, ThresholdRules};
use crate::report::{Evaluation, Report, ReportKind, ReportSection, SectionKind};
use chrono::{DateTime, Local};
use humansize::{format_size, BINARY};
use tracing::warn;

const UNKNOWN_FIELD: &str = "unknown";

/// Runs the probes `kind` needs, strictly in layout order, and builds the
/// report. Every section of the layout is emitted even when its probe
/// returned nothing.
pub async fn assemble<P: Probes>(
    kind: ReportKind,
    probes: &mut P,
    rules: &ThresholdRules,
    generated_at: DateTime<Local>,
) -> Report {
    let info = probes.system_info().await;
    let mut builder = Builder {
        rules,
        evaluations: Vec::new(),
        unreachable: Vec::new(),
    };

    let mut sections = Vec::with_capacity(kind.layout().len());
    for &section_kind in kind.layout() {
        let mut section = ReportSection::new(section_kind);
        builder.fill(section_kind, probes, &info, &mut section.lines).await;
        sections.push(section);
    }

    Report {
        kind,
        generated_at,
        hostname: info.host_name.unwrap_or_else(|| UNKNOWN_FIELD.to_string()),
        sections,
        evaluations: builder.evaluations,
        unreachable: builder.unreachable,
    }
}

struct Builder<'a> {
    rules: &'a ThresholdRules,
    evaluations: Vec<Evaluation>,
    unreachable: Vec<String>,
}

impl Builder<'_> {
    async fn fill<P: Probes>(
        &mut self,
        kind: SectionKind,
        probes: &mut P,
        info: &SystemInfo,
        lines: &mut Vec<String>,
    ) {
        match kind {
            SectionKind::SystemInfo => system_info_lines(info, lines),
            SectionKind::Cpu => {
                let metric = probes.cpu().await;
                let shown = metric.value.map(|v| format!("{v:.1}%"));
                lines.push(self.classified("CPU Usage", metric, shown));
            }
            SectionKind::Memory => match probes.memory().await {
                Some(mem) => {
                    lines.push(format!("Total Memory: {}", format_size(mem.total_bytes, BINARY)));
                    lines.push(format!("Used Memory: {}", format_size(mem.used_bytes, BINARY)));
                    lines.push(format!(
                        "Available Memory: {}",
                        format_size(mem.available_bytes, BINARY)
                    ));
                    let metric = mem.metric();
                    let shown = metric.value.map(|v| format!("{v:.2}%"));
                    lines.push(self.classified("Memory Usage", metric, shown));
                }
                None => {
                    let metric = Metric::percent(crate::collectors::MEMORY_USAGE, None);
                    lines.push(self.classified("Memory Usage", metric, None));
                }
            },
            SectionKind::Disk => match probes.disks().await {
                Some(disks) if disks.is_empty() => {
                    lines.push("No device-backed filesystems found".to_string());
                }
                Some(disks) => {
                    for disk in disks {
                        let label = format!("{} on {}", disk.filesystem, disk.mount_point);
                        let shown = Some(format!("{:.0}%", disk.usage_percent));
                        lines.push(self.classified(&label, disk.metric(), shown));
                    }
                }
                None => {
                    let metric = Metric::percent(crate::collectors::DISK_USAGE, None);
                    lines.push(self.classified("Disk Usage", metric, None));
                }
            },
            SectionKind::Load => match probes.load().await {
                Some(avg) => lines.push(format!(
                    "Load Average (1min, 5min, 15min): {:.2}, {:.2}, {:.2}",
                    avg.one, avg.five, avg.fifteen
                )),
                None => lines.push("Unable to retrieve load average".to_string()),
            },
            SectionKind::Network => {
                let results = probes.network().await;
                if results.is_empty() {
                    lines.push("No network targets configured".to_string());
                }
                for r in results {
                    let status = if r.reachable { "OK" } else { "FAIL" };
                    lines.push(format!("{} ({}): {}", r.name, r.address, status));
                    if !r.reachable {
                        self.unreachable.push(r.name);
                    }
                }
            }
            SectionKind::Interfaces => {
                text_or_placeholder(probes.interfaces().await, "network information", lines)
            }
            SectionKind::Processes => {
                text_or_placeholder(probes.processes().await, "process information", lines)
            }
            SectionKind::Packages => match probes.packages().await {
                Some(counts) => lines.extend(
                    counts
                        .into_iter()
                        .map(|pc| format!("{}: {} packages", pc.manager.to_uppercase(), pc.count)),
                ),
                None => lines.push("Unable to retrieve package information".to_string()),
            },
            SectionKind::Uptime => {
                text_or_placeholder(probes.uptime().await.map(|u| vec![u]), "uptime", lines)
            }
            SectionKind::Logins => {
                text_or_placeholder(probes.logins().await, "login records", lines)
            }
        }
    }

    /// `<label>: <value> [<CLASS>]`, recorded as an evaluation when a rule exists.
    fn classified(&mut self, label: &str, metric: Metric, shown: Option<String>) -> String {
        let shown = shown.unwrap_or_else(|| "unable to retrieve".to_string());
        let Some(rule) = self.rules.get(&metric.name) else {
            return format!("{label}: {shown}");
        };

        let classification = classify(metric.value, rule);
        if classification == Classification::Warning {
            warn!(
                metric = %metric.name,
                label,
                value = metric.value.unwrap_or_default(),
                limit = rule.limit,
                "превышен порог"
            );
        }

        self.evaluations.push(Evaluation {
            label: label.to_string(),
            metric,
            classification,
        });
        format!("{label}: {shown} [{classification}]")
    }
}

fn system_info_lines(info: &SystemInfo, lines: &mut Vec<String>) {
    let fields = [
        ("Hostname", &info.host_name),
        ("System", &info.os_name),
        ("Release", &info.kernel_version),
        ("Version", &info.os_version),
        ("Machine", &info.machine),
        ("Processor", &info.cpu_brand),
    ];
    if fields.iter().all(|(_, v)| v.is_none()) {
        lines.push("Unable to retrieve system information".to_string());
        return;
    }
    for (name, value) in fields {
        lines.push(format!("{name}: {}", value.as_deref().unwrap_or(UNKNOWN_FIELD)));
    }
}

fn text_or_placeholder(text: Option<Vec<String>>, what: &str, lines: &mut Vec<String>) {
    match text {
        Some(text) if !text.is_empty() => lines.extend(text),
        _ => lines.push(format!("Unable to retrieve {what}")),
    }
}
