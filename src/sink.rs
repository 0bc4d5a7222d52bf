use crate::report::Report;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("не удалось создать каталог отчётов {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("не удалось записать отчёт в {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("не удалось сохранить отчёт как {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Writes rendered reports into one directory. A report either lands in full
/// under its final name or not at all.
#[derive(Debug, Clone)]
pub struct ReportSink {
    dir: PathBuf,
}

impl ReportSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn write(&self, report: &Report) -> Result<PathBuf, SinkError> {
        fs::create_dir_all(&self.dir).map_err(|source| SinkError::CreateDir {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.dir.join(report.file_name());
        let write_err = |source| SinkError::Write {
            path: path.clone(),
            source,
        };

        let mut tmp = tempfile::Builder::new()
            .prefix(".sysreport-")
            .suffix(".tmp")
            .tempfile_in(&self.dir)
            .map_err(write_err)?;
        tmp.write_all(report.render().as_bytes()).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;

        // Dropping the temp file on any error above removes it.
        tmp.persist(&path).map_err(|e| SinkError::Persist {
            path: path.clone(),
            source: e.error,
        })?;

        info!(
            report = report.kind.slug(),
            path = %path.display(),
            summary = %report.summary(),
            "отчёт сохранён"
        );
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::assemble;
    use crate::assemble::tests::healthy_probes;
    use crate::config::ThresholdsConfig;
    use crate::evaluate::ThresholdRules;
    use crate::report::ReportKind;
    use chrono::{Local, TimeZone};
    use std::path::Path;

    async fn sample(kind: ReportKind) -> Report {
        let mut probes = healthy_probes();
        let rules = ThresholdRules::from_config(&ThresholdsConfig::default());
        let at = Local.with_ymd_and_hms(2026, 10, 18, 14, 30, 5).unwrap();
        assemble(kind, &mut probes, &rules, at).await
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn writes_timestamped_file_with_rendered_text() {
        let dir = tempfile::tempdir().unwrap();
        let report = sample(ReportKind::HealthCheck).await;

        let path = ReportSink::new(dir.path()).write(&report).unwrap();

        assert_eq!(path, dir.path().join("health-check-20261018-143005.txt"));
        assert_eq!(fs::read_to_string(&path).unwrap(), report.render());
        assert_eq!(entries(dir.path()), vec!["health-check-20261018-143005.txt"]);
    }

    #[tokio::test]
    async fn creates_missing_report_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("reports").join("daily");
        let report = sample(ReportKind::FullReport).await;

        let path = ReportSink::new(&nested).write(&report).unwrap();
        assert!(path.starts_with(&nested));
        assert!(path.ends_with("full-report-20261018-143005.txt"));
    }

    #[tokio::test]
    async fn report_with_unreachable_targets_is_still_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut probes = healthy_probes();
        for r in &mut probes.network {
            r.reachable = false;
        }
        let rules = ThresholdRules::from_config(&ThresholdsConfig::default());
        let report = assemble(ReportKind::HealthCheck, &mut probes, &rules, Local::now()).await;

        let path = ReportSink::new(dir.path()).write(&report).unwrap();
        let text = fs::read_to_string(path).unwrap();
        assert_eq!(text.matches(": FAIL").count(), 2);
    }

    #[tokio::test]
    async fn directory_that_is_a_file_fails_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("reports");
        fs::write(&blocker, "not a directory").unwrap();
        let report = sample(ReportKind::HealthCheck).await;

        let err = ReportSink::new(&blocker).write(&report).unwrap_err();
        assert!(matches!(err, SinkError::CreateDir { .. }), "{err:?}");
        assert_eq!(entries(dir.path()), vec!["reports"]);
        assert_eq!(fs::read_to_string(&blocker).unwrap(), "not a directory");
    }

    #[tokio::test]
    async fn persist_failure_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let report = sample(ReportKind::HealthCheck).await;
        // A non-empty directory under the target name makes the rename fail.
        let target = dir.path().join(report.file_name());
        fs::create_dir(&target).unwrap();
        fs::write(target.join("keep"), "x").unwrap();

        let err = ReportSink::new(dir.path()).write(&report).unwrap_err();
        assert!(matches!(err, SinkError::Persist { .. }), "{err:?}");
        assert_eq!(entries(dir.path()), vec![report.file_name()]);
    }
}
