use std::fmt;
use std::fs;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("{program} недоступна: {source}")]
    Unavailable {
        program: String,
        source: std::io::Error,
    },
    #[error("{program} не ответила за {timeout_ms} мс")]
    Timeout { program: String, timeout_ms: u64 },
    #[error("{program} завершилась с ошибкой: {status}")]
    Failed { program: String, status: String },
    #[error("неожиданный вывод {what}: {detail}")]
    Parse { what: String, detail: String },
    #[error("нет данных: {0}")]
    NoData(String),
}

impl ProbeError {
    pub fn parse(what: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Parse {
            what: what.into(),
            detail: detail.into(),
        }
    }

    /// True when the tool simply is not installed on this host.
    pub fn is_missing_tool(&self) -> bool {
        matches!(
            self,
            Self::Unavailable { source, .. } if source.kind() == std::io::ErrorKind::NotFound
        )
    }
}

/// One external program invocation with fixed arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: &'static str,
    pub args: Vec<&'static str>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: &'static str, args: &[&'static str], timeout: Duration) -> Self {
        Self {
            program,
            args: args.to_vec(),
            timeout,
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Access to the host's read-only information sources.
pub trait CommandRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<String, ProbeError>;

    fn read_file(&self, path: &str) -> Result<String, ProbeError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<String, ProbeError> {
        let output = Command::new(spec.program)
            .args(&spec.args)
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match time::timeout(spec.timeout, output).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(ProbeError::Unavailable {
                    program: spec.program.to_string(),
                    source,
                })
            }
            Err(_elapsed) => {
                return Err(ProbeError::Timeout {
                    program: spec.program.to_string(),
                    timeout_ms: spec.timeout.as_millis() as u64,
                })
            }
        };

        if !output.status.success() {
            return Err(ProbeError::Failed {
                program: spec.to_string(),
                status: output.status.to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn read_file(&self, path: &str) -> Result<String, ProbeError> {
        fs::read_to_string(path).map_err(|source| ProbeError::Unavailable {
            program: path.to_string(),
            source,
        })
    }
}
