use std::{process::Stdio, time::Duration};

use tokio::process::Command;
use tracing::info;

use crate::{
    models::{HostReport, ScanType},
    parser::parse_nmap_xml,
};

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("refusing target '{0}': looks like a command-line option")]
    InvalidTarget(String),
    #[error("failed to launch {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} exited with {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("unreadable scanner output: {0}")]
    Parse(#[from] quick_xml::DeError),
    #[error("scan did not finish within {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub target: String,
    pub mode: ScanType,
}

/// An external port/service scanner, invoked once per target specifier.
#[async_trait::async_trait]
pub trait ToolAdapter: Send + Sync {
    fn name(&self) -> &'static str;
    async fn run(&self, req: ScanRequest) -> Result<Vec<HostReport>, ScanError>;
}

#[derive(Debug, Clone)]
pub struct NmapAdapter {
    binary: String,
}

impl NmapAdapter {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn arguments(req: &ScanRequest) -> Vec<String> {
        let mode: &[&str] = match req.mode {
            ScanType::Quick => &["-F"],
            ScanType::Full => &["-sV", "--script=vuln"],
        };
        mode.iter()
            .chain(["-oX", "-"].iter())
            .map(|a| a.to_string())
            .chain(std::iter::once(req.target.clone()))
            .collect()
    }
}

impl Default for NmapAdapter {
    fn default() -> Self {
        Self::new("nmap")
    }
}

#[async_trait::async_trait]
impl ToolAdapter for NmapAdapter {
    fn name(&self) -> &'static str {
        "nmap"
    }

    async fn run(&self, req: ScanRequest) -> Result<Vec<HostReport>, ScanError> {
        if req.target.starts_with('-') {
            return Err(ScanError::InvalidTarget(req.target));
        }
        let xml = run_tool(&self.binary, &Self::arguments(&req)).await?;
        Ok(parse_nmap_xml(&xml)?)
    }
}

/// Run an external tool to completion and return its stdout.
///
/// The child is killed if the returned future is dropped, so wrapping this
/// in `tokio::time::timeout` does not leak processes.
pub async fn run_tool(cmd: &str, args: &[String]) -> Result<String, ScanError> {
    info!(command = cmd, ?args, "audit: launching external tool");
    let child = Command::new(cmd)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ScanError::Spawn {
            tool: cmd.to_string(),
            source,
        })?;

    let out = child
        .wait_with_output()
        .await
        .map_err(|source| ScanError::Spawn {
            tool: cmd.to_string(),
            source,
        })?;

    if !out.status.success() {
        return Err(ScanError::ToolFailed {
            tool: cmd.to_string(),
            status: out.status,
            stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&out.stdout).to_string())
}
