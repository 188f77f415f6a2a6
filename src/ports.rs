use crate::config::QueryBackend;
use crate::error::QueryError;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fmt;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::debug;

const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Names of the outputs that are currently connected, e.g. `LVDS-1`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AvailablePorts(BTreeSet<String>);

impl AvailablePorts {
    pub fn contains(&self, port: &str) -> bool {
        self.0.contains(port)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for AvailablePorts {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for AvailablePorts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("(none)");
        }
        let names: Vec<&str> = self.iter().collect();
        f.write_str(&names.join(", "))
    }
}

/// Source of the connected port list.
#[allow(async_fn_in_trait)]
pub trait PortQuery {
    async fn connected_ports(&self) -> Result<AvailablePorts, QueryError>;
}

/// `xrandr --query`
#[derive(Debug, Clone, Default)]
pub struct XrandrQuery;

/// `hyprctl monitors all -j`
#[derive(Debug, Clone, Default)]
pub struct HyprctlQuery;

#[derive(Debug, Clone, Deserialize)]
struct HyprMonitor {
    name: String,
}

impl PortQuery for XrandrQuery {
    async fn connected_ports(&self) -> Result<AvailablePorts, QueryError> {
        let stdout = run_tool("xrandr", &["--query"]).await?;
        let ports = parse_xrandr(&stdout)?;
        debug!("Connected outputs: {}", ports);
        Ok(ports)
    }
}

impl PortQuery for HyprctlQuery {
    async fn connected_ports(&self) -> Result<AvailablePorts, QueryError> {
        let stdout = run_tool("hyprctl", &["monitors", "all", "-j"]).await?;
        let ports = parse_hyprctl(&stdout)?;
        debug!("Connected monitors: {}", ports);
        Ok(ports)
    }
}

/// Backend picked from the `query` key of the configuration.
#[derive(Debug, Clone)]
pub enum DisplayQuery {
    Xrandr(XrandrQuery),
    Hyprctl(HyprctlQuery),
}

impl DisplayQuery {
    pub fn new(backend: QueryBackend) -> Self {
        match backend {
            QueryBackend::Xrandr => Self::Xrandr(XrandrQuery),
            QueryBackend::Hyprctl => Self::Hyprctl(HyprctlQuery),
        }
    }
}

impl PortQuery for DisplayQuery {
    async fn connected_ports(&self) -> Result<AvailablePorts, QueryError> {
        match self {
            Self::Xrandr(q) => q.connected_ports().await,
            Self::Hyprctl(q) => q.connected_ports().await,
        }
    }
}

async fn run_tool(tool: &str, args: &[&str]) -> Result<String, QueryError> {
    let cmd = Command::new(tool).args(args).kill_on_drop(true).output();

    let output = match timeout(QUERY_TIMEOUT, cmd).await {
        Ok(Ok(output)) => output,
        Ok(Err(source)) => {
            return Err(QueryError::Spawn {
                tool: tool.to_string(),
                source,
            });
        }
        Err(_) => {
            return Err(QueryError::TimedOut {
                tool: tool.to_string(),
            });
        }
    };

    if !output.status.success() {
        return Err(QueryError::Failed {
            tool: tool.to_string(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

pub fn parse_xrandr(output: &str) -> Result<AvailablePorts, QueryError> {
    let mut recognised = false;
    let mut ports = BTreeSet::new();

    // mode lines are indented; output lines look like "VGA-1 connected 1024x768+0+0 ..."
    for line in output.lines().filter(|l| !l.starts_with(char::is_whitespace)) {
        let mut tokens = line.split_whitespace();
        let (Some(name), Some(state)) = (tokens.next(), tokens.next()) else {
            continue;
        };
        match state {
            "connected" => {
                recognised = true;
                ports.insert(name.to_string());
            }
            "disconnected" | "unknown" => recognised = true,
            _ => {}
        }
    }

    if !recognised {
        return Err(QueryError::Unparseable {
            tool: "xrandr".to_string(),
            reason: "no output status line found".to_string(),
        });
    }

    Ok(AvailablePorts(ports))
}

pub fn parse_hyprctl(output: &str) -> Result<AvailablePorts, QueryError> {
    let monitors: Vec<HyprMonitor> =
        serde_json::from_str(output).map_err(|e| QueryError::Unparseable {
            tool: "hyprctl".to_string(),
            reason: e.to_string(),
        })?;

    Ok(monitors.into_iter().map(|m| m.name).collect())
}
