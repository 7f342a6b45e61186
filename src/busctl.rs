use crate::service::{DisplayConfigService, ServiceError};
use crate::types::{
    ApplyMethod, CurrentState, LiveLogicalMonitor, LogicalMonitor, MonitorId, MonitorInfo,
    MonitorMode, Properties, Transform, Value,
};
use serde::Deserialize;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const DESTINATION: &str = "org.gnome.Mutter.DisplayConfig";
const OBJECT_PATH: &str = "/org/gnome/Mutter/DisplayConfig";
const INTERFACE: &str = "org.gnome.Mutter.DisplayConfig";
const APPLY_SIGNATURE: &str = "uua(iiduba(ssa{sv}))a{sv}";
const CHANGED_MATCH: &str = "--match=type='signal',interface='org.gnome.Mutter.DisplayConfig',member='MonitorsChanged'";

/// Talks to the display service by running `busctl` and parsing its JSON output.
pub(crate) struct BusctlService {
    command: Vec<String>,
    changes: broadcast::Sender<()>,
    watcher: Option<JoinHandle<()>>,
}

impl Drop for BusctlService {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}

impl BusctlService {
    /// `command` is the busctl invocation prefix, e.g. `["busctl", "--user"]`.
    pub(crate) fn new(command: Vec<String>) -> Self {
        let (changes, _) = broadcast::channel(16);
        BusctlService {
            command,
            changes,
            watcher: None,
        }
    }

    fn program(&self) -> Result<(&String, &[String]), ServiceError> {
        self.command.split_first().ok_or_else(|| ServiceError::Spawn {
            command: String::new(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty busctl command"),
        })
    }

    async fn execute_busctl_output(&self, args: &[String]) -> Result<String, ServiceError> {
        let (program, prefix) = self.program()?;
        let rendered = shell_words::join(self.command.iter().chain(args));
        debug!(command = %rendered, "running busctl");

        let output = Command::new(program)
            .args(prefix)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ServiceError::Spawn {
                command: rendered.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        debug!(
            status = %output.status,
            stdout = %stdout.trim(),
            stderr = %stderr.trim(),
            "busctl finished"
        );

        if !output.status.success() {
            let stderr = stderr.trim();
            if let Some(reason) = stderr.strip_prefix("Call failed:") {
                return Err(ServiceError::Rejected(reason.trim().to_string()));
            }
            return Err(ServiceError::Failed {
                command: rendered,
                status: output.status.to_string(),
                stderr: stderr.to_string(),
            });
        }
        Ok(stdout)
    }

    /// Starts a `busctl monitor` child that turns every `MonitorsChanged`
    /// signal into a message on the change channel.
    pub(crate) fn watch_changes(&mut self) -> Result<(), ServiceError> {
        let (program, prefix) = self.program()?;
        let args = [
            "--json=short".to_string(),
            "monitor".to_string(),
            CHANGED_MATCH.to_string(),
        ];
        let rendered = shell_words::join(self.command.iter().chain(&args));
        debug!(command = %rendered, "starting busctl monitor");

        let mut child = Command::new(program)
            .args(prefix)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ServiceError::Spawn {
                command: rendered.clone(),
                source,
            })?;
        let stdout = child.stdout.take().ok_or_else(|| ServiceError::Spawn {
            command: rendered,
            source: std::io::Error::other("busctl monitor has no stdout"),
        })?;

        let changes = self.changes.clone();
        let watcher = tokio::spawn(async move {
            let _child = child;
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if is_monitors_changed(&line) {
                            debug!("MonitorsChanged received");
                            let _ = changes.send(());
                        }
                    }
                    Ok(None) => {
                        warn!("busctl monitor exited; display changes are no longer tracked");
                        break;
                    }
                    Err(err) => {
                        warn!(error = %err, "failed to read busctl monitor output");
                        break;
                    }
                }
            }
        });
        if let Some(previous) = self.watcher.replace(watcher) {
            previous.abort();
        }
        Ok(())
    }
}

fn call_args(method: &str, arguments: Vec<String>) -> Vec<String> {
    let mut args = vec![
        "--json=short".to_string(),
        "call".to_string(),
        DESTINATION.to_string(),
        OBJECT_PATH.to_string(),
        INTERFACE.to_string(),
        method.to_string(),
    ];
    args.extend(arguments);
    args
}

impl DisplayConfigService for BusctlService {
    async fn get_current_state(&self) -> Result<CurrentState, ServiceError> {
        let stdout = self
            .execute_busctl_output(&call_args("GetCurrentState", Vec::new()))
            .await?;
        parse_current_state(&stdout)
    }

    async fn apply_monitors_config(
        &self,
        serial: u32,
        method: ApplyMethod,
        logical_monitors: Vec<LogicalMonitor>,
        properties: Properties,
    ) -> Result<(), ServiceError> {
        let arguments = build_apply_args(serial, method, &logical_monitors, &properties)?;
        self.execute_busctl_output(&call_args("ApplyMonitorsConfig", arguments))
            .await?;
        Ok(())
    }

    fn monitors_changed(&self) -> broadcast::Receiver<()> {
        self.changes.subscribe()
    }
}

#[derive(Deserialize)]
struct Reply<T> {
    data: T,
}

type RawMonitorId = (String, String, String, String);
type RawMode = (String, i32, i32, f64, f64, Vec<f64>, Properties);
type RawMonitor = (RawMonitorId, Vec<RawMode>, Properties);
type RawLogicalMonitor = (i32, i32, f64, Transform, bool, Vec<RawMonitorId>, Properties);
type RawState = (u32, Vec<RawMonitor>, Vec<RawLogicalMonitor>, Properties);

fn monitor_id((connector, vendor, product, serial): RawMonitorId) -> MonitorId {
    MonitorId {
        connector,
        vendor,
        product,
        serial,
    }
}

/// Parses the `--json=short` reply of `GetCurrentState`.
pub(crate) fn parse_current_state(json: &str) -> Result<CurrentState, ServiceError> {
    let reply: Reply<RawState> = serde_json::from_str(json)?;
    let (serial, monitors, logical_monitors, properties) = reply.data;

    let monitors = monitors
        .into_iter()
        .map(|(id, modes, props)| MonitorInfo {
            id: monitor_id(id),
            modes: modes
                .into_iter()
                .map(|(id, width, height, refresh_hz, _, _, props)| MonitorMode {
                    id,
                    width,
                    height,
                    refresh_hz,
                    is_current: props
                        .get("is-current")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                })
                .collect(),
            props,
        })
        .collect();

    let logical_monitors = logical_monitors
        .into_iter()
        .map(
            |(x, y, scale, transform, primary, monitors, _)| LiveLogicalMonitor {
                x,
                y,
                scale,
                transform,
                primary,
                monitors: monitors.into_iter().map(monitor_id).collect(),
            },
        )
        .collect();

    Ok(CurrentState {
        serial,
        monitors,
        logical_monitors,
        properties,
    })
}

/// Flattens an `ApplyMonitorsConfig` call into busctl's argument syntax:
/// arrays and dictionaries are a length followed by their items, variants are a
/// signature followed by the value.
pub(crate) fn build_apply_args(
    serial: u32,
    method: ApplyMethod,
    logical_monitors: &[LogicalMonitor],
    properties: &Properties,
) -> Result<Vec<String>, ServiceError> {
    let mut args = vec![
        APPLY_SIGNATURE.to_string(),
        serial.to_string(),
        method.code().to_string(),
        logical_monitors.len().to_string(),
    ];
    for lm in logical_monitors {
        args.push(lm.x.to_string());
        args.push(lm.y.to_string());
        args.push(lm.scale.to_string());
        args.push(u32::from(lm.transform).to_string());
        args.push(lm.primary.to_string());
        args.push(lm.assignments.len().to_string());
        for assignment in &lm.assignments {
            args.push(assignment.connector.clone());
            args.push(assignment.mode_id.clone());
            push_properties(&mut args, &assignment.props)?;
        }
    }
    push_properties(&mut args, properties)?;
    Ok(args)
}

fn push_properties(args: &mut Vec<String>, props: &Properties) -> Result<(), ServiceError> {
    args.push(props.len().to_string());
    for (key, value) in props {
        let data = match value {
            Value::Bool(b) => b.to_string(),
            Value::U32(v) => v.to_string(),
            Value::I32(v) => v.to_string(),
            Value::Double(v) => v.to_string(),
            Value::Str(s) => s.clone(),
            Value::Other { signature, .. } => {
                return Err(ServiceError::Unsupported(format!(
                    "property '{}' of type '{}'",
                    key, signature
                )));
            }
        };
        args.push(key.clone());
        args.push(value.signature().to_string());
        args.push(data);
    }
    Ok(())
}

fn is_monitors_changed(line: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(line)
        .ok()
        .and_then(|message| {
            message
                .get("member")
                .and_then(|m| m.as_str())
                .map(|m| m == "MonitorsChanged")
        })
        .unwrap_or(false)
}
