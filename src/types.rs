use crate::fingerprint::compute_hash;
use crate::identity::DisplayRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// `a{sv}` dictionary. Keys stay sorted so every encoding of it is stable.
pub(crate) type Properties = BTreeMap<String, Value>;

/// A D-Bus variant value as carried in `a{sv}` dictionaries.
///
/// On disk and on the busctl JSON wire a variant is `{"type": <signature>, "data": <json>}`.
/// Signatures outside `b u i d s` are carried opaquely so they survive a load/save cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TaggedValue", into = "TaggedValue")]
pub(crate) enum Value {
    Bool(bool),
    U32(u32),
    I32(i32),
    Double(f64),
    Str(String),
    Other {
        signature: String,
        data: serde_json::Value,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TaggedValue {
    #[serde(rename = "type")]
    signature: String,
    data: serde_json::Value,
}

impl Value {
    pub(crate) fn signature(&self) -> &str {
        match self {
            Value::Bool(_) => "b",
            Value::U32(_) => "u",
            Value::I32(_) => "i",
            Value::Double(_) => "d",
            Value::Str(_) => "s",
            Value::Other { signature, .. } => signature,
        }
    }

    pub(crate) fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub(crate) fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::U32(v) => write!(f, "{}", v),
            Value::I32(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Other { signature, data } => write!(f, "<{}> {}", signature, data),
        }
    }
}

impl From<Value> for TaggedValue {
    fn from(value: Value) -> Self {
        let signature = value.signature().to_string();
        let data = match value {
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::U32(v) => serde_json::Value::from(v),
            Value::I32(v) => serde_json::Value::from(v),
            Value::Double(v) => serde_json::Number::from_f64(v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s),
            Value::Other { data, .. } => data,
        };
        TaggedValue { signature, data }
    }
}

impl TryFrom<TaggedValue> for Value {
    type Error = String;

    fn try_from(tagged: TaggedValue) -> Result<Self, Self::Error> {
        let TaggedValue { signature, data } = tagged;
        if !matches!(signature.as_str(), "b" | "u" | "i" | "d" | "s") {
            return Ok(Value::Other { signature, data });
        }
        let value = match signature.as_str() {
            "b" => data.as_bool().map(Value::Bool),
            "u" => data
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .map(Value::U32),
            "i" => data
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .map(Value::I32),
            "d" => data.as_f64().map(Value::Double),
            _ => data.as_str().map(|s| Value::Str(s.to_string())),
        };
        value.ok_or_else(|| format!("variant data {} does not match signature '{}'", data, signature))
    }
}

/// Rotation/flip of a logical monitor, numbered as the display service numbers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub(crate) enum Transform {
    Normal = 0,
    Rotate90 = 1,
    Rotate180 = 2,
    Rotate270 = 3,
    Flipped = 4,
    Flipped90 = 5,
    Flipped180 = 6,
    Flipped270 = 7,
}

impl From<Transform> for u32 {
    fn from(transform: Transform) -> u32 {
        transform as u32
    }
}

impl TryFrom<u32> for Transform {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Transform::Normal,
            1 => Transform::Rotate90,
            2 => Transform::Rotate180,
            3 => Transform::Rotate270,
            4 => Transform::Flipped,
            5 => Transform::Flipped90,
            6 => Transform::Flipped180,
            7 => Transform::Flipped270,
            other => return Err(format!("invalid monitor transform {}", other)),
        })
    }
}

/// How the display service should treat an apply request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ApplyMethod {
    Normal = 1,
    Prompt = 2,
}

impl ApplyMethod {
    pub(crate) fn from_confirm(confirm: bool) -> Self {
        if confirm {
            ApplyMethod::Prompt
        } else {
            ApplyMethod::Normal
        }
    }

    pub(crate) fn code(self) -> u32 {
        self as u32
    }
}

type AssignmentTuple = (String, String, Properties);

/// One physical display placed inside a logical monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "AssignmentTuple", into = "AssignmentTuple")]
pub(crate) struct MonitorAssignment {
    pub(crate) connector: String,
    pub(crate) mode_id: String,
    pub(crate) props: Properties,
}

impl From<AssignmentTuple> for MonitorAssignment {
    fn from((connector, mode_id, props): AssignmentTuple) -> Self {
        MonitorAssignment {
            connector,
            mode_id,
            props,
        }
    }
}

impl From<MonitorAssignment> for AssignmentTuple {
    fn from(assignment: MonitorAssignment) -> Self {
        (assignment.connector, assignment.mode_id, assignment.props)
    }
}

type LogicalMonitorTuple = (i32, i32, f64, Transform, bool, Vec<MonitorAssignment>);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "LogicalMonitorTuple", into = "LogicalMonitorTuple")]
pub(crate) struct LogicalMonitor {
    pub(crate) x: i32,
    pub(crate) y: i32,
    pub(crate) scale: f64,
    pub(crate) transform: Transform,
    pub(crate) primary: bool,
    pub(crate) assignments: Vec<MonitorAssignment>,
}

impl From<LogicalMonitorTuple> for LogicalMonitor {
    fn from((x, y, scale, transform, primary, assignments): LogicalMonitorTuple) -> Self {
        LogicalMonitor {
            x,
            y,
            scale,
            transform,
            primary,
            assignments,
        }
    }
}

impl From<LogicalMonitor> for LogicalMonitorTuple {
    fn from(lm: LogicalMonitor) -> Self {
        (lm.x, lm.y, lm.scale, lm.transform, lm.primary, lm.assignments)
    }
}

type ConfigTuple = (
    String,
    u32,
    Vec<LogicalMonitor>,
    Properties,
    Vec<DisplayRecord>,
);

/// A named, saved monitor layout.
///
/// `hash` is derived data: it is recomputed from the other fields on load, before
/// every save and before every comparison, and never edited by hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ConfigTuple", into = "ConfigTuple")]
pub(crate) struct Config {
    pub(crate) name: String,
    pub(crate) hash: u32,
    pub(crate) logical_monitors: Vec<LogicalMonitor>,
    pub(crate) properties: Properties,
    pub(crate) physical_displays: Vec<DisplayRecord>,
}

impl Config {
    pub(crate) fn new(
        name: &str,
        logical_monitors: Vec<LogicalMonitor>,
        properties: Properties,
        physical_displays: Vec<DisplayRecord>,
    ) -> Self {
        let mut config = Config {
            name: name.to_string(),
            hash: 0,
            logical_monitors,
            properties,
            physical_displays,
        };
        config.refresh_hash();
        config
    }

    pub(crate) fn refresh_hash(&mut self) {
        self.hash = compute_hash(
            &self.logical_monitors,
            &self.properties,
            &self.physical_displays,
        );
    }
}

impl From<ConfigTuple> for Config {
    fn from((name, hash, logical_monitors, properties, physical_displays): ConfigTuple) -> Self {
        Config {
            name,
            hash,
            logical_monitors,
            properties,
            physical_displays,
        }
    }
}

impl From<Config> for ConfigTuple {
    fn from(config: Config) -> Self {
        (
            config.name,
            config.hash,
            config.logical_monitors,
            config.properties,
            config.physical_displays,
        )
    }
}

/// A display as it is physically present right now.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PhysicalDisplay {
    pub(crate) connector: String,
    pub(crate) display_name: String,
    pub(crate) vendor: String,
    pub(crate) product: String,
    pub(crate) serial: String,
    pub(crate) current_mode_id: Option<String>,
    /// Per-display settings worth re-applying: `underscanning`, `color-mode`.
    pub(crate) extra_props: Properties,
}

impl PhysicalDisplay {
    /// The record this display is saved as.
    pub(crate) fn record(&self) -> DisplayRecord {
        DisplayRecord::Modern {
            connector: self.connector.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

// Collaborator wire types, as returned by `GetCurrentState`.

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct MonitorId {
    pub(crate) connector: String,
    pub(crate) vendor: String,
    pub(crate) product: String,
    pub(crate) serial: String,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MonitorMode {
    pub(crate) id: String,
    pub(crate) width: i32,
    pub(crate) height: i32,
    pub(crate) refresh_hz: f64,
    pub(crate) is_current: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MonitorInfo {
    pub(crate) id: MonitorId,
    pub(crate) modes: Vec<MonitorMode>,
    pub(crate) props: Properties,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LiveLogicalMonitor {
    pub(crate) x: i32,
    pub(crate) y: i32,
    pub(crate) scale: f64,
    pub(crate) transform: Transform,
    pub(crate) primary: bool,
    pub(crate) monitors: Vec<MonitorId>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CurrentState {
    pub(crate) serial: u32,
    pub(crate) monitors: Vec<MonitorInfo>,
    pub(crate) logical_monitors: Vec<LiveLogicalMonitor>,
    pub(crate) properties: Properties,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_round_trips_known_and_opaque_signatures() {
        let json = r#"{"a":{"type":"b","data":true},"b":{"type":"u","data":2},"c":{"type":"au","data":[1,2]}}"#;
        let props: Properties = serde_json::from_str(json).unwrap();
        assert_eq!(props["a"], Value::Bool(true));
        assert_eq!(props["b"], Value::U32(2));
        assert_eq!(props["c"].signature(), "au");
        let back = serde_json::to_string(&props).unwrap();
        assert_eq!(back, json);
    }

    #[test]
    fn value_rejects_data_of_the_wrong_shape() {
        let err = serde_json::from_str::<Value>(r#"{"type":"u","data":"nope"}"#).unwrap_err();
        assert!(err.to_string().contains("does not match signature"));
    }

    #[test]
    fn config_uses_tuple_wire_layout_with_both_display_forms() {
        let json = r#"["Desk",0,[[0,0,1.0,0,true,[["DP-1","2560x1440@60",{}]]]],{},[["DP-1","LG Monitor"],["HDMI-1","DEL","U2719D","ABC"]]]"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.name, "Desk");
        assert_eq!(config.logical_monitors[0].assignments[0].connector, "DP-1");
        assert!(matches!(
            config.physical_displays[1],
            DisplayRecord::Legacy { .. }
        ));
        let back = serde_json::to_string(&config).unwrap();
        assert_eq!(back, json);
    }

    #[test]
    fn transform_rejects_out_of_range_values() {
        assert_eq!(Transform::try_from(3).unwrap(), Transform::Rotate270);
        assert!(Transform::try_from(8).is_err());
    }
}
