//! Canonical encoding and hash of a monitor configuration.
//!
//! The encoding mirrors the `(a(iiduba(ssa{sv}))a{sv}a(ss))` tuple layout as text.
//! Doubles are written as their IEEE-754 bit pattern so no float formatting
//! reaches the hash input. Logical monitors and their assignments are put in
//! canonical order first; physical display records are encoded in the order
//! given.

use crate::identity::DisplayRecord;
use crate::types::{LogicalMonitor, MonitorAssignment, Properties, Value};
use std::cmp::Ordering;

const ENCODING_VERSION: u32 = 1;

pub(crate) fn compute_hash(
    logical_monitors: &[LogicalMonitor],
    properties: &Properties,
    physical_displays: &[DisplayRecord],
) -> u32 {
    string_hash(encode(logical_monitors, properties, physical_displays).as_bytes())
}

/// Sorts assignments by `(connector, mode)` and logical monitors by
/// `(x, y, primary last)`, with the remaining fields as tie-breakers.
pub(crate) fn canonicalize(logical_monitors: &mut [LogicalMonitor]) {
    for lm in logical_monitors.iter_mut() {
        lm.assignments.sort_by(assignment_order);
    }
    logical_monitors.sort_by(logical_monitor_order);
}

pub(crate) fn encode(
    logical_monitors: &[LogicalMonitor],
    properties: &Properties,
    physical_displays: &[DisplayRecord],
) -> String {
    let mut canonical = logical_monitors.to_vec();
    canonicalize(&mut canonical);

    let monitors = canonical
        .iter()
        .map(encode_logical_monitor)
        .collect::<Vec<_>>()
        .join(", ");
    let displays = physical_displays
        .iter()
        .map(encode_display_record)
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "v{} ([{}], {}, [{}])",
        ENCODING_VERSION,
        monitors,
        encode_properties(properties),
        displays
    )
}

// g_string_hash style: h = h * 31 + byte.
fn string_hash(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0u32, |h, &b| h.wrapping_mul(31).wrapping_add(u32::from(b)))
}

fn encode_logical_monitor(lm: &LogicalMonitor) -> String {
    let assignments = lm
        .assignments
        .iter()
        .map(encode_assignment)
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "({}, {}, {}, {}, {}, [{}])",
        lm.x,
        lm.y,
        encode_double(lm.scale),
        u32::from(lm.transform),
        lm.primary,
        assignments
    )
}

fn encode_assignment(assignment: &MonitorAssignment) -> String {
    format!(
        "({:?}, {:?}, {})",
        assignment.connector,
        assignment.mode_id,
        encode_properties(&assignment.props)
    )
}

fn encode_display_record(record: &DisplayRecord) -> String {
    match record {
        DisplayRecord::Modern {
            connector,
            display_name,
        } => format!("({:?}, {:?})", connector, display_name),
        DisplayRecord::Legacy {
            connector,
            vendor,
            product,
            serial,
        } => format!("({:?}, {:?}, {:?}, {:?})", connector, vendor, product, serial),
    }
}

fn encode_properties(props: &Properties) -> String {
    let entries = props
        .iter()
        .map(|(key, value)| format!("{:?}: {}", key, encode_value(value)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{{}}}", entries)
}

fn encode_value(value: &Value) -> String {
    match value {
        Value::Bool(b) => b.to_string(),
        Value::U32(v) => format!("uint32 {}", v),
        Value::I32(v) => format!("int32 {}", v),
        Value::Double(v) => encode_double(*v),
        Value::Str(s) => format!("{:?}", s),
        Value::Other { signature, data } => format!("<{}> {}", signature, data),
    }
}

fn encode_double(v: f64) -> String {
    format!("double 0x{:016x}", v.to_bits())
}

fn assignment_order(a: &MonitorAssignment, b: &MonitorAssignment) -> Ordering {
    a.connector
        .cmp(&b.connector)
        .then_with(|| a.mode_id.cmp(&b.mode_id))
        .then_with(|| encode_properties(&a.props).cmp(&encode_properties(&b.props)))
}

fn logical_monitor_order(a: &LogicalMonitor, b: &LogicalMonitor) -> Ordering {
    a.x.cmp(&b.x)
        .then(a.y.cmp(&b.y))
        .then(a.primary.cmp(&b.primary))
        .then_with(|| a.scale.total_cmp(&b.scale))
        .then(a.transform.cmp(&b.transform))
        .then_with(|| {
            for (x, y) in a.assignments.iter().zip(&b.assignments) {
                let ord = assignment_order(x, y);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            a.assignments.len().cmp(&b.assignments.len())
        })
}
