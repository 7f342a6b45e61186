//! The controller's view of the live display state.

use crate::fingerprint::canonicalize;
use crate::identity::DisplayRecord;
use crate::remap::{RemapOutcome, remap};
use crate::types::{
    Config, CurrentState, LogicalMonitor, MonitorAssignment, PhysicalDisplay, Properties, Value,
};
use tracing::debug;

pub(crate) const COLOR_MODE: &str = "color-mode";

/// One `GetCurrentState` reply, reduced to what saving and matching need.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DisplayState {
    pub(crate) serial: u32,
    pub(crate) displays: Vec<PhysicalDisplay>,
    /// Canonically ordered.
    pub(crate) logical_monitors: Vec<LogicalMonitor>,
    pub(crate) properties: Properties,
}

impl DisplayState {
    pub(crate) fn from_current(state: CurrentState) -> Self {
        let displays: Vec<PhysicalDisplay> = state
            .monitors
            .iter()
            .map(|monitor| {
                let mut extra_props = Properties::new();
                if let Some(v) = monitor.props.get("is-underscanning").and_then(Value::as_bool) {
                    extra_props.insert("underscanning".to_string(), Value::Bool(v));
                }
                if let Some(v) = monitor.props.get(COLOR_MODE) {
                    extra_props.insert(COLOR_MODE.to_string(), v.clone());
                }
                let current = monitor.modes.iter().find(|m| m.is_current);
                match current {
                    Some(mode) => debug!(
                        connector = %monitor.id.connector,
                        width = mode.width,
                        height = mode.height,
                        refresh_hz = mode.refresh_hz,
                        "current mode"
                    ),
                    None => debug!(connector = %monitor.id.connector, "display has no current mode"),
                }
                PhysicalDisplay {
                    connector: monitor.id.connector.clone(),
                    display_name: monitor
                        .props
                        .get("display-name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    vendor: monitor.id.vendor.clone(),
                    product: monitor.id.product.clone(),
                    serial: monitor.id.serial.clone(),
                    current_mode_id: current.map(|m| m.id.clone()),
                    extra_props,
                }
            })
            .collect();

        let mut logical_monitors: Vec<LogicalMonitor> = state
            .logical_monitors
            .iter()
            .map(|lm| LogicalMonitor {
                x: lm.x,
                y: lm.y,
                scale: lm.scale,
                transform: lm.transform,
                primary: lm.primary,
                assignments: lm
                    .monitors
                    .iter()
                    .filter_map(|id| {
                        let index = state.monitors.iter().position(|m| &m.id == id)?;
                        let display = &displays[index];
                        Some(MonitorAssignment {
                            connector: display.connector.clone(),
                            mode_id: display.current_mode_id.clone().unwrap_or_default(),
                            props: display.extra_props.clone(),
                        })
                    })
                    .collect(),
            })
            .collect();
        canonicalize(&mut logical_monitors);

        let mut properties = Properties::new();
        let supports_layout_mode = state
            .properties
            .get("supports-changing-layout-mode")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if supports_layout_mode && let Some(mode) = state.properties.get("layout-mode") {
            properties.insert("layout-mode".to_string(), mode.clone());
        }

        DisplayState {
            serial: state.serial,
            displays,
            logical_monitors,
            properties,
        }
    }

    /// Modern records for every connected display, in enumeration order.
    pub(crate) fn display_records(&self) -> Vec<DisplayRecord> {
        self.displays.iter().map(PhysicalDisplay::record).collect()
    }

    pub(crate) fn to_config(&self, name: &str) -> Config {
        Config::new(
            name,
            self.logical_monitors.clone(),
            self.properties.clone(),
            self.display_records(),
        )
    }

    pub(crate) fn remap(&self, saved: &Config) -> RemapOutcome {
        remap(
            &saved.logical_monitors,
            &saved.physical_displays,
            &self.displays,
        )
    }
}

/// Drops `color-mode` from every assignment and rehashes. Configs saved before
/// the display service reported color modes hash like the result.
pub(crate) fn without_color_mode(config: &Config) -> Config {
    let mut stripped = config.clone();
    for lm in stripped.logical_monitors.iter_mut() {
        for assignment in lm.assignments.iter_mut() {
            assignment.props.remove(COLOR_MODE);
        }
    }
    stripped.refresh_hash();
    stripped
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn displays_carry_identity_mode_and_extra_props() {
        let state = DisplayState::from_current(desk(7, "DP-1", "HDMI-1"));
        assert_eq!(state.serial, 7);
        let lg = &state.displays[0];
        assert_eq!(lg.connector, "DP-1");
        assert_eq!(lg.display_name, "LG Monitor");
        assert_eq!(lg.serial, "0001");
        assert_eq!(lg.current_mode_id.as_deref(), Some("2560x1440@59.951"));
        assert_eq!(lg.extra_props["underscanning"], Value::Bool(false));
        assert!(!lg.extra_props.contains_key(COLOR_MODE));
    }

    #[test]
    fn logical_monitors_are_canonical_with_assignments() {
        let state = DisplayState::from_current(desk(1, "DP-1", "HDMI-1"));
        assert_eq!(state.logical_monitors[0].x, 0);
        assert_eq!(state.logical_monitors[0].assignments[0].connector, "DP-1");
        assert_eq!(state.logical_monitors[1].assignments[0].connector, "HDMI-1");
        assert_eq!(
            state.logical_monitors[1].assignments[0].mode_id,
            "2560x1440@59.951"
        );
    }

    #[test]
    fn layout_mode_is_kept_only_when_changeable() {
        let mut current = desk(1, "DP-1", "HDMI-1");
        current
            .properties
            .insert("layout-mode".to_string(), Value::U32(2));
        assert!(DisplayState::from_current(current.clone()).properties.is_empty());

        current.properties.insert(
            "supports-changing-layout-mode".to_string(),
            Value::Bool(true),
        );
        let state = DisplayState::from_current(current);
        assert_eq!(state.properties["layout-mode"], Value::U32(2));
    }

    #[test]
    fn enumeration_order_does_not_change_the_config_hash() {
        let a = DisplayState::from_current(desk(1, "DP-1", "HDMI-1")).to_config("");
        let mut reordered = desk(1, "DP-1", "HDMI-1");
        reordered.logical_monitors.reverse();
        let b = DisplayState::from_current(reordered).to_config("");
        assert_eq!(a.hash, b.hash);
    }

    #[test]
    fn stripping_color_mode_rehashes() {
        let mut current = desk(1, "DP-1", "HDMI-1");
        current.monitors[0]
            .props
            .insert(COLOR_MODE.to_string(), Value::U32(1));
        let with = DisplayState::from_current(current).to_config("");
        let plain = DisplayState::from_current(desk(1, "DP-1", "HDMI-1")).to_config("");
        let stripped = without_color_mode(&with);
        assert_ne!(with.hash, plain.hash);
        assert_eq!(stripped.hash, plain.hash);
    }
}
