//! Structural comparison of two configs with connector names ignored.

use crate::identity::{DisplayRecord, same_display};
use crate::types::{Config, LogicalMonitor};

/// Every saved display matches at least one of `live`, connectors ignored.
///
/// The check is existential per display, not a bijection: two saved records
/// with the same identity are both satisfied by one live display.
pub(crate) fn displays_present(saved: &[DisplayRecord], live: &[DisplayRecord]) -> bool {
    saved
        .iter()
        .all(|s| live.iter().any(|l| same_display(s, l)))
}

/// True when both configs describe the same displays in the same arrangement.
///
/// Display records are compared order-independently and by identity only.
/// Logical monitors are compared on `(x, y, scale, transform, primary)` after
/// sorting by position; their assignments are not looked at.
pub(crate) fn same_physical_setup(a: &Config, b: &Config) -> bool {
    if a.physical_displays.len() != b.physical_displays.len() {
        return false;
    }
    if !displays_present(&a.physical_displays, &b.physical_displays) {
        return false;
    }
    if a.logical_monitors.len() != b.logical_monitors.len() {
        return false;
    }

    let sorted_a = sorted_by_position(&a.logical_monitors);
    let sorted_b = sorted_by_position(&b.logical_monitors);
    sorted_a
        .iter()
        .zip(&sorted_b)
        .all(|(x, y)| same_geometry(x, y))
}

fn sorted_by_position(lms: &[LogicalMonitor]) -> Vec<&LogicalMonitor> {
    let mut sorted: Vec<&LogicalMonitor> = lms.iter().collect();
    sorted.sort_by(|a, b| a.x.cmp(&b.x).then(a.y.cmp(&b.y)));
    sorted
}

fn same_geometry(a: &LogicalMonitor, b: &LogicalMonitor) -> bool {
    a.x == b.x
        && a.y == b.y
        && a.scale == b.scale
        && a.transform == b.transform
        && a.primary == b.primary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MonitorAssignment, Properties, Transform};

    fn modern(connector: &str, name: &str) -> DisplayRecord {
        DisplayRecord::Modern {
            connector: connector.to_string(),
            display_name: name.to_string(),
        }
    }

    fn monitor(x: i32, primary: bool, connector: &str) -> LogicalMonitor {
        LogicalMonitor {
            x,
            y: 0,
            scale: 1.0,
            transform: Transform::Normal,
            primary,
            assignments: vec![MonitorAssignment {
                connector: connector.to_string(),
                mode_id: "2560x1440@60".to_string(),
                props: Properties::new(),
            }],
        }
    }

    fn desk() -> Config {
        Config::new(
            "Desk",
            vec![monitor(0, true, "DP-1"), monitor(2560, false, "HDMI-1")],
            Properties::new(),
            vec![modern("DP-1", "LG Monitor"), modern("HDMI-1", "Dell Monitor")],
        )
    }

    #[test]
    fn config_matches_itself_after_shuffling() {
        let config = desk();
        let mut shuffled = config.clone();
        shuffled.logical_monitors.reverse();
        shuffled.physical_displays.reverse();
        assert!(same_physical_setup(&config, &shuffled));
        assert!(same_physical_setup(&shuffled, &config));
    }

    #[test]
    fn connector_names_do_not_matter() {
        let mut swapped = desk();
        swapped.physical_displays = vec![modern("HDMI-2", "Dell Monitor"), modern("DP-3", "LG Monitor")];
        swapped.logical_monitors = vec![monitor(0, true, "DP-3"), monitor(2560, false, "HDMI-2")];
        assert!(same_physical_setup(&desk(), &swapped));
    }

    #[test]
    fn geometry_differences_fail() {
        let mut moved = desk();
        moved.logical_monitors[1].x = 1920;
        assert!(!same_physical_setup(&desk(), &moved));

        let mut rotated = desk();
        rotated.logical_monitors[0].transform = Transform::Rotate90;
        assert!(!same_physical_setup(&desk(), &rotated));

        let mut primary_moved = desk();
        primary_moved.logical_monitors[0].primary = false;
        primary_moved.logical_monitors[1].primary = true;
        assert!(!same_physical_setup(&desk(), &primary_moved));
    }

    #[test]
    fn display_count_and_identity_must_agree() {
        let mut fewer = desk();
        fewer.physical_displays.pop();
        assert!(!same_physical_setup(&desk(), &fewer));

        let mut other = desk();
        other.physical_displays[1] = modern("HDMI-1", "Samsung");
        assert!(!same_physical_setup(&desk(), &other));
    }

    #[test]
    fn assignments_are_not_compared() {
        let mut remoded = desk();
        remoded.logical_monitors[0].assignments[0].mode_id = "1920x1080@60".to_string();
        assert!(same_physical_setup(&desk(), &remoded));
    }

    #[test]
    fn duplicate_names_are_accepted_existentially() {
        let twins = vec![modern("DP-1", "LG Monitor"), modern("DP-2", "LG Monitor")];
        let mixed = vec![modern("DP-1", "LG Monitor"), modern("DP-2", "Dell Monitor")];
        assert!(displays_present(&twins, &mixed));
        assert!(!displays_present(&mixed, &twins));
    }
}
