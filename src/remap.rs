//! Rewrites a saved layout onto the connectors the same hardware uses now.

use crate::identity::{DisplayRecord, same_display};
use crate::types::{LogicalMonitor, MonitorAssignment, PhysicalDisplay};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RemapOutcome {
    pub(crate) logical_monitors: Vec<LogicalMonitor>,
    /// Saved connector -> live connector, for every saved display record.
    pub(crate) connector_map: BTreeMap<String, String>,
    /// Display names reported by more than one live display.
    pub(crate) duplicate_names: Vec<String>,
    /// Saved connectors whose display was not found among the live ones.
    pub(crate) unmatched: Vec<String>,
}

/// Maps every connector referenced by `saved_lms` onto the live connector of the
/// same physical display.
///
/// Geometry is never touched. Assignments landing on a connected display take
/// that display's current mode and its current props as defaults under the
/// saved props; assignments for displays that are not connected pass through.
pub(crate) fn remap(
    saved_lms: &[LogicalMonitor],
    saved_displays: &[DisplayRecord],
    live: &[PhysicalDisplay],
) -> RemapOutcome {
    let duplicate_names = duplicate_display_names(live);
    for name in &duplicate_names {
        warn!(
            display_name = %name,
            "duplicate display name among connected displays; connector remapping may be unreliable"
        );
    }

    let mut connector_map = BTreeMap::new();
    let mut unmatched = Vec::new();
    for saved in saved_displays {
        let saved_connector = saved.connector().to_string();
        let name = saved.comparable_name();
        if name.is_empty() {
            connector_map.insert(saved_connector.clone(), saved_connector);
            continue;
        }

        let probe = DisplayRecord::Modern {
            connector: saved_connector.clone(),
            display_name: name.to_string(),
        };
        match live.iter().find(|d| same_display(&d.record(), &probe)) {
            Some(found) => {
                debug!(
                    from = %saved_connector,
                    to = %found.connector,
                    display_name = %name,
                    "mapped connector"
                );
                connector_map.insert(saved_connector, found.connector.clone());
            }
            None => {
                warn!(
                    connector = %saved_connector,
                    display_name = %name,
                    "no connected display matches saved display"
                );
                unmatched.push(saved_connector.clone());
                connector_map.insert(saved_connector.clone(), saved_connector);
            }
        }
    }

    let logical_monitors = saved_lms
        .iter()
        .map(|lm| LogicalMonitor {
            assignments: lm
                .assignments
                .iter()
                .map(|a| remap_assignment(a, &connector_map, live))
                .collect(),
            ..lm.clone()
        })
        .collect();

    RemapOutcome {
        logical_monitors,
        connector_map,
        duplicate_names,
        unmatched,
    }
}

fn remap_assignment(
    saved: &MonitorAssignment,
    connector_map: &BTreeMap<String, String>,
    live: &[PhysicalDisplay],
) -> MonitorAssignment {
    let connector = connector_map
        .get(&saved.connector)
        .cloned()
        .unwrap_or_else(|| saved.connector.clone());

    let Some(display) = live.iter().find(|d| d.connector == connector) else {
        return MonitorAssignment {
            connector,
            ..saved.clone()
        };
    };

    let mut props = display.extra_props.clone();
    props.extend(saved.props.iter().map(|(k, v)| (k.clone(), v.clone())));
    let mode_id = display
        .current_mode_id
        .clone()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| saved.mode_id.clone());

    MonitorAssignment {
        connector,
        mode_id,
        props,
    }
}

fn duplicate_display_names(live: &[PhysicalDisplay]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut duplicates = BTreeSet::new();
    for display in live {
        if display.display_name.is_empty() {
            continue;
        }
        if !seen.insert(display.display_name.as_str()) {
            duplicates.insert(display.display_name.clone());
        }
    }
    duplicates.into_iter().collect()
}
