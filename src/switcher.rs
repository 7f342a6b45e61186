//! Decisions about saved configs made against the live display state: which
//! ones can be applied, which one is active, and where next/previous lead.

use crate::equivalence::{displays_present, same_physical_setup};
use crate::identity::DisplayRecord;
use crate::snapshot::{DisplayState, without_color_mode};
use crate::store::StoredConfigs;
use crate::types::Config;
use tracing::{debug, info, warn};

/// Indices of saved configs whose displays are all connected right now.
pub(crate) fn available_configs(saved: &[Config], live: &[DisplayRecord]) -> Vec<usize> {
    saved
        .iter()
        .enumerate()
        .filter(|(_, config)| displays_present(&config.physical_displays, live))
        .map(|(index, _)| index)
        .collect()
}

/// Whether `saved` describes the layout the displays are in right now.
///
/// A hash match only counts once `same_physical_setup` agrees. Otherwise the
/// saved layout is remapped onto the live connectors and rehashed together with
/// the live display records.
pub(crate) fn is_active(saved: &Config, current: &Config, live: &DisplayState) -> bool {
    if saved.hash == current.hash {
        if same_physical_setup(saved, current) {
            return true;
        }
        warn!(
            config = %saved.name,
            hash = saved.hash,
            "hash collision: hashes match but displays or layout differ"
        );
    }

    let remapped = live.remap(saved);
    let candidate = Config::new(
        &saved.name,
        remapped.logical_monitors,
        saved.properties.clone(),
        live.display_records(),
    );
    debug!(
        config = %saved.name,
        remapped_hash = candidate.hash,
        current_hash = current.hash,
        "compared remapped config"
    );
    candidate.hash == current.hash
}

/// The active config among `available`. When several match, the last one wins.
pub(crate) fn find_active(
    saved: &[Config],
    available: &[usize],
    current: &Config,
    live: &DisplayState,
) -> Option<usize> {
    available
        .iter()
        .rev()
        .copied()
        .find(|&index| is_active(&saved[index], current, live))
}

/// Replaces the saved config that matches the live layout once `color-mode` is
/// ignored with the live layout itself, keeping its name.
pub(crate) fn upgrade_color_mode(stored: &mut StoredConfigs, current: &Config) -> Option<usize> {
    let stripped = without_color_mode(current);
    let index = stored
        .configs
        .iter()
        .position(|config| config.hash == stripped.hash)?;

    let name = stored.configs[index].name.clone();
    info!(config = %name, "upgrading saved config with color-mode");
    let mut upgraded = current.clone();
    upgraded.name = name;
    stored.configs[index] = upgraded;
    Some(index)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Upsert {
    Replaced(usize),
    Added(usize),
}

/// Saves `config`, replacing the first saved config with the same physical
/// setup or appending otherwise.
pub(crate) fn upsert_config(stored: &mut StoredConfigs, config: Config) -> Upsert {
    match stored
        .configs
        .iter()
        .position(|existing| same_physical_setup(existing, &config))
    {
        Some(index) => {
            stored.configs[index] = config;
            Upsert::Replaced(index)
        }
        None => {
            stored.configs.push(config);
            Upsert::Added(stored.configs.len() - 1)
        }
    }
}

/// The config next to `active` among `available`, wrapping around. With
/// nothing active the first available config is chosen.
pub(crate) fn cycle(available: &[usize], active: Option<usize>, forward: bool) -> Option<usize> {
    let first = *available.first()?;
    let Some(position) = active.and_then(|a| available.iter().position(|&i| i == a)) else {
        return Some(first);
    };
    let n = available.len();
    let next = if forward {
        (position + 1) % n
    } else {
        (position + n - 1) % n
    };
    Some(available[next])
}

/// The last applied config, if it can be applied right now.
pub(crate) fn restore_target(stored: &StoredConfigs, available: &[usize]) -> Option<usize> {
    let index = stored.last_applied();
    (index < stored.configs.len() && available.contains(&index)).then_some(index)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Evaluation {
    pub(crate) available: Vec<usize>,
    pub(crate) active: Option<usize>,
    pub(crate) upgraded: Option<usize>,
    /// `stored` changed and should be written back.
    pub(crate) dirty: bool,
}

/// Works out available and active configs for the live state, upgrading a
/// pre-color-mode config at most once and remembering the active index.
pub(crate) fn evaluate(stored: &mut StoredConfigs, live: &DisplayState) -> Evaluation {
    let current = live.to_config("");
    let records = live.display_records();
    let mut available = available_configs(&stored.configs, &records);
    let mut active = find_active(&stored.configs, &available, &current, live);

    let mut upgraded = None;
    if active.is_none()
        && let Some(index) = upgrade_color_mode(stored, &current)
    {
        upgraded = Some(index);
        available = available_configs(&stored.configs, &records);
        active = find_active(&stored.configs, &available, &current, live);
    }

    let mut dirty = upgraded.is_some();
    if let Some(index) = active
        && stored.last_applied() != index
    {
        stored.set_last_applied(index);
        dirty = true;
    }

    Evaluation {
        available,
        active,
        upgraded,
        dirty,
    }
}
