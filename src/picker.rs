use crate::MyError;
use skim::prelude::*;

const ACTIVE_MARKER: &str = " (active)";

/// One line per config, numbered so equal names stay distinguishable.
pub(crate) fn build_pick_labels(names: &[&str], active: Option<usize>) -> Vec<String> {
    names
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let marker = if Some(idx) == active { ACTIVE_MARKER } else { "" };
            format!("{}. {}{}", idx + 1, name, marker)
        })
        .collect()
}

/// Lets the user choose one of `names`. Returns its position, or `None` when
/// the picker was cancelled.
pub(crate) fn pick_config(
    names: &[&str],
    active: Option<usize>,
) -> Result<Option<usize>, Box<dyn std::error::Error>> {
    if names.is_empty() {
        return Err(
            MyError("No saved configurations match the connected displays.".to_string()).into(),
        );
    }

    let labels = build_pick_labels(names, active);
    let options = SkimOptionsBuilder::default()
        .height(Some("50%"))
        .prompt(Some("Select display configuration> "))
        .reverse(true)
        .multi(false)
        .build()
        .map_err(|e| MyError(format!("Failed to build skim options: {}", e)))?;

    let reader = SkimItemReader::default();
    let items = reader.of_bufread(std::io::Cursor::new(labels.join("\n")));
    let selected = Skim::run_with(&options, Some(items))
        .filter(|out| !out.is_abort)
        .map(|out| out.selected_items)
        .unwrap_or_default();

    if selected.is_empty() {
        return Ok(None);
    }

    let selected_label = selected[0].output().to_string();
    let position = labels
        .iter()
        .position(|l| *l == selected_label)
        .ok_or_else(|| MyError("Selected configuration not found.".to_string()))?;
    Ok(Some(position))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_numbered_and_mark_the_active_config() {
        let labels = build_pick_labels(&["Desk", "Couch", "Desk"], Some(1));
        assert_eq!(labels, vec!["1. Desk", "2. Couch (active)", "3. Desk"]);
    }
}
