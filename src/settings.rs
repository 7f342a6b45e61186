use crate::MyError;
use crate::controller::{DEBOUNCE_DELAY, SETTLE_DELAY, Timings};
use crate::tui_settings::{apply_editor_defaults, edit_settings_tui};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_REL_PATH: &str = "displayswitch/config.toml";
const DEFAULT_STORE_FILE: &str = "configs.json";
pub(crate) const DEFAULT_BUSCTL_COMMAND: &str = "busctl --user";
pub(crate) const DEFAULT_STORE_POLL_SECS: u64 = 2;

/// The settings file as written by the user. Every key is optional.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub(crate) struct Settings {
    pub(crate) store_path: Option<String>,
    pub(crate) busctl_command: Option<String>,
    pub(crate) debounce_ms: Option<u64>,
    pub(crate) settle_ms: Option<u64>,
    pub(crate) confirm_apply: Option<bool>,
    pub(crate) restore_on_start: Option<bool>,
    pub(crate) store_poll_secs: Option<u64>,
}

/// Values from the command line that win over the settings file.
#[derive(Debug, Clone, Default)]
pub(crate) struct SettingsOverrides {
    pub(crate) store_path: Option<String>,
    pub(crate) busctl_command: Option<String>,
    pub(crate) confirm_apply: bool,
    pub(crate) no_restore: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EffectiveSettings {
    pub(crate) store_path: PathBuf,
    pub(crate) busctl: Vec<String>,
    pub(crate) timings: Timings,
    pub(crate) confirm_apply: bool,
    pub(crate) restore_on_start: bool,
    pub(crate) store_poll: Duration,
}

fn resolve_default_config_path() -> Result<PathBuf, Box<dyn Error>> {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return Ok(PathBuf::from(xdg).join(DEFAULT_CONFIG_REL_PATH));
    }
    if let Ok(home) = std::env::var("HOME") {
        return Ok(PathBuf::from(home)
            .join(".config")
            .join(DEFAULT_CONFIG_REL_PATH));
    }
    Err(
        MyError("Unable to resolve config path (HOME and XDG_CONFIG_HOME are unset).".to_string())
            .into(),
    )
}

pub(crate) fn resolve_config_path(path_override: &Option<String>) -> Result<PathBuf, Box<dyn Error>> {
    if let Some(path) = path_override {
        Ok(PathBuf::from(path))
    } else {
        resolve_default_config_path()
    }
}

pub(crate) fn load_settings(path_override: &Option<String>) -> Result<Settings, Box<dyn Error>> {
    let path = resolve_config_path(path_override)?;
    if !path.exists() {
        return Ok(Settings::default());
    }

    let contents = std::fs::read_to_string(&path)?;
    let settings: Settings = toml::from_str(&contents)
        .map_err(|e| MyError(format!("Failed to parse config {}: {}", path.display(), e)))?;
    Ok(settings)
}

/// Loads the settings file and merges the command line on top.
pub(crate) fn effective_settings(
    path_override: &Option<String>,
    overrides: &SettingsOverrides,
) -> Result<EffectiveSettings, Box<dyn Error>> {
    let path = resolve_config_path(path_override)?;
    let settings = load_settings(path_override)?;
    apply_settings(overrides, &settings, config_dir(&path))
}

fn config_dir(config_path: &Path) -> &Path {
    config_path.parent().unwrap_or_else(|| Path::new("."))
}

fn default_settings_values() -> Settings {
    Settings {
        store_path: None,
        busctl_command: Some(DEFAULT_BUSCTL_COMMAND.to_string()),
        debounce_ms: Some(DEBOUNCE_DELAY.as_millis() as u64),
        settle_ms: Some(SETTLE_DELAY.as_millis() as u64),
        confirm_apply: Some(false),
        restore_on_start: Some(true),
        store_poll_secs: Some(DEFAULT_STORE_POLL_SECS),
    }
}

fn render_settings_template(settings: &Settings) -> String {
    let store_path_line = settings
        .store_path
        .as_ref()
        .map(|p| {
            format!(
                "store_path = {}",
                serde_json::to_string(p).unwrap_or_else(|_| "\"\"".to_string())
            )
        })
        .unwrap_or_else(|| "# store_path = \"~/.config/displayswitch/configs.json\"".to_string());
    let busctl_command = settings
        .busctl_command
        .clone()
        .unwrap_or_else(|| DEFAULT_BUSCTL_COMMAND.to_string());
    let debounce_ms = settings
        .debounce_ms
        .unwrap_or(DEBOUNCE_DELAY.as_millis() as u64);
    let settle_ms = settings.settle_ms.unwrap_or(SETTLE_DELAY.as_millis() as u64);
    let confirm_apply = settings.confirm_apply.unwrap_or(false);
    let restore_on_start = settings.restore_on_start.unwrap_or(true);
    let store_poll_secs = settings.store_poll_secs.unwrap_or(DEFAULT_STORE_POLL_SECS);

    format!(
        r#"# Displayswitch config

# Where saved display configurations live (defaults to configs.json next to this file)
{store_path_line}

# Command used to reach the session bus; split like a shell would
busctl_command = {busctl_command}

# Wait this long after the last MonitorsChanged signal before re-reading state
debounce_ms = {debounce_ms}
# Wait this long after applying a configuration before re-reading state
settle_ms = {settle_ms}

# Ask the display service to show its keep/revert prompt when applying
confirm_apply = {confirm_apply}
# `watch`: re-apply the last applied configuration when it is available on start
restore_on_start = {restore_on_start}
# `watch`: how often to check the saved configurations for outside changes
store_poll_secs = {store_poll_secs}
"#,
        store_path_line = store_path_line,
        busctl_command = serde_json::to_string(&busctl_command)
            .unwrap_or_else(|_| "\"\"".to_string()),
        debounce_ms = debounce_ms,
        settle_ms = settle_ms,
        confirm_apply = confirm_apply,
        restore_on_start = restore_on_start,
        store_poll_secs = store_poll_secs,
    )
}

fn prompt_yes_no(prompt: &str, default: bool) -> Result<bool, Box<dyn Error>> {
    loop {
        let hint = if default { "Y/n" } else { "y/N" };
        print!("{} [{}]: ", prompt, hint);
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        let normalized = input.trim().to_lowercase();

        if normalized.is_empty() {
            return Ok(default);
        }
        if normalized == "y" || normalized == "yes" {
            return Ok(true);
        }
        if normalized == "n" || normalized == "no" {
            return Ok(false);
        }

        println!("Please answer y/yes or n/no.");
    }
}

pub(crate) fn print_kv_table(title: &str, rows: Vec<(&str, String)>) {
    println!("Displayswitch: {}", title);
    let key_width = rows
        .iter()
        .map(|(k, _)| k.len())
        .max()
        .unwrap_or(3)
        .max("Key".len());
    let val_width = rows
        .iter()
        .map(|(_, v)| v.len())
        .max()
        .unwrap_or(5)
        .max("Value".len());

    let sep = format!("+-{}-+-{}-+", "-".repeat(key_width), "-".repeat(val_width));
    println!("{}", sep);
    println!(
        "| {:<key_width$} | {:<val_width$} |",
        "Key",
        "Value",
        key_width = key_width,
        val_width = val_width
    );
    println!("{}", sep);
    for (k, v) in rows {
        println!(
            "| {:<key_width$} | {:<val_width$} |",
            k,
            v,
            key_width = key_width,
            val_width = val_width
        );
    }
    println!("{}", sep);
}

fn format_optional<T: ToString>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "(unset)".to_string())
}

fn print_settings_table(title: &str, settings: &Settings) {
    print_kv_table(
        title,
        vec![
            ("store_path", format_optional(&settings.store_path)),
            ("busctl_command", format_optional(&settings.busctl_command)),
            ("debounce_ms", format_optional(&settings.debounce_ms)),
            ("settle_ms", format_optional(&settings.settle_ms)),
            ("confirm_apply", format_optional(&settings.confirm_apply)),
            ("restore_on_start", format_optional(&settings.restore_on_start)),
            ("store_poll_secs", format_optional(&settings.store_poll_secs)),
        ],
    );
}

fn print_effective_table(title: &str, effective: &EffectiveSettings) {
    print_kv_table(
        title,
        vec![
            ("store_path", effective.store_path.display().to_string()),
            ("busctl_command", format!("{:?}", effective.busctl)),
            (
                "debounce_ms",
                effective.timings.debounce.as_millis().to_string(),
            ),
            ("settle_ms", effective.timings.settle.as_millis().to_string()),
            ("confirm_apply", effective.confirm_apply.to_string()),
            ("restore_on_start", effective.restore_on_start.to_string()),
            ("store_poll_secs", effective.store_poll.as_secs().to_string()),
        ],
    );
}

fn write_settings(path_override: &Option<String>, settings: &Settings) -> Result<(), Box<dyn Error>> {
    let path = resolve_config_path(path_override)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(settings)
        .map_err(|e| MyError(format!("Failed to serialize config: {}", e)))?;
    std::fs::write(&path, toml_str)?;
    println!("Displayswitch: Wrote config to {}", path.display());
    Ok(())
}

pub(crate) fn write_default_settings(
    path_override: &Option<String>,
    force: bool,
) -> Result<(), Box<dyn Error>> {
    let path = resolve_config_path(path_override)?;

    if path.exists() && !force {
        let should_overwrite = prompt_yes_no(
            &format!("Config already exists at {}. Overwrite it?", path.display()),
            false,
        )?;
        if !should_overwrite {
            println!("Displayswitch: Keeping existing config unchanged.");
            return Ok(());
        }
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut settings = apply_editor_defaults(default_settings_values());
    if !force {
        match edit_settings_tui("Config Init", settings.clone(), &path)? {
            Some(edited) => settings = apply_editor_defaults(edited),
            None => {
                println!("Displayswitch: Config init cancelled.");
                return Ok(());
            }
        }
    }

    std::fs::write(&path, render_settings_template(&settings))?;
    println!("Displayswitch: Wrote config to {}", path.display());
    print_settings_table("Final Config Defaults", &settings);
    Ok(())
}

pub(crate) fn show_settings(
    path_override: &Option<String>,
    overrides: &SettingsOverrides,
) -> Result<(), Box<dyn Error>> {
    let path = resolve_config_path(path_override)?;
    let settings = load_settings(path_override)?;
    let effective = apply_settings(overrides, &settings, config_dir(&path))?;

    println!("Displayswitch: Config path: {}", path.display());
    print_effective_table("Effective Values (after CLI overrides)", &effective);
    print_settings_table("Raw Config Values", &settings);
    Ok(())
}

pub(crate) fn interactive_settings(path_override: &Option<String>) -> Result<(), Box<dyn Error>> {
    let path = resolve_config_path(path_override)?;
    println!("Displayswitch: Interactive config at {}", path.display());
    let settings = apply_editor_defaults(load_settings(path_override)?);

    match edit_settings_tui("Config Editor", settings, &path)? {
        Some(edited) => {
            write_settings(path_override, &edited)?;
            println!(
                "Displayswitch: Done. Use `displayswitch config-show` to inspect effective values."
            );
        }
        None => println!("Displayswitch: Config update cancelled."),
    }
    Ok(())
}

pub(crate) fn apply_settings(
    overrides: &SettingsOverrides,
    settings: &Settings,
    config_dir: &Path,
) -> Result<EffectiveSettings, Box<dyn Error>> {
    let store_path = overrides
        .store_path
        .clone()
        .or_else(|| settings.store_path.clone())
        .map(PathBuf::from)
        .unwrap_or_else(|| config_dir.join(DEFAULT_STORE_FILE));

    let busctl_line = overrides
        .busctl_command
        .clone()
        .or_else(|| settings.busctl_command.clone())
        .unwrap_or_else(|| DEFAULT_BUSCTL_COMMAND.to_string());
    let busctl = shell_words::split(&busctl_line).map_err(|e| {
        MyError(format!(
            "Failed to parse busctl_command '{}': {}",
            busctl_line, e
        ))
    })?;
    if busctl.is_empty() {
        return Err(MyError("busctl_command must not be empty.".to_string()).into());
    }

    let timings = Timings {
        debounce: settings
            .debounce_ms
            .map(Duration::from_millis)
            .unwrap_or(DEBOUNCE_DELAY),
        settle: settings
            .settle_ms
            .map(Duration::from_millis)
            .unwrap_or(SETTLE_DELAY),
    };

    let confirm_apply = if overrides.confirm_apply {
        true
    } else {
        settings.confirm_apply.unwrap_or(false)
    };

    let restore_on_start = if overrides.no_restore {
        false
    } else {
        settings.restore_on_start.unwrap_or(true)
    };

    let mut store_poll_secs = settings.store_poll_secs.unwrap_or(DEFAULT_STORE_POLL_SECS);
    if store_poll_secs == 0 {
        eprintln!("Displayswitch: store_poll_secs 0 is out of range; using 1.");
        store_poll_secs = 1;
    }

    Ok(EffectiveSettings {
        store_path,
        busctl,
        timings,
        confirm_apply,
        restore_on_start,
        store_poll: Duration::from_secs(store_poll_secs),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_settings() -> Settings {
        Settings {
            store_path: Some("/srv/displays.json".to_string()),
            busctl_command: Some("busctl --user --timeout=5".to_string()),
            debounce_ms: Some(250),
            settle_ms: Some(2000),
            confirm_apply: Some(true),
            restore_on_start: Some(false),
            store_poll_secs: Some(5),
        }
    }

    #[test]
    fn apply_settings_uses_file_values() {
        let effective = apply_settings(
            &SettingsOverrides::default(),
            &base_settings(),
            Path::new("/home/me/.config/displayswitch"),
        )
        .unwrap();

        assert_eq!(effective.store_path, PathBuf::from("/srv/displays.json"));
        assert_eq!(effective.busctl, vec!["busctl", "--user", "--timeout=5"]);
        assert_eq!(effective.timings.debounce, Duration::from_millis(250));
        assert_eq!(effective.timings.settle, Duration::from_millis(2000));
        assert!(effective.confirm_apply);
        assert!(!effective.restore_on_start);
        assert_eq!(effective.store_poll, Duration::from_secs(5));
    }

    #[test]
    fn apply_settings_defaults_follow_the_config_dir() {
        let effective = apply_settings(
            &SettingsOverrides::default(),
            &Settings::default(),
            Path::new("/home/me/.config/displayswitch"),
        )
        .unwrap();

        assert_eq!(
            effective.store_path,
            PathBuf::from("/home/me/.config/displayswitch/configs.json")
        );
        assert_eq!(effective.busctl, vec!["busctl", "--user"]);
        assert_eq!(effective.timings, Timings::default());
        assert!(!effective.confirm_apply);
        assert!(effective.restore_on_start);
        assert_eq!(effective.store_poll, Duration::from_secs(2));
    }

    #[test]
    fn apply_settings_cli_overrides_win() {
        let mut settings = base_settings();
        settings.confirm_apply = Some(false);
        settings.restore_on_start = Some(true);
        settings.store_poll_secs = Some(0);
        let overrides = SettingsOverrides {
            store_path: Some("/tmp/other.json".to_string()),
            busctl_command: Some("'/opt/bus tools/busctl' --system".to_string()),
            confirm_apply: true,
            no_restore: true,
        };

        let effective = apply_settings(&overrides, &settings, Path::new("/cfg")).unwrap();
        assert_eq!(effective.store_path, PathBuf::from("/tmp/other.json"));
        assert_eq!(effective.busctl, vec!["/opt/bus tools/busctl", "--system"]);
        assert!(effective.confirm_apply);
        assert!(!effective.restore_on_start);
        assert_eq!(effective.store_poll, Duration::from_secs(1));
    }

    #[test]
    fn empty_or_unbalanced_busctl_command_is_rejected() {
        let mut settings = Settings::default();
        settings.busctl_command = Some("   ".to_string());
        assert!(apply_settings(&SettingsOverrides::default(), &settings, Path::new("/cfg")).is_err());

        settings.busctl_command = Some("busctl 'unterminated".to_string());
        let err = apply_settings(&SettingsOverrides::default(), &settings, Path::new("/cfg"))
            .unwrap_err();
        assert!(err.to_string().contains("busctl_command"));
    }

    #[test]
    fn template_parses_back_to_the_same_settings() {
        let settings = apply_editor_defaults(base_settings());
        let parsed: Settings = toml::from_str(&render_settings_template(&settings)).unwrap();
        assert_eq!(parsed, settings);

        let defaults = apply_editor_defaults(default_settings_values());
        let parsed: Settings = toml::from_str(&render_settings_template(&defaults)).unwrap();
        assert_eq!(parsed.store_path, None);
        assert_eq!(parsed.debounce_ms, Some(500));
    }
}
