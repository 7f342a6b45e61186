use crate::MyError;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

pub(crate) const DEBUG_LOG_ENV_VAR: &str = "DISPLAYSWITCH_DEBUG_LOG";
pub(crate) const FALLBACK_DEBUG_LOG_PATH: &str = "/tmp/displayswitch-debug.log";
const DEFAULT_DEBUG_LOG_REL_PATH: &str = "displayswitch/debug.log";

fn default_debug_log_path() -> PathBuf {
    if let Ok(state) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(state).join(DEFAULT_DEBUG_LOG_REL_PATH);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".local/state")
            .join(DEFAULT_DEBUG_LOG_REL_PATH);
    }
    PathBuf::from(FALLBACK_DEBUG_LOG_PATH)
}

pub(crate) fn resolve_debug_log_path(path_override: &Option<String>) -> PathBuf {
    if let Some(p) = path_override.as_ref() {
        PathBuf::from(p)
    } else if let Ok(p) = std::env::var(DEBUG_LOG_ENV_VAR) {
        PathBuf::from(p)
    } else {
        default_debug_log_path()
    }
}

fn default_level(verbose: bool, debug: bool) -> &'static str {
    if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        "warn"
    }
}

/// Installs the global `tracing` subscriber. Events go to stderr unless
/// `debug` is set, in which case they go to the debug log file. `RUST_LOG`
/// overrides the level either way.
pub(crate) fn init_logging(
    verbose: bool,
    debug: bool,
    path_override: &Option<String>,
) -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(verbose, debug)));

    if !debug {
        return tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init()
            .map_err(|e| MyError(format!("Failed to initialize logging: {}", e)).into());
    }

    let chosen_path = resolve_debug_log_path(path_override);
    let open_file = |path: &PathBuf| -> Result<std::fs::File, Box<dyn Error>> {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        Ok(std::fs::OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(path)?)
    };

    let (path, file) = match open_file(&chosen_path) {
        Ok(f) => (chosen_path, f),
        Err(e) => {
            let fallback = PathBuf::from(FALLBACK_DEBUG_LOG_PATH);
            eprintln!(
                "Displayswitch: Failed to open debug log at {} ({}), falling back to {}",
                chosen_path.display(),
                e,
                fallback.display()
            );
            let f = open_file(&fallback)?;
            (fallback, f)
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|e| MyError(format!("Failed to initialize logging: {}", e)))?;
    println!("Displayswitch: Debug log enabled at {}", path.display());
    tracing::debug!("debug logging initialized");
    Ok(())
}
