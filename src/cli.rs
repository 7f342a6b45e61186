use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub(crate) struct Cli {
    /// Log informational messages to stderr.
    #[arg(long, global = true, default_value_t = false)]
    pub(crate) verbose: bool,
    /// Enable diagnostic logging to a file.
    #[arg(long, global = true, default_value_t = false)]
    pub(crate) debug: bool,
    /// Path to debug log file (used with --debug). Overrides DISPLAYSWITCH_DEBUG_LOG.
    #[arg(long, global = true)]
    pub(crate) debug_log: Option<String>,
    /// Path to a config file (TOML). Defaults to $XDG_CONFIG_HOME/displayswitch/config.toml.
    #[arg(long, global = true)]
    pub(crate) config: Option<String>,
    /// Path to the saved display configurations (JSON). Overrides store_path.
    #[arg(long, global = true)]
    pub(crate) store: Option<String>,
    /// Command used to reach the session bus, e.g. "busctl --user". Overrides busctl_command.
    #[arg(long, global = true)]
    pub(crate) busctl: Option<String>,
    #[command(subcommand)]
    pub(crate) command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Show connected displays and the active saved configuration (default).
    Status,
    /// List saved configurations, marking available and active ones.
    List,
    /// Save the current display layout under a name.
    Save { name: String },
    /// Apply a saved configuration by name.
    Apply {
        name: String,
        /// Ask the display service to show its keep/revert prompt.
        #[arg(long, default_value_t = false)]
        confirm: bool,
    },
    /// Apply the next available configuration.
    Next {
        /// Ask the display service to show its keep/revert prompt.
        #[arg(long, default_value_t = false)]
        confirm: bool,
    },
    /// Apply the previous available configuration.
    Previous {
        /// Ask the display service to show its keep/revert prompt.
        #[arg(long, default_value_t = false)]
        confirm: bool,
    },
    /// Pick an available configuration interactively and apply it.
    Pick {
        /// Ask the display service to show its keep/revert prompt.
        #[arg(long, default_value_t = false)]
        confirm: bool,
    },
    /// Rename a saved configuration.
    Rename { old: String, new: String },
    /// Delete a saved configuration.
    Remove { name: String },
    /// Follow display changes, restoring the last configuration and reporting the active one.
    Watch {
        /// Do not re-apply the last configuration on start.
        #[arg(long, default_value_t = false)]
        no_restore: bool,
    },
    /// Create a starter config file.
    ConfigInit {
        /// Overwrite existing config if present (skip overwrite prompt).
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Interactively edit timings and apply behaviour.
    Config,
    /// Print resolved config (path + values).
    ConfigShow {
        /// Override confirm_apply in effective output.
        #[arg(long, default_value_t = false)]
        confirm: bool,
        /// Override restore_on_start in effective output.
        #[arg(long, default_value_t = false)]
        no_restore: bool,
    },
}

impl Commands {
    /// Whether the command talks to the display service.
    pub(crate) fn needs_display_state(&self) -> bool {
        matches!(
            self,
            Commands::Status
                | Commands::List
                | Commands::Save { .. }
                | Commands::Apply { .. }
                | Commands::Next { .. }
                | Commands::Previous { .. }
                | Commands::Pick { .. }
                | Commands::Watch { .. }
        )
    }
}
