mod busctl;
mod cli;
mod controller;
mod debuglog;
mod equivalence;
mod fingerprint;
mod identity;
mod picker;
mod remap;
mod service;
mod settings;
mod snapshot;
mod store;
mod switcher;
mod tui_settings;
mod types;

use crate::busctl::BusctlService;
use crate::cli::{Cli, Commands};
use crate::controller::{ApplyOutcome, DisplayStateController};
use crate::debuglog::init_logging;
use crate::settings::{
    EffectiveSettings, SettingsOverrides, effective_settings, interactive_settings,
    print_kv_table, show_settings, write_default_settings,
};
use crate::snapshot::DisplayState;
use crate::store::{ConfigStore, StoredConfigs};
use crate::switcher::{Evaluation, Upsert, cycle, evaluate, restore_target, upsert_config};
use crate::types::ApplyMethod;
use clap::Parser;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::{error::Error, fmt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub(crate) struct MyError(pub(crate) String);

impl fmt::Display for MyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Error for MyError {}

/// A connection to the display service plus the saved configurations.
struct Session {
    controller: DisplayStateController<BusctlService>,
    store: ConfigStore,
    stored: StoredConfigs,
    method: ApplyMethod,
}

impl Session {
    fn open(
        settings: &EffectiveSettings,
        service: BusctlService,
        watch: bool,
    ) -> Result<Self, Box<dyn Error>> {
        let controller = if watch {
            DisplayStateController::start(service, settings.timings)
        } else {
            DisplayStateController::new(service, settings.timings)
        };
        let mut store = ConfigStore::new(settings.store_path.clone());
        let stored = store.load()?;
        Ok(Session {
            controller,
            store,
            stored,
            method: ApplyMethod::from_confirm(settings.confirm_apply),
        })
    }

    async fn live_state(&self) -> Result<Arc<DisplayState>, Box<dyn Error>> {
        self.controller
            .refresh()
            .await
            .map_err(|e| MyError(format!("Failed to read display state: {}", e)))?;
        self.controller
            .snapshot()
            .ok_or_else(|| MyError("No display state available.".to_string()).into())
    }

    /// Evaluates the saved configs against `live` and writes back whatever changed.
    fn evaluate(&mut self, live: &DisplayState) -> Result<Evaluation, Box<dyn Error>> {
        let evaluation = evaluate(&mut self.stored, live);
        if let Some(index) = evaluation.upgraded {
            println!(
                "Displayswitch: Updated \"{}\" for the current display service.",
                self.stored.configs[index].name
            );
        }
        if evaluation.dirty {
            self.store.save(&self.stored)?;
        }
        Ok(evaluation)
    }

    async fn apply_index(&mut self, index: usize) -> Result<(), Box<dyn Error>> {
        let config = self.stored.configs[index].clone();
        println!("Displayswitch: Applying \"{}\"...", config.name);
        match self.controller.apply_config(&config, self.method).await {
            Ok(ApplyOutcome::Applied) => {}
            Ok(ApplyOutcome::NoState) => {
                return Err(MyError(format!(
                    "Failed to apply \"{}\": no display state available",
                    config.name
                ))
                .into());
            }
            Err(e) => {
                return Err(MyError(format!("Failed to apply \"{}\": {}", config.name, e)).into());
            }
        }
        self.stored.set_last_applied(index);
        self.store.save(&self.stored)?;
        println!("Displayswitch: Applied \"{}\".", config.name);
        Ok(())
    }

    fn name_of(&self, index: Option<usize>) -> &str {
        index
            .and_then(|i| self.stored.configs.get(i))
            .map(|c| c.name.as_str())
            .unwrap_or("(none)")
    }
}

fn print_status(session: &Session, live: &DisplayState, evaluation: &Evaluation) {
    let rows = live
        .displays
        .iter()
        .map(|d| {
            let name = if d.display_name.is_empty() {
                "(unnamed)"
            } else {
                d.display_name.as_str()
            };
            (
                d.connector.as_str(),
                format!(
                    "{} [{}]",
                    name,
                    d.current_mode_id.as_deref().unwrap_or("off")
                ),
            )
        })
        .collect();
    print_kv_table("Connected displays", rows);
    println!(
        "Displayswitch: Active configuration: {}",
        session.name_of(evaluation.active)
    );
    println!(
        "Displayswitch: {} of {} saved configurations match the connected displays.",
        evaluation.available.len(),
        session.stored.configs.len()
    );
}

fn print_list(stored: &StoredConfigs, evaluation: Option<&Evaluation>) {
    if stored.configs.is_empty() {
        println!("Displayswitch: No saved configurations.");
        return;
    }
    println!("Displayswitch: Saved configurations:");
    for (index, config) in stored.configs.iter().enumerate() {
        let marker = match evaluation {
            Some(e) if e.active == Some(index) => " [active]",
            Some(e) if e.available.contains(&index) => " [available]",
            _ => "",
        };
        println!("  {}. {}{}", index + 1, config.name, marker);
    }
}

async fn status(settings: &EffectiveSettings) -> Result<(), Box<dyn Error>> {
    let mut session = Session::open(settings, BusctlService::new(settings.busctl.clone()), false)?;
    let live = session.live_state().await?;
    let evaluation = session.evaluate(&live)?;
    print_status(&session, &live, &evaluation);
    Ok(())
}

async fn list(settings: &EffectiveSettings) -> Result<(), Box<dyn Error>> {
    let mut session = Session::open(settings, BusctlService::new(settings.busctl.clone()), false)?;
    if session.stored.configs.is_empty() {
        print_list(&session.stored, None);
        return Ok(());
    }
    match session.live_state().await {
        Ok(live) => {
            let evaluation = session.evaluate(&live)?;
            print_list(&session.stored, Some(&evaluation));
        }
        Err(e) => {
            eprintln!("Displayswitch: {} Listing without availability.", e);
            print_list(&session.stored, None);
        }
    }
    Ok(())
}

async fn save(settings: &EffectiveSettings, name: &str) -> Result<(), Box<dyn Error>> {
    let name = name.trim();
    if name.is_empty() {
        return Err(MyError("Configuration name must not be empty.".to_string()).into());
    }
    let mut session = Session::open(settings, BusctlService::new(settings.busctl.clone()), false)?;
    session.live_state().await?;

    let mut config = session
        .controller
        .current_config()
        .ok_or_else(|| MyError("No display state available.".to_string()))?;
    config.name = name.to_string();
    let previous = session
        .stored
        .configs
        .iter()
        .map(|c| c.name.clone())
        .collect::<Vec<_>>();
    let outcome = upsert_config(&mut session.stored, config);
    let index = match outcome {
        Upsert::Replaced(index) | Upsert::Added(index) => index,
    };
    session.stored.set_last_applied(index);
    session.store.save(&session.stored)?;

    match outcome {
        Upsert::Replaced(index) => println!(
            "Displayswitch: Saved \"{}\" (replaces \"{}\", same displays).",
            name, previous[index]
        ),
        Upsert::Added(_) => println!("Displayswitch: Saved \"{}\".", name),
    }
    println!(
        "Displayswitch: Stored in {}",
        session.store.path().display()
    );
    Ok(())
}

async fn apply_named(settings: &EffectiveSettings, name: &str) -> Result<(), Box<dyn Error>> {
    let mut session = Session::open(settings, BusctlService::new(settings.busctl.clone()), false)?;
    let index = session
        .stored
        .position(name)
        .ok_or_else(|| MyError(format!("No saved configuration named {}.", name)))?;
    let live = session.live_state().await?;
    let evaluation = session.evaluate(&live)?;
    if !evaluation.available.contains(&index) {
        return Err(MyError(format!(
            "Configuration {} needs displays that are not connected.",
            name
        ))
        .into());
    }
    session.apply_index(index).await
}

async fn apply_cycled(settings: &EffectiveSettings, forward: bool) -> Result<(), Box<dyn Error>> {
    let mut session = Session::open(settings, BusctlService::new(settings.busctl.clone()), false)?;
    let live = session.live_state().await?;
    let evaluation = session.evaluate(&live)?;
    let Some(index) = cycle(&evaluation.available, evaluation.active, forward) else {
        println!("Displayswitch: No saved configurations match the connected displays.");
        return Ok(());
    };
    session.apply_index(index).await
}

async fn pick(settings: &EffectiveSettings) -> Result<(), Box<dyn Error>> {
    let mut session = Session::open(settings, BusctlService::new(settings.busctl.clone()), false)?;
    let live = session.live_state().await?;
    let evaluation = session.evaluate(&live)?;

    let names = evaluation
        .available
        .iter()
        .map(|&i| session.stored.configs[i].name.as_str())
        .collect::<Vec<_>>();
    let active = evaluation
        .active
        .and_then(|a| evaluation.available.iter().position(|&i| i == a));
    let Some(choice) = picker::pick_config(&names, active)? else {
        println!("Displayswitch: Selection cancelled.");
        return Ok(());
    };
    session.apply_index(evaluation.available[choice]).await
}

/// Re-evaluates after a state or store change; restores the last config once.
async fn on_change(session: &mut Session, restore_pending: &mut bool) {
    // The refresh after an apply reports again.
    if session.controller.is_applying() {
        return;
    }
    let Some(live) = session.controller.snapshot() else {
        return;
    };
    let evaluation = match session.evaluate(&live) {
        Ok(evaluation) => evaluation,
        Err(e) => {
            eprintln!("Displayswitch: Failed to update saved configurations: {}", e);
            return;
        }
    };

    if *restore_pending && !evaluation.available.is_empty() {
        *restore_pending = false;
        if evaluation.active.is_none()
            && let Some(index) = restore_target(&session.stored, &evaluation.available)
        {
            info!(config = %session.stored.configs[index].name, "restoring last applied config");
            if let Err(e) = session.apply_index(index).await {
                eprintln!("Displayswitch: {}", e);
            }
            return;
        }
    }

    println!(
        "Displayswitch: Active configuration: {}",
        session.name_of(evaluation.active)
    );
}

async fn watch(settings: &EffectiveSettings) -> Result<(), Box<dyn Error>> {
    let mut service = BusctlService::new(settings.busctl.clone());
    service
        .watch_changes()
        .map_err(|e| MyError(format!("Failed to watch for display changes: {}", e)))?;
    let mut session = Session::open(settings, service, true)?;
    let mut events = session.controller.subscribe();
    let mut store_changes = session.store.subscribe();

    let (stop_tx, mut stop_rx) = tokio::sync::watch::channel(false);
    let shutting_down = Arc::new(AtomicBool::new(false));
    {
        let shutting_down = Arc::clone(&shutting_down);
        ctrlc::set_handler(move || {
            if shutting_down.swap(true, Ordering::SeqCst) {
                std::process::exit(130);
            }
            println!("\nDisplayswitch: Ctrl+C received, stopping...");
            let _ = stop_tx.send(true);
        })?;
    }

    if let Err(e) = session.controller.refresh().await {
        eprintln!("Displayswitch: Failed to read display state: {}", e);
    }
    if !session.controller.has_state() {
        println!("Displayswitch: Display state not available yet; waiting for changes.");
    }
    let mut restore_pending = settings.restore_on_start;
    let mut poll = tokio::time::interval(settings.store_poll);
    println!("Displayswitch: Watching for display changes. Press Ctrl+C to stop.");

    loop {
        tokio::select! {
            _ = stop_rx.changed() => break,
            event = events.recv() => match event {
                Ok(_) | Err(RecvError::Lagged(_)) => on_change(&mut session, &mut restore_pending).await,
                Err(RecvError::Closed) => break,
            },
            _ = poll.tick() => {
                session.store.poll_external_change();
            }
            changed = store_changes.recv() => {
                if let Err(RecvError::Closed) = changed {
                    break;
                }
                match session.store.load() {
                    Ok(stored) => {
                        info!(configs = stored.configs.len(), "saved configurations changed on disk");
                        session.stored = stored;
                        on_change(&mut session, &mut restore_pending).await;
                    }
                    Err(e) => warn!(error = %e, "failed to reload saved configurations"),
                }
            }
        }
    }

    session.controller.shutdown();
    debug!(phase = ?session.controller.phase(), "display state controller shut down");
    println!("Displayswitch: Stopped watching.");
    Ok(())
}

fn rename(settings: &EffectiveSettings, old: &str, new: &str) -> Result<(), Box<dyn Error>> {
    let mut store = ConfigStore::new(settings.store_path.clone());
    let mut stored = store.load()?;
    stored.rename(old, new)?;
    store.save(&stored)?;
    println!("Displayswitch: Renamed \"{}\" to \"{}\".", old, new.trim());
    Ok(())
}

fn remove(settings: &EffectiveSettings, name: &str) -> Result<(), Box<dyn Error>> {
    let mut store = ConfigStore::new(settings.store_path.clone());
    let mut stored = store.load()?;
    let removed = stored.remove(name)?;
    store.save(&stored)?;
    println!("Displayswitch: Removed \"{}\".", removed.name);
    Ok(())
}

async fn run_session(command: Commands, settings: EffectiveSettings) -> Result<(), Box<dyn Error>> {
    match command {
        Commands::Status => status(&settings).await,
        Commands::List => list(&settings).await,
        Commands::Save { name } => save(&settings, &name).await,
        Commands::Apply { name, .. } => apply_named(&settings, &name).await,
        Commands::Next { .. } => apply_cycled(&settings, true).await,
        Commands::Previous { .. } => apply_cycled(&settings, false).await,
        Commands::Pick { .. } => pick(&settings).await,
        Commands::Watch { .. } => watch(&settings).await,
        other => Err(MyError(format!("{:?} does not use the display service.", other)).into()),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.debug, &cli.debug_log)?;

    let command = cli.command.unwrap_or(Commands::Status);
    let mut overrides = SettingsOverrides {
        store_path: cli.store,
        busctl_command: cli.busctl,
        ..SettingsOverrides::default()
    };
    match &command {
        Commands::Apply { confirm, .. }
        | Commands::Next { confirm }
        | Commands::Previous { confirm }
        | Commands::Pick { confirm } => overrides.confirm_apply = *confirm,
        Commands::Watch { no_restore } => overrides.no_restore = *no_restore,
        _ => {}
    }

    match &command {
        Commands::ConfigInit { force } => return write_default_settings(&cli.config, *force),
        Commands::Config => return interactive_settings(&cli.config),
        Commands::ConfigShow {
            confirm,
            no_restore,
        } => {
            overrides.confirm_apply = *confirm;
            overrides.no_restore = *no_restore;
            return show_settings(&cli.config, &overrides);
        }
        _ => {}
    }

    let settings = effective_settings(&cli.config, &overrides)?;
    match &command {
        Commands::Rename { old, new } => return rename(&settings, old, new),
        Commands::Remove { name } => return remove(&settings, name),
        _ => {}
    }

    debug_assert!(command.needs_display_state());
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run_session(command, settings))
}
