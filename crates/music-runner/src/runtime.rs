use std::process::Command as ChildCommand;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use music_player::source::SourceKind;
use music_player::{
    CpalLineProvider, MusicConfig, MusicSource, PlayerRegistry, ResourceBundle, SessionOutcome,
    SessionRun, TracingSink, companion, device, run_session,
};

use crate::cli::SourceArgs;

/// Effective configuration after applying command line overrides.
#[derive(Debug)]
pub struct Resolved {
    pub config: MusicConfig,
    pub resources: ResourceBundle,
    pub sources: Vec<MusicSource>,
}

/// Load the config file (if any), apply flags and build the source list.
///
/// Returns `None` when the config asks to skip music.
pub fn resolve(args: &SourceArgs) -> Result<Option<Resolved>> {
    let mut config = match &args.config {
        Some(path) => MusicConfig::load(path)?,
        None => MusicConfig::default(),
    };
    if config.skip {
        return Ok(None);
    }

    if let Some(db) = args.volume_db {
        config.default_volume_db = db;
    }
    if args.shuffle {
        config.shuffle = true;
    }
    if args.no_repeat {
        config.repeat = false;
    }
    if args.device.is_some() {
        config.device = args.device.clone();
    }

    let resources = config.resource_bundle()?;
    let sources = if args.has_sources() {
        let mut sources: Vec<MusicSource> =
            args.files.iter().map(|p| MusicSource::file(p.clone())).collect();
        for uri in &args.uris {
            sources.push(MusicSource::network(uri).with_context(|| format!("--uri {uri}"))?);
        }
        for service in &args.services {
            sources.push(
                MusicSource::service(service).with_context(|| format!("--service {service}"))?,
            );
        }
        sources
    } else {
        config.sources_with_bundle(&resources)?
    };

    Ok(Some(Resolved {
        config,
        resources,
        sources,
    }))
}

fn build_registry(config: &MusicConfig, resources: ResourceBundle) -> Arc<PlayerRegistry> {
    let lines = CpalLineProvider::new(config.device.clone(), config.playback.clone());
    Arc::new(PlayerRegistry::with_defaults(
        Arc::new(lines),
        Arc::new(resources),
        &config.playback,
        Arc::new(TracingSink),
    ))
}

fn install_stop_handler(registry: &Arc<PlayerRegistry>) {
    let registry = registry.clone();
    let _ = ctrlc::set_handler(move || {
        registry.stop_active_player();
        std::process::exit(130);
    });
}

fn warn_if_companion_missing(sources: &[MusicSource]) {
    if sources.iter().any(|s| s.kind() == SourceKind::Service) && !companion::is_running() {
        tracing::warn!("Spotify sources are configured but the Spotify app is not running");
    }
}

/// Play in the foreground until the list ends or Ctrl-C.
pub fn run_play(args: &SourceArgs) -> Result<()> {
    let Some(resolved) = resolve(args)? else {
        tracing::info!("music skipped");
        return Ok(());
    };
    warn_if_companion_missing(&resolved.sources);

    let registry = build_registry(&resolved.config, resolved.resources);
    install_stop_handler(&registry);

    // The subcommand decides the mode; the config's `background` does not apply.
    let options = music_player::SessionOptions {
        background: false,
        ..resolved.config.session_options()
    };
    match run_session(registry, resolved.sources, options)? {
        SessionRun::Completed(SessionOutcome::Failed(msg)) => Err(anyhow!(msg)),
        SessionRun::Completed(outcome) => {
            tracing::debug!(?outcome, "session ended");
            Ok(())
        }
        SessionRun::Skipped | SessionRun::Background(_) => Ok(()),
    }
}

/// Play in the background while `command` runs. Returns the command's exit code.
pub fn run_command(args: &SourceArgs, command: &[String]) -> Result<i32> {
    let (program, rest) = command
        .split_first()
        .ok_or_else(|| anyhow!("no command given"))?;

    let session = match resolve(args)? {
        Some(resolved) => {
            warn_if_companion_missing(&resolved.sources);
            let registry = build_registry(&resolved.config, resolved.resources);
            install_stop_handler(&registry);
            let options = music_player::SessionOptions {
                background: true,
                ..resolved.config.session_options()
            };
            match run_session(registry, resolved.sources, options) {
                Ok(SessionRun::Background(handle)) => Some(handle),
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!("music not started: {e:#}");
                    None
                }
            }
        }
        None => {
            tracing::info!("music skipped");
            None
        }
    };

    let status = ChildCommand::new(program)
        .args(rest)
        .status()
        .with_context(|| format!("run {program}"));

    if let Some(handle) = session {
        let outcome = handle.stop();
        tracing::debug!(?outcome, "music stopped");
    }

    let status = status?;
    tracing::info!(%status, "command finished");
    Ok(status.code().unwrap_or(1))
}

pub fn print_devices() -> Result<()> {
    let host = cpal::default_host();
    for d in device::list_devices(&host)? {
        let marker = if d.is_default { "*" } else { " " };
        println!(
            "{marker} {}  rates {}-{} Hz, up to {} channels",
            d.name, d.min_rate, d.max_rate, d.max_channels
        );
    }
    Ok(())
}

pub fn print_companion() {
    println!("installed: {}", companion::is_installed());
    println!("running: {}", companion::is_running());
}
