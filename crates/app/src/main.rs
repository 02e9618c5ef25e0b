use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use noor_bridge_core::{AppConfig, DhikrCatalog, MediaSessionState, ReminderSettings};
use noor_bridge_engine::persist::{PLAYBACK_STATE, REMINDER_SETTINGS};
use noor_bridge_engine::{reconcile, Coordinator, CoordinatorConfig, HostServices, MessageRouter};
use noor_bridge_host::{
    load_json, AudioHost, AudioUrlResolver, CommandNotificationHost, JsonFileStore, KeyValueStore,
    LogNotificationHost, LogWindowHost, NotificationHost, TemplateResolver, TokioAlarmHost,
    VirtualAudioHost, WindowHost,
};
use noor_bridge_transport::{
    AudioBridge, ClientHub, RemoteAudioHost, TransportServer, UiClient, UiNotifier, UiWindowHost,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "noor-bridge",
    about = "Extension UI -> Session Coordinator -> audio, autoplay and dhikr reminders"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Run,
    Doctor,
    Status,
    Send {
        json: String,
    },
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cmd = cli.command.unwrap_or(Commands::Run);
    let cfg_path = cli.config.unwrap_or_else(default_config_path);

    match cmd {
        Commands::Config {
            action: ConfigAction::Init,
        } => {
            init_config(&cfg_path)?;
            println!("Initialized config at {}", cfg_path.display());
            Ok(())
        }
        Commands::Doctor => {
            let cfg = load_or_default(&cfg_path)?;
            init_logging(&cfg.log_level);
            doctor(&cfg).await
        }
        Commands::Status => {
            let cfg = load_or_default(&cfg_path)?;
            init_logging(&cfg.log_level);
            status(&cfg).await
        }
        Commands::Send { json } => {
            let cfg = load_or_default(&cfg_path)?;
            init_logging(&cfg.log_level);
            send(&cfg, &json).await
        }
        Commands::Run => {
            let cfg = load_or_default(&cfg_path)?;
            init_logging(&cfg.log_level);
            run(cfg).await
        }
    }
}

async fn run(cfg: AppConfig) -> Result<()> {
    let storage_path = storage_path(&cfg);
    let storage: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::new(&storage_path));

    let bridge = AudioBridge::new(Duration::from_millis(cfg.intervals.load_timeout_ms));
    let hub = ClientHub::new(bridge.clone());

    let mut clock = None;
    let (audio, windows): (Arc<dyn AudioHost>, Arc<dyn WindowHost>) =
        match cfg.audio_backend.as_str() {
            "remote" => (
                Arc::new(RemoteAudioHost::new(bridge)) as Arc<dyn AudioHost>,
                Arc::new(UiWindowHost::new(hub.clone())) as Arc<dyn WindowHost>,
            ),
            "virtual" => {
                let host = VirtualAudioHost::new(300.0);
                clock = Some(host.spawn_clock(Duration::from_secs(1)));
                (
                    Arc::new(host) as Arc<dyn AudioHost>,
                    Arc::new(LogWindowHost) as Arc<dyn WindowHost>,
                )
            }
            other => bail!("unknown audio backend {other:?}; expected \"remote\" or \"virtual\""),
        };

    let notifications = build_notifier(&cfg);
    let (alarms, fired) = TokioAlarmHost::new();
    let resolver: Arc<dyn AudioUrlResolver> =
        Arc::new(TemplateResolver::new(cfg.audio_url_template.clone()));

    let coordinator = Coordinator::new(
        HostServices {
            storage,
            audio,
            notifications: notifications.clone(),
            permission: None,
            page: Arc::new(UiNotifier::new(hub.clone())),
            windows,
            alarms: Arc::new(alarms),
            resolver,
            catalog: DhikrCatalog::builtin(),
        },
        CoordinatorConfig::from_app_config(&cfg),
    );
    let alarm_listener = coordinator.spawn_alarm_listener(fired);

    let report = reconcile(&coordinator).await;
    info!(
        session_restored = report.session_restored,
        reminders_rearmed = report.reminders_rearmed,
        "startup reconciliation finished"
    );

    let router = Arc::new(MessageRouter::new(
        coordinator.clone(),
        coordinator.config().dedup_cooldown,
    ));
    let server = TransportServer::bind(&cfg.listen_addr, hub).await?;

    info!(
        addr = %server.local_addr()?,
        audio = %cfg.audio_backend,
        notifier = notifications.name(),
        storage = %storage_path.display(),
        "noor-bridge started"
    );

    tokio::select! {
        res = server.serve(router) => {
            if let Err(err) = res {
                warn!(error = %err, "transport stopped");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received ctrl-c; shutting down");
        }
    }

    coordinator.shutdown().await;
    alarm_listener.abort();
    if let Some(clock) = clock {
        clock.abort();
    }
    Ok(())
}

fn build_notifier(cfg: &AppConfig) -> Arc<dyn NotificationHost> {
    match cfg
        .notifications
        .command
        .as_deref()
        .and_then(CommandNotificationHost::from_command_line)
    {
        Some(host) => Arc::new(host),
        None => Arc::new(LogNotificationHost::new()),
    }
}

async fn doctor(cfg: &AppConfig) -> Result<()> {
    println!("== noor-bridge doctor ==");

    let path = storage_path(cfg);
    let storage_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    println!(
        "Storage file: {} ({})",
        path.display(),
        if path.exists() {
            "present"
        } else if storage_dir.exists() {
            "will be created"
        } else {
            "directory missing; will be created on first write"
        }
    );

    match tokio::net::TcpListener::bind(&cfg.listen_addr).await {
        Ok(_) => println!("Listen address {}: available", cfg.listen_addr),
        Err(err) => println!(
            "Listen address {}: unavailable ({err}); is noor-bridge already running?",
            cfg.listen_addr
        ),
    }

    println!("Audio backend: {}", cfg.audio_backend);
    if !matches!(cfg.audio_backend.as_str(), "remote" | "virtual") {
        println!("  unknown backend; expected \"remote\" or \"virtual\"");
    }

    match TemplateResolver::new(cfg.audio_url_template.clone())
        .resolve_audio_url("sample", "1")
        .await
    {
        Ok(url) => println!("Audio url template: ok ({url})"),
        Err(err) => println!("Audio url template: invalid ({err:#})"),
    }

    match cfg.notifications.command.as_deref() {
        None => println!("Notifier: log only (set notifications.command to use a desktop notifier)"),
        Some(line) => match CommandNotificationHost::from_command_line(line) {
            Some(host) if program_on_path(host.program()) => {
                println!("Notifier: {} (found)", host.program())
            }
            Some(host) => println!("Notifier: {} (not found on PATH)", host.program()),
            None => println!("Notifier: command is empty"),
        },
    }

    Ok(())
}

async fn status(cfg: &AppConfig) -> Result<()> {
    let store = JsonFileStore::new(storage_path(cfg));

    let playback: Option<MediaSessionState> = load_json(&store, PLAYBACK_STATE).await?;
    match playback.filter(MediaSessionState::has_track) {
        Some(state) => {
            println!(
                "track: {} / {}",
                state.source_id.as_deref().unwrap_or("?"),
                state.track_id.as_deref().unwrap_or("?")
            );
            println!(
                "position: {:.0}s of {:.0}s",
                state.position_seconds, state.duration_seconds
            );
            println!("playing: {}", state.is_playing);
        }
        None => println!("track: <none>"),
    }

    let reminders: Option<ReminderSettings> = load_json(&store, REMINDER_SETTINGS).await?;
    let reminders = reminders.unwrap_or_default();
    println!(
        "reminders: {} every {}s ({})",
        if reminders.enabled { "on" } else { "off" },
        reminders.interval_seconds,
        reminders.mode
    );

    let url = format!("ws://{}", cfg.listen_addr);
    let reachable = tokio::time::timeout(Duration::from_secs(1), UiClient::connect(&url))
        .await
        .map(|r| r.is_ok())
        .unwrap_or(false);
    println!(
        "daemon: {}",
        if reachable { "running" } else { "not reachable" }
    );

    Ok(())
}

async fn send(cfg: &AppConfig, json: &str) -> Result<()> {
    let command: serde_json::Value =
        serde_json::from_str(json).context("command is not valid JSON")?;
    let url = format!("ws://{}", cfg.listen_addr);
    let mut client = UiClient::connect(&url).await?;
    let response = client.request(command).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn program_on_path(program: &str) -> bool {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.exists();
    }
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(program).exists()))
        .unwrap_or(false)
}

fn default_config_path() -> PathBuf {
    let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("noor-bridge").join("config.toml")
}

fn default_storage_path() -> PathBuf {
    let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("noor-bridge").join("state.json")
}

fn storage_path(cfg: &AppConfig) -> PathBuf {
    cfg.storage_path
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(default_storage_path)
}

fn init_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }
    let cfg = AppConfig::default();
    let toml = toml::to_string_pretty(&cfg)?;
    std::fs::write(path, toml)
        .with_context(|| format!("failed to write config file {}", path.display()))?;
    Ok(())
}

fn load_or_default(path: &Path) -> Result<AppConfig> {
    let mut cfg = if !path.exists() {
        AppConfig::default()
    } else {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&data).with_context(|| format!("failed to parse {}", path.display()))?
    };
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

fn init_logging(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();
}

fn apply_env_overrides(cfg: &mut AppConfig) {
    if let Ok(v) = std::env::var("NOOR_BRIDGE_LISTEN_ADDR") {
        if !v.trim().is_empty() {
            cfg.listen_addr = v;
        }
    }
    if let Ok(v) = std::env::var("NOOR_BRIDGE_LOG_LEVEL") {
        if !v.trim().is_empty() {
            cfg.log_level = v;
        }
    }
    if let Ok(v) = std::env::var("NOOR_BRIDGE_AUDIO_BACKEND") {
        if !v.trim().is_empty() {
            cfg.audio_backend = v.trim().to_ascii_lowercase();
        }
    }
}
