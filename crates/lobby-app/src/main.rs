// Lobby client entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file, stdout belongs to the console)
// 2. Load config
// 3. Create the notification channel and spawn the websocket transport
// 4. Resolve the local avatar
// 5. Spawn the session controller
// 6. Attach the presence tracker
// 7. Run the console loop until the user quits
// 8. Dispose the controller and stop the transport

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use lobby_app::avatar_http::HttpAvatarResolver;
use lobby_app::commands::{self, AppCommand, HELP};
use lobby_app::config;
use lobby_app::render::ConsoleRenderer;
use lobby_app::transport;
use lobby_core::avatar::{AvatarResolver, FixedAvatarResolver};
use lobby_core::channel::NotificationChannel;
use lobby_core::controller::{SessionController, SessionOutputs};
use lobby_core::presence::PresenceTracker;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    let log_path = init_tracing()?;
    info!("Lobby client starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: player={}, server={}",
        config.player.username, config.server.notification_url
    );

    // 3. Notification channel and transport
    let (channel, outbound_rx) = NotificationChannel::new();
    let ws_url = config.server.notification_url.clone();
    let ws_channel = channel.clone();
    let ws_handle = tokio::spawn(async move {
        if let Err(e) = transport::run(&ws_url, ws_channel, outbound_rx).await {
            error!("Notification transport error: {:#}", e);
        }
    });

    // 4. Local avatar, placeholder on failure
    let resolver: Arc<dyn AvatarResolver> = match &config.server.user_info_url {
        Some(template) => Arc::new(
            HttpAvatarResolver::new(template).context("invalid server.user_info_url")?,
        ),
        None => {
            info!("No user-info endpoint configured, using placeholder avatars");
            Arc::new(FixedAvatarResolver::new(
                config.lobby.placeholder_avatar.clone(),
            ))
        }
    };
    let local_avatar = match resolver.resolve(&config.player.username).await {
        Ok(url) => url,
        Err(e) => {
            warn!("Local avatar lookup failed, using placeholder: {}", e);
            config.lobby.placeholder_avatar.clone()
        }
    };

    // 5. Session controller
    let (controller, handle, outputs) = SessionController::new(
        config.local_player(local_avatar),
        channel.clone(),
        Arc::clone(&resolver),
        config.controller_config(),
    );
    let controller_handle = tokio::spawn(controller.run());
    let SessionOutputs {
        mut ui_rx,
        mut nav_rx,
    } = outputs;

    // 6. Presence tracker shares the channel through its own listener
    let mut presence = PresenceTracker::attach(channel.clone());
    if let Err(e) = presence.request_update() {
        warn!("Could not request online users: {}", e);
    }
    let mut presence_open = true;

    // 7. Console loop
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel();
    tokio::spawn(commands::read_stdin(cmd_tx));

    let mut renderer = ConsoleRenderer::new(std::io::stdout());
    renderer.notice(&format!(
        "Lobby client for {} (log: {})",
        config.player.username,
        log_path.display()
    ))?;
    renderer.notice(HELP)?;

    loop {
        tokio::select! {
            Some(update) = ui_rx.recv() => renderer.apply(update)?,

            Some(nav) = nav_rx.recv() => {
                info!("Router handoff: {}", nav);
                renderer.navigate(&nav)?;
            }

            users = next_online(&mut presence), if presence_open => match users {
                Some(users) => renderer.online(&users)?,
                None => {
                    presence_open = false;
                    renderer.notice("Disconnected from notification server.")?;
                }
            },

            cmd = cmd_rx.recv() => match cmd {
                Some(AppCommand::Session(cmd)) => {
                    if handle.send(cmd).is_err() {
                        warn!("Session controller is gone");
                        break;
                    }
                }
                Some(AppCommand::Online) => {
                    if let Err(e) = presence.request_update() {
                        renderer.notice(&format!("! {e}"))?;
                    }
                }
                Some(AppCommand::Help) => renderer.notice(HELP)?,
                Some(AppCommand::Quit) | None => break,
            },
        }
    }

    // 8. Cleanup
    if let Err(e) = handle.dispose() {
        warn!("Dispose failed: {}", e);
    }
    let _ = tokio::time::timeout(Duration::from_secs(5), controller_handle).await;
    presence.detach();
    channel.close();
    ws_handle.abort();

    info!("Lobby client shut down cleanly");
    Ok(())
}

async fn next_online(presence: &mut PresenceTracker) -> Option<Vec<String>> {
    presence.next_update().await.map(<[String]>::to_vec)
}

/// Initialize tracing to a log file under the user's data directory (or
/// `./logs` when none is available). Returns the log file path.
fn init_tracing() -> anyhow::Result<PathBuf> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = match directories::ProjectDirs::from("", "", "lobby") {
        Some(dirs) => dirs.data_local_dir().join("logs"),
        None => std::env::current_dir()?.join("logs"),
    };
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;

    let log_path = log_dir.join("lobby.log");
    let log_file = std::fs::File::create(&log_path)?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("lobby_core=info,lobby_app=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(log_path)
}
