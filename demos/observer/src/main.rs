//! Headless observer: logs in, joins a room, and logs everything the
//! client reports. Reconnect prompts are answered with "yes".

use std::path::PathBuf;

use clap::Parser;
use nightwatch::prelude::*;
use nightwatch::tick::TickScheduler;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nightwatch-observer")]
#[command(about = "Watch a werewolf room from the terminal")]
struct Args {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(short, long, default_value_t = 5000)]
    port: u16,

    #[arg(short, long, help = "JSON client config file")]
    config: Option<PathBuf>,

    #[arg(short, long, help = "Username to log in with")]
    user: Option<String>,

    #[arg(long, requires = "user")]
    password: Option<String>,

    #[arg(short, long, help = "Room to join after logging in")]
    room: Option<u32>,
}

#[derive(Serialize)]
struct Login<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct JoinRoom {
    room_id: u32,
}

// ---------------------------------------------------------------------------
// Presenter
// ---------------------------------------------------------------------------

struct LogPresenter;

impl Presenter for LogPresenter {
    fn on_phase_changed(&mut self, state: NightState, view: &RoleView) {
        match view {
            RoleView::Action { kind, targets, submitted } => {
                tracing::info!(%state, ?kind, ?targets, submitted, "your turn");
            }
            RoleView::Waiting { active_role } => {
                tracing::info!(%state, ?active_role, "waiting");
            }
            RoleView::Inactive => tracing::info!(%state, "phase changed"),
        }
    }

    fn on_deadline_tick(&mut self, phase: Phase, remaining_secs: f64) {
        tracing::debug!(%phase, remaining = remaining_secs.ceil(), "countdown");
    }

    fn on_connection_state_changed(&mut self, state: ConnectionState) {
        tracing::info!(%state, "connection");
    }

    fn on_reconnect_prompt(&mut self, reason: &NightwatchError) -> ReconnectChoice {
        tracing::warn!(%reason, "connection lost, reconnecting");
        ReconnectChoice::Reconnect
    }

    fn on_connection_restored(&mut self) {
        tracing::info!("connection restored");
    }

    fn on_return_to_entry(&mut self, reason: &str) {
        tracing::error!(%reason, "session over");
    }

    fn on_notification(&mut self, message: &str) {
        tracing::warn!(%message, "notice");
    }

    fn on_role_revealed(&mut self, role: Option<Role>, wolf_team: &[String]) {
        tracing::info!(?role, ?wolf_team, "role dealt");
    }

    fn on_action_result(&mut self, outcome: &ActionOutcome) {
        tracing::info!(?outcome, "action result");
    }

    fn on_night_resolved(&mut self, _resolution: &NightResolution, eliminated: &[String]) {
        tracing::info!(?eliminated, "night over");
    }

    fn on_game_over(&mut self, result: &Payload) {
        tracing::info!(?result, "game over");
    }
}

// ---------------------------------------------------------------------------
// Main loop
// ---------------------------------------------------------------------------

fn succeeded(payload: &Payload) -> bool {
    payload.get("status").and_then(|v| v.as_str()) == Some("success")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    };

    let mut builder = ClientBuilder::new().config(config.clone());
    if let Some(user) = &args.user {
        builder = builder.local_user(user.clone());
    }
    let mut client = builder.build_tcp(LogPresenter);

    client.connect(Endpoint::new(args.host.clone(), args.port)).await?;
    if let (Some(user), Some(password)) = (&args.user, &args.password) {
        let login = Login { username: user, password };
        client.send_json(MessageType::LoginReq, &login).await?;
    }

    let mut scheduler = TickScheduler::new(config.tick());
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                client.disconnect();
                return Ok(());
            }
            _ = scheduler.wait_for_tick() => {
                if let Err(e) = client.tick().await {
                    tracing::error!(error = %e, "giving up");
                    return Err(e.into());
                }
                for (msg_type, payload) in client.drain_passthrough() {
                    match (msg_type, args.room) {
                        (MessageType::LoginRes, Some(room_id)) if succeeded(&payload) => {
                            client.send_json(MessageType::JoinRoomReq, &JoinRoom { room_id }).await?;
                        }
                        (MessageType::JoinRoomRes, Some(room_id)) if succeeded(&payload) => {
                            client.enter_room(RoomId(room_id));
                            client.request_resume().await?;
                        }
                        _ => tracing::info!(%msg_type, ?payload, "server message"),
                    }
                }
                scheduler.record_tick_end();
            }
        }
    }
}
