//! Game-night host: one seeded table, a house bot, and a WebSocket door.
//!
//! Seats are fixed at startup (the engine leaves lobbies to an external
//! service): the house bot opens, then the two demo humans. Connect with
//! token "1" or "2", subscribe to the room, and play; send a BotTurn
//! command whenever the bot holds the turn.
//!
//! Configuration via environment:
//!   PARLOR_ADDR        listen address      (default 0.0.0.0:8080)
//!   PARLOR_ROOM        room code           (default NIGHT1)
//!   PARLOR_GAME        game kind token     (default yatzy)
//!   PARLOR_GRACE_SECS  disconnect grace    (default builder's)

use std::sync::Arc;
use std::time::Duration;

use parlor::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

const BOT_USER: UserId = UserId(900);

struct TokenAuth;

impl Authenticator for TokenAuth {
    async fn authenticate(&self, token: &str) -> Result<UserId, SessionError> {
        let id: u64 = token
            .parse()
            .map_err(|_| SessionError::AuthFailed("token must be a number".into()))?;
        Ok(UserId(id))
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

struct DemoConfig {
    addr: String,
    room: RoomCode,
    kind: GameKind,
    grace: Option<Duration>,
}

impl DemoConfig {
    fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let addr = lookup("PARLOR_ADDR").unwrap_or_else(|| "0.0.0.0:8080".into());
        let room = RoomCode::new(lookup("PARLOR_ROOM").unwrap_or_else(|| "NIGHT1".into()));
        let kind = match lookup("PARLOR_GAME") {
            Some(token) => GameKind::parse(&token)?,
            None => GameKind::Yatzy,
        };
        let grace = lookup("PARLOR_GRACE_SECS")
            .map(|raw| raw.parse::<u64>().map(Duration::from_secs))
            .transpose()?;
        Ok(Self { addr, room, kind, grace })
    }
}

// ---------------------------------------------------------------------------
// Table seeding
// ---------------------------------------------------------------------------

/// Creates the night's table and seats everyone: the house bot first so
/// it opens, then the demo humans.
async fn seed_table<S: SnapshotStore>(
    coordinator: &Coordinator<S>,
    kind: GameKind,
    room: &RoomCode,
) -> Result<GameId, ParlorError> {
    let snap = coordinator.create_game(kind, room.clone()).await?;
    let game = snap.game_id;
    coordinator.join_game(game, room, BOT_USER, "housebot").await?;
    coordinator.join_game(game, room, UserId(1), "alice").await?;
    coordinator.join_game(game, room, UserId(2), "bert").await?;
    coordinator.start_game(game, room).await?;
    info!(%game, %kind, %room, "table seeded");
    Ok(game)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = DemoConfig::from_env()?;

    let coordinator = Arc::new(Coordinator::new(
        Arc::new(GameRegistry::standard()),
        Arc::new(MemoryStore::new()),
        Arc::new(Gateway::default()),
    ));

    let game = seed_table(&coordinator, config.kind, &config.room).await?;

    let mut builder = ParlorServerBuilder::new().bind(&config.addr);
    if let Some(grace) = config.grace {
        builder = builder.grace(grace);
    }
    let server = builder.build(Arc::clone(&coordinator), TokenAuth).await?;

    info!(
        room = %config.room,
        %game,
        bot = %BOT_USER,
        "game night open: tokens 1 and 2, bot turns via BotTurn"
    );
    server.run().await?;
    Ok(())
}

// =========================================================================
// Tests
// =========================================================================
