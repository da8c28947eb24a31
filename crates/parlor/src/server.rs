//! `ParlorServer` builder and accept loop.
//!
//! This is the entry point for running a Parlor game server over
//! WebSockets. It ties the layers together: transport → protocol →
//! session → coordinator → gateway.

use std::sync::Arc;
use std::time::Duration;

use parlor_gateway::Gateway;
use parlor_protocol::{Codec, JsonCodec};
use parlor_session::{
    Authenticator, DEFAULT_GRACE, DisconnectWatch, PresenceTracker, RateLimitConfig, RateLimiter,
};
use parlor_store::SnapshotStore;
use parlor_transport::{Transport, WebSocketTransport};

use crate::bot::{BotConfig, BotRunner};
use crate::coordinator::Coordinator;
use crate::handler::handle_connection;
use crate::ParlorError;

/// The current protocol version. Clients must send this in their
/// `Hello` or be rejected.
pub const PROTOCOL_VERSION: u16 = 1;

/// How often the background tasks sweep the rate-limiter windows.
const LIMITER_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Shared server state passed to each connection handler task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks. Everything
/// inside carries its own interior mutability.
pub(crate) struct ServerState<S: SnapshotStore, A: Authenticator, C: Codec> {
    pub(crate) coordinator: Arc<Coordinator<S>>,
    pub(crate) bots: BotRunner<S>,
    pub(crate) gateway: Arc<Gateway>,
    pub(crate) auth: A,
    pub(crate) codec: C,
    pub(crate) presence: PresenceTracker,
    pub(crate) limiter: RateLimiter,
    pub(crate) watch: DisconnectWatch,
}

/// Builder for configuring and starting a Parlor server.
///
/// # Example
///
/// ```rust,ignore
/// use parlor::prelude::*;
///
/// let server = ParlorServerBuilder::new()
///     .bind("0.0.0.0:8080")
///     .build(coordinator, my_auth)
///     .await?;
/// server.run().await
/// ```
pub struct ParlorServerBuilder {
    bind_addr: String,
    grace: Duration,
    rate_limit: RateLimitConfig,
    bot_config: BotConfig,
}

impl ParlorServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            grace: DEFAULT_GRACE,
            rate_limit: RateLimitConfig::default(),
            bot_config: BotConfig::default(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the disconnect grace window: how long an abruptly dropped
    /// player keeps their seat before being marked departed.
    pub fn grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Sets the per-connection rate limit.
    pub fn rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = config;
        self
    }

    /// Sets the bot turn ceiling and move bound.
    pub fn bot_config(mut self, config: BotConfig) -> Self {
        self.bot_config = config;
        self
    }

    /// Builds the server around an existing coordinator.
    ///
    /// The coordinator is shared: the embedding process keeps its handle
    /// for creating and seeding games while the server routes client
    /// traffic into it. Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build<S: SnapshotStore>(
        self,
        coordinator: Arc<Coordinator<S>>,
        auth: impl Authenticator,
    ) -> Result<ParlorServer<S, impl Authenticator, JsonCodec>, ParlorError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;

        let state = Arc::new(ServerState {
            gateway: coordinator.gateway(),
            bots: BotRunner::new(Arc::clone(&coordinator), self.bot_config),
            coordinator,
            auth,
            codec: JsonCodec,
            presence: PresenceTracker::new(),
            limiter: RateLimiter::new(self.rate_limit),
            watch: DisconnectWatch::new(self.grace),
        });

        Ok(ParlorServer { transport, state })
    }
}

impl Default for ParlorServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running Parlor game server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct ParlorServer<S: SnapshotStore, A: Authenticator, C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<S, A, C>>,
}

impl<S, A, C> ParlorServer<S, A, C>
where
    S: SnapshotStore,
    A: Authenticator,
    C: Codec + Clone + 'static,
{
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ParlorError> {
        Ok(self.transport.local_addr()?)
    }

    /// Runs the server accept loop.
    ///
    /// Starts the background sweepers, then accepts incoming connections
    /// and spawns a handler task for each. Runs until the process is
    /// terminated.
    pub async fn run(mut self) -> Result<(), ParlorError> {
        tracing::info!("parlor server running");

        self.state.gateway.spawn_sweeper();
        spawn_limiter_sweeper(Arc::clone(&self.state));

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection::<S, A, C>(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

fn spawn_limiter_sweeper<S, A, C>(state: Arc<ServerState<S, A, C>>)
where
    S: SnapshotStore,
    A: Authenticator,
    C: Codec,
{
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(LIMITER_SWEEP_INTERVAL);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            state.limiter.sweep();
        }
    });
}
