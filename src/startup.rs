//! Application Startup
//!
//! Wires the storage backend, services, presence registry and gateway into
//! one [`AppState`], and serves the router.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;

use crate::application::services::{ChatService, MessageService, RoomService};
use crate::config::{Settings, StorageBackend};
use crate::domain::{MessageRepository, RoomRepository};
use crate::infrastructure::blob::{BlobStore, LocalBlobStore};
use crate::infrastructure::database;
use crate::infrastructure::identity::{create_identity_provider, IdentityProvider};
use crate::infrastructure::presence::PresenceRegistry;
use crate::infrastructure::repositories::{
    InMemoryMessageRepository, InMemoryRoomRepository, PgMessageRepository, PgRoomRepository,
};
use crate::presentation::http::{create_router, handlers::health};
use crate::presentation::websocket::Gateway;
use crate::shared::snowflake::SnowflakeGenerator;

/// Application state shared across handlers and gateway connections
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub chat: Arc<ChatService>,
    pub presence: Arc<PresenceRegistry>,
    pub gateway: Arc<Gateway>,
    pub identity: Arc<dyn IdentityProvider>,
    pub blobs: Arc<dyn BlobStore>,
}

impl AppState {
    /// State backed by the in-memory repositories.
    pub fn in_memory(settings: Settings) -> Self {
        Self::assemble(
            settings,
            Arc::new(InMemoryRoomRepository::new()),
            Arc::new(InMemoryMessageRepository::new()),
        )
    }

    /// State for the configured storage backend. Postgres gets a pool and,
    /// unless disabled, pending migrations.
    pub async fn build(settings: Settings) -> Result<Self> {
        match settings.storage.backend {
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; rooms and messages are lost on restart");
                Ok(Self::in_memory(settings))
            }
            StorageBackend::Postgres => {
                let pool = database::create_pool(&settings.database)
                    .await
                    .context("failed to create database pool")?;
                tracing::info!("Database connection pool created");

                if settings.database.run_migrations {
                    database::run_migrations(&pool)
                        .await
                        .context("failed to run database migrations")?;
                    tracing::info!("Database migrations applied");
                }

                Ok(Self::assemble(
                    settings,
                    Arc::new(PgRoomRepository::new(pool.clone())),
                    Arc::new(PgMessageRepository::new(pool)),
                ))
            }
        }
    }

    fn assemble(
        settings: Settings,
        rooms: Arc<dyn RoomRepository>,
        messages: Arc<dyn MessageRepository>,
    ) -> Self {
        let ids = Arc::new(SnowflakeGenerator::new(
            settings.snowflake.machine_id,
            settings.snowflake.epoch,
        ));
        let gateway = Arc::new(Gateway::new(settings.websocket.heartbeat_interval_ms));

        let chat = ChatService::new(
            RoomService::new(rooms, settings.chat.room_list_limit),
            MessageService::new(
                messages,
                ids,
                settings.chat.history_default_limit,
                settings.chat.history_max_limit,
            ),
            gateway.clone(),
            settings.chat.announce_membership,
        );

        Self {
            identity: Arc::from(create_identity_provider(&settings.identity)),
            blobs: Arc::new(LocalBlobStore::from_settings(&settings.uploads)),
            chat: Arc::new(chat),
            presence: Arc::new(PresenceRegistry::new()),
            gateway,
            settings: Arc::new(settings),
        }
    }
}

/// Application instance
pub struct Application {
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application from settings
    pub async fn build(settings: Settings) -> Result<Self> {
        health::init_server_start();
        let addr = settings.server_addr();
        let state = AppState::build(settings).await?;

        if state.settings.chat.seed_default_rooms {
            let created = state.chat.rooms().ensure_default_rooms().await?;
            tracing::info!(created, "Default rooms ensured");
        }

        let router = create_router(state);

        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;
        tracing::info!("Listening on {}", addr);

        Ok(Self { listener, router })
    }

    /// Run the server until ctrl-c
    pub async fn run_until_stopped(self) -> Result<()> {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }

    /// Get the bound address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
