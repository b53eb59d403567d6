mod api_doc;
mod application;
mod auth;
mod db;
mod feed;
mod notification;
mod realtime;
mod routes;
mod schema_ext;
#[cfg(test)]
mod test_support;
mod websocket;

use axum::{routing::get, Router};
use dotenv::dotenv;
use redis::Client;
use std::{net::SocketAddr, sync::Arc};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api_doc::ApiDoc;
use crate::application::service::ApplicationService;
use crate::application::store::PgApplicationStore;
use crate::feed::FeedConfig;
use crate::notification::model::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::notification::service::NotificationService;
use crate::notification::store::PgNotificationStore;
use crate::realtime::{BroadcastChannel, RealtimeChannel, RedisChannel, RetryPolicy};
use crate::websocket::notifications::NotificationState;

const DEFAULT_PORT: u16 = 9500;
const MAX_DB_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone)]
struct AppConfig {
    database_url: String,
    redis_url: Option<String>,
    port: u16,
    feed_page_size: i64,
    realtime_max_retries: u32,
}

impl AppConfig {
    fn from_env() -> Result<Self, String> {
        let database_url =
            std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set".to_string())?;
        if std::env::var("JWT_SECRET").is_err() {
            return Err("JWT_SECRET must be set".to_string());
        }

        Ok(Self {
            database_url,
            redis_url: std::env::var("REDIS_URL").ok().filter(|url| !url.is_empty()),
            port: parse_var("PORT", DEFAULT_PORT)?,
            feed_page_size: parse_var("FEED_PAGE_SIZE", DEFAULT_PAGE_SIZE)?.clamp(1, MAX_PAGE_SIZE),
            realtime_max_retries: parse_var(
                "REALTIME_MAX_RETRIES",
                RetryPolicy::default().max_attempts,
            )?,
        })
    }

    fn feed_config(&self) -> FeedConfig {
        FeedConfig {
            page_size: self.feed_page_size,
            retry: RetryPolicy {
                max_attempts: self.realtime_max_retries,
                ..RetryPolicy::default()
            },
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, String> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| format!("{} has an invalid value: {}", name, raw)),
        Err(_) => Ok(default),
    }
}

/// Redis pub/sub when configured, otherwise in-process fan-out
fn realtime_channel(redis_url: Option<&str>) -> Arc<dyn RealtimeChannel> {
    if let Some(url) = redis_url {
        info!("Initializing Redis realtime channel with URL: {}", url);
        match Client::open(url) {
            Ok(client) => return Arc::new(RedisChannel::new(client)),
            Err(e) => error!("Failed to open Redis client, falling back to in-process: {}", e),
        }
    } else {
        info!("No Redis URL configured, using in-process realtime channel");
    }
    Arc::new(BroadcastChannel::new())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    dotenv().ok();

    let config = AppConfig::from_env()?;

    let pool = db::connect(&config.database_url, MAX_DB_CONNECTIONS).await?;
    if !db::check_db_initialized(&pool).await {
        db::init_db(&pool).await?;
    }

    let channel = realtime_channel(config.redis_url.as_deref());
    let notification_service = NotificationService::new(
        Arc::new(PgNotificationStore::new(pool.clone())),
        channel,
    );
    let application_service = Arc::new(ApplicationService::new(
        Arc::new(PgApplicationStore::new(pool.clone())),
        notification_service.clone(),
    ));
    let notification_state = Arc::new(NotificationState {
        service: notification_service.clone(),
        feed_config: config.feed_config(),
    });

    let app = Router::new()
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(routes::health::routes(pool.clone()))
        .merge(routes::notifications::routes(
            Arc::new(notification_service),
            notification_state,
        ))
        .merge(routes::applications::routes(application_service))
        .route("/", get(|| async { "Job Board Realtime API" }))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let server = match axum::Server::try_bind(&addr) {
        Ok(server) => server,
        Err(e) => {
            warn!("Failed to bind {}: {}", addr, e);
            return Err(e.into());
        }
    };

    info!("Server listening on http://{}", addr);
    info!("API documentation: http://{}/docs", addr);
    info!(
        "Feed WebSocket: ws://{}/api/notifications/ws?token=<JWT>",
        addr
    );

    server.serve(app.into_make_service()).await?;
    Ok(())
}
