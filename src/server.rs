//! # Server Configuration
//!
//! Application state, the Axum router and the long-running server with its background
//! scheduler.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    Router, middleware,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::crypto::CryptoKey;
use crate::dispatch::WebhookDispatcher;
use crate::feeds::FeedManager;
use crate::handlers::{
    self, connectors, feed_webhooks, feeds, notifications, products, schedules, webhooks,
};
use crate::ingest::{IngestService, IngestorRegistry};
use crate::notifications::NotificationProjector;
use crate::repositories::OrganizationRepository;
use crate::scheduler::FeedScheduler;
use crate::telemetry;

const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    /// The single organization this process serves
    pub organization_id: Uuid,
    pub crypto_key: Option<CryptoKey>,
    pub feeds: FeedManager,
    pub ingest: Arc<IngestService>,
    pub scheduler: Arc<FeedScheduler>,
    pub projector: Arc<NotificationProjector>,
}

impl AppState {
    /// Resolves the organization and wires every service onto one pool and HTTP client.
    pub async fn build(config: Arc<AppConfig>, db: DatabaseConnection) -> anyhow::Result<Self> {
        let organization = OrganizationRepository::new(db.clone())
            .ensure_default()
            .await
            .context("failed to resolve the default organization")?;
        let organization_id = organization.id;

        let crypto_key = config
            .crypto_key
            .clone()
            .map(CryptoKey::new)
            .transpose()
            .context("invalid crypto key")?;

        let client = reqwest::Client::builder()
            .user_agent(concat!("product-feeds/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        let registry = IngestorRegistry::with_defaults(client.clone(), &config.sync);
        let ingest = Arc::new(IngestService::new(
            db.clone(),
            registry,
            crypto_key.clone(),
            config.sync.clone(),
            organization_id,
        ));

        let projector = Arc::new(NotificationProjector::new(db.clone(), organization_id));
        let dispatcher = WebhookDispatcher::new(
            client,
            db.clone(),
            organization_id,
            config.dispatch.clone(),
            projector.clone(),
        );
        let feeds = FeedManager::new(db.clone(), organization_id, config.clone(), dispatcher);
        let scheduler = Arc::new(FeedScheduler::new(
            config.clone(),
            db.clone(),
            organization_id,
            feeds.clone(),
            projector.clone(),
        ));

        info!(organization_id = %organization_id, "Application state ready");
        Ok(Self {
            config,
            db,
            organization_id,
            crypto_key,
            feeds,
            ingest,
            scheduler,
            projector,
        })
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/api/v1/feeds",
            post(feeds::create_feed).get(feeds::list_feeds),
        )
        .route("/api/v1/feeds/run-scheduled", post(feeds::run_scheduled))
        .route("/api/v1/feeds/webhook-receiver", post(feeds::webhook_receiver))
        .route(
            "/api/v1/feeds/{id}",
            get(feeds::get_feed)
                .put(feeds::update_feed)
                .delete(feeds::delete_feed),
        )
        .route("/api/v1/feeds/{id}/regenerate", post(feeds::regenerate_feed))
        .route("/api/v1/feeds/{id}/download", get(feeds::download_feed))
        .route("/api/v1/feeds/{id}/preview", get(feeds::preview_feed))
        .route("/api/v1/feeds/{id}/history", get(feeds::feed_history))
        .route("/api/v1/feeds/{id}/analytics", get(feeds::feed_analytics))
        .route(
            "/api/v1/feeds/{id}/schedule",
            get(schedules::get_schedule).put(schedules::put_schedule),
        )
        .route(
            "/api/v1/feeds/{id}/webhook",
            get(feed_webhooks::get_webhook).put(feed_webhooks::put_webhook),
        )
        .route(
            "/api/v1/feeds/{id}/webhook/deliveries",
            get(feed_webhooks::list_deliveries),
        )
        .route(
            "/api/v1/connectors",
            post(connectors::create_connector).get(connectors::list_connectors),
        )
        .route("/api/v1/connectors/{id}", get(connectors::get_connector))
        .route("/api/v1/connectors/{id}/sync", post(connectors::sync_connector))
        .route("/api/v1/products", get(products::list_products))
        .route("/api/v1/products/{id}", get(products::get_product))
        .route("/api/v1/notifications", get(notifications::list_notifications))
        .route(
            "/api/v1/notifications/{id}/read",
            post(notifications::mark_notification_read),
        )
        .route(
            "/webhooks/shopify/{resource}/{action}",
            post(webhooks::shopify_webhook),
        )
        .route(
            "/webhooks/woocommerce/{connector_id}",
            post(webhooks::woocommerce_webhook),
        );

    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .merge(api)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn(telemetry::trace_context_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Starts the server and the feed scheduler; returns after a shutdown signal.
pub async fn run_server(config: AppConfig, db: DatabaseConnection) -> anyhow::Result<()> {
    let addr = config.bind_addr().context("invalid server address")?;
    let config = Arc::new(config);
    let state = AppState::build(config.clone(), db).await?;

    let shutdown = CancellationToken::new();
    let scheduler = state.scheduler.clone();
    let scheduler_shutdown = shutdown.clone();
    let scheduler_task = tokio::spawn(async move { scheduler.run(scheduler_shutdown).await });

    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, profile = %config.profile, "Server listening");

    let signal = shutdown.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!(error = ?err, "Failed to listen for shutdown signal");
            }
            info!("Shutdown signal received");
            signal.cancel();
        })
        .await;

    shutdown.cancel();
    if let Err(err) = scheduler_task.await {
        error!(error = ?err, "Scheduler task ended abnormally");
    }
    served.context("server error")
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::feeds::create_feed,
        crate::handlers::feeds::list_feeds,
        crate::handlers::feeds::get_feed,
        crate::handlers::feeds::update_feed,
        crate::handlers::feeds::delete_feed,
        crate::handlers::feeds::regenerate_feed,
        crate::handlers::feeds::download_feed,
        crate::handlers::feeds::preview_feed,
        crate::handlers::feeds::feed_history,
        crate::handlers::feeds::feed_analytics,
        crate::handlers::feeds::run_scheduled,
        crate::handlers::feeds::webhook_receiver,
        crate::handlers::schedules::get_schedule,
        crate::handlers::schedules::put_schedule,
        crate::handlers::feed_webhooks::get_webhook,
        crate::handlers::feed_webhooks::put_webhook,
        crate::handlers::feed_webhooks::list_deliveries,
        crate::handlers::connectors::create_connector,
        crate::handlers::connectors::list_connectors,
        crate::handlers::connectors::get_connector,
        crate::handlers::connectors::sync_connector,
        crate::handlers::products::list_products,
        crate::handlers::products::get_product,
        crate::handlers::notifications::list_notifications,
        crate::handlers::notifications::mark_notification_read,
        crate::handlers::webhooks::shopify_webhook,
        crate::handlers::webhooks::woocommerce_webhook,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::error::ApiError,
            crate::handlers::HealthResponse,
            crate::handlers::feeds::FeedResponse,
            crate::handlers::feeds::CreateFeedRequest,
            crate::handlers::feeds::UpdateFeedRequest,
            crate::handlers::feeds::RegenerateResponse,
            crate::handlers::feeds::GenerationRunResponse,
            crate::handlers::feeds::ReceiverResponse,
            crate::handlers::schedules::ScheduleResponse,
            crate::handlers::schedules::ScheduleRequest,
            crate::handlers::feed_webhooks::WebhookResponse,
            crate::handlers::feed_webhooks::WebhookRequest,
            crate::handlers::feed_webhooks::DeliveryResponse,
            crate::handlers::connectors::ConnectorResponse,
            crate::handlers::connectors::CreateConnectorRequest,
            crate::handlers::connectors::SyncAcceptedResponse,
            crate::handlers::products::ProductResponse,
            crate::handlers::notifications::NotificationResponse,
            crate::handlers::webhooks::WebhookAcceptResponse,
            crate::feeds::FeedAnalytics,
            crate::filter::FeedFilter,
            crate::events::FeedEvent,
            crate::render::ValidationIssue,
            crate::scheduler::TickReport,
            crate::models::feed::FeedChannel,
            crate::models::feed::FeedFormat,
            crate::models::connector::ConnectorKind,
            crate::models::product::Variant,
            crate::models::webhook::WebhookEvent,
        )
    ),
    tags(
        (name = "root", description = "Service information and health"),
        (name = "feeds", description = "Feed definitions, generation and downloads"),
        (name = "schedules", description = "Recurring regeneration"),
        (name = "webhooks", description = "Inbound source webhooks and outbound feed webhooks"),
        (name = "connectors", description = "Product sources"),
        (name = "products", description = "Normalized product store"),
        (name = "notifications", description = "In-app notifications")
    ),
    info(
        title = "Product Feeds API",
        description = "Product ingestion and marketing channel feed generation",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
