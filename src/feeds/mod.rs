//! # Feed Manager
//!
//! Owns feed definitions and coordinates regeneration, download and preview.
//!
//! A regeneration claims the feed by moving it to `generating`, inserts a `started` run and
//! continues on a background task. The task selects and renders the products, finishes the
//! run exactly once, releases the feed and hands the outcome to the webhook dispatcher.

pub mod analytics;

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use metrics::{counter, histogram};
use sea_orm::{DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QuerySelect};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::dispatch::WebhookDispatcher;
use crate::error::{PipelineError, map_db_err};
use crate::events::FeedEvent;
use crate::filter::{FeedFilter, FilterScope, scope_condition};
use crate::models::connector::ConnectorKind;
use crate::models::feed::{self, FeedChannel, FeedFormat};
use crate::models::{generation_run, product, webhook, webhook_delivery};
use crate::render::{self, RenderContext};
use crate::repositories::feed::{FeedChanges, NewFeed};
use crate::repositories::generation_run::RunStats;
use crate::repositories::webhook::WebhookSettings;
use crate::repositories::{
    ConnectorRepository, FeedRepository, GenerationRunRepository, WebhookDeliveryRepository,
    WebhookRepository,
};

pub use analytics::FeedAnalytics;

/// Storefront origin used when neither configuration nor the connector provides one.
pub const FALLBACK_STOREFRONT: &str = "https://store.example.com";
pub const DEFAULT_PREVIEW_LIMIT: u64 = 10;
pub const MAX_PREVIEW_LIMIT: u64 = 100;
pub const MAX_WEBHOOK_RETRIES: i32 = 10;
pub const MAX_WEBHOOK_TIMEOUT_SECONDS: i32 = 60;

/// Fields of a feed to create
#[derive(Debug, Clone)]
pub struct CreateFeed {
    pub name: String,
    pub channel: FeedChannel,
    /// Defaults to the channel's usual format
    pub format: Option<FeedFormat>,
    pub connector_id: Option<Uuid>,
    pub filter: FeedFilter,
}

/// Rendered feed bytes ready to serve
#[derive(Debug, Clone)]
pub struct FeedArtifact {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub filename: String,
}

/// A regeneration accepted for background execution
#[derive(Debug)]
pub struct RegenerationHandle {
    pub run_id: Uuid,
    pub join: JoinHandle<RunOutcome>,
}

/// Terminal state of one run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub feed_id: Uuid,
    pub succeeded: bool,
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct FeedManager {
    db: DatabaseConnection,
    organization_id: Uuid,
    config: Arc<AppConfig>,
    dispatcher: WebhookDispatcher,
}

impl FeedManager {
    pub fn new(
        db: DatabaseConnection,
        organization_id: Uuid,
        config: Arc<AppConfig>,
        dispatcher: WebhookDispatcher,
    ) -> Self {
        Self {
            db,
            organization_id,
            config,
            dispatcher,
        }
    }

    pub fn organization_id(&self) -> Uuid {
        self.organization_id
    }

    fn feeds(&self) -> FeedRepository {
        FeedRepository::new(self.db.clone())
    }

    fn runs(&self) -> GenerationRunRepository {
        GenerationRunRepository::new(self.db.clone())
    }

    pub async fn create(&self, request: CreateFeed) -> Result<feed::Model, PipelineError> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(PipelineError::BadPayload("name must not be empty".into()));
        }
        validate_filter(&request.filter)?;
        if let Some(connector_id) = request.connector_id {
            self.ensure_connector(connector_id).await?;
        }

        let format = request
            .format
            .unwrap_or_else(|| request.channel.default_format());
        let feed = self
            .feeds()
            .create(
                self.organization_id,
                NewFeed {
                    name,
                    channel: request.channel,
                    format,
                    connector_id: request.connector_id,
                    filter: request.filter,
                },
            )
            .await
            .map_err(|e| map_db_err("create feed", e))?;

        info!(feed_id = %feed.id, channel = %feed.channel, format = %feed.format, "Feed created");
        Ok(feed)
    }

    pub async fn get(&self, feed_id: Uuid) -> Result<feed::Model, PipelineError> {
        self.feeds()
            .find(self.organization_id, feed_id)
            .await?
            .ok_or_else(|| PipelineError::not_found("feed", feed_id))
    }

    pub async fn list(&self) -> Result<Vec<feed::Model>, PipelineError> {
        Ok(self.feeds().list(self.organization_id).await?)
    }

    pub async fn update(
        &self,
        feed_id: Uuid,
        mut changes: FeedChanges,
    ) -> Result<feed::Model, PipelineError> {
        let feed = self.get(feed_id).await?;
        if let Some(name) = changes.name.as_mut() {
            *name = name.trim().to_string();
            if name.is_empty() {
                return Err(PipelineError::BadPayload("name must not be empty".into()));
            }
        }
        if let Some(filter) = &changes.filter {
            validate_filter(filter)?;
        }
        if let Some(Some(connector_id)) = changes.connector_id {
            self.ensure_connector(connector_id).await?;
        }
        Ok(self.feeds().update(feed, changes).await?)
    }

    pub async fn delete(&self, feed_id: Uuid) -> Result<(), PipelineError> {
        if self.feeds().delete(self.organization_id, feed_id).await? {
            info!(feed_id = %feed_id, "Feed deleted");
            Ok(())
        } else {
            Err(PipelineError::not_found("feed", feed_id))
        }
    }

    /// Claims the feed and starts a run in the background.
    ///
    /// Fails with `ConcurrentRun` while another run of the same feed is in flight.
    #[instrument(skip_all, fields(feed_id = %feed_id))]
    pub async fn regenerate(&self, feed_id: Uuid) -> Result<RegenerationHandle, PipelineError> {
        let feed = self.get(feed_id).await?;
        if !self.feeds().try_lock(feed.id).await? {
            counter!("generation_runs_rejected_total").increment(1);
            return Err(PipelineError::ConcurrentRun { feed_id });
        }

        let run = match self
            .runs()
            .start(self.organization_id, feed.id, feed.parsed_format().as_str())
            .await
        {
            Ok(run) => run,
            Err(err) => {
                if let Err(release_err) = self.feeds().mark_error(feed.id).await {
                    error!(error = ?release_err, "Failed to release feed after run insert failure");
                }
                return Err(map_db_err("start generation run", err));
            }
        };

        info!(run_id = %run.id, "Generation run started");
        let run_id = run.id;
        let manager = self.clone();
        let join = tokio::spawn(async move { manager.execute_run(feed, run).await });
        Ok(RegenerationHandle { run_id, join })
    }

    /// Regenerates and waits for the terminal state.
    pub async fn regenerate_and_wait(&self, feed_id: Uuid) -> Result<RunOutcome, PipelineError> {
        let handle = self.regenerate(feed_id).await?;
        let run_id = handle.run_id;
        handle.join.await.map_err(|err| {
            error!(error = ?err, run_id = %run_id, "Generation task panicked or was cancelled");
            PipelineError::Render(format!("generation task for run {run_id} did not finish"))
        })
    }

    #[instrument(skip_all, fields(feed_id = %feed.id, run_id = %run.id))]
    async fn execute_run(&self, feed: feed::Model, run: generation_run::Model) -> RunOutcome {
        let started = Instant::now();
        let result = self.generate(&feed, run.id).await;
        let elapsed_ms = started.elapsed().as_millis() as i64;
        histogram!("generation_run_duration_ms").record(elapsed_ms as f64);

        let (event, outcome) = match result {
            Ok(mut stats) => {
                stats.generation_time_ms = elapsed_ms;
                let included = stats.products_included;
                let event = FeedEvent::Generated {
                    feed_id: feed.id,
                    feed_name: feed.name.clone(),
                    channel: feed.channel.clone(),
                    format: feed.format.clone(),
                    run_id: Some(run.id),
                    products_included: i64::from(stats.products_included),
                    products_excluded: i64::from(stats.products_excluded),
                    generation_time_ms: elapsed_ms,
                    file_size_bytes: stats.file_size_bytes,
                    timestamp: Utc::now(),
                };
                match self.runs().complete(run.id, stats).await {
                    Ok(true) => {}
                    Ok(false) => warn!("Run was already terminal; completion not recorded"),
                    Err(err) => error!(error = ?err, "Failed to record completed run"),
                }
                if let Err(err) = self.feeds().mark_generated(feed.id, included).await {
                    error!(error = ?err, "Failed to release feed after completion");
                }
                counter!("generation_runs_total", "outcome" => "completed").increment(1);
                info!(products_included = included, elapsed_ms, "Generation run completed");
                (
                    event,
                    RunOutcome {
                        run_id: run.id,
                        feed_id: feed.id,
                        succeeded: true,
                        error: None,
                    },
                )
            }
            Err(err) => {
                let message = err.to_string();
                match self.runs().fail(run.id, &message, elapsed_ms).await {
                    Ok(true) => {}
                    Ok(false) => warn!("Run was already terminal; failure not recorded"),
                    Err(db_err) => error!(error = ?db_err, "Failed to record failed run"),
                }
                if let Err(db_err) = self.feeds().mark_error(feed.id).await {
                    error!(error = ?db_err, "Failed to release feed after failure");
                }
                counter!("generation_runs_total", "outcome" => "failed").increment(1);
                error!(error = %message, "Generation run failed");
                (
                    FeedEvent::Failed {
                        feed_id: feed.id,
                        feed_name: feed.name.clone(),
                        channel: feed.channel.clone(),
                        run_id: Some(run.id),
                        error: message.clone(),
                        timestamp: Utc::now(),
                    },
                    RunOutcome {
                        run_id: run.id,
                        feed_id: feed.id,
                        succeeded: false,
                        error: Some(message),
                    },
                )
            }
        };

        self.dispatcher.dispatch(&event).await;
        outcome
    }

    /// Selects, renders and validates the feed's products.
    async fn generate(&self, feed: &feed::Model, run_id: Uuid) -> Result<RunStats, PipelineError> {
        let scope = self.scope(feed);
        let processed = product::Entity::find()
            .filter(scope_condition(scope))
            .count(&self.db)
            .await
            .map_err(|e| map_db_err("count feed scope", e))?;
        let products = feed
            .filter()
            .select(scope)
            .all(&self.db)
            .await
            .map_err(|e| map_db_err("select feed products", e))?;

        let ctx = self.render_context(feed).await?;
        let items = render::feed_items(&ctx, &products);
        let bytes = render::render(feed.parsed_format(), &ctx, &items)?;
        let issues = render::validate(feed.parsed_channel(), &items, &products);
        if !issues.is_empty() {
            warn!(run_id = %run_id, issues = issues.len(), "Feed has validation issues");
        }

        let included = products.len() as i32;
        let processed = i32::try_from(processed).unwrap_or(i32::MAX);
        Ok(RunStats {
            products_processed: processed,
            products_included: included,
            products_excluded: (processed - included).max(0),
            generation_time_ms: 0,
            file_size_bytes: bytes.len() as i64,
            file_url: Some(self.download_url(feed.id)),
            validation_issues: Some(
                serde_json::to_value(&issues).map_err(|e| PipelineError::Render(e.to_string()))?,
            ),
        })
    }

    /// Renders the whole feed on demand, optionally in another format.
    pub async fn download(
        &self,
        feed_id: Uuid,
        format: Option<FeedFormat>,
        limit: Option<u64>,
    ) -> Result<FeedArtifact, PipelineError> {
        if limit == Some(0) {
            return Err(PipelineError::BadPayload("limit must be at least 1".into()));
        }
        let feed = self.get(feed_id).await?;
        let format = format.unwrap_or_else(|| feed.parsed_format());
        self.render_feed(&feed, format, limit).await
    }

    /// Renders the first few products of the feed in its own format.
    pub async fn preview(
        &self,
        feed_id: Uuid,
        limit: Option<u64>,
    ) -> Result<FeedArtifact, PipelineError> {
        let feed = self.get(feed_id).await?;
        let limit = limit
            .unwrap_or(DEFAULT_PREVIEW_LIMIT)
            .clamp(1, MAX_PREVIEW_LIMIT);
        self.render_feed(&feed, feed.parsed_format(), Some(limit))
            .await
    }

    async fn render_feed(
        &self,
        feed: &feed::Model,
        format: FeedFormat,
        limit: Option<u64>,
    ) -> Result<FeedArtifact, PipelineError> {
        let mut select = feed.filter().select(self.scope(feed));
        if let Some(limit) = limit {
            select = select.limit(limit);
        }
        let products = select
            .all(&self.db)
            .await
            .map_err(|e| map_db_err("select feed products", e))?;

        let ctx = self.render_context(feed).await?;
        let items = render::feed_items(&ctx, &products);
        let bytes = render::render(format, &ctx, &items)?;
        Ok(FeedArtifact {
            bytes,
            content_type: format.content_type(),
            filename: format!("{}.{}", file_stem(&feed.name), format.extension()),
        })
    }

    /// A page of the feed's runs, newest first.
    pub async fn history(
        &self,
        feed_id: Uuid,
        status: Option<&str>,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<generation_run::Model>, u64), PipelineError> {
        let feed = self.get(feed_id).await?;
        Ok(self.runs().list_by_feed(feed.id, status, page, limit).await?)
    }

    pub async fn analytics(&self, feed_id: Uuid) -> Result<FeedAnalytics, PipelineError> {
        let feed = self.get(feed_id).await?;
        let runs = self.runs().all_for_feed(feed.id).await?;
        Ok(analytics::summarize(feed.id, &runs))
    }

    pub async fn find_run(&self, run_id: Uuid) -> Result<generation_run::Model, PipelineError> {
        self.runs()
            .find(run_id)
            .await?
            .filter(|run| run.organization_id == self.organization_id)
            .ok_or_else(|| PipelineError::not_found("generation run", run_id))
    }

    pub async fn webhook(&self, feed_id: Uuid) -> Result<webhook::Model, PipelineError> {
        let feed = self.get(feed_id).await?;
        WebhookRepository::new(self.db.clone())
            .find_for_feed(feed.id)
            .await?
            .ok_or_else(|| PipelineError::not_found("webhook", feed_id))
    }

    /// Creates or replaces the feed's outbound webhook. Delivery counters survive updates.
    pub async fn configure_webhook(
        &self,
        feed_id: Uuid,
        settings: WebhookSettings,
    ) -> Result<webhook::Model, PipelineError> {
        let feed = self.get(feed_id).await?;
        validate_webhook(&settings)?;
        let webhook = WebhookRepository::new(self.db.clone())
            .upsert_for_feed(self.organization_id, feed.id, settings)
            .await
            .map_err(|e| map_db_err("save webhook", e))?;
        info!(
            feed_id = %feed.id,
            webhook_id = %webhook.id,
            enabled = webhook.enabled,
            "Webhook saved"
        );
        Ok(webhook)
    }

    /// A page of the feed's delivery log, latest first.
    pub async fn deliveries(
        &self,
        feed_id: Uuid,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<webhook_delivery::Model>, u64), PipelineError> {
        let feed = self.get(feed_id).await?;
        Ok(WebhookDeliveryRepository::new(self.db.clone())
            .list_by_feed(feed.id, page, limit)
            .await?)
    }

    fn scope(&self, feed: &feed::Model) -> FilterScope {
        FilterScope {
            organization_id: self.organization_id,
            connector_id: feed.connector_id,
        }
    }

    /// Storefront origin: configuration first, then the feed's shop connector.
    async fn render_context(&self, feed: &feed::Model) -> Result<RenderContext, PipelineError> {
        let mut storefront = self.config.storefront_base_url.clone();
        if storefront.is_none()
            && let Some(connector_id) = feed.connector_id
            && let Some(connector) = ConnectorRepository::new(self.db.clone())
                .find(self.organization_id, connector_id)
                .await?
            && connector.kind.parse::<ConnectorKind>().ok() != Some(ConnectorKind::Csv)
        {
            storefront = Some(crate::ingest::SourceContext::base_url_for(&connector.shop_domain));
        }

        Ok(RenderContext::new(
            storefront.unwrap_or_else(|| FALLBACK_STOREFRONT.to_string()),
            self.config.placeholder_image_url.clone(),
            feed.name.clone(),
        ))
    }

    fn download_url(&self, feed_id: Uuid) -> String {
        let base = self
            .config
            .public_base_url
            .as_deref()
            .unwrap_or("")
            .trim_end_matches('/');
        format!("{base}/api/v1/feeds/{feed_id}/download")
    }

    async fn ensure_connector(&self, connector_id: Uuid) -> Result<(), PipelineError> {
        ConnectorRepository::new(self.db.clone())
            .find(self.organization_id, connector_id)
            .await?
            .map(|_| ())
            .ok_or_else(|| PipelineError::not_found("connector", connector_id))
    }
}

fn validate_filter(filter: &FeedFilter) -> Result<(), PipelineError> {
    if let (Some(min), Some(max)) = (filter.min_price, filter.max_price)
        && !min.is_zero()
        && !max.is_zero()
        && min > max
    {
        return Err(PipelineError::BadPayload(
            "min_price must not exceed max_price".into(),
        ));
    }
    if filter.min_price.is_some_and(|p| p.is_sign_negative())
        || filter.max_price.is_some_and(|p| p.is_sign_negative())
    {
        return Err(PipelineError::BadPayload("prices must not be negative".into()));
    }
    Ok(())
}

fn validate_webhook(settings: &WebhookSettings) -> Result<(), PipelineError> {
    let url = url::Url::parse(&settings.url)
        .map_err(|e| PipelineError::BadPayload(format!("invalid webhook url: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(PipelineError::BadPayload(
            "webhook url must use http or https".into(),
        ));
    }
    if settings.events.is_empty() {
        return Err(PipelineError::BadPayload(
            "webhook must subscribe to at least one event".into(),
        ));
    }
    if settings
        .retry_count
        .is_some_and(|n| !(0..=MAX_WEBHOOK_RETRIES).contains(&n))
    {
        return Err(PipelineError::BadPayload(format!(
            "retry_count must be between 0 and {MAX_WEBHOOK_RETRIES}"
        )));
    }
    if settings
        .timeout_seconds
        .is_some_and(|n| !(1..=MAX_WEBHOOK_TIMEOUT_SECONDS).contains(&n))
    {
        return Err(PipelineError::BadPayload(format!(
            "timeout_seconds must be between 1 and {MAX_WEBHOOK_TIMEOUT_SECONDS}"
        )));
    }
    Ok(())
}

/// Feed name reduced to characters safe inside a Content-Disposition filename.
pub fn file_stem(name: &str) -> String {
    let stem: String = name
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() { "feed".to_string() } else { stem }
}
