//! Feed generation, downloads and outbound webhook delivery.

use std::time::Duration;

use axum::{
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use product_feeds::{
    error::PipelineError,
    ingest::CanonicalProduct,
    models::{
        connector::{self, ConnectorKind},
        generation_run::{self, RUN_STATUS_COMPLETED, RUN_STATUS_STARTED},
        notification,
        product::{ProductStatus, Variant},
        webhook::WebhookEvent,
        webhook_delivery,
    },
    repositories::{ProductRepository, webhook::WebhookSettings},
    server::AppState,
};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header_exists, method, path},
};

#[path = "test_utils/mod.rs"]
mod test_utils;

use test_utils::{
    SHOP_DOMAIN, SHOPIFY_SECRET, build_state, post_shopify_webhook, register_connector, router,
    send, test_config,
};

const PLACEHOLDER: &str = "https://img.example/placeholder.png";
const STOREFRONT: &str = "https://shop.example";

async fn pipeline_state() -> AppState {
    let mut config = test_config();
    config.placeholder_image_url = PLACEHOLDER.to_string();
    config.storefront_base_url = Some(STOREFRONT.to_string());
    build_state(config).await.unwrap()
}

fn canonical(external_id: &str, title: &str, price: Decimal, images: &[&str]) -> CanonicalProduct {
    CanonicalProduct {
        external_id: external_id.to_string(),
        title: title.to_string(),
        description: Some(format!("{title} description")),
        price,
        currency: "USD".to_string(),
        sku: Some(format!("SKU-{external_id}")),
        brand: Some("Acme".to_string()),
        category: Some("Apparel".to_string()),
        images: images.iter().map(|image| image.to_string()).collect(),
        variants: vec![Variant {
            variant_id: format!("{external_id}-1"),
            price: Some(price),
            inventory_quantity: Some(3),
            inventory_management: Some("shopify".to_string()),
            inventory_policy: Some("deny".to_string()),
            ..Variant::default()
        }],
        metadata: json!({"tags": ["summer"]}),
        upstream_status: ProductStatus::Active,
    }
}

async fn seed_connector(state: &AppState) -> connector::Model {
    register_connector(state, ConnectorKind::Shopify, SHOP_DOMAIN)
        .await
        .unwrap()
}

async fn seed(state: &AppState, connector: &connector::Model, product: CanonicalProduct) {
    ProductRepository::new(state.db.clone())
        .upsert(state.organization_id, connector.id, &product)
        .await
        .unwrap();
}

async fn create_feed(app: &axum::Router, body: Value) -> Uuid {
    let (status, feed) = send(app, Method::POST, "/api/v1/feeds", Some(body))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::CREATED, "{feed}");
    feed["id"].as_str().unwrap().parse().unwrap()
}

async fn download(app: &axum::Router, uri: &str) -> (StatusCode, header::HeaderMap, String) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, String::from_utf8(bytes.to_vec()).unwrap())
}

fn sink_settings(url: String, retry_count: i32) -> WebhookSettings {
    WebhookSettings {
        url,
        events: vec![WebhookEvent::FeedGenerated],
        enabled: true,
        secret: Some("sink-secret".to_string()),
        retry_count: Some(retry_count),
        timeout_seconds: Some(5),
    }
}

#[tokio::test]
async fn google_feed_downloads_ingested_product() {
    let state = test_utils::test_state().await.unwrap();
    register_connector(&state, ConnectorKind::Shopify, SHOP_DOMAIN)
        .await
        .unwrap();
    let app = router(&state);

    let create = json!({
        "id": 100,
        "title": "Red Shirt",
        "handle": "red-shirt",
        "variants": [{"id": 1, "price": "19.99", "sku": "RS-1", "inventory_quantity": 5, "inventory_management": "shopify"}]
    });
    post_shopify_webhook(&app, "products/create", &create, SHOPIFY_SECRET)
        .await
        .unwrap();
    let update = json!({
        "id": 100,
        "title": "Red Shirt",
        "handle": "red-shirt",
        "variants": [{"id": 1, "price": "24.99", "inventory_management": ""}]
    });
    post_shopify_webhook(&app, "products/update", &update, SHOPIFY_SECRET)
        .await
        .unwrap();

    let feed_id = create_feed(
        &app,
        json!({"name": "G1", "channel": "google", "format": "xml", "filter": {"min_price": 10}}),
    )
    .await;

    let outcome = state.feeds.regenerate_and_wait(feed_id).await.unwrap();
    assert!(outcome.succeeded, "{:?}", outcome.error);

    let (status, headers, xml) = download(&app, &format!("/api/v1/feeds/{feed_id}/download")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(
        headers[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("application/xml")
    );
    assert_eq!(
        headers[header::CONTENT_DISPOSITION].to_str().unwrap(),
        "attachment; filename=\"G1.xml\""
    );
    assert!(xml.contains("Red Shirt"));
    assert!(xml.contains("<g:price>24.99 USD</g:price>"), "{xml}");
    assert!(xml.contains("<g:availability>in stock</g:availability>"));

    let (_, feed) = send(&app, Method::GET, &format!("/api/v1/feeds/{feed_id}"), None)
        .await
        .unwrap();
    assert_eq!(feed["status"], "active");
    assert_eq!(feed["products_count"], 1);
    assert!(feed["last_generated"].is_string());
}

#[tokio::test]
async fn curated_set_renders_items_images_and_links() {
    let state = pipeline_state().await;
    let connector = seed_connector(&state).await;
    seed(
        &state,
        &connector,
        canonical(
            "a",
            "Two Images",
            Decimal::new(2000, 2),
            &["https://cdn.example/a1.jpg", "https://cdn.example/a2.jpg"],
        ),
    )
    .await;
    seed(&state, &connector, canonical("b", "No Images", Decimal::new(1500, 2), &[])).await;
    let mut handled = canonical(
        "c",
        "Handled",
        Decimal::new(3000, 2),
        &["https://cdn.example/c.jpg"],
    );
    handled.metadata = json!({"handle": "red-shirt", "tags": []});
    seed(&state, &connector, handled).await;

    let app = router(&state);
    let feed_id = create_feed(&app, json!({"name": "Curated", "channel": "google"})).await;

    let artifact = state.feeds.download(feed_id, None, None).await.unwrap();
    let xml = String::from_utf8(artifact.bytes).unwrap();

    assert_eq!(xml.matches("<item>").count(), 3);
    assert_eq!(xml.matches(PLACEHOLDER).count(), 1);
    assert_eq!(
        xml.matches("<g:additional_image_link>https://cdn.example/a2.jpg</g:additional_image_link>")
            .count(),
        1
    );
    assert!(xml.contains(&format!("<g:link>{STOREFRONT}/products/red-shirt</g:link>")));

    let no_images_item = xml
        .split("<item>")
        .find(|item| item.contains("No Images"))
        .unwrap();
    assert!(no_images_item.contains(PLACEHOLDER));

    let again = state.feeds.download(feed_id, None, None).await.unwrap();
    assert_eq!(again.bytes, xml.into_bytes());
}

#[tokio::test]
async fn other_formats_and_preview() {
    let state = pipeline_state().await;
    let connector = seed_connector(&state).await;
    for (id, cents) in [("p1", 1000), ("p2", 2000), ("p3", 3000)] {
        seed(
            &state,
            &connector,
            canonical(id, &format!("Item {id}"), Decimal::new(cents, 2), &[]),
        )
        .await;
    }
    let app = router(&state);
    let feed_id = create_feed(&app, json!({"name": "Meta", "channel": "facebook"})).await;

    let (status, headers, csv) =
        download(&app, &format!("/api/v1/feeds/{feed_id}/download")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/csv"));
    let mut reader = ::csv::Reader::from_reader(csv.as_bytes());
    assert_eq!(reader.records().count(), 3);

    let (status, headers, json_body) =
        download(&app, &format!("/api/v1/feeds/{feed_id}/download?format=json")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    let parsed: Value = serde_json::from_str(&json_body).unwrap();
    assert!(parsed.is_object() || parsed.is_array());

    let (status, headers, preview) =
        download(&app, &format!("/api/v1/feeds/{feed_id}/preview?limit=1")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers.get(header::CONTENT_DISPOSITION).is_none());
    let mut reader = ::csv::Reader::from_reader(preview.as_bytes());
    assert_eq!(reader.records().count(), 1);

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/v1/feeds/{}/download", Uuid::new_v4()),
        None,
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NOT_FOUND");
}

#[tokio::test]
async fn download_honours_limit() {
    let state = pipeline_state().await;
    let connector = seed_connector(&state).await;
    for (id, cents) in [("l1", 1500), ("l2", 2500), ("l3", 3500)] {
        seed(
            &state,
            &connector,
            canonical(id, &format!("Limited {id}"), Decimal::new(cents, 2), &[]),
        )
        .await;
    }
    let app = router(&state);
    let feed_id = create_feed(&app, json!({"name": "Limited", "channel": "google"})).await;

    let (status, headers, xml) =
        download(&app, &format!("/api/v1/feeds/{feed_id}/download?limit=1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"Limited.xml\""
    );
    assert_eq!(xml.matches("<item>").count(), 1);

    let (_, _, full) = download(&app, &format!("/api/v1/feeds/{feed_id}/download")).await;
    assert_eq!(full.matches("<item>").count(), 3);

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/v1/feeds/{feed_id}/download?limit=0"),
        None,
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BAD_PAYLOAD");
}

#[tokio::test]
async fn generated_event_is_delivered_to_sink() {
    let state = pipeline_state().await;
    let connector = seed_connector(&state).await;
    seed(&state, &connector, canonical("x", "Sink Item", Decimal::new(1200, 2), &[])).await;
    let app = router(&state);
    let feed_id = create_feed(&app, json!({"name": "G1", "channel": "google"})).await;

    let sink = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(header_exists("X-Webhook-Signature"))
        .and(header_exists("X-Feed-ID"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&sink)
        .await;

    let (status, webhook) = send(
        &app,
        Method::PUT,
        &format!("/api/v1/feeds/{feed_id}/webhook"),
        Some(json!({
            "url": format!("{}/hook", sink.uri()),
            "events": ["feed.generated"],
            "secret": "sink-secret",
            "timeout_seconds": 5
        })),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::OK, "{webhook}");
    assert_eq!(webhook["has_secret"], true);
    assert!(webhook.get("secret").is_none());

    let outcome = state.feeds.regenerate_and_wait(feed_id).await.unwrap();
    assert!(outcome.succeeded);

    let deliveries = webhook_delivery::Entity::find()
        .all(&state.db)
        .await
        .unwrap();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].status_code, Some(200));
    assert!(deliveries[0].success);
    assert_eq!(deliveries[0].run_id, Some(outcome.run_id));
    assert_eq!(deliveries[0].event, "feed.generated");

    let (_, page) = send(
        &app,
        Method::GET,
        &format!("/api/v1/feeds/{feed_id}/webhook/deliveries"),
        None,
    )
    .await
    .unwrap();
    assert_eq!(page["total"], 1);
    assert_eq!(page["data"][0]["status_code"], 200);

    let (_, webhook) = send(&app, Method::GET, &format!("/api/v1/feeds/{feed_id}/webhook"), None)
        .await
        .unwrap();
    assert_eq!(webhook["successful_deliveries"], 1);
    assert_eq!(webhook["total_deliveries"], 1);
}

#[tokio::test]
async fn failing_sink_gets_retry_count_plus_one_attempts() {
    let state = pipeline_state().await;
    let connector = seed_connector(&state).await;
    seed(&state, &connector, canonical("r", "Retry Item", Decimal::new(900, 2), &[])).await;
    let app = router(&state);
    let feed_id = create_feed(&app, json!({"name": "Retry", "channel": "google"})).await;

    let sink = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(4)
        .mount(&sink)
        .await;

    state
        .feeds
        .configure_webhook(feed_id, sink_settings(format!("{}/hook", sink.uri()), 3))
        .await
        .unwrap();

    let outcome = state.feeds.regenerate_and_wait(feed_id).await.unwrap();
    assert!(outcome.succeeded);

    let deliveries = webhook_delivery::Entity::find()
        .all(&state.db)
        .await
        .unwrap();
    assert_eq!(deliveries.len(), 4);
    assert!(deliveries.iter().all(|d| !d.success && d.status_code == Some(500)));
    let mut attempts: Vec<i32> = deliveries.iter().map(|d| d.retry_attempt).collect();
    attempts.sort_unstable();
    assert_eq!(attempts, vec![0, 1, 2, 3]);

    let webhook = state.feeds.webhook(feed_id).await.unwrap();
    assert_eq!(webhook.failed_deliveries, 4);
    assert_eq!(webhook.successful_deliveries, 0);
    assert_eq!(webhook.total_deliveries, 4);
}

#[tokio::test]
async fn loopback_webhook_projects_notification_in_process() {
    let state = pipeline_state().await;
    let connector = seed_connector(&state).await;
    seed(&state, &connector, canonical("l", "Loop Item", Decimal::new(500, 2), &[])).await;
    let app = router(&state);
    let feed_id = create_feed(&app, json!({"name": "Loop", "channel": "instagram"})).await;

    state
        .feeds
        .configure_webhook(
            feed_id,
            sink_settings(
                "http://127.0.0.1:9/api/v1/feeds/webhook-receiver".to_string(),
                3,
            ),
        )
        .await
        .unwrap();

    let outcome = state.feeds.regenerate_and_wait(feed_id).await.unwrap();
    assert!(outcome.succeeded);

    let deliveries = webhook_delivery::Entity::find()
        .all(&state.db)
        .await
        .unwrap();
    assert_eq!(deliveries.len(), 1);
    assert!(deliveries[0].success);
    assert_eq!(
        notification::Entity::find().count(&state.db).await.unwrap(),
        1
    );

    let (status, page) = send(&app, Method::GET, "/api/v1/notifications?unread=true", None)
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);
    assert_eq!(page["data"][0]["notification_type"], "feed_generated");
    let id = page["data"][0]["id"].as_str().unwrap().to_string();

    let (status, read) = send(
        &app,
        Method::POST,
        &format!("/api/v1/notifications/{id}/read"),
        None,
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(read["read"], true);

    let (_, page) = send(&app, Method::GET, "/api/v1/notifications?unread=true", None)
        .await
        .unwrap();
    assert_eq!(page["total"], 0);
}

#[tokio::test]
async fn concurrent_regenerations_start_one_run() {
    let state = pipeline_state().await;
    let connector = seed_connector(&state).await;
    seed(&state, &connector, canonical("k", "Race Item", Decimal::new(700, 2), &[])).await;
    let app = router(&state);
    let feed_id = create_feed(&app, json!({"name": "Race", "channel": "google"})).await;

    let (first, second) = tokio::join!(
        state.feeds.regenerate(feed_id),
        state.feeds.regenerate(feed_id)
    );
    let (winner, loser) = match (first, second) {
        (Ok(handle), Err(err)) | (Err(err), Ok(handle)) => (handle, err),
        (first, second) => panic!("expected one winner, got {first:?} and {second:?}"),
    };
    assert!(matches!(loser, PipelineError::ConcurrentRun { .. }));

    let outcome = winner.join.await.unwrap();
    assert!(outcome.succeeded);

    let runs = generation_run::Entity::find()
        .filter(generation_run::Column::FeedId.eq(feed_id))
        .all(&state.db)
        .await
        .unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RUN_STATUS_COMPLETED);
}

#[tokio::test]
async fn regenerate_endpoint_rejects_while_generating() {
    let state = pipeline_state().await;
    let app = router(&state);
    let feed_id = create_feed(&app, json!({"name": "Busy", "channel": "google"})).await;

    product_feeds::repositories::FeedRepository::new(state.db.clone())
        .try_lock(feed_id)
        .await
        .unwrap();

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/v1/feeds/{feed_id}/regenerate"),
        None,
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "CONCURRENT_RUN");
}

#[tokio::test]
async fn regenerate_endpoint_runs_in_background_and_fills_history() {
    let state = pipeline_state().await;
    let connector = seed_connector(&state).await;
    seed(&state, &connector, canonical("h", "History Item", Decimal::new(1100, 2), &[])).await;
    let app = router(&state);
    let feed_id = create_feed(&app, json!({"name": "History", "channel": "google"})).await;

    let (status, accepted) = send(
        &app,
        Method::POST,
        &format!("/api/v1/feeds/{feed_id}/regenerate"),
        None,
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(accepted["status"], "generating");
    let run_id: Uuid = accepted["run_id"].as_str().unwrap().parse().unwrap();

    let mut run = state.feeds.find_run(run_id).await.unwrap();
    for _ in 0..100 {
        if run.status != RUN_STATUS_STARTED {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        run = state.feeds.find_run(run_id).await.unwrap();
    }
    assert_eq!(run.status, RUN_STATUS_COMPLETED);
    assert_eq!(run.products_included, 1);
    assert_eq!(
        run.file_url.as_deref(),
        Some(format!("/api/v1/feeds/{feed_id}/download").as_str())
    );

    let (_, history) = send(
        &app,
        Method::GET,
        &format!("/api/v1/feeds/{feed_id}/history?status=completed"),
        None,
    )
    .await
    .unwrap();
    assert_eq!(history["total"], 1);
    assert_eq!(history["data"][0]["id"], run_id.to_string());
    assert!(history["data"][0]["validation_issues"].is_array());

    let (_, analytics) = send(
        &app,
        Method::GET,
        &format!("/api/v1/feeds/{feed_id}/analytics"),
        None,
    )
    .await
    .unwrap();
    assert_eq!(analytics["total_runs"], 1);
    assert_eq!(analytics["completed_runs"], 1);
    assert_eq!(analytics["success_rate"], 1.0);
}

#[tokio::test]
async fn feed_crud_validates_input() {
    let state = pipeline_state().await;
    let app = router(&state);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/feeds",
        Some(json!({"name": "Bad", "channel": "google", "filter": {"min_price": 50, "max_price": 5}})),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BAD_PAYLOAD");

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/feeds",
        Some(json!({"name": "Orphan", "channel": "google", "connector_id": Uuid::new_v4()})),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::NOT_FOUND);

    let feed_id = create_feed(&app, json!({"name": "Editable", "channel": "instagram"})).await;
    let (status, updated) = send(
        &app,
        Method::PUT,
        &format!("/api/v1/feeds/{feed_id}"),
        Some(json!({"name": "Edited", "filter": {"brands": ["Acme"]}})),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], "Edited");
    assert_eq!(updated["format"], "json");
    assert_eq!(updated["filter"]["brands"][0], "Acme");

    let (status, list) = send(&app, Method::GET, "/api/v1/feeds", None).await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().map(Vec::len), Some(1));

    let (status, _) = send(&app, Method::DELETE, &format!("/api/v1/feeds/{feed_id}"), None)
        .await
        .unwrap();
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, Method::GET, &format!("/api/v1/feeds/{feed_id}"), None)
        .await
        .unwrap();
    assert_eq!(status, StatusCode::NOT_FOUND);
}
