//! Pull syncs against mocked Shopify, WooCommerce and CSV sources.

use product_feeds::{
    ingest::{IngestError, SyncReport},
    models::{
        connector::{self, ConnectorKind, ConnectorStatus},
        product,
    },
    repositories::ProductRepository,
    server::AppState,
};
use sea_orm::{EntityTrait, PaginatorTrait};
use serde_json::{Value, json};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header, method, path, query_param, query_param_is_missing},
};

#[path = "test_utils/mod.rs"]
mod test_utils;

use test_utils::{build_state, shopify_product, test_config, test_state};

const PRODUCTS_PATH: &str = "/admin/api/2024-01/products.json";

async fn shopify_connector(state: &AppState, server: &MockServer) -> connector::Model {
    state
        .ingest
        .register_connector(
            ConnectorKind::Shopify,
            &server.uri(),
            json!({"access_token": "shpat_test"}),
            None,
        )
        .await
        .unwrap()
}

async fn mount_shopify(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/admin/api/2024-01/shop.json"))
        .and(header("X-Shopify-Access-Token", "shpat_test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"shop": {"currency": "EUR"}})))
        .mount(server)
        .await;

    let next = format!(
        "<{}{PRODUCTS_PATH}?limit=250&page_info=page-two>; rel=\"next\"",
        server.uri()
    );
    Mock::given(method("GET"))
        .and(path(PRODUCTS_PATH))
        .and(query_param_is_missing("page_info"))
        .and(header("X-Shopify-Access-Token", "shpat_test"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Link", next.as_str())
                .set_body_json(json!({"products": [
                    shopify_product(1, "First", "10.00", 2),
                    shopify_product(2, "Second", "20.00", 0),
                ]})),
        )
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(PRODUCTS_PATH))
        .and(query_param("page_info", "page-two"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"products": [
            shopify_product(3, "Third", "30.00", 5),
            {"id": 4, "variants": []}
        ]})))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/admin/api/2024-01/inventory_levels.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"inventory_levels": [
            {"inventory_item_id": 101, "location_id": 1, "available": 2}
        ]})))
        .mount(server)
        .await;
}

#[tokio::test]
async fn shopify_sync_follows_link_pages() {
    let server = MockServer::start().await;
    mount_shopify(&server).await;
    let state = test_state().await.unwrap();
    let connector = shopify_connector(&state, &server).await;
    assert_eq!(connector.status, ConnectorStatus::Pending.as_str());

    let report: SyncReport = state.ingest.pull_sync(connector.id).await.unwrap();
    assert_eq!(report.pages, 2);
    assert_eq!(report.products_upserted, 3);
    assert!(!report.truncated);
    assert!(report.next_cursor.is_none());

    let synced = state.ingest.connector_by_id(connector.id).await.unwrap();
    assert_eq!(synced.status, ConnectorStatus::Active.as_str());
    assert_eq!(synced.currency.as_deref(), Some("EUR"));
    assert!(synced.last_sync_at.is_some());
    assert!(synced.sync_cursor.is_none());

    let products = ProductRepository::new(state.db.clone());
    let first = products
        .find_by_external(connector.id, "1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.currency, "EUR");
    assert_eq!(first.brand.as_deref(), Some("Acme"));
    let second = products
        .find_by_external(connector.id, "2")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.status, "out_of_stock");

    // A second run upserts the same rows.
    state.ingest.pull_sync(connector.id).await.unwrap();
    assert_eq!(product::Entity::find().count(&state.db).await.unwrap(), 3);
}

#[tokio::test]
async fn page_cap_truncates_and_next_sync_resumes() {
    let server = MockServer::start().await;
    mount_shopify(&server).await;
    let mut config = test_config();
    config.sync.max_pages = 1;
    let state = build_state(config).await.unwrap();
    let connector = shopify_connector(&state, &server).await;

    let report = state.ingest.pull_sync(connector.id).await.unwrap();
    assert_eq!(report.pages, 1);
    assert!(report.truncated);
    assert_eq!(report.next_cursor.as_deref(), Some("page-two"));
    let stored = state.ingest.connector_by_id(connector.id).await.unwrap();
    assert_eq!(stored.sync_cursor.as_deref(), Some("page-two"));
    assert_eq!(product::Entity::find().count(&state.db).await.unwrap(), 2);

    let resumed = state.ingest.pull_sync(connector.id).await.unwrap();
    assert_eq!(resumed.pages, 1);
    assert!(!resumed.truncated);
    assert_eq!(product::Entity::find().count(&state.db).await.unwrap(), 3);
    let stored = state.ingest.connector_by_id(connector.id).await.unwrap();
    assert!(stored.sync_cursor.is_none());
}

#[tokio::test]
async fn non_success_listing_fails_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(PRODUCTS_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid token"))
        .expect(1)
        .mount(&server)
        .await;
    let state = test_state().await.unwrap();
    let connector = state
        .ingest
        .register_connector(
            ConnectorKind::Shopify,
            &server.uri(),
            json!({"access_token": "revoked"}),
            Some("usd".to_string()),
        )
        .await
        .unwrap();
    assert_eq!(connector.currency.as_deref(), Some("USD"));

    let err = state.ingest.pull_sync(connector.id).await.unwrap_err();
    assert!(
        matches!(err, IngestError::UpstreamStatus { status: 401, ref body } if body == "invalid token"),
        "{err:?}"
    );
    let stored = state.ingest.connector_by_id(connector.id).await.unwrap();
    assert_eq!(stored.status, ConnectorStatus::Pending.as_str());
    assert!(stored.last_sync_at.is_none());
}

#[tokio::test]
async fn inactive_connector_is_not_synced() {
    let server = MockServer::start().await;
    let state = test_state().await.unwrap();
    let connector = shopify_connector(&state, &server).await;
    state.ingest.uninstall(&connector).await.unwrap();

    let err = state.ingest.pull_sync(connector.id).await.unwrap_err();
    assert!(matches!(err, IngestError::BadPayload(_)));
}

fn woo_product(id: u64, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "price": "12.50",
        "sku": format!("W-{id}"),
        "manage_stock": true,
        "stock_quantity": 3,
        "status": "publish",
        "images": [{"src": format!("https://cdn.example/w{id}.jpg")}],
        "categories": [{"name": "Garden"}]
    })
}

#[tokio::test]
async fn woocommerce_sync_uses_total_pages_header() {
    let server = MockServer::start().await;
    for (page, product) in [("1", woo_product(11, "Rake")), ("2", woo_product(12, "Hoe"))] {
        Mock::given(method("GET"))
            .and(path("/wp-json/wc/v3/products"))
            .and(query_param("page", page))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("X-WP-TotalPages", "2")
                    .set_body_json(json!([product])),
            )
            .expect(1)
            .mount(&server)
            .await;
    }

    let state = test_state().await.unwrap();
    let connector = state
        .ingest
        .register_connector(
            ConnectorKind::Woocommerce,
            &server.uri(),
            json!({"consumer_key": "ck_test", "consumer_secret": "cs_test"}),
            Some("EUR".to_string()),
        )
        .await
        .unwrap();

    let report = state.ingest.pull_sync(connector.id).await.unwrap();
    assert_eq!(report.pages, 2);
    assert_eq!(report.products_upserted, 2);

    let hoe = ProductRepository::new(state.db.clone())
        .find_by_external(connector.id, "12")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(hoe.currency, "EUR");
    assert_eq!(hoe.category.as_deref(), Some("Garden"));
    assert_eq!(hoe.total_stock(), 3);
}

#[tokio::test]
async fn csv_document_is_one_page() {
    let server = MockServer::start().await;
    let document = "id,title,price,brand,image_link,tags,quantity,status,handle\n\
        C1,Lamp,40.00,Lumen,https://cdn.example/l1.jpg|https://cdn.example/l2.jpg,\"home, light\",3,active,lamp\n\
        C2,Draft Lamp,45.00,Lumen,,,1,draft,\n\
        ,Nameless,1.00,,,,,,\n";
    Mock::given(method("GET"))
        .and(path("/catalog.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_string(document))
        .mount(&server)
        .await;

    let state = test_state().await.unwrap();
    let connector = state
        .ingest
        .register_connector(
            ConnectorKind::Csv,
            &format!("{}/catalog.csv", server.uri()),
            Value::Null,
            None,
        )
        .await
        .unwrap();
    assert_eq!(connector.status, ConnectorStatus::Active.as_str());

    let report = state.ingest.pull_sync(connector.id).await.unwrap();
    assert_eq!(report.pages, 1);
    assert_eq!(report.products_upserted, 2);

    let products = ProductRepository::new(state.db.clone());
    let lamp = products
        .find_by_external(connector.id, "C1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(lamp.images, json!(["https://cdn.example/l1.jpg", "https://cdn.example/l2.jpg"]));
    assert_eq!(lamp.handle(), Some("lamp"));
    assert_eq!(lamp.currency, "USD");
    let draft = products
        .find_by_external(connector.id, "C2")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(draft.status, "draft");
}
