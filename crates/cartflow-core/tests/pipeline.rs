use std::sync::Arc;

use cartflow_bucket::MemoryBucketStore;
use cartflow_core::config::{PipelineConfig, RetryPolicy, WarehouseConfig};
use cartflow_core::graph::{GraphRunner, TaskStatus};
use cartflow_core::load::WarehouseLoader;
use cartflow_core::pipeline::{build_daily_graph, PipelineDeps, LOAD_TASK, UPLOAD_TASK};
use cartflow_core::secrets::WarehouseCredentials;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_in(root: &std::path::Path, base_url: String) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.raw_dir = root.join("extract/data");
    config.cleaned_dir = root.join("transform/cleaned");
    config.source.base_url = base_url;
    config.retry = RetryPolicy::none();
    config
}

fn deps(store: Arc<MemoryBucketStore>, program: &str) -> PipelineDeps {
    let warehouse = WarehouseConfig {
        program: program.to_string(),
        ..WarehouseConfig::default()
    };
    PipelineDeps {
        store,
        loader: WarehouseLoader::new(
            &warehouse,
            WarehouseCredentials {
                account: "acct".into(),
                user: "user".into(),
            },
        ),
    }
}

#[test]
fn daily_graph_has_four_levels() {
    let root = tempfile::tempdir().unwrap();
    let config = config_in(root.path(), "http://127.0.0.1:9".into());
    let store = Arc::new(MemoryBucketStore::new("bucket"));

    let graph = build_daily_graph(&config, deps(store, "snowsql")).unwrap();
    let levels: Vec<Vec<&str>> = graph
        .levels()
        .unwrap()
        .iter()
        .map(|level| level.iter().map(|&id| graph.task_name(id)).collect())
        .collect();

    assert_eq!(
        levels,
        vec![
            vec!["extract_products", "extract_users", "extract_carts"],
            vec!["transform_data"],
            vec!["upload_to_s3"],
            vec!["load_to_snowflake"],
        ]
    );
}

#[test]
fn invalid_config_builds_no_graph() {
    let root = tempfile::tempdir().unwrap();
    let mut config = config_in(root.path(), "http://127.0.0.1:9".into());
    config.source.resources.clear();
    let store = Arc::new(MemoryBucketStore::new("bucket"));

    assert!(build_daily_graph(&config, deps(store, "snowsql")).is_err());
}

#[cfg(unix)]
#[tokio::test]
async fn full_run_lands_cleaned_files_in_the_bucket() {
    let server = MockServer::start().await;
    let bodies = [
        (
            "/products",
            json!([
                {"id": 1, "title": "Backpack", "price": 109.95, "rating": {"rate": 3.9, "count": 120}},
                {"id": 1, "title": "Backpack", "price": 109.95, "rating": {"rate": 3.9, "count": 120}}
            ]),
        ),
        (
            "/users",
            json!([{"id": 1, "username": "johnd", "name": {"firstname": "john"}}]),
        ),
        (
            "/carts",
            json!([{"id": 1, "userId": 1, "products": [{"productId": 1, "quantity": 4}]}]),
        ),
    ];
    for (route, body) in bodies {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;
    }

    let root = tempfile::tempdir().unwrap();
    let config = config_in(root.path(), server.uri());
    let store = Arc::new(MemoryBucketStore::new("bucket"));
    let graph = build_daily_graph(&config, deps(Arc::clone(&store), "true")).unwrap();

    let report = GraphRunner::new(config.retry).run(&graph).await.unwrap();

    assert!(report.is_success(), "failed tasks: {:?}", report.failed_tasks());
    assert_eq!(
        store.keys(),
        vec![
            "cleaned/carts_clean.csv",
            "cleaned/products_clean.csv",
            "cleaned/users_clean.csv",
        ]
    );
    let products = store.get("cleaned/products_clean.csv").unwrap();
    assert_eq!(
        std::str::from_utf8(&products.bytes).unwrap(),
        "id,title,price,ratingrate,ratingcount\n1,Backpack,109.95,3.9,120\n"
    );
    let carts = store.get("cleaned/carts_clean.csv").unwrap();
    assert_eq!(
        std::str::from_utf8(&carts.bytes).unwrap(),
        "id,userid,products\n1,1,\"[{\"\"productId\"\":1,\"\"quantity\"\":4}]\"\n"
    );
    assert!(matches!(
        report.task(LOAD_TASK).unwrap().status,
        TaskStatus::Succeeded { .. }
    ));
}

#[cfg(unix)]
#[tokio::test]
async fn upstream_outage_skips_everything_after_extract() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let root = tempfile::tempdir().unwrap();
    let config = config_in(root.path(), server.uri());
    let store = Arc::new(MemoryBucketStore::new("bucket"));
    let graph = build_daily_graph(&config, deps(Arc::clone(&store), "true")).unwrap();

    let report = GraphRunner::new(config.retry).run(&graph).await.unwrap();

    assert_eq!(report.failed_tasks().len(), 3);
    assert_eq!(report.task(UPLOAD_TASK).unwrap().status, TaskStatus::Skipped);
    assert!(store.attempted_keys().is_empty());
}
