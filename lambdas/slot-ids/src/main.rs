use aws_config::BehaviorVersion;
use domain::{
    clinic::{ensure_slot_ids, RetryPolicy},
    store::DynamoStore,
    Settings,
};
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::{json, Value};

#[tokio::main]
async fn main() -> Result<(), Error> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();

    let settings = Settings::from_env();

    let config = aws_config::defaults(BehaviorVersion::latest()).load().await;
    let dynamodb_client = aws_sdk_dynamodb::Client::new(&config);

    let store = DynamoStore::new(dynamodb_client, settings.tables());
    let retry = settings.retry_policy();

    lambda_runtime::run(service_fn(|event: LambdaEvent<Value>| async {
        handle(event, &store, &retry).await
    }))
    .await
}

// Triggered on a schedule; the event payload is ignored.
async fn handle(
    event: LambdaEvent<Value>,
    store: &DynamoStore,
    retry: &RetryPolicy,
) -> Result<Value, Error> {
    tracing::info!("Slot id maintenance requested by {}", event.context.request_id);

    let ensured = ensure_slot_ids(store, retry).await?;
    tracing::info!(
        "{} slots checked, {} ids assigned",
        ensured.slots.len(),
        ensured.assigned
    );

    Ok(json!({ "assigned": ensured.assigned }))
}
