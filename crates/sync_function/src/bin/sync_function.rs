use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;
use sync_function::adapters::GcpConnector;
use sync_function::handlers::sync::{handle_sync_event, SyncResponse};
use sync_function::logging::init_logging;

async fn handle_request(
    event: LambdaEvent<Value>,
    connector: &GcpConnector,
) -> Result<SyncResponse, Error> {
    Ok(handle_sync_event(
        &event.payload,
        |name| std::env::var(name).ok(),
        connector,
    ))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_logging();

    let connector = GcpConnector::from_env()?;
    let connector = &connector;

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| async move {
        handle_request(event, connector).await
    }))
    .await
}
