mod organizations;

use anyhow::Result;
use aws_config::BehaviorVersion;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use organizations::{list_active_accounts, AccountRef};
use serde_json::Value;

#[tokio::main]
async fn main() -> Result<(), Error> {
    shared::log::init();

    let aws_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let organizations = aws_sdk_organizations::Client::new(&aws_config);
    let organizations = &organizations;

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| async move {
        func(organizations, event).await
    }))
    .await?;
    Ok(())
}

async fn func(
    organizations: &aws_sdk_organizations::Client,
    _event: LambdaEvent<Value>,
) -> Result<Vec<AccountRef>> {
    list_active_accounts(organizations).await
}
