mod clients;
mod config;
mod handler;
mod state;

use anyhow::Result;
use aws_config::BehaviorVersion;
use clients::AwsAccess;
use config::Config;
use handler::Handler;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use shared::s3::S3Bucket;
use state::FunctionState;
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<(), Error> {
    shared::log::init();

    let config = Config::from_env()?;
    debug!("BUCKET: {} ASSUME_ROLE_NAME: {}", config.bucket, config.assume_role_name);

    let aws_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let access = AwsAccess::new(&aws_config, &config.role_session_name);
    let store = S3Bucket::new(aws_sdk_s3::Client::new(&aws_config), &config.bucket);
    info!("Uploading credential reports to {}", store.bucket());

    let handler = Handler {
        config: &config,
        access: &access,
        store: &store,
    };
    let handler = &handler;

    lambda_runtime::run(service_fn(move |event: LambdaEvent<FunctionState>| async move {
        func(handler, event).await
    }))
    .await?;
    Ok(())
}

async fn func(handler: &Handler<'_>, event: LambdaEvent<FunctionState>) -> Result<FunctionState> {
    debug!("Input event: {:?}", event.payload);

    let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
    handler.run(event.payload, &today).await
}
