use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_iam::config::Credentials;
use aws_sdk_iam::error::DisplayErrorContext;
use aws_sdk_iam::types::ReportStateType;
use tracing::{debug, error};

/// Outcome of asking IAM to generate a credential report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportStatus {
    Complete,
    /// Still generating; carries the state IAM reported.
    Pending(String),
    /// GenerateCredentialReport was rate limited.
    Throttled,
}

#[async_trait]
pub trait CredentialReports: Send + Sync {
    /// Start generation, or check on one already running. Safe to repeat.
    async fn generate(&self) -> Result<ReportStatus>;

    /// The finished report as text.
    async fn fetch(&self) -> Result<String>;
}

#[async_trait]
pub trait AccountAccess: Send + Sync {
    /// Account the process credentials belong to.
    async fn caller_account(&self) -> Result<String>;

    /// Reports client using the process credentials.
    async fn ambient(&self) -> Result<Box<dyn CredentialReports>>;

    /// Reports client using credentials for `role_name` in `account_id`.
    async fn assume(
        &self,
        account_id: &str,
        role_name: &str,
    ) -> Result<Box<dyn CredentialReports>>;
}

pub fn role_arn(account_id: &str, role_name: &str) -> String {
    format!("arn:aws:iam::{}:role/{}", account_id, role_name)
}

pub struct IamReports {
    client: aws_sdk_iam::Client,
}

impl IamReports {
    pub fn new(client: aws_sdk_iam::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CredentialReports for IamReports {
    async fn generate(&self) -> Result<ReportStatus> {
        let output = match self.client.generate_credential_report().send().await {
            Ok(output) => output,
            Err(err) => {
                if let Some(service_err) = err.as_service_error() {
                    if service_err.is_limit_exceeded_exception() {
                        return Ok(ReportStatus::Throttled);
                    }
                }
                error!("GenerateCredentialReport failed: {}", DisplayErrorContext(&err));
                return Err(err.into());
            }
        };

        match output.state {
            Some(ReportStateType::Complete) => Ok(ReportStatus::Complete),
            // Anything short of COMPLETE, including states newer than this SDK, is still pending.
            Some(state) => Ok(ReportStatus::Pending(state.as_str().to_string())),
            None => bail!("GenerateCredentialReport returned no state"),
        }
    }

    async fn fetch(&self) -> Result<String> {
        let output = self
            .client
            .get_credential_report()
            .send()
            .await
            .map_err(|err| {
                error!("GetCredentialReport failed: {}", DisplayErrorContext(&err));
                err
            })?;

        let content = output
            .content
            .ok_or_else(|| anyhow!("GetCredentialReport returned no content"))?;

        String::from_utf8(content.into_inner()).context("credential report is not valid UTF-8")
    }
}

/// STS-backed access to member accounts.
pub struct AwsAccess {
    sdk_config: SdkConfig,
    sts: aws_sdk_sts::Client,
    session_name: String,
}

impl AwsAccess {
    pub fn new(sdk_config: &SdkConfig, session_name: impl Into<String>) -> Self {
        Self {
            sdk_config: sdk_config.clone(),
            sts: aws_sdk_sts::Client::new(sdk_config),
            session_name: session_name.into(),
        }
    }
}

#[async_trait]
impl AccountAccess for AwsAccess {
    async fn caller_account(&self) -> Result<String> {
        let output = self
            .sts
            .get_caller_identity()
            .send()
            .await
            .map_err(|err| {
                error!("GetCallerIdentity failed: {}", DisplayErrorContext(&err));
                err
            })?;

        output
            .account
            .ok_or_else(|| anyhow!("GetCallerIdentity returned no account"))
    }

    async fn ambient(&self) -> Result<Box<dyn CredentialReports>> {
        let iam = aws_sdk_iam::Client::new(&self.sdk_config);
        Ok(Box::new(IamReports::new(iam)))
    }

    async fn assume(
        &self,
        account_id: &str,
        role_name: &str,
    ) -> Result<Box<dyn CredentialReports>> {
        let role_arn = role_arn(account_id, role_name);
        debug!("Assuming {}", role_arn);

        let output = self
            .sts
            .assume_role()
            .role_arn(&role_arn)
            .role_session_name(&self.session_name)
            .send()
            .await
            .map_err(|err| {
                error!(
                    "AssumeRole {} failed: {}",
                    role_arn,
                    DisplayErrorContext(&err)
                );
                err
            })?;

        let creds = output
            .credentials
            .ok_or_else(|| anyhow!("no credentials found for role_arn: {}", role_arn))?;

        let credentials = Credentials::new(
            creds.access_key_id,
            creds.secret_access_key,
            Some(creds.session_token),
            None,
            "IAMCredentialReportAssumeRole",
        );

        let config = aws_sdk_iam::config::Builder::from(&self.sdk_config)
            .credentials_provider(credentials)
            .build();

        let iam = aws_sdk_iam::Client::from_conf(config);
        Ok(Box::new(IamReports::new(iam)))
    }
}
