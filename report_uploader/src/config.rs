use anyhow::{bail, Result};

pub const DEFAULT_MAX_LOOP: u32 = 15;
pub const DEFAULT_ROLE_SESSION_NAME: &str = "IAMCredentialReport";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bucket: String,
    pub assume_role_name: String,
    pub max_loop: u32,
    pub role_session_name: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.is_empty());

        let bucket = match var("BUCKET_ARN").or_else(|| var("BUCKET_NAME")) {
            Some(value) => bucket_name(&value),
            None => bail!("Missing BUCKET_ARN value"),
        };

        let Some(assume_role_name) = var("ASSUME_ROLE_NAME") else {
            bail!("Missing ASSUME_ROLE_NAME value");
        };

        let max_loop = match var("MAX_LOOP") {
            Some(value) => match value.parse::<u32>() {
                Ok(max_loop) if value.bytes().all(|b| b.is_ascii_digit()) => max_loop,
                _ => bail!("MAX_LOOP is not numeric: {}", value),
            },
            None => DEFAULT_MAX_LOOP,
        };

        let role_session_name =
            var("ROLE_SESSION_NAME").unwrap_or_else(|| DEFAULT_ROLE_SESSION_NAME.to_string());

        Ok(Config {
            bucket,
            assume_role_name,
            max_loop,
            role_session_name,
        })
    }
}

/// `arn:aws:s3:::reports` and `reports` both name the bucket `reports`.
fn bucket_name(value: &str) -> String {
    value.rsplit(':').next().unwrap_or(value).to_string()
}
