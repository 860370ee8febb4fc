use anyhow::{anyhow, Result};
use async_trait::async_trait;
use aws_sdk_organizations::error::DisplayErrorContext;
use aws_sdk_organizations::types::AccountStatus;
use serde::Serialize;
use tracing::{error, info};

/// ListAccounts rejects anything larger.
pub const PAGE_SIZE: i32 = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub suspended: bool,
}

#[derive(Debug, Default)]
pub struct AccountPage {
    pub accounts: Vec<Account>,
    pub next_token: Option<String>,
}

/// One account handed to the state machine for fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRef {
    pub account_id: String,
}

#[async_trait]
pub trait AccountSource: Send + Sync {
    async fn list_accounts_page(&self, next_token: Option<String>) -> Result<AccountPage>;
}

#[async_trait]
impl AccountSource for aws_sdk_organizations::Client {
    async fn list_accounts_page(&self, next_token: Option<String>) -> Result<AccountPage> {
        let response = self
            .list_accounts()
            .max_results(PAGE_SIZE)
            .set_next_token(next_token)
            .send()
            .await
            .map_err(|err| {
                error!("ListAccounts failed: {}", DisplayErrorContext(&err));
                err
            })?;

        let accounts = response
            .accounts
            .unwrap_or_default()
            .into_iter()
            .map(|account| {
                let suspended = matches!(account.status, Some(AccountStatus::Suspended));
                account
                    .id
                    .map(|id| Account { id, suspended })
                    .ok_or_else(|| anyhow!("ListAccounts returned an account without an Id"))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(AccountPage {
            accounts,
            next_token: response.next_token,
        })
    }
}

/// Walk every page and keep the accounts that are not suspended, in listing order.
pub async fn list_active_accounts(source: &dyn AccountSource) -> Result<Vec<AccountRef>> {
    let mut next_token = None;
    let mut active = Vec::new();
    let mut total = 0usize;

    loop {
        let page = source.list_accounts_page(next_token.take()).await?;

        for account in page.accounts {
            total += 1;
            if account.suspended {
                continue;
            }
            info!("Account: {}", account.id);
            active.push(AccountRef {
                account_id: account.id,
            });
        }

        match page.next_token {
            Some(token) => next_token = Some(token),
            None => break,
        }
    }

    info!(
        "Completed! Sent {} active accounts out of {} total accounts to Step Function.",
        active.len(),
        total
    );

    Ok(active)
}
