use crate::clients::{AccountAccess, ReportStatus};
use crate::config::Config;
use crate::state::FunctionState;
use anyhow::{bail, Result};
use shared::s3::{upload_text, ObjectStore};
use tracing::{debug, error, info};

pub struct Handler<'a> {
    pub config: &'a Config,
    pub access: &'a dyn AccountAccess,
    pub store: &'a dyn ObjectStore,
}

pub fn report_file_name(account_id: &str) -> String {
    format!("credentialReport_{}.csv", account_id)
}

impl Handler<'_> {
    /// Run one pass for `state.accountId`. `today` is the `YYYY-MM-DD` folder for the upload.
    ///
    /// Returns the updated state with `loopAgain = "yes"` while the report is
    /// still generating or IAM is throttling, and `"no"` once the report is
    /// stored or the pass limit is exceeded. Anything else is an error.
    pub async fn run(&self, mut state: FunctionState, today: &str) -> Result<FunctionState> {
        debug!("MAX_LOOP: {}", self.config.max_loop);

        let Some(account_id) = state.account_id.clone() else {
            error!("Error, we don't have an accountId");
            bail!("no accountId was passed to function");
        };

        state.begin_pass();
        info!("Processing AccountId: {}", account_id);

        let current_account = self.access.caller_account().await?;
        let reports = if account_id == current_account {
            self.access.ambient().await?
        } else {
            self.access
                .assume(&account_id, &self.config.assume_role_name)
                .await?
        };

        let status = reports.generate().await?;
        info!("IAM credential report current state: {:?}", status);

        match status {
            ReportStatus::Pending(_) | ReportStatus::Throttled => {
                if state.loop_count() > self.config.max_loop {
                    error!(
                        "Error: Too many iterations. Exceeded {} loops.",
                        self.config.max_loop
                    );
                    return Ok(state.fail(format!(
                        "Too many iterations. Exceeded MAX_LOOP of {}",
                        self.config.max_loop
                    )));
                }
                match &status {
                    ReportStatus::Pending(report_state) => info!(
                        "Report is {}. Waiting for report to complete... Exiting to sleep in Step function.",
                        report_state
                    ),
                    _ => info!("Waiting for limit... Exiting to sleep in Step function."),
                }
                Ok(state.wait())
            }
            ReportStatus::Complete => {
                info!(
                    "IAM credential report successfully generated for account Id: {}",
                    account_id
                );
                let content = reports.fetch().await?;
                let file_name = report_file_name(&account_id);
                let key = format!("{}/{}", today, file_name);

                upload_text(self.store, &key, &file_name, &content).await?;
                info!("Uploaded {}", key);

                Ok(state.complete(file_name))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::CredentialReports;
    use crate::state::{FuncState, LoopAgain};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::fs;
    use std::path::Path;
    use std::sync::Mutex;

    const ACCOUNT: &str = "111111111111";
    const HOME: &str = "999999999999";
    const TODAY: &str = "2024-03-01";
    const REPORT: &str = "user,arn,user_creation_time\n<root_account>,arn:aws:iam::111111111111:root,2020-01-01T00:00:00+00:00\n";

    #[derive(Clone)]
    enum Generate {
        Status(ReportStatus),
        Fail(&'static str),
    }

    struct FakeReports {
        generate: Generate,
        fetch: Result<String, &'static str>,
    }

    #[async_trait]
    impl CredentialReports for FakeReports {
        async fn generate(&self) -> Result<ReportStatus> {
            match &self.generate {
                Generate::Status(status) => Ok(status.clone()),
                Generate::Fail(message) => bail!(*message),
            }
        }

        async fn fetch(&self) -> Result<String> {
            match &self.fetch {
                Ok(content) => Ok(content.clone()),
                Err(message) => bail!(*message),
            }
        }
    }

    struct FakeAccess {
        generate: Generate,
        fetch: Result<String, &'static str>,
        assume_fails: bool,
        assumed: Mutex<Vec<(String, String)>>,
        ambient: Mutex<usize>,
    }

    impl FakeAccess {
        fn new(generate: Generate) -> Self {
            Self {
                generate,
                fetch: Ok(REPORT.to_string()),
                assume_fails: false,
                assumed: Mutex::default(),
                ambient: Mutex::default(),
            }
        }

        fn reports(&self) -> Box<dyn CredentialReports> {
            Box::new(FakeReports {
                generate: self.generate.clone(),
                fetch: self.fetch.clone(),
            })
        }
    }

    #[async_trait]
    impl AccountAccess for FakeAccess {
        async fn caller_account(&self) -> Result<String> {
            Ok(HOME.to_string())
        }

        async fn ambient(&self) -> Result<Box<dyn CredentialReports>> {
            *self.ambient.lock().unwrap() += 1;
            Ok(self.reports())
        }

        async fn assume(
            &self,
            account_id: &str,
            role_name: &str,
        ) -> Result<Box<dyn CredentialReports>> {
            self.assumed
                .lock()
                .unwrap()
                .push((account_id.to_string(), role_name.to_string()));
            if self.assume_fails {
                bail!("AccessDenied: not authorized to perform sts:AssumeRole");
            }
            Ok(self.reports())
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        objects: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl ObjectStore for MemoryStore {
        async fn put_file(&self, key: &str, path: &Path) -> Result<()> {
            let body = fs::read_to_string(path)?;
            self.objects.lock().unwrap().insert(key.to_string(), body);
            Ok(())
        }
    }

    fn config() -> Config {
        Config {
            bucket: "credential-reports".to_string(),
            assume_role_name: "ReportReader".to_string(),
            max_loop: 15,
            role_session_name: "IAMCredentialReport".to_string(),
        }
    }

    fn pending() -> Generate {
        Generate::Status(ReportStatus::Pending("STARTED".to_string()))
    }

    async fn run(
        access: &FakeAccess,
        store: &MemoryStore,
        state: FunctionState,
    ) -> Result<FunctionState> {
        let config = config();
        let handler = Handler {
            config: &config,
            access,
            store,
        };
        handler.run(state, TODAY).await
    }

    #[tokio::test]
    async fn first_pass_waits_with_loop_count_zero() {
        let access = FakeAccess::new(pending());
        let store = MemoryStore::default();

        let out = run(&access, &store, FunctionState::new(ACCOUNT)).await.unwrap();

        assert_eq!(out.loop_count, Some(0));
        assert_eq!(out.loop_again, Some(LoopAgain::Yes));
        assert_eq!(out.func_state, Some(FuncState::NotComplete));
        assert!(out.error_message.is_none());
        assert!(store.objects.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn second_pass_increments_loop_count() {
        let access = FakeAccess::new(pending());
        let store = MemoryStore::default();

        let first = run(&access, &store, FunctionState::new(ACCOUNT)).await.unwrap();
        let second = run(&access, &store, first).await.unwrap();

        assert_eq!(second.account_id.as_deref(), Some(ACCOUNT));
        assert_eq!(second.loop_count, Some(1));
        assert_eq!(second.loop_again, Some(LoopAgain::Yes));
    }

    #[tokio::test]
    async fn gives_up_after_max_loop() {
        let access = FakeAccess::new(pending());
        let store = MemoryStore::default();
        let mut state = FunctionState::new(ACCOUNT);
        state.loop_count = Some(15);

        let out = run(&access, &store, state).await.unwrap();

        assert_eq!(out.loop_count, Some(16));
        assert_eq!(out.func_state, Some(FuncState::Error));
        assert_eq!(out.loop_again, Some(LoopAgain::No));
        assert_eq!(
            out.error_message.as_deref(),
            Some("Too many iterations. Exceeded MAX_LOOP of 15")
        );
    }

    #[tokio::test]
    async fn max_loop_itself_still_waits() {
        let access = FakeAccess::new(pending());
        let store = MemoryStore::default();
        let mut state = FunctionState::new(ACCOUNT);
        state.loop_count = Some(14);

        let out = run(&access, &store, state).await.unwrap();

        assert_eq!(out.loop_count, Some(15));
        assert_eq!(out.loop_again, Some(LoopAgain::Yes));
        assert_eq!(out.func_state, Some(FuncState::NotComplete));
    }

    #[tokio::test]
    async fn complete_report_is_uploaded() {
        let access = FakeAccess::new(Generate::Status(ReportStatus::Complete));
        let store = MemoryStore::default();

        let out = run(&access, &store, FunctionState::new(ACCOUNT)).await.unwrap();

        assert_eq!(out.func_state, Some(FuncState::Complete));
        assert_eq!(out.loop_again, Some(LoopAgain::No));
        assert_eq!(
            out.report_file_name.as_deref(),
            Some("credentialReport_111111111111.csv")
        );
        let objects = store.objects.lock().unwrap();
        assert_eq!(
            objects
                .get("2024-03-01/credentialReport_111111111111.csv")
                .map(String::as_str),
            Some(REPORT)
        );
    }

    #[tokio::test]
    async fn assumes_role_in_other_accounts() {
        let access = FakeAccess::new(pending());
        let store = MemoryStore::default();

        run(&access, &store, FunctionState::new(ACCOUNT)).await.unwrap();

        assert_eq!(
            *access.assumed.lock().unwrap(),
            vec![(ACCOUNT.to_string(), "ReportReader".to_string())]
        );
        assert_eq!(*access.ambient.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn own_account_skips_assume_role() {
        let access = FakeAccess::new(Generate::Status(ReportStatus::Complete));
        let store = MemoryStore::default();

        let out = run(&access, &store, FunctionState::new(HOME)).await.unwrap();

        assert_eq!(out.func_state, Some(FuncState::Complete));
        assert!(access.assumed.lock().unwrap().is_empty());
        assert_eq!(*access.ambient.lock().unwrap(), 1);
        assert!(store
            .objects
            .lock()
            .unwrap()
            .contains_key("2024-03-01/credentialReport_999999999999.csv"));
    }

    #[tokio::test]
    async fn throttling_waits_without_error() {
        let access = FakeAccess::new(Generate::Status(ReportStatus::Throttled));
        let store = MemoryStore::default();
        let mut state = FunctionState::new(ACCOUNT);
        state.loop_count = Some(3);

        let out = run(&access, &store, state).await.unwrap();

        assert_eq!(out.loop_count, Some(4));
        assert_eq!(out.loop_again, Some(LoopAgain::Yes));
        assert_eq!(out.func_state, Some(FuncState::NotComplete));
        assert!(out.error_message.is_none());
    }

    #[tokio::test]
    async fn throttling_is_bounded_by_max_loop() {
        let access = FakeAccess::new(Generate::Status(ReportStatus::Throttled));
        let store = MemoryStore::default();
        let mut state = FunctionState::new(ACCOUNT);
        state.loop_count = Some(15);

        let out = run(&access, &store, state).await.unwrap();

        assert_eq!(out.func_state, Some(FuncState::Error));
        assert_eq!(out.loop_again, Some(LoopAgain::No));
        assert!(out.error_message.is_some());
    }

    #[tokio::test]
    async fn missing_account_id_is_fatal() {
        let access = FakeAccess::new(pending());
        let store = MemoryStore::default();

        let err = run(&access, &store, FunctionState::default())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "no accountId was passed to function");
        assert_eq!(*access.ambient.lock().unwrap(), 0);
        assert!(access.assumed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn assume_role_failure_propagates() {
        let mut access = FakeAccess::new(pending());
        access.assume_fails = true;
        let store = MemoryStore::default();

        let err = run(&access, &store, FunctionState::new(ACCOUNT))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("AccessDenied"));
    }

    #[tokio::test]
    async fn generate_failure_propagates() {
        let access = FakeAccess::new(Generate::Fail("ServiceFailure"));
        let store = MemoryStore::default();

        let err = run(&access, &store, FunctionState::new(ACCOUNT))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "ServiceFailure");
    }

    #[tokio::test]
    async fn fetch_failure_propagates_and_uploads_nothing() {
        let mut access = FakeAccess::new(Generate::Status(ReportStatus::Complete));
        access.fetch = Err("ReportExpired");
        let store = MemoryStore::default();

        let err = run(&access, &store, FunctionState::new(ACCOUNT))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "ReportExpired");
        assert!(store.objects.lock().unwrap().is_empty());
    }
}
