use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopAgain {
    Yes,
    No,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FuncState {
    #[serde(rename = "not complete")]
    NotComplete,
    #[serde(rename = "complete")]
    Complete,
    #[serde(rename = "error")]
    Error,
}

/// State threaded through every invocation by the state machine.
///
/// Only `accountId` is set on the first call; each later call receives the
/// previous output. Unrecognised fields are passed back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(alias = "LoopAgain", skip_serializing_if = "Option::is_none")]
    pub loop_again: Option<LoopAgain>,
    #[serde(alias = "LoopCount", skip_serializing_if = "Option::is_none")]
    pub loop_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub func_state: Option<FuncState>,
    #[serde(alias = "ErrorMessage", skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_file_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FunctionState {
    #[cfg(test)]
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            account_id: Some(account_id.into()),
            ..Default::default()
        }
    }

    /// Start a new pass: count it and fill in the fields the first call leaves unset.
    pub fn begin_pass(&mut self) {
        self.loop_count = Some(match self.loop_count {
            Some(count) => count.saturating_add(1),
            None => 0,
        });
        self.loop_again.get_or_insert(LoopAgain::Yes);
        self.func_state.get_or_insert(FuncState::NotComplete);
    }

    pub fn loop_count(&self) -> u32 {
        self.loop_count.unwrap_or_default()
    }

    pub fn wait(mut self) -> Self {
        self.loop_again = Some(LoopAgain::Yes);
        self
    }

    pub fn fail(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self.loop_again = Some(LoopAgain::No);
        self.func_state = Some(FuncState::Error);
        self
    }

    pub fn complete(mut self, report_file_name: impl Into<String>) -> Self {
        self.report_file_name = Some(report_file_name.into());
        self.loop_again = Some(LoopAgain::No);
        self.func_state = Some(FuncState::Complete);
        self
    }
}
