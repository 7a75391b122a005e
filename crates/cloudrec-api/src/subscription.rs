//! Subscription notification actions
//!
//! An [`ActionItem`] is one row of the action list inside a subscription
//! draft. `idx` only addresses the row while the draft is being edited; it is
//! not a server identity and is stripped before submission
//! (see [`SubmittedAction`]).

use serde::{Deserialize, Serialize};

use cloudrec_common::CloudRecError;

use crate::validation::{validate_target_name, validate_time_of_day, validate_url};

/// When the notification fires
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    /// Scheduled digest at fixed times
    Timing,
    /// Fired as soon as a matching risk appears
    Realtime,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Timing => "timing",
            ActionType::Realtime => "realtime",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ActionType {
    type Err = CloudRecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "timing" => Ok(ActionType::Timing),
            "realtime" => Ok(ActionType::Realtime),
            _ => Err(CloudRecError::Validation(format!(
                "unknown action type '{}'",
                s
            ))),
        }
    }
}

/// Where the notification is delivered
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotifyChannel {
    DingGroup,
    Wechat,
    InterfaceCallback,
}

impl NotifyChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyChannel::DingGroup => "dingGroup",
            NotifyChannel::Wechat => "wechat",
            NotifyChannel::InterfaceCallback => "interfaceCallback",
        }
    }

    /// Group chat channels address a named group; callbacks only need a url
    pub fn needs_group_name(&self) -> bool {
        !matches!(self, NotifyChannel::InterfaceCallback)
    }
}

/// Type-specific fields of an action, edited through the action's sub-form
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<NotifyChannel>,
    /// Group chat name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Webhook of the group, or the callback endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub time_list: Vec<String>,
}

impl ActionFields {
    pub fn is_empty(&self) -> bool {
        self == &ActionFields::default()
    }

    /// Check that the fields form a complete configuration for `action_type`
    pub fn validate_for(&self, action_type: ActionType) -> Result<(), CloudRecError> {
        let channel = self
            .action
            .ok_or_else(|| invalid(action_type, "notification channel is required"))?;

        if action_type == ActionType::Timing && channel == NotifyChannel::InterfaceCallback {
            return Err(invalid(
                action_type,
                "interface callbacks are only available for realtime notifications",
            ));
        }

        if channel.needs_group_name() {
            let name = self.name.as_deref().unwrap_or_default();
            validate_target_name(name).map_err(|e| invalid(action_type, &e.code))?;
        }

        let url = self.url.as_deref().unwrap_or_default();
        validate_url(url).map_err(|e| invalid(action_type, &e.code))?;

        if action_type == ActionType::Timing {
            if self.period.as_deref().is_none_or(|p| p.trim().is_empty()) {
                return Err(invalid(action_type, "period is required"));
            }
            if self.time_list.is_empty() {
                return Err(invalid(action_type, "at least one notification time is required"));
            }
            for time in &self.time_list {
                validate_time_of_day(time).map_err(|e| invalid(action_type, &e.code))?;
            }
        }
        Ok(())
    }
}

fn invalid(action_type: ActionType, reason: &str) -> CloudRecError {
    CloudRecError::Validation(format!("{} action: {}", action_type, reason))
}

/// One row of a subscription draft's action list
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionItem {
    pub idx: u32,
    pub action_type: ActionType,
    #[serde(flatten)]
    pub fields: ActionFields,
}

impl ActionItem {
    /// A freshly added row; its fields are filled in later by a sub-form
    pub fn new(idx: u32, action_type: ActionType) -> Self {
        Self {
            idx,
            action_type,
            fields: ActionFields::default(),
        }
    }

    pub fn validate(&self) -> Result<(), CloudRecError> {
        self.fields.validate_for(self.action_type)
    }

    /// Whether the row has been configured through its sub-form yet
    pub fn is_configured(&self) -> bool {
        !self.fields.is_empty()
    }

    pub fn into_submitted(self) -> SubmittedAction {
        SubmittedAction {
            action_type: self.action_type,
            fields: self.fields,
        }
    }
}

/// An action as stored by the backend: no `idx`, order is significant
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedAction {
    pub action_type: ActionType,
    #[serde(flatten)]
    pub fields: ActionFields,
}
