use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::SitekickError;

// ---------------------------------------------------------------------------
// EventType
// ---------------------------------------------------------------------------

/// Customer-facing lifecycle emails guarded by the notification gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    DemoReady,
    WebsiteLaunch,
}

impl EventType {
    pub fn all() -> &'static [EventType] {
        &[EventType::DemoReady, EventType::WebsiteLaunch]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventType::DemoReady => "demo_ready",
            EventType::WebsiteLaunch => "website_launch",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = SitekickError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "demo_ready" => Ok(EventType::DemoReady),
            "website_launch" => Ok(EventType::WebsiteLaunch),
            _ => Err(SitekickError::InvalidEventType(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// EmailOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailOutcome {
    Sent,
    Failed,
}

impl EmailOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            EmailOutcome::Sent => "sent",
            EmailOutcome::Failed => "failed",
        }
    }
}

impl fmt::Display for EmailOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EmailOutcome {
    type Err = SitekickError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(EmailOutcome::Sent),
            "failed" => Ok(EmailOutcome::Failed),
            _ => Err(SitekickError::InvalidOutcome(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// ProjectStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    NotTouched,
    InProgress,
    Complete,
    Live,
}

impl ProjectStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProjectStatus::NotTouched => "not_touched",
            ProjectStatus::InProgress => "in_progress",
            ProjectStatus::Complete => "complete",
            ProjectStatus::Live => "live",
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProjectStatus {
    type Err = SitekickError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_touched" => Ok(ProjectStatus::NotTouched),
            "in_progress" => Ok(ProjectStatus::InProgress),
            "complete" => Ok(ProjectStatus::Complete),
            "live" => Ok(ProjectStatus::Live),
            _ => Err(SitekickError::InvalidProjectStatus(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// PaymentStatus
// ---------------------------------------------------------------------------

/// Lifecycle of a payment row. Reconciliation only ever moves a row out of
/// `Pending`; the cancellation states are owned by the billing screens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
    ScheduledForCancellation,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::ScheduledForCancellation => "scheduled_for_cancellation",
        }
    }

    pub fn is_terminal(self) -> bool {
        match self {
            PaymentStatus::Completed | PaymentStatus::Failed | PaymentStatus::Cancelled => true,
            PaymentStatus::Pending | PaymentStatus::ScheduledForCancellation => false,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = SitekickError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            "cancelled" => Ok(PaymentStatus::Cancelled),
            "scheduled_for_cancellation" => Ok(PaymentStatus::ScheduledForCancellation),
            _ => Err(SitekickError::InvalidPaymentStatus(s.to_string())),
        }
    }
}
