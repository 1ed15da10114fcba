use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::answer::AnswerPayload;
use crate::models::question::{OptionView, QuestionKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    InProgress,
    Submitted,
    Error,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::InProgress => "IN_PROGRESS",
            SessionStatus::Submitted => "SUBMITTED",
            SessionStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN_PROGRESS" => Ok(SessionStatus::InProgress),
            "SUBMITTED" => Ok(SessionStatus::Submitted),
            "ERROR" => Ok(SessionStatus::Error),
            other => Err(format!("unknown session status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub test_assessment_id: i64,
    pub blueprint_id: Option<i64>,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub marked_at: Option<DateTime<Utc>>,
    pub score: Decimal,
    pub ip_address: Option<IpAddr>,
    pub user_agent: Option<String>,
    /// Taken from the owning test assessment when the row is read.
    pub duration_minutes: Option<i32>,
}

impl TestSession {
    /// `None` when the test has no duration configured.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        match self.duration_minutes {
            Some(minutes) if minutes > 0 => {
                Some(self.started_at + Duration::minutes(minutes as i64))
            }
            _ => None,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().map(|end| now > end).unwrap_or(false)
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted_at.is_some()
    }

    /// What clients see as "expired": past the deadline and not yet submitted.
    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_submitted() && self.is_expired_at(now)
    }
}

#[derive(Debug, Clone)]
pub struct NewTestSession {
    pub user_id: Uuid,
    pub test_assessment_id: i64,
    pub blueprint_id: Option<i64>,
    pub ip_address: Option<IpAddr>,
    pub user_agent: Option<String>,
}

/// A question frozen into a session at creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSessionQuestion {
    pub id: Uuid,
    pub test_session_id: Uuid,
    pub question_id: i64,
    pub question_kind: QuestionKind,
    pub order: i32,
    pub snapshot_text: String,
    pub snapshot_options: Vec<OptionView>,
}

#[derive(Debug, Clone)]
pub struct NewSessionQuestion {
    pub question_id: i64,
    pub question_kind: QuestionKind,
    pub order: i32,
    pub snapshot_text: String,
    pub snapshot_options: Vec<OptionView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSessionAnswer {
    pub id: Uuid,
    pub session_question_id: Uuid,
    pub payload: AnswerPayload,
    pub is_correct: Option<bool>,
    pub answered_at: DateTime<Utc>,
}
