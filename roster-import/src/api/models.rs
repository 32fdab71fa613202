//! Record and request types for the roster directory service

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A user account as returned by the directory service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    /// Account identifier (UUID string)
    pub uuid: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// A group as returned by the directory service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRecord {
    /// Group identifier (UUID string)
    pub uuid: String,
    /// Display name
    pub title: String,
}

/// An event as returned by the directory service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub uuid: String,
    pub title: String,
}

/// Request body for creating a standalone user account
#[derive(Debug, Clone, Serialize)]
pub struct NewUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub gender: String,
    pub birth_date: NaiveDate,
    /// Extra profile fields passed through untouched
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Request body for creating (or linking) a child account under a parent
///
/// Two uses: creating a new child (profile fields set, `child_uuid` empty),
/// and linking an already-existing child to a second parent (`child_uuid`
/// set, profile fields ignored by the service).
#[derive(Debug, Clone, Default, Serialize)]
pub struct NewChild {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    /// Contact email, if the sheet provided one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Ask the service to synthesize a platform email address
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub synthesize_email: bool,
    /// Link this existing account instead of creating a new one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_uuid: Option<String>,
}

impl NewChild {
    /// Build a link-only request for attaching an existing child to a parent
    pub fn link(child_uuid: impl Into<String>) -> Self {
        Self {
            child_uuid: Some(child_uuid.into()),
            ..Self::default()
        }
    }
}

/// Request body for creating a group
#[derive(Debug, Clone, Serialize)]
pub struct NewGroup {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Postal address fields (`zip`, `city`, ...) straight from the sheet
    pub location: HashMap<String, String>,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_type: Option<String>,
    /// Identifiers of parent groups this group nests under
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub groups_above: Vec<String>,
}

/// Request body for creating an event
#[derive(Debug, Clone, Serialize)]
pub struct NewEvent {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Identifiers of the groups involved
    pub group_uuids: Vec<String>,
    pub duration_minutes: i64,
}

/// How a member pays their group fee
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Full,
    Plan,
}

impl PaymentMethod {
    /// Map a sheet `group_fee` value to a payment method
    pub fn from_fee(fee: &str) -> Option<Self> {
        match fee {
            "full" => Some(PaymentMethod::Full),
            "plan" => Some(PaymentMethod::Plan),
            _ => None,
        }
    }
}

/// Request body for joining a user to a group
#[derive(Debug, Clone, Serialize)]
pub struct GroupJoin {
    pub group_uuid: String,
    pub user_uuid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<PaymentMethod>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub webform_ids: Vec<String>,
}

impl GroupJoin {
    /// Join with no role, payment, or webforms
    pub fn plain(group_uuid: impl Into<String>, user_uuid: impl Into<String>) -> Self {
        Self {
            group_uuid: group_uuid.into(),
            user_uuid: user_uuid.into(),
            role: None,
            payment: None,
            webform_ids: Vec::new(),
        }
    }
}
