//! Wire format of the ad server API.
//!
//! Requests are JSON arrays of [`OutboundEvent`]s; responses are JSON arrays of
//! objects discriminated by their `type` field, decoded with
//! [`ResponseEvent::from_value`].

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::meta::AdImage;
use crate::reward::{deserialize_rewards, Reward};

pub const API_VERSION: &str = "1.0";
pub const SDK_TYPE: &str = "Web";

// ---------- Outbound ----------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutboundEvent {
    AdRequest(AdRequest),
    AdDismissed(AdDismissed),
    AdStarted(AdStarted),
    TransactionConfirmed(TransactionConfirmed),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdRequest {
    pub placement_id: String,
    pub device_information: String,
    pub language: String,
    pub languages: Vec<String>,
    pub user_data: UserData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    pub api_version: String,
    #[serde(rename = "PlatformType")]
    pub platform_type: String,
    pub sdk_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    pub sdk_version: String,
    pub user_agent: String,
    /// Upper case, e.g. `FEMALE`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facebook_user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdDismissed {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ad_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdStarted {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ad_id: Option<String>,
    #[serde(default)]
    pub custom_parameters: Vec<CustomParameter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomParameter {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionConfirmed {
    pub ad_id: String,
    pub transaction_id: String,
}

// ---------- Inbound ----------

/// When the close button of the ad dialog may be shown. Unknown values mean
/// [`CloseButtonVisibility::Overall`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CloseButtonVisibility {
    #[default]
    Overall,
    BeforeCall2Action,
    AfterCall2Action,
    AfterCall2ActionPlus,
}

impl CloseButtonVisibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseButtonVisibility::Overall => "OVERALL",
            CloseButtonVisibility::BeforeCall2Action => "BEFORE_CALL2ACTION",
            CloseButtonVisibility::AfterCall2Action => "AFTER_CALL2ACTION",
            CloseButtonVisibility::AfterCall2ActionPlus => "AFTER_CALL2ACTION_PLUS",
        }
    }
}

impl From<String> for CloseButtonVisibility {
    fn from(value: String) -> Self {
        match value.as_str() {
            "BEFORE_CALL2ACTION" => CloseButtonVisibility::BeforeCall2Action,
            "AFTER_CALL2ACTION" => CloseButtonVisibility::AfterCall2Action,
            "AFTER_CALL2ACTION_PLUS" => CloseButtonVisibility::AfterCall2ActionPlus,
            _ => CloseButtonVisibility::Overall,
        }
    }
}

impl From<CloseButtonVisibility> for String {
    fn from(value: CloseButtonVisibility) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdCreative {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teaser: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
}

/// An ad offered for this placement.
///
/// Only `url`, `placementId` and `adId` are required; every other field falls
/// back to its default when missing or malformed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdResponse {
    pub url: String,
    pub placement_id: String,
    pub ad_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ad_type: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_rewards")]
    pub rewards: Vec<Reward>,
    #[serde(default, deserialize_with = "deserialize_lenient_vec")]
    pub images: Vec<AdImage>,
    #[serde(
        default,
        deserialize_with = "deserialize_lenient_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub ad: Option<AdCreative>,
    #[serde(
        default,
        deserialize_with = "deserialize_lenient_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub close_button_visibility: Option<CloseButtonVisibility>,
}

impl AdResponse {
    const REQUIRED_FIELDS: [&'static str; 3] = ["url", "placementId", "adId"];

    pub fn has_required_fields(value: &Value) -> bool {
        Self::REQUIRED_FIELDS
            .iter()
            .all(|field| value.get(field).is_some_and(Value::is_string))
    }

    /// Ads without an expiry never expire.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry.is_some_and(|expiry| now >= expiry)
    }
}

/// One element of a response batch.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEvent {
    AdResponse(Box<AdResponse>),
    /// An `adResponse` that lacks required fields.
    InvalidAdResponse(Value),
    /// Raw transaction list; turned into [`crate::Transactions`] by the placement.
    OpenTransactions(Option<Value>),
    AdNoFill { retry_after: Option<DateTime<Utc>> },
    Unknown(Option<String>),
}

impl ResponseEvent {
    pub fn from_value(value: &Value) -> Self {
        let kind = value.get("type").and_then(Value::as_str);
        match kind {
            Some("adResponse") => {
                if !AdResponse::has_required_fields(value) {
                    return ResponseEvent::InvalidAdResponse(value.clone());
                }
                match AdResponse::deserialize(value) {
                    Ok(response) => ResponseEvent::AdResponse(Box::new(response)),
                    Err(e) => {
                        log::warn!("could not decode ad response: {}", e);
                        ResponseEvent::InvalidAdResponse(value.clone())
                    }
                }
            }
            Some("openTransactions") => {
                ResponseEvent::OpenTransactions(value.get("transactions").cloned())
            }
            Some("adNoFill") => ResponseEvent::AdNoFill {
                retry_after: value.get("retryAfter").and_then(timestamp_from_value),
            },
            other => ResponseEvent::Unknown(other.map(str::to_string)),
        }
    }
}

// ---------- Helpers ----------

/// Parse an RFC 3339 timestamp; a bare date (`1970-01-01`, `1970-01-01Z`)
/// means midnight UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    let trimmed = s.strip_suffix('Z').unwrap_or(s);
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Strings are parsed with [`parse_timestamp`], numbers are epoch milliseconds.
pub fn timestamp_from_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let parsed = parse_timestamp(s);
            if parsed.is_none() {
                log::warn!("ignoring unparseable timestamp {:?}", s);
            }
            parsed
        }
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<Value> = Option::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(timestamp_from_value))
}

fn deserialize_lenient_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let items = match Value::deserialize(deserializer)? {
        Value::Array(items) => items,
        _ => Vec::new(),
    };
    Ok(items
        .into_iter()
        .filter_map(|value| serde_json::from_value(value).ok())
        .collect())
}

fn deserialize_lenient_option<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value: Option<Value> = Option::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}
