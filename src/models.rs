use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type RecordId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SurveyKind {
    Cancellation,
    Followup,
}

impl SurveyKind {
    pub fn label(self) -> &'static str {
        match self {
            SurveyKind::Cancellation => "cancellation",
            SurveyKind::Followup => "follow-up",
        }
    }
}

impl fmt::Display for SurveyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Opaque per-device token, generated once and reused for the lifetime of the
/// local profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn generate() -> Self {
        Self(format!("device_{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancellationResponse {
    /// Assigned by the store; filled in on read.
    #[serde(skip_serializing)]
    pub id: RecordId,
    pub submitted_at: DateTime<Utc>,
    pub proposal_adjusted: bool,
    pub attention_met: bool,
    pub found_alternative: bool,
    pub main_reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<DeviceId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowupResponse {
    #[serde(skip_serializing)]
    pub id: RecordId,
    pub submitted_at: DateTime<Utc>,
    pub blocking_aspect: String,
    pub wants_adjustment: bool,
    pub team_attention: String,
    pub wants_visit_or_call: bool,
    pub wants_contact_24h: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<DeviceId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceGateRecord {
    pub device_id: DeviceId,
    pub recorded_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
}

/// Records the dashboard can filter by submission time.
pub trait Timestamped {
    fn timestamp(&self) -> DateTime<Utc>;
}

impl Timestamped for CancellationResponse {
    fn timestamp(&self) -> DateTime<Utc> {
        self.submitted_at
    }
}

impl Timestamped for FollowupResponse {
    fn timestamp(&self) -> DateTime<Utc> {
        self.submitted_at
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total_cancellations: usize,
    pub total_followups: usize,
    pub cancellation: Option<CancellationStats>,
    pub followup: Option<FollowupStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancellationStats {
    pub proposal_adjusted: u32,
    pub attention_met: u32,
    pub found_alternative: u32,
    pub main_reasons: Tally,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowupStats {
    pub wants_adjustment: u32,
    pub wants_visit_or_call: u32,
    pub wants_contact_24h: u32,
    pub blocking_aspects: Tally,
    pub team_attention: Tally,
}

/// Exact-text frequency counter that remembers first-occurrence order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tally {
    entries: Vec<(String, usize)>,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: &str) {
        match self.entries.iter_mut().find(|(existing, _)| existing == key) {
            Some((_, count)) => *count += 1,
            None => self.entries.push((key.to_string(), 1)),
        }
    }

    pub fn get(&self, key: &str) -> usize {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.entries.iter().map(|(_, count)| count).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.entries
            .iter()
            .map(|(key, count)| (key.as_str(), *count))
    }
}

impl<'a> FromIterator<&'a str> for Tally {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut tally = Tally::new();
        for key in iter {
            tally.add(key);
        }
        tally
    }
}

impl Serialize for Tally {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, count) in &self.entries {
            map.serialize_entry(key, count)?;
        }
        map.end()
    }
}
