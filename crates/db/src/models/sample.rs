use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use strum_macros::{Display, EnumString};
use tracing::warn;
use ts_rs::TS;

/// Code recorded for a sensory field that has not been evaluated yet.
pub const NOT_EVALUATED: &str = "N";

/// Remote `samples` table columns, in table order.
pub const REMOTE_COLUMNS: &[&str] = &[
    "id",
    "number",
    "product",
    "ready_time",
    "fabrication",
    "dlc",
    "smell",
    "texture",
    "taste",
    "aspect",
    "ph",
    "enterobacteria",
    "yeast_mold",
    "status",
    "brand",
    "created_at",
    "modified_at",
    "modified_by",
    "site",
    "analysis_type",
    "analysis_delay",
    "reading_day",
    "assigned_to",
    "report_title",
];

/// Workflow state of a sample
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, TS, EnumString, Display, Default)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SampleStatus {
    #[default]
    Pending,
    /// Older rows spell this `inProgress`.
    #[strum(to_string = "in_progress", serialize = "inProgress")]
    InProgress,
    Completed,
    Rejected,
}

impl SampleStatus {
    /// Parse a status column value. Missing or unknown values fall back to `Pending`.
    pub fn from_remote(value: Option<&str>) -> Self {
        match value {
            None | Some("") => SampleStatus::Pending,
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                warn!(status = %raw, "Unknown sample status, treating as pending");
                SampleStatus::Pending
            }),
        }
    }
}

/// Lenient like [`SampleStatus::from_remote`]: null, non-string and unknown values read as `Pending`.
impl<'de> Deserialize<'de> for SampleStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Option::<serde_json::Value>::deserialize(deserializer)? {
            Some(serde_json::Value::String(raw)) => Ok(SampleStatus::from_remote(Some(&raw))),
            Some(other) => {
                warn!(status = %other, "Non-text sample status, treating as pending");
                Ok(SampleStatus::Pending)
            }
            None => Ok(SampleStatus::Pending),
        }
    }
}

/// Identifier of a sample: remote-assigned, or a `local-` fallback for
/// records that only exist in the local mirror.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, TS)]
#[serde(transparent)]
pub struct SampleId(String);

impl SampleId {
    pub const LOCAL_PREFIX: &'static str = "local-";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build a local-only id from a unix timestamp in milliseconds and a random suffix.
    pub fn local(timestamp_millis: i64, suffix: &str) -> Self {
        Self(format!("{}{timestamp_millis}-{suffix}", Self::LOCAL_PREFIX))
    }

    pub fn is_local(&self) -> bool {
        self.0.starts_with(Self::LOCAL_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SampleId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl<'de> Deserialize<'de> for SampleId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        TextOrNumber::deserialize(deserializer).map(|value| SampleId(value.into_string()))
    }
}

/// Remote columns are loosely typed: numeric columns come back as JSON numbers.
#[derive(Deserialize)]
#[serde(untagged)]
enum TextOrNumber {
    Text(String),
    Number(serde_json::Number),
}

impl TextOrNumber {
    fn into_string(self) -> String {
        match self {
            TextOrNumber::Text(text) => text,
            TextOrNumber::Number(number) => number.to_string(),
        }
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Option::<TextOrNumber>::deserialize(deserializer).map(|value| value.map(TextOrNumber::into_string))
}

/// A sample as held in memory and in the local mirror (camelCase fields)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase", default)]
pub struct Sample {
    pub id: SampleId,
    pub number: String,
    pub product: String,
    pub ready_time: String,
    pub fabrication: String,
    pub dlc: String,
    pub smell: String,
    pub texture: String,
    pub taste: String,
    pub aspect: String,
    pub ph: Option<String>,
    pub enterobacteria: Option<String>,
    pub yeast_mold: Option<String>,
    pub status: SampleStatus,
    pub brand: String,
    pub site: String,
    pub created_at: String,
    pub modified_at: String,
    pub modified_by: String,
    pub assigned_to: Option<String>,
    pub report_title: Option<String>,
    pub analysis_type: Option<String>,
    pub analysis_delay: Option<String>,
    pub reading_day: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_local_only: bool,
}

/// A row of the remote `samples` table (snake_case columns, all nullable)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSample {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<SampleId>,
    #[serde(deserialize_with = "lenient_string")]
    pub number: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub product: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub ready_time: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub fabrication: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub dlc: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub smell: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub texture: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub taste: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub aspect: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub ph: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub enterobacteria: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub yeast_mold: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub status: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub brand: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub created_at: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub modified_at: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub modified_by: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub site: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub analysis_type: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub analysis_delay: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub reading_day: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub assigned_to: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub report_title: Option<String>,
}

impl From<RemoteSample> for Sample {
    fn from(row: RemoteSample) -> Self {
        Sample {
            id: row.id.unwrap_or_default(),
            number: row.number.unwrap_or_default(),
            product: row.product.unwrap_or_default(),
            ready_time: row.ready_time.unwrap_or_default(),
            fabrication: row.fabrication.unwrap_or_default(),
            dlc: row.dlc.unwrap_or_default(),
            smell: row.smell.unwrap_or_default(),
            texture: row.texture.unwrap_or_default(),
            taste: row.taste.unwrap_or_default(),
            aspect: row.aspect.unwrap_or_default(),
            ph: row.ph,
            enterobacteria: row.enterobacteria,
            yeast_mold: row.yeast_mold,
            status: SampleStatus::from_remote(row.status.as_deref()),
            brand: row.brand.unwrap_or_default(),
            site: row.site.unwrap_or_default(),
            created_at: row.created_at.unwrap_or_default(),
            modified_at: row.modified_at.unwrap_or_default(),
            modified_by: row.modified_by.unwrap_or_default(),
            assigned_to: row.assigned_to,
            report_title: row.report_title,
            analysis_type: row.analysis_type,
            analysis_delay: row.analysis_delay,
            reading_day: row.reading_day,
            is_local_only: false,
        }
    }
}

impl From<&Sample> for RemoteSample {
    fn from(sample: &Sample) -> Self {
        RemoteSample {
            id: (!sample.is_local_only).then(|| sample.id.clone()),
            number: Some(sample.number.clone()),
            product: Some(sample.product.clone()),
            ready_time: Some(sample.ready_time.clone()),
            fabrication: Some(sample.fabrication.clone()),
            dlc: Some(sample.dlc.clone()),
            smell: Some(sample.smell.clone()),
            texture: Some(sample.texture.clone()),
            taste: Some(sample.taste.clone()),
            aspect: Some(sample.aspect.clone()),
            ph: sample.ph.clone(),
            enterobacteria: sample.enterobacteria.clone(),
            yeast_mold: sample.yeast_mold.clone(),
            status: Some(sample.status.to_string()),
            brand: Some(sample.brand.clone()),
            created_at: Some(sample.created_at.clone()),
            modified_at: Some(sample.modified_at.clone()),
            modified_by: Some(sample.modified_by.clone()),
            site: Some(sample.site.clone()),
            analysis_type: sample.analysis_type.clone(),
            analysis_delay: sample.analysis_delay.clone(),
            reading_day: sample.reading_day.clone(),
            assigned_to: sample.assigned_to.clone(),
            report_title: sample.report_title.clone(),
        }
    }
}

impl Sample {
    /// Local-only record built from an insert candidate that never reached the remote store.
    pub fn local_only(id: SampleId, candidate: RemoteSample) -> Self {
        Sample {
            id,
            is_local_only: true,
            ..Sample::from(candidate)
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn full_row() -> RemoteSample {
        RemoteSample {
            id: Some(SampleId::new("42")),
            number: Some("004".into()),
            product: Some("Yaourt nature".into()),
            ready_time: Some("12:00".into()),
            fabrication: Some("2025-05-02".into()),
            dlc: Some("2025-05-30".into()),
            smell: Some("N".into()),
            texture: Some("A".into()),
            taste: Some("N".into()),
            aspect: Some("B".into()),
            ph: Some("4.5".into()),
            enterobacteria: Some("10".into()),
            yeast_mold: None,
            status: Some("in_progress".into()),
            brand: Some("yaourts".into()),
            created_at: Some("2025-05-02T08:00:00.000Z".into()),
            modified_at: Some("2025-05-02T09:00:00.000Z".into()),
            modified_by: Some("Utilisateur".into()),
            site: Some("BAIKO".into()),
            analysis_type: Some("microbio".into()),
            analysis_delay: Some("24".into()),
            reading_day: None,
            assigned_to: Some("lab".into()),
            report_title: None,
        }
    }

    #[test]
    fn test_remote_to_internal_to_remote_is_identity() {
        let row = full_row();
        let sample = Sample::from(row.clone());
        assert_eq!(RemoteSample::from(&sample), row);
    }

    #[test]
    fn test_internal_to_remote_to_internal_is_identity() {
        let sample = Sample::from(full_row());
        assert_eq!(Sample::from(RemoteSample::from(&sample)), sample);
    }

    #[test]
    fn test_legacy_in_progress_is_normalized() {
        let row: RemoteSample = serde_json::from_value(json!({
            "id": 7,
            "status": "inProgress",
            "brand": "ACME"
        }))
        .unwrap();
        let sample = Sample::from(row);
        assert_eq!(sample.status, SampleStatus::InProgress);
        assert_eq!(RemoteSample::from(&sample).status.as_deref(), Some("in_progress"));
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(SampleStatus::from_remote(None), SampleStatus::Pending);
        assert_eq!(SampleStatus::from_remote(Some("completed")), SampleStatus::Completed);
        assert_eq!(SampleStatus::from_remote(Some("inProgress")), SampleStatus::InProgress);
        assert_eq!(SampleStatus::from_remote(Some("archived")), SampleStatus::Pending);
        assert_eq!(SampleStatus::InProgress.to_string(), "in_progress");

        let status: SampleStatus = serde_json::from_value(json!("inProgress")).unwrap();
        assert_eq!(status, SampleStatus::InProgress);
    }

    #[test]
    fn test_numeric_columns_are_read_as_text() {
        let row: RemoteSample = serde_json::from_value(json!({
            "id": 42,
            "ph": 4.5,
            "analysis_delay": 48,
            "product": null
        }))
        .unwrap();
        assert_eq!(row.id, Some(SampleId::new("42")));
        assert_eq!(row.ph.as_deref(), Some("4.5"));
        assert_eq!(row.analysis_delay.as_deref(), Some("48"));
        assert_eq!(row.product, None);
    }

    #[test]
    fn test_remote_row_serializes_known_columns_only() {
        let value = serde_json::to_value(full_row()).unwrap();
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        for key in &keys {
            assert!(REMOTE_COLUMNS.contains(key), "unexpected column {key}");
        }
        assert_eq!(keys.len(), REMOTE_COLUMNS.len());
    }

    #[test]
    fn test_insert_payload_omits_id() {
        let mut sample = Sample::from(full_row());
        sample.id = SampleId::local(1_714_000_000_000, "abc1234");
        sample.is_local_only = true;
        let value = serde_json::to_value(RemoteSample::from(&sample)).unwrap();
        assert!(value.get("id").is_none());
    }

    #[test]
    fn test_local_flag_skipped_when_false() {
        let sample = Sample::from(full_row());
        let value = serde_json::to_value(&sample).unwrap();
        assert!(value.get("isLocalOnly").is_none());
        assert_eq!(value["yeastMold"], serde_json::Value::Null);
        assert_eq!(value["readyTime"], "12:00");

        let local = Sample::local_only(SampleId::local(1, "x"), full_row());
        let value = serde_json::to_value(&local).unwrap();
        assert_eq!(value["isLocalOnly"], true);
    }

    #[test]
    fn test_local_id_format() {
        let id = SampleId::local(1_714_000_000_000, "k3j9a0b");
        assert_eq!(id.as_str(), "local-1714000000000-k3j9a0b");
        assert!(id.is_local());
        assert!(!SampleId::new("42").is_local());
    }

    #[test]
    fn test_mirror_record_with_null_or_unknown_status_still_parses() {
        let samples: Vec<Sample> = serde_json::from_value(json!([
            { "id": "o1", "brand": "OTHER", "status": null },
            { "id": "o2", "brand": "OTHER", "status": "archived" },
            { "id": "o3", "brand": "OTHER", "status": 3 },
            { "id": "o4", "brand": "OTHER", "status": "inProgress" }
        ]))
        .unwrap();
        let statuses: Vec<SampleStatus> = samples.iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            vec![
                SampleStatus::Pending,
                SampleStatus::Pending,
                SampleStatus::Pending,
                SampleStatus::InProgress
            ]
        );
    }

    #[test]
    fn test_partial_mirror_record_deserializes_with_defaults() {
        let sample: Sample = serde_json::from_value(json!({
            "id": "local-1-abc",
            "brand": "ACME",
            "isLocalOnly": true
        }))
        .unwrap();
        assert_eq!(sample.brand, "ACME");
        assert!(sample.is_local_only);
        assert_eq!(sample.status, SampleStatus::Pending);
        assert!(sample.ph.is_none());
    }
}
