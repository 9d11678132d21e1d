use serde::{Deserialize, Serialize};
use ts_rs::TS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
pub enum ToastVariant {
    Default,
    Destructive,
}

/// User-facing notification attached to an operation outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct Toast {
    pub title: String,
    pub description: String,
    pub variant: ToastVariant,
}

impl Toast {
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            variant: ToastVariant::Default,
        }
    }

    pub fn destructive(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            variant: ToastVariant::Destructive,
        }
    }

    pub fn offline_query_failed() -> Self {
        Self::destructive(
            "Offline mode enabled",
            "Unable to fetch samples from the database",
        )
    }

    pub fn offline_unreachable() -> Self {
        Self::destructive(
            "Error",
            "Unable to fetch samples. Offline mode enabled.",
        )
    }

    pub fn sample_added() -> Self {
        Self::info("Success", "Sample added successfully")
    }

    pub fn sample_saved_locally() -> Self {
        Self::info(
            "Sample added (local mode)",
            "Sample saved locally. Synchronise later once the connection is restored.",
        )
    }

    pub fn sample_add_failed() -> Self {
        Self::destructive("Error", "Unable to add the sample")
    }

    pub fn sync_unavailable() -> Self {
        Self::destructive(
            "Synchronisation unavailable",
            "The database is still unreachable. Samples remain saved locally.",
        )
    }

    pub fn synchronized(pushed: usize, remaining: usize) -> Self {
        if remaining == 0 {
            Self::info(
                "Synchronisation complete",
                format!("{pushed} sample(s) sent to the database"),
            )
        } else {
            Self::destructive(
                "Synchronisation incomplete",
                format!("{pushed} sample(s) sent, {remaining} still saved locally"),
            )
        }
    }
}
