//! Sample store: remote-first reads and writes with a local mirror fallback.
//!
//! No mode flag is kept between calls. Every operation receives the caller's
//! [`SampleBook`] tagged with the mode it was last seen in ([`Synced`]) and
//! hands back the updated book with the mode the operation ended in.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use db::models::sample::{NOT_EVALUATED, RemoteSample, Sample, SampleId, SampleStatus};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use ts_rs::TS;

use super::{
    local_mirror::{LocalMirror, union_by_id},
    notification::Toast,
    remote_store::{RemoteError, RemoteStore, SampleQuery},
};

pub const DEFAULT_PRODUCT: &str = "Crème dessert vanille";
pub const DEFAULT_READY_TIME: &str = "12:00";
pub const DEFAULT_MODIFIED_BY: &str = "Utilisateur";
pub const DEFAULT_SITE: &str = "R1";

const LOCAL_SUFFIX_LEN: usize = 7;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Error)]
pub enum SampleError {
    #[error("brand is required")]
    MissingBrand,
    #[error("invalid {field}: {value:?}")]
    InvalidField { field: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Online,
    Offline,
}

/// A value tagged with the connectivity mode it was produced in
#[derive(Debug, Clone, PartialEq)]
pub enum Synced<T> {
    Online(T),
    Offline(T),
}

impl<T> Synced<T> {
    pub fn new(mode: Mode, value: T) -> Self {
        match mode {
            Mode::Online => Synced::Online(value),
            Mode::Offline => Synced::Offline(value),
        }
    }

    pub fn mode(&self) -> Mode {
        match self {
            Synced::Online(_) => Mode::Online,
            Synced::Offline(_) => Mode::Offline,
        }
    }

    pub fn is_online(&self) -> bool {
        self.mode() == Mode::Online
    }

    pub fn get(&self) -> &T {
        match self {
            Synced::Online(value) | Synced::Offline(value) => value,
        }
    }

    pub fn into_inner(self) -> T {
        self.into_parts().1
    }

    pub fn into_parts(self) -> (Mode, T) {
        match self {
            Synced::Online(value) => (Mode::Online, value),
            Synced::Offline(value) => (Mode::Offline, value),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Synced<U> {
        let (mode, value) = self.into_parts();
        Synced::new(mode, f(value))
    }
}

/// The samples known for one brand
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
pub struct SampleBook {
    pub brand: String,
    pub samples: Vec<Sample>,
}

impl SampleBook {
    pub fn new(brand: impl Into<String>) -> Self {
        Self {
            brand: brand.into(),
            samples: Vec::new(),
        }
    }
}

/// Optional field values supplied when adding a sample
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase", default)]
pub struct SampleOverrides {
    pub ready_time: Option<String>,
    pub fabrication: Option<String>,
    pub dlc: Option<String>,
    pub enterobacteria: Option<String>,
    pub yeast_mold: Option<String>,
    pub modified_by: Option<String>,
    pub site: Option<String>,
    pub analysis_type: Option<String>,
    pub analysis_delay: Option<String>,
    pub reading_day: Option<String>,
}

/// Request to add a sample to a brand
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(default)]
pub struct NewSample {
    pub product: Option<String>,
    pub overrides: SampleOverrides,
}

impl NewSample {
    pub fn product(product: impl Into<String>) -> Self {
        Self {
            product: Some(product.into()),
            ..Self::default()
        }
    }

    pub fn with_overrides(mut self, overrides: SampleOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Assemble the row to insert, filling every required column.
    fn into_candidate(
        self,
        brand: &str,
        number: String,
        now: DateTime<Utc>,
    ) -> Result<RemoteSample, SampleError> {
        if brand.trim().is_empty() {
            return Err(SampleError::MissingBrand);
        }

        let today = now.date_naive().format("%Y-%m-%d").to_string();
        let timestamp = now.to_rfc3339_opts(SecondsFormat::Millis, true);
        let SampleOverrides {
            ready_time,
            fabrication,
            dlc,
            enterobacteria,
            yeast_mold,
            modified_by,
            site,
            analysis_type,
            analysis_delay,
            reading_day,
        } = self.overrides;

        let ready_time = present(ready_time)
            .map(|value| checked_time("readyTime", value))
            .transpose()?
            .unwrap_or_else(|| DEFAULT_READY_TIME.to_string());
        let fabrication = present(fabrication)
            .map(|value| checked_date("fabrication", value))
            .transpose()?
            .unwrap_or_else(|| today.clone());
        let dlc = present(dlc)
            .map(|value| checked_date("dlc", value))
            .transpose()?
            .unwrap_or(today);

        Ok(RemoteSample {
            id: None,
            number: Some(number),
            product: Some(present(self.product).unwrap_or_else(|| DEFAULT_PRODUCT.to_string())),
            ready_time: Some(ready_time),
            fabrication: Some(fabrication),
            dlc: Some(dlc),
            smell: Some(NOT_EVALUATED.to_string()),
            texture: Some(NOT_EVALUATED.to_string()),
            taste: Some(NOT_EVALUATED.to_string()),
            aspect: Some(NOT_EVALUATED.to_string()),
            ph: Some(String::new()),
            enterobacteria: present(enterobacteria),
            yeast_mold: present(yeast_mold),
            status: Some(SampleStatus::Pending.to_string()),
            brand: Some(brand.to_string()),
            created_at: Some(timestamp.clone()),
            modified_at: Some(timestamp),
            modified_by: Some(present(modified_by).unwrap_or_else(|| DEFAULT_MODIFIED_BY.to_string())),
            site: Some(present(site).unwrap_or_else(|| DEFAULT_SITE.to_string())),
            analysis_type: present(analysis_type),
            analysis_delay: present(analysis_delay),
            reading_day: present(reading_day),
            assigned_to: None,
            report_title: None,
        })
    }
}

/// Empty strings count as "not provided".
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn checked_date(field: &'static str, value: String) -> Result<String, SampleError> {
    match NaiveDate::parse_from_str(&value, "%Y-%m-%d") {
        Ok(_) => Ok(value),
        Err(_) => Err(SampleError::InvalidField { field, value }),
    }
}

fn checked_time(field: &'static str, value: String) -> Result<String, SampleError> {
    match NaiveTime::parse_from_str(&value, "%H:%M") {
        Ok(_) => Ok(value),
        Err(_) => Err(SampleError::InvalidField { field, value }),
    }
}

#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub book: Synced<SampleBook>,
    pub toast: Option<Toast>,
}

#[derive(Debug, Clone)]
pub struct AddOutcome {
    pub book: Synced<SampleBook>,
    /// Remote or local id of the new sample; `None` when it could not be built.
    pub id: Option<SampleId>,
    pub toast: Toast,
}

#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub book: Synced<SampleBook>,
    pub pushed: usize,
    pub remaining: usize,
    pub toast: Toast,
}

pub struct SampleStore {
    remote: Arc<dyn RemoteStore>,
    mirror: LocalMirror,
}

impl SampleStore {
    pub fn new(remote: Arc<dyn RemoteStore>, mirror: LocalMirror) -> Self {
        Self { remote, mirror }
    }

    pub fn mirror(&self) -> &LocalMirror {
        &self.mirror
    }

    /// Fetch every sample of `brand`, newest first, falling back to the mirror.
    pub async fn load(&self, brand: &str) -> Result<LoadOutcome, SampleError> {
        let brand = brand.trim();
        if brand.is_empty() {
            return Err(SampleError::MissingBrand);
        }

        match self.remote.select(&SampleQuery::for_brand(brand)).await {
            Ok(rows) => {
                let mut samples: Vec<Sample> = rows
                    .into_iter()
                    .map(|row| with_brand(Sample::from(row), brand))
                    .collect();

                // Records added while offline are not on the remote yet.
                let pending: Vec<Sample> = self
                    .mirror
                    .read(brand)
                    .await
                    .into_iter()
                    .filter(|local| local.is_local_only && !samples.iter().any(|s| s.id == local.id))
                    .collect();
                if !pending.is_empty() {
                    info!(
                        brand = %brand,
                        pending = pending.len(),
                        "Keeping local-only samples awaiting synchronisation"
                    );
                }
                samples.extend(pending);

                let book = SampleBook {
                    brand: brand.to_string(),
                    samples,
                };
                self.mirror_book(&book).await;
                info!(brand = %brand, count = book.samples.len(), "Loaded samples from remote store");

                Ok(LoadOutcome {
                    book: Synced::Online(book),
                    toast: None,
                })
            }
            Err(e) => {
                error!(
                    brand = %brand,
                    error = %e,
                    "Failed to fetch samples from remote store, switching to offline mode"
                );
                let toast = if e.is_unreachable() {
                    Toast::offline_unreachable()
                } else {
                    Toast::offline_query_failed()
                };
                let book = SampleBook {
                    brand: brand.to_string(),
                    samples: self.mirror.read(brand).await,
                };

                Ok(LoadOutcome {
                    book: Synced::Offline(book),
                    toast: Some(toast),
                })
            }
        }
    }

    /// Add a sample: remote insert when online, local-only record otherwise.
    pub async fn add_sample(&self, book: Synced<SampleBook>, request: NewSample) -> AddOutcome {
        let (mode, mut book) = book.into_parts();
        let mirrored = self.mirror.read(&book.brand).await;
        let number = next_number(&book, &mirrored);
        let now = Utc::now();

        let candidate = match request.into_candidate(&book.brand, number, now) {
            Ok(candidate) => candidate,
            Err(e) => {
                error!(brand = %book.brand, error = %e, "Failed to build sample");
                return AddOutcome {
                    book: Synced::new(mode, book),
                    id: None,
                    toast: Toast::sample_add_failed(),
                };
            }
        };
        debug!(brand = %book.brand, number = ?candidate.number, "Sample candidate built");
        adopt_mirrored(&mut book, mirrored);

        if mode == Mode::Online {
            match self.insert_remote(&candidate).await {
                Ok(row) => {
                    let sample = with_brand(Sample::from(row), &book.brand);
                    let id = sample.id.clone();
                    book.samples.push(sample);
                    self.mirror_book(&book).await;
                    info!(brand = %book.brand, id = %id, "Sample inserted in remote store");

                    return AddOutcome {
                        book: Synced::Online(book),
                        id: Some(id),
                        toast: Toast::sample_added(),
                    };
                }
                Err(e) => {
                    warn!(
                        brand = %book.brand,
                        error = %e,
                        "Remote insert unavailable, saving sample locally"
                    );
                }
            }
        }

        let id = SampleId::local(now.timestamp_millis(), &random_suffix());
        book.samples.push(Sample::local_only(id.clone(), candidate));
        self.mirror_book(&book).await;
        info!(brand = %book.brand, id = %id, "Sample saved locally");

        AddOutcome {
            book: Synced::Offline(book),
            id: Some(id),
            toast: Toast::sample_saved_locally(),
        }
    }

    /// Push local-only samples to the remote store, stopping at the first failure.
    pub async fn synchronize(&self, book: Synced<SampleBook>) -> SyncOutcome {
        let mut book = book.into_inner();
        let pending: Vec<usize> = book
            .samples
            .iter()
            .enumerate()
            .filter(|(_, sample)| sample.is_local_only)
            .map(|(index, _)| index)
            .collect();

        if let Err(e) = self.remote.select(&SampleQuery::probe()).await {
            warn!(brand = %book.brand, error = %e, "Remote store unavailable, synchronisation skipped");
            return SyncOutcome {
                remaining: pending.len(),
                book: Synced::Offline(book),
                pushed: 0,
                toast: Toast::sync_unavailable(),
            };
        }

        let mut pushed = 0;
        let mut interrupted = false;
        for index in pending {
            let row = RemoteSample::from(&book.samples[index]);
            match self.remote.insert(&row).await.and_then(require_id) {
                Ok(stored) => {
                    debug!(
                        local_id = %book.samples[index].id,
                        "Local sample pushed to remote store"
                    );
                    book.samples[index] = with_brand(Sample::from(stored), &book.brand);
                    pushed += 1;
                }
                Err(e) => {
                    warn!(brand = %book.brand, error = %e, "Synchronisation interrupted");
                    interrupted = true;
                    break;
                }
            }
        }

        self.mirror_book(&book).await;
        let remaining = book.samples.iter().filter(|s| s.is_local_only).count();
        info!(brand = %book.brand, pushed, remaining, "Synchronisation finished");

        let mode = if interrupted { Mode::Offline } else { Mode::Online };
        SyncOutcome {
            book: Synced::new(mode, book),
            pushed,
            remaining,
            toast: Toast::synchronized(pushed, remaining),
        }
    }

    /// Existence check first, so a dead backend never sees the write.
    async fn insert_remote(&self, candidate: &RemoteSample) -> Result<RemoteSample, RemoteError> {
        self.remote.select(&SampleQuery::probe()).await?;
        self.remote.insert(candidate).await.and_then(require_id)
    }

    async fn mirror_book(&self, book: &SampleBook) {
        if let Err(e) = self.mirror.write(&book.brand, &book.samples).await {
            error!(brand = %book.brand, error = %e, "Failed to save samples to local mirror");
        }
    }
}

/// Display number of the next sample: known samples (memory and mirror) + 1.
fn next_number(book: &SampleBook, mirrored: &[Sample]) -> String {
    let known = union_by_id(&book.samples, mirrored).count();
    format!("{:03}", known + 1)
}

/// Append mirrored records the book does not hold yet, so rewriting the
/// brand slice from the book cannot drop them.
fn adopt_mirrored(book: &mut SampleBook, mirrored: Vec<Sample>) {
    let missing: Vec<Sample> = mirrored
        .into_iter()
        .filter(|stored| !book.samples.iter().any(|s| s.id == stored.id))
        .collect();
    if !missing.is_empty() {
        debug!(brand = %book.brand, adopted = missing.len(), "Adopted mirrored samples into book");
    }
    book.samples.extend(missing);
}

fn require_id(row: RemoteSample) -> Result<RemoteSample, RemoteError> {
    if row.id.is_some() { Ok(row) } else { Err(RemoteError::Empty) }
}

fn with_brand(mut sample: Sample, brand: &str) -> Sample {
    if sample.brand.is_empty() {
        sample.brand = brand.to_string();
    }
    sample
}

fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..LOCAL_SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect()
}
