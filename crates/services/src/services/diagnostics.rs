//! Checks run against the remote store when samples keep falling back to offline mode.
//!
//! The usual culprit is row-level security enabled on the sample table without
//! policies allowing the anonymous key to read or insert.

use std::fmt;

use chrono::{SecondsFormat, Utc};
use db::models::sample::{NOT_EVALUATED, RemoteSample};
use serde_json::{Value, json};
use tracing::{info, warn};

use super::remote_store::{RemoteError, RemoteStore, SampleQuery};

const RLS_STATUS_FUNCTION: &str = "get_rls_status";
const EXEC_SQL_FUNCTION: &str = "exec_sql";

/// Enables row-level security and installs permissive policies for the anonymous role.
pub const PERMISSIVE_POLICIES_SQL: &str = r#"
ALTER TABLE public.samples
ENABLE ROW LEVEL SECURITY;

CREATE POLICY "Allow anonymous read"
ON public.samples
FOR SELECT
USING (true);

CREATE POLICY "Allow anonymous insert"
ON public.samples
FOR INSERT
WITH CHECK (true);

CREATE POLICY "Allow anonymous update"
ON public.samples
FOR UPDATE
USING (true)
WITH CHECK (true);
"#;

pub const RECOMMENDATIONS: &[&str] = &[
    "Check that row-level security is configured on the samples table",
    "Make sure policies allow SELECT, INSERT and UPDATE for the key in use",
    "In the database console: Authentication > Policies, select the 'samples' table",
    "Enable RLS if needed and add SELECT, INSERT and UPDATE policies with the condition (true)",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Pass,
    Warn,
    Fail,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Outcome::Pass => "ok",
            Outcome::Warn => "warn",
            Outcome::Fail => "fail",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub check: &'static str,
    pub outcome: Outcome,
    pub detail: String,
}

impl Finding {
    fn new(check: &'static str, outcome: Outcome, detail: impl Into<String>) -> Self {
        let finding = Self {
            check,
            outcome,
            detail: detail.into(),
        };
        match outcome {
            Outcome::Pass => info!(check, detail = %finding.detail, "Diagnostic passed"),
            Outcome::Warn | Outcome::Fail => {
                warn!(check, outcome = %outcome, detail = %finding.detail, "Diagnostic issue")
            }
        }
        finding
    }
}

/// What the access-policy probe concluded
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyStatus {
    /// The backend reported its status directly.
    Reported(Value),
    /// Reads work but inserts are refused: RLS without an insert policy.
    InsertBlocked,
    /// Reads are refused: RLS without a read policy.
    ReadBlocked,
    /// Inserts work: RLS is off or correctly configured.
    Open,
}

#[derive(Debug, Clone, Default)]
pub struct DiagnosticReport {
    pub findings: Vec<Finding>,
}

impl DiagnosticReport {
    pub fn has_failures(&self) -> bool {
        self.findings.iter().any(|f| f.outcome == Outcome::Fail)
    }
}

impl fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for finding in &self.findings {
            writeln!(f, "[{:>4}] {}: {}", finding.outcome, finding.check, finding.detail)?;
        }
        writeln!(f)?;
        writeln!(f, "Recommendations:")?;
        for (index, line) in RECOMMENDATIONS.iter().enumerate() {
            writeln!(f, "{}. {line}", index + 1)?;
        }
        Ok(())
    }
}

pub struct Diagnostics<'a> {
    remote: &'a dyn RemoteStore,
}

impl<'a> Diagnostics<'a> {
    pub fn new(remote: &'a dyn RemoteStore) -> Self {
        Self { remote }
    }

    /// Status check, accessibility round trip, then policy activation (unless skipped).
    pub async fn run(&self, activate_policies: bool) -> DiagnosticReport {
        let mut report = DiagnosticReport::default();

        let status = self.policy_status().await;
        report.findings.push(status_finding(&status));
        report.findings.extend(self.accessibility().await);
        if activate_policies {
            report.findings.push(self.activate_policies().await);
        }

        report
    }

    /// Ask the backend for its RLS status, or infer it from read and insert behaviour.
    pub async fn policy_status(&self) -> PolicyStatus {
        match self.remote.rpc(RLS_STATUS_FUNCTION, json!({})).await {
            Ok(value) => return PolicyStatus::Reported(value),
            Err(e) => warn!(error = %e, "RLS status unavailable, probing behaviour instead"),
        }

        let read = self.remote.select(&SampleQuery::probe()).await;
        let insert = self.remote.insert(&probe_sample("TEST-RLS", "Test RLS")).await;

        if let Ok(row) = &insert {
            self.cleanup(row).await;
        }

        match (read, insert) {
            (Ok(_), Err(_)) => PolicyStatus::InsertBlocked,
            (Err(_), _) => PolicyStatus::ReadBlocked,
            (Ok(_), Ok(_)) => PolicyStatus::Open,
        }
    }

    /// Read, insert, read back and delete a test row.
    pub async fn accessibility(&self) -> Vec<Finding> {
        let mut findings = Vec::new();

        match self.remote.select(&SampleQuery::default().limit(5)).await {
            Ok(rows) => findings.push(Finding::new(
                "read",
                Outcome::Pass,
                format!("{} sample(s) found", rows.len()),
            )),
            Err(e) => findings.push(Finding::new("read", Outcome::Fail, e.to_string())),
        }

        let number = format!("TEST-{}", Utc::now().timestamp_millis());
        let inserted = match self.remote.insert(&probe_sample(&number, "Test Offline Mode")).await {
            Ok(row) => row,
            Err(e) => {
                let detail = if is_access_denied(&e) {
                    format!("{e}; blocked by row-level security")
                } else {
                    e.to_string()
                };
                findings.push(Finding::new("insert", Outcome::Fail, detail));
                return findings;
            }
        };
        let Some(id) = inserted.id.clone() else {
            findings.push(Finding::new(
                "insert",
                Outcome::Fail,
                "inserted row came back without an id",
            ));
            return findings;
        };
        findings.push(Finding::new("insert", Outcome::Pass, format!("id {id}")));

        findings.push(match self.remote.select(&SampleQuery::by_id(id.clone())).await {
            Ok(rows) if !rows.is_empty() => Finding::new("read back", Outcome::Pass, format!("id {id}")),
            Ok(_) => Finding::new(
                "read back",
                Outcome::Warn,
                "no row visible right after the insert",
            ),
            Err(e) => Finding::new("read back", Outcome::Fail, e.to_string()),
        });

        findings.push(match self.remote.delete(&id).await {
            Ok(()) => Finding::new("delete", Outcome::Pass, format!("id {id}")),
            Err(e) => Finding::new("delete", Outcome::Warn, e.to_string()),
        });

        findings
    }

    /// Try to install the permissive policies. Usually refused without admin rights.
    pub async fn activate_policies(&self) -> Finding {
        match self
            .remote
            .rpc(EXEC_SQL_FUNCTION, json!({ "sql_query": PERMISSIVE_POLICIES_SQL }))
            .await
        {
            Ok(_) => Finding::new("policies", Outcome::Pass, "row-level security policies installed"),
            Err(e) => Finding::new(
                "policies",
                Outcome::Warn,
                format!("{e}; admin rights are probably missing, enable the policies in the database console"),
            ),
        }
    }

    async fn cleanup(&self, row: &RemoteSample) {
        if let Some(id) = &row.id {
            if let Err(e) = self.remote.delete(id).await {
                warn!(id = %id, error = %e, "Failed to delete probe row");
            }
        }
    }
}

fn status_finding(status: &PolicyStatus) -> Finding {
    match status {
        PolicyStatus::Reported(value) => {
            Finding::new("rls status", Outcome::Pass, format!("reported: {value}"))
        }
        PolicyStatus::InsertBlocked => Finding::new(
            "rls status",
            Outcome::Fail,
            "RLS is probably enabled without an insert policy",
        ),
        PolicyStatus::ReadBlocked => Finding::new(
            "rls status",
            Outcome::Fail,
            "RLS is probably enabled without a read policy",
        ),
        PolicyStatus::Open => Finding::new(
            "rls status",
            Outcome::Pass,
            "RLS is either disabled or correctly configured",
        ),
    }
}

fn probe_sample(number: &str, product: &str) -> RemoteSample {
    let now = Utc::now();
    let today = now.date_naive().format("%Y-%m-%d").to_string();
    let timestamp = now.to_rfc3339_opts(SecondsFormat::Millis, true);
    RemoteSample {
        number: Some(number.to_string()),
        product: Some(product.to_string()),
        ready_time: Some("12:00".to_string()),
        fabrication: Some(today.clone()),
        dlc: Some(today),
        smell: Some(NOT_EVALUATED.to_string()),
        texture: Some(NOT_EVALUATED.to_string()),
        taste: Some(NOT_EVALUATED.to_string()),
        aspect: Some(NOT_EVALUATED.to_string()),
        status: Some("pending".to_string()),
        brand: Some("TEST".to_string()),
        created_at: Some(timestamp.clone()),
        modified_at: Some(timestamp),
        ..RemoteSample::default()
    }
}

/// Whether an error means the store refused the operation rather than failed to answer.
pub fn is_access_denied(error: &RemoteError) -> bool {
    matches!(error, RemoteError::Query { status: 401 | 403, .. })
        || matches!(error, RemoteError::Query { code: Some(code), .. } if code == "42501")
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use db::models::sample::SampleId;

    use super::*;

    fn denied() -> RemoteError {
        RemoteError::Query {
            status: 401,
            code: Some("42501".into()),
            message: "new row violates row-level security policy".into(),
        }
    }

    #[derive(Default)]
    struct ScriptedRemote {
        rpc_ok: bool,
        read_ok: bool,
        insert_ok: bool,
        delete_ok: bool,
        deleted: Mutex<Vec<SampleId>>,
        inserts: AtomicUsize,
    }

    #[async_trait]
    impl RemoteStore for ScriptedRemote {
        async fn select(&self, query: &SampleQuery) -> Result<Vec<RemoteSample>, RemoteError> {
            if !self.read_ok {
                return Err(denied());
            }
            Ok(match &query.id {
                Some(id) => vec![RemoteSample {
                    id: Some(id.clone()),
                    ..RemoteSample::default()
                }],
                None => vec![RemoteSample::default(); 3],
            })
        }

        async fn insert(&self, sample: &RemoteSample) -> Result<RemoteSample, RemoteError> {
            let n = self.inserts.fetch_add(1, Ordering::SeqCst);
            if !self.insert_ok {
                return Err(denied());
            }
            Ok(RemoteSample {
                id: Some(SampleId::new(format!("{}", 900 + n))),
                ..sample.clone()
            })
        }

        async fn delete(&self, id: &SampleId) -> Result<(), RemoteError> {
            if !self.delete_ok {
                return Err(denied());
            }
            self.deleted.lock().unwrap().push(id.clone());
            Ok(())
        }

        async fn rpc(&self, _function: &str, args: Value) -> Result<Value, RemoteError> {
            if self.rpc_ok {
                Ok(json!({ "enabled": true, "args": args }))
            } else {
                Err(RemoteError::Query {
                    status: 404,
                    code: Some("PGRST202".into()),
                    message: "function not found".into(),
                })
            }
        }
    }

    #[tokio::test]
    async fn test_status_reported_by_backend() {
        let remote = ScriptedRemote {
            rpc_ok: true,
            ..ScriptedRemote::default()
        };
        let status = Diagnostics::new(&remote).policy_status().await;
        assert!(matches!(status, PolicyStatus::Reported(_)));
        assert_eq!(remote.inserts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_status_inferred_insert_blocked() {
        let remote = ScriptedRemote {
            read_ok: true,
            ..ScriptedRemote::default()
        };
        assert_eq!(
            Diagnostics::new(&remote).policy_status().await,
            PolicyStatus::InsertBlocked
        );
    }

    #[tokio::test]
    async fn test_status_inferred_read_blocked() {
        let remote = ScriptedRemote::default();
        assert_eq!(
            Diagnostics::new(&remote).policy_status().await,
            PolicyStatus::ReadBlocked
        );
    }

    #[tokio::test]
    async fn test_status_open_cleans_up_probe_row() {
        let remote = ScriptedRemote {
            read_ok: true,
            insert_ok: true,
            delete_ok: true,
            ..ScriptedRemote::default()
        };
        assert_eq!(Diagnostics::new(&remote).policy_status().await, PolicyStatus::Open);
        assert_eq!(remote.deleted.lock().unwrap().as_slice(), &[SampleId::new("900")]);
    }

    #[tokio::test]
    async fn test_accessibility_full_cycle() {
        let remote = ScriptedRemote {
            read_ok: true,
            insert_ok: true,
            delete_ok: true,
            ..ScriptedRemote::default()
        };
        let findings = Diagnostics::new(&remote).accessibility().await;
        let checks: Vec<&str> = findings.iter().map(|f| f.check).collect();
        assert_eq!(checks, vec!["read", "insert", "read back", "delete"]);
        assert!(findings.iter().all(|f| f.outcome == Outcome::Pass));
        assert_eq!(findings[0].detail, "3 sample(s) found");
    }

    #[tokio::test]
    async fn test_delete_failure_is_only_a_warning() {
        let remote = ScriptedRemote {
            read_ok: true,
            insert_ok: true,
            ..ScriptedRemote::default()
        };
        let findings = Diagnostics::new(&remote).accessibility().await;
        let delete = findings.last().unwrap();
        assert_eq!(delete.check, "delete");
        assert_eq!(delete.outcome, Outcome::Warn);
    }

    #[tokio::test]
    async fn test_insert_failure_stops_the_cycle() {
        let remote = ScriptedRemote {
            read_ok: true,
            ..ScriptedRemote::default()
        };
        let findings = Diagnostics::new(&remote).accessibility().await;
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[1].outcome, Outcome::Fail);
        assert!(findings[1].detail.ends_with("blocked by row-level security"));
    }

    #[tokio::test]
    async fn test_run_reports_refused_policy_activation_as_warning() {
        let remote = ScriptedRemote {
            read_ok: true,
            insert_ok: true,
            delete_ok: true,
            ..ScriptedRemote::default()
        };
        let report = Diagnostics::new(&remote).run(true).await;
        let policies = report.findings.last().unwrap();
        assert_eq!(policies.check, "policies");
        assert_eq!(policies.outcome, Outcome::Warn);
        assert!(!report.has_failures());

        let printed = report.to_string();
        assert!(printed.contains("Recommendations:"));
        assert!(printed.contains("[  ok] rls status"));
    }

    #[test]
    fn test_access_denied_detection() {
        assert!(is_access_denied(&denied()));
        assert!(!is_access_denied(&RemoteError::Timeout));
        assert!(!is_access_denied(&RemoteError::Query {
            status: 500,
            code: None,
            message: "boom".into(),
        }));
    }
}
