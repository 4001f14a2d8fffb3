use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use cumulus_core::{CumulusError, PushConfig, ReleaseVersion};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::client::{soql_quote, SalesforceClient};

/// Lifecycle of a `PackagePushRequest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PushStatus {
    Created,
    Pending,
    #[serde(rename = "In Progress")]
    InProgress,
    Succeeded,
    Failed,
    Canceled,
}

impl PushStatus {
    /// Whether Salesforce will not change this status again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }
}

impl fmt::Display for PushStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "Created",
            Self::Pending => "Pending",
            Self::InProgress => "In Progress",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Canceled => "Canceled",
        };
        f.write_str(s)
    }
}

/// How long to wait between status polls.
///
/// Polling starts at `interval` and switches to `slow_interval` once
/// `slow_after` polls have been made.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use cumulus_push::PollSchedule;
///
/// let schedule = PollSchedule::default();
/// assert_eq!(schedule.delay_after(1), Duration::from_secs(10));
/// assert_eq!(schedule.delay_after(10), Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    /// Delay between the first polls.
    pub interval: Duration,
    /// Delay once the schedule has escalated.
    pub slow_interval: Duration,
    /// Number of polls after which `slow_interval` applies.
    pub slow_after: u32,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            slow_interval: Duration::from_secs(30),
            slow_after: 10,
        }
    }
}

impl PollSchedule {
    /// Build the schedule from the `[push]` polling settings.
    pub fn from_config(config: &PushConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.poll_interval_secs),
            slow_interval: Duration::from_secs(config.slow_poll_interval_secs),
            slow_after: config.slow_after_polls,
        }
    }

    /// Delay before the next poll once `polls` polls have been made.
    pub fn delay_after(&self, polls: u32) -> Duration {
        if polls >= self.slow_after {
            self.slow_interval
        } else {
            self.interval
        }
    }
}

/// One `PackagePushError` record, joined with the org it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushError {
    /// `PackagePushJob` the error belongs to.
    pub job_id: String,
    /// Subscriber org of that job.
    pub org_id: String,
    /// `ErrorTitle`, a short summary.
    pub title: Option<String>,
    /// `ErrorMessage`.
    pub message: Option<String>,
    /// `ErrorDetails`, often a stack trace or the failing component.
    pub details: Option<String>,
    /// `ErrorSeverity`, e.g. `Error` or `Warning`.
    pub severity: Option<String>,
}

/// Outcome of a push request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushReport {
    /// `PackagePushRequest` Id.
    pub request_id: String,
    /// Status of the request itself.
    pub status: PushStatus,
    /// Number of push jobs per job status.
    pub jobs: BTreeMap<String, usize>,
    /// Errors reported for failed jobs.
    pub errors: Vec<PushError>,
}

impl PushReport {
    /// Number of jobs in the request, whatever their status.
    pub fn total_jobs(&self) -> usize {
        self.jobs.values().sum()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct IdRecord {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RequestRecord {
    status: PushStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct JobRecord {
    id: String,
    status: String,
    subscriber_organization_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorRecord {
    package_push_job_id: String,
    error_title: Option<String>,
    error_message: Option<String>,
    error_details: Option<String>,
    error_severity: Option<String>,
}

/// Push upgrade operations on the packaging org.
pub struct PushApi<'a> {
    client: &'a SalesforceClient,
}

impl<'a> PushApi<'a> {
    /// Operate on the packaging org behind `client`.
    pub fn new(client: &'a SalesforceClient) -> Self {
        Self { client }
    }

    /// Id of the released `MetadataPackageVersion` matching `version` in the
    /// package with namespace prefix `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`CumulusError::Config`] for beta versions, which cannot be
    /// pushed, and [`CumulusError::Salesforce`] if the package or version
    /// does not exist.
    pub async fn find_version(
        &self,
        namespace: &str,
        version: &ReleaseVersion,
    ) -> Result<String, CumulusError> {
        if version.is_beta() {
            return Err(CumulusError::Config(format!(
                "cannot push beta version {version}"
            )));
        }

        let packages: Vec<IdRecord> = self
            .client
            .query(&format!(
                "SELECT Id FROM MetadataPackage WHERE NamespacePrefix = {}",
                soql_quote(namespace)
            ))
            .await?;
        let package = packages.into_iter().next().ok_or_else(|| {
            CumulusError::Salesforce(format!("no package with namespace '{namespace}'"))
        })?;

        let versions: Vec<IdRecord> = self
            .client
            .query(&format!(
                "SELECT Id FROM MetadataPackageVersion WHERE MetadataPackageId = {} \
                 AND ReleaseState = 'Released' AND MajorVersion = {} AND MinorVersion = {} \
                 AND PatchVersion = {}",
                soql_quote(&package.id),
                version.major(),
                version.minor(),
                version.patch()
            ))
            .await?;
        let found = versions.into_iter().next().ok_or_else(|| {
            CumulusError::Salesforce(format!(
                "version {version} of package '{namespace}' not found"
            ))
        })?;
        debug!(namespace, %version, id = %found.id, "found package version");
        Ok(found.id)
    }

    /// Create a push request for `version_id` to `org_ids` and mark it
    /// `Pending` so Salesforce starts it at `start_time` (or right away).
    /// Returns the request Id.
    ///
    /// # Errors
    ///
    /// Returns [`CumulusError::Batch`] naming every org whose job could not
    /// be created; the request is then left unscheduled.
    pub async fn schedule(
        &self,
        version_id: &str,
        org_ids: &[String],
        start_time: Option<DateTime<Utc>>,
    ) -> Result<String, CumulusError> {
        if org_ids.is_empty() {
            return Err(CumulusError::Config("no orgs to push to".into()));
        }

        let mut request = json!({ "PackageVersionId": version_id });
        if let Some(start) = start_time {
            request["ScheduledStartTime"] =
                json!(start.to_rfc3339_opts(SecondsFormat::Secs, true));
        }
        let request_id = self.client.create("PackagePushRequest", &request).await?;
        info!(%request_id, orgs = org_ids.len(), "created push request");

        let mut failures = Vec::new();
        for org in org_ids {
            let job = json!({
                "PackagePushRequestId": request_id,
                "SubscriberOrganizationKey": org,
            });
            if let Err(e) = self.client.create("PackagePushJob", &job).await {
                warn!(%org, error = %e, "could not create push job");
                failures.push(format!("{org}: {e}"));
            }
        }
        if !failures.is_empty() {
            return Err(CumulusError::Batch(failures));
        }

        self.client
            .update(
                "PackagePushRequest",
                &request_id,
                &json!({ "Status": "Pending" }),
            )
            .await?;
        info!(%request_id, "push request scheduled");
        Ok(request_id)
    }

    /// Current status of push request `request_id`.
    pub async fn request_status(&self, request_id: &str) -> Result<PushStatus, CumulusError> {
        let records: Vec<RequestRecord> = self
            .client
            .query(&format!(
                "SELECT Id, Status FROM PackagePushRequest WHERE Id = {}",
                soql_quote(request_id)
            ))
            .await?;
        records
            .into_iter()
            .next()
            .map(|r| r.status)
            .ok_or_else(|| CumulusError::Salesforce(format!("push request '{request_id}' not found")))
    }

    /// Poll until the request reaches a terminal status and return it.
    ///
    /// `on_poll` is called after each poll with the poll count (from 1) and
    /// the status seen.
    pub async fn wait_for_completion<F>(
        &self,
        request_id: &str,
        schedule: &PollSchedule,
        mut on_poll: F,
    ) -> Result<PushStatus, CumulusError>
    where
        F: FnMut(u32, &PushStatus),
    {
        let mut polls = 0u32;
        loop {
            let status = self.request_status(request_id).await?;
            polls += 1;
            on_poll(polls, &status);
            if status.is_terminal() {
                info!(request_id, %status, polls, "push request finished");
                return Ok(status);
            }
            tokio::time::sleep(schedule.delay_after(polls)).await;
        }
    }

    /// Summarize push request `request_id`: its status, job counts by status
    /// and the errors of failed jobs.
    pub async fn report(&self, request_id: &str) -> Result<PushReport, CumulusError> {
        let status = self.request_status(request_id).await?;
        let jobs: Vec<JobRecord> = self
            .client
            .query(&format!(
                "SELECT Id, Status, SubscriberOrganizationKey FROM PackagePushJob \
                 WHERE PackagePushRequestId = {}",
                soql_quote(request_id)
            ))
            .await?;

        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for job in &jobs {
            *counts.entry(job.status.clone()).or_default() += 1;
        }

        let failed: Vec<&JobRecord> = jobs.iter().filter(|j| j.status == "Failed").collect();
        let mut errors = Vec::new();
        if !failed.is_empty() {
            let ids = failed
                .iter()
                .map(|j| soql_quote(&j.id))
                .collect::<Vec<_>>()
                .join(", ");
            let records: Vec<ErrorRecord> = self
                .client
                .query(&format!(
                    "SELECT PackagePushJobId, ErrorTitle, ErrorMessage, ErrorDetails, ErrorSeverity \
                     FROM PackagePushError WHERE PackagePushJobId IN ({ids})"
                ))
                .await?;
            errors = records
                .into_iter()
                .map(|r| {
                    let org_id = failed
                        .iter()
                        .find(|j| j.id == r.package_push_job_id)
                        .map(|j| j.subscriber_organization_key.clone())
                        .unwrap_or_default();
                    PushError {
                        job_id: r.package_push_job_id,
                        org_id,
                        title: r.error_title,
                        message: r.error_message,
                        details: r.error_details,
                        severity: r.error_severity,
                    }
                })
                .collect();
        }

        Ok(PushReport {
            request_id: request_id.to_string(),
            status,
            jobs: counts,
            errors,
        })
    }
}
