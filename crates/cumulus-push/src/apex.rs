use std::collections::BTreeMap;
use std::fmt;

use cumulus_core::CumulusError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::client::{soql_quote, SalesforceClient};
use crate::push::PollSchedule;

/// An Apex class selected for a test run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApexClass {
    /// `ApexClass` record Id.
    pub id: String,
    /// Class name without namespace prefix.
    pub name: String,
}

/// Status of one `ApexTestQueueItem`, i.e. one class in an asynchronous run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QueueItemStatus {
    Holding,
    Queued,
    Preparing,
    Processing,
    Completed,
    Failed,
    Aborted,
}

impl QueueItemStatus {
    /// Whether the class has finished running, successfully or not.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Aborted)
    }
}

impl fmt::Display for QueueItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Holding => "Holding",
            Self::Queued => "Queued",
            Self::Preparing => "Preparing",
            Self::Processing => "Processing",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Aborted => "Aborted",
        };
        f.write_str(s)
    }
}

/// Number of queued classes per status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestRunProgress {
    /// Queued classes per status.
    pub classes: BTreeMap<QueueItemStatus, usize>,
}

impl TestRunProgress {
    /// Number of queued classes.
    pub fn total(&self) -> usize {
        self.classes.values().sum()
    }

    /// Classes that reached a terminal status.
    pub fn finished(&self) -> usize {
        self.classes
            .iter()
            .filter(|(status, _)| status.is_terminal())
            .map(|(_, count)| count)
            .sum()
    }

    /// True once at least one class is queued and every class has finished.
    pub fn is_complete(&self) -> bool {
        self.total() > 0 && self.finished() == self.total()
    }
}

impl fmt::Display for TestRunProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} classes finished", self.finished(), self.total())
    }
}

/// Outcome of a single test method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TestOutcome {
    Pass,
    Fail,
    CompileFail,
    Skip,
}

impl TestOutcome {
    /// Whether this outcome fails the run.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Fail | Self::CompileFail)
    }
}

/// One `ApexTestResult` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    /// Test class name.
    pub class_name: String,
    /// Test method name.
    pub method_name: String,
    /// How the method ended.
    pub outcome: TestOutcome,
    /// Assertion or exception message of a failed method.
    pub message: Option<String>,
    /// Apex stack trace of a failed method.
    pub stack_trace: Option<String>,
    /// Run time in milliseconds.
    pub run_time: Option<u64>,
}

/// A class whose queue item failed or was aborted before its tests ran,
/// typically because it does not compile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassError {
    /// Class name.
    pub class_name: String,
    /// `Failed` or `Aborted`.
    pub status: QueueItemStatus,
    /// `ExtendedStatus` of the queue item.
    pub detail: Option<String>,
}

/// Results of an asynchronous Apex test run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestReport {
    /// `AsyncApexJob` Id of the run.
    pub job_id: String,
    /// Number of test methods per outcome.
    pub outcomes: BTreeMap<TestOutcome, usize>,
    /// Every test method, ordered by class and method name.
    pub results: Vec<TestResult>,
    /// Classes that failed or were aborted before their tests ran.
    pub class_errors: Vec<ClassError>,
}

impl TestReport {
    fn new(job_id: &str, results: Vec<TestResult>, class_errors: Vec<ClassError>) -> Self {
        let mut outcomes = BTreeMap::new();
        for result in &results {
            *outcomes.entry(result.outcome).or_default() += 1;
        }
        Self {
            job_id: job_id.to_string(),
            outcomes,
            results,
            class_errors,
        }
    }

    /// Methods that failed or did not compile.
    pub fn failures(&self) -> impl Iterator<Item = &TestResult> {
        self.results.iter().filter(|r| r.outcome.is_failure())
    }

    /// Number of methods with `outcome`.
    pub fn count(&self, outcome: TestOutcome) -> usize {
        self.outcomes.get(&outcome).copied().unwrap_or_default()
    }

    /// True when no method failed and every class ran.
    pub fn is_success(&self) -> bool {
        self.failures().next().is_none() && self.class_errors.is_empty()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct QueueItemRecord {
    status: QueueItemStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ClassRef {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FailedItemRecord {
    apex_class: ClassRef,
    status: QueueItemStatus,
    extended_status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ResultRecord {
    apex_class: ClassRef,
    method_name: String,
    outcome: TestOutcome,
    message: Option<String>,
    stack_trace: Option<String>,
    run_time: Option<u64>,
}

/// Runs Apex test classes asynchronously through the Tooling API.
pub struct ApexTestRunner<'a> {
    client: &'a SalesforceClient,
}

impl<'a> ApexTestRunner<'a> {
    /// Run tests in the org behind `client`.
    pub fn new(client: &'a SalesforceClient) -> Self {
        Self { client }
    }

    /// Classes whose name matches any of the comma separated SOQL `LIKE`
    /// patterns in `name_match`, ordered by name.
    ///
    /// Only classes in `namespace` are considered, or classes outside any
    /// namespace when it is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`CumulusError::Config`] if `name_match` holds no pattern.
    pub async fn find_test_classes(
        &self,
        name_match: &str,
        namespace: Option<&str>,
    ) -> Result<Vec<ApexClass>, CumulusError> {
        let patterns: Vec<String> = name_match
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| format!("Name LIKE {}", soql_quote(p)))
            .collect();
        if patterns.is_empty() {
            return Err(CumulusError::Config(
                "APEX_TEST_NAME_MATCH holds no class name pattern".into(),
            ));
        }

        let namespace_filter = match namespace {
            Some(ns) => format!("NamespacePrefix = {}", soql_quote(ns)),
            None => "NamespacePrefix = null".to_string(),
        };
        let classes: Vec<ApexClass> = self
            .client
            .tooling_query(&format!(
                "SELECT Id, Name FROM ApexClass WHERE {namespace_filter} AND ({}) ORDER BY Name",
                patterns.join(" OR ")
            ))
            .await?;
        debug!(count = classes.len(), name_match, "found test classes");
        Ok(classes)
    }

    /// Queue `classes` for an asynchronous run and return the job Id.
    ///
    /// # Errors
    ///
    /// Returns [`CumulusError::Config`] when `classes` is empty.
    pub async fn enqueue(&self, classes: &[ApexClass]) -> Result<String, CumulusError> {
        if classes.is_empty() {
            return Err(CumulusError::Config("no test classes to run".into()));
        }
        let ids = classes
            .iter()
            .map(|c| c.id.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let job_id: String = self
            .client
            .tooling_post("runTestsAsynchronous", &json!({ "classids": ids }))
            .await?;
        info!(%job_id, classes = classes.len(), "queued Apex tests");
        Ok(job_id)
    }

    /// Queue item counts per status for job `job_id`.
    pub async fn progress(&self, job_id: &str) -> Result<TestRunProgress, CumulusError> {
        let items: Vec<QueueItemRecord> = self
            .client
            .query(&format!(
                "SELECT Id, Status FROM ApexTestQueueItem WHERE ParentJobId = {}",
                soql_quote(job_id)
            ))
            .await?;
        let mut progress = TestRunProgress::default();
        for item in items {
            *progress.classes.entry(item.status).or_default() += 1;
        }
        Ok(progress)
    }

    /// Poll until every queued class has finished.
    ///
    /// `on_poll` is called after each poll with the poll count (from 1) and
    /// the progress seen.
    pub async fn wait_for_completion<F>(
        &self,
        job_id: &str,
        schedule: &PollSchedule,
        mut on_poll: F,
    ) -> Result<TestRunProgress, CumulusError>
    where
        F: FnMut(u32, &TestRunProgress),
    {
        let mut polls = 0u32;
        loop {
            let progress = self.progress(job_id).await?;
            polls += 1;
            on_poll(polls, &progress);
            if progress.is_complete() {
                info!(job_id, polls, classes = progress.total(), "Apex tests finished");
                return Ok(progress);
            }
            tokio::time::sleep(schedule.delay_after(polls)).await;
        }
    }

    /// Collect the method results and failed classes of job `job_id`.
    pub async fn report(&self, job_id: &str) -> Result<TestReport, CumulusError> {
        let quoted = soql_quote(job_id);
        let records: Vec<ResultRecord> = self
            .client
            .query(&format!(
                "SELECT ApexClass.Name, MethodName, Outcome, Message, StackTrace, RunTime \
                 FROM ApexTestResult WHERE AsyncApexJobId = {quoted} \
                 ORDER BY ApexClass.Name, MethodName"
            ))
            .await?;
        let failed: Vec<FailedItemRecord> = self
            .client
            .query(&format!(
                "SELECT ApexClass.Name, Status, ExtendedStatus FROM ApexTestQueueItem \
                 WHERE ParentJobId = {quoted} AND Status IN ('Failed', 'Aborted')"
            ))
            .await?;

        let results = records
            .into_iter()
            .map(|r| TestResult {
                class_name: r.apex_class.name,
                method_name: r.method_name,
                outcome: r.outcome,
                message: r.message,
                stack_trace: r.stack_trace,
                run_time: r.run_time,
            })
            .collect();
        let class_errors = failed
            .into_iter()
            .map(|item| ClassError {
                class_name: item.apex_class.name,
                status: item.status,
                detail: item.extended_status,
            })
            .collect();
        Ok(TestReport::new(job_id, results, class_errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(class: &str, method: &str, outcome: TestOutcome) -> TestResult {
        TestResult {
            class_name: class.into(),
            method_name: method.into(),
            outcome,
            message: None,
            stack_trace: None,
            run_time: None,
        }
    }

    #[test]
    fn progress_completes_when_every_class_finished() {
        let mut progress = TestRunProgress::default();
        assert!(!progress.is_complete());

        progress.classes.insert(QueueItemStatus::Completed, 2);
        progress.classes.insert(QueueItemStatus::Processing, 1);
        assert!(!progress.is_complete());
        assert_eq!(progress.to_string(), "2/3 classes finished");

        progress.classes.remove(&QueueItemStatus::Processing);
        progress.classes.insert(QueueItemStatus::Failed, 1);
        assert!(progress.is_complete());
    }

    #[test]
    fn report_counts_outcomes() {
        let report = TestReport::new(
            "707A",
            vec![
                result("A_TEST", "one", TestOutcome::Pass),
                result("A_TEST", "two", TestOutcome::Fail),
                result("B_TEST", "three", TestOutcome::Pass),
                result("B_TEST", "four", TestOutcome::Skip),
            ],
            Vec::new(),
        );
        assert_eq!(report.count(TestOutcome::Pass), 2);
        assert_eq!(report.count(TestOutcome::CompileFail), 0);
        assert_eq!(report.failures().count(), 1);
        assert!(!report.is_success());
    }

    #[test]
    fn class_error_fails_run_without_failed_methods() {
        let report = TestReport::new(
            "707A",
            vec![result("A_TEST", "one", TestOutcome::Pass)],
            vec![ClassError {
                class_name: "B_TEST".into(),
                status: QueueItemStatus::Failed,
                detail: Some("compile error".into()),
            }],
        );
        assert!(!report.is_success());
    }

    #[test]
    fn outcome_serializes_with_salesforce_names() {
        let outcome: TestOutcome = serde_json::from_str("\"CompileFail\"").unwrap();
        assert!(outcome.is_failure());
        assert!(!TestOutcome::Skip.is_failure());
    }
}
