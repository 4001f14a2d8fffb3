//! Salesforce org automation: push upgrades and Apex test runs.
//!
//! [`SalesforceClient`] logs in through the SOAP partner API and talks to the
//! REST and Tooling APIs with the resulting session. [`PushApi`] schedules
//! push requests and polls them until Salesforce reports a final status.
//! [`ApexTestRunner`] queues test classes and gathers their results.

pub mod apex;
pub mod client;
pub mod orgs;
pub mod push;
mod soap;

pub use apex::{
    ApexClass, ApexTestRunner, ClassError, QueueItemStatus, TestOutcome, TestReport, TestResult,
    TestRunProgress,
};
pub use client::SalesforceClient;
pub use orgs::read_org_ids;
pub use push::{PollSchedule, PushApi, PushError, PushReport, PushStatus};
