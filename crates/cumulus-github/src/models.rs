//! Typed views of the GitHub REST API payloads used by this crate.
//!
//! Only the fields the toolkit reads are declared; everything else in the
//! responses is ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A GitHub release.
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub id: u64,
    pub tag_name: String,
    pub name: Option<String>,
    pub body: Option<String>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
    pub html_url: Option<String>,
}

/// Payload for creating a release.
#[derive(Debug, Clone, Serialize)]
pub struct NewRelease<'a> {
    pub tag_name: &'a str,
    pub name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<&'a str>,
    pub draft: bool,
    pub prerelease: bool,
}

/// A git reference such as `refs/tags/release/1.2`.
#[derive(Debug, Clone, Deserialize)]
pub struct GitRef {
    #[serde(rename = "ref")]
    pub name: String,
    pub object: GitObject,
}

/// The object a reference or annotated tag points to.
#[derive(Debug, Clone, Deserialize)]
pub struct GitObject {
    pub sha: String,
    /// `"commit"` or `"tag"`.
    #[serde(rename = "type")]
    pub kind: String,
}

impl GitObject {
    /// Whether this object is an annotated tag rather than a commit.
    pub fn is_tag(&self) -> bool {
        self.kind == "tag"
    }
}

/// `GET /git/refs/tags/{tag}` answers with one ref for an exact match and an
/// array when the name is only a prefix of other refs.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum RefLookup {
    One(GitRef),
    Many(Vec<GitRef>),
}

impl RefLookup {
    pub(crate) fn exact(self, full_name: &str) -> Option<GitRef> {
        match self {
            RefLookup::One(r) => (r.name == full_name).then_some(r),
            RefLookup::Many(refs) => refs.into_iter().find(|r| r.name == full_name),
        }
    }
}

/// An annotated tag object.
#[derive(Debug, Clone, Deserialize)]
pub struct Tag {
    pub tag: String,
    pub sha: String,
    pub message: Option<String>,
    pub object: GitObject,
}

/// Author or committer of a git commit.
#[derive(Debug, Clone, Deserialize)]
pub struct Signature {
    pub name: String,
    pub email: String,
    pub date: DateTime<Utc>,
}

/// A git commit from the git data API.
#[derive(Debug, Clone, Deserialize)]
pub struct Commit {
    pub sha: String,
    pub message: String,
    pub author: Signature,
    pub committer: Signature,
}

/// A GitHub account.
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub login: String,
}

/// A commit from the repository commits API, which links GitHub accounts.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoCommit {
    pub sha: String,
    pub author: Option<User>,
}

/// One side of a pull request.
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestRef {
    #[serde(rename = "ref")]
    pub name: String,
    pub sha: String,
}

/// A pull request.
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub merged_at: Option<DateTime<Utc>>,
    pub base: PullRequestRef,
    pub head: PullRequestRef,
    pub html_url: Option<String>,
}

/// An issue or pull request comment.
#[derive(Debug, Clone, Deserialize)]
pub struct IssueComment {
    pub id: u64,
    pub body: Option<String>,
}
