use cumulus_core::{CumulusError, ReleaseVersion, TagPrefixes};
use tracing::{info, warn};

use crate::client::{GitHubClient, MergeOutcome};
use crate::models::{NewRelease, Release};

/// Tag `commit` (or the head of `master_branch`) with the tag for `version`
/// and create a GitHub release for it. Beta versions become prereleases.
///
/// # Errors
///
/// Returns [`CumulusError::Config`] if the tag already exists, or any API
/// error.
pub async fn create_release(
    client: &GitHubClient,
    version: &ReleaseVersion,
    commit: Option<&str>,
    master_branch: &str,
    prefixes: &TagPrefixes,
) -> Result<Release, CumulusError> {
    let tag = version.tag_name(prefixes);
    if client.find_tag_ref(&tag).await?.is_some() {
        return Err(CumulusError::Config(format!("tag '{tag}' already exists")));
    }

    let sha = match commit {
        Some(sha) => sha.to_string(),
        None => client.branch_head(master_branch).await?,
    };

    let tag_object = client
        .create_tag(&tag, &format!("Release of version {version}"), &sha)
        .await?;
    client
        .create_ref(&format!("refs/tags/{tag}"), &tag_object.sha)
        .await?;

    let name = version.to_string();
    let release = client
        .create_release(&NewRelease {
            tag_name: &tag,
            name: &name,
            body: None,
            draft: false,
            prerelease: version.is_beta(),
        })
        .await?;
    info!(%tag, commit = %sha, release_id = release.id, "created release");
    Ok(release)
}

/// Create tag `dst` pointing at the same commit as tag `src`.
///
/// # Errors
///
/// Returns [`CumulusError::Config`] if `src` is missing or `dst` exists.
pub async fn clone_tag(client: &GitHubClient, src: &str, dst: &str) -> Result<String, CumulusError> {
    if client.find_tag_ref(dst).await?.is_some() {
        return Err(CumulusError::Config(format!("tag '{dst}' already exists")));
    }
    let sha = client.tag_commit_sha(src).await?;
    let tag_object = client
        .create_tag(dst, &format!("Cloned from {src}"), &sha)
        .await?;
    client
        .create_ref(&format!("refs/tags/{dst}"), &tag_object.sha)
        .await?;
    info!(src, dst, commit = %sha, "cloned tag");
    Ok(sha)
}

/// What happened to each feature branch in [`merge_master_to_feature`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Branches that received a merge commit.
    pub merged: Vec<String>,
    /// Branches that already contained master.
    pub up_to_date: Vec<String>,
    /// Branches that conflicted, with the pull request opened for each.
    pub conflicts: Vec<(String, u64)>,
}

/// Merge `master_branch` into every branch whose name starts with
/// `feature_prefix`.
///
/// A conflicting merge opens a pull request from master into the branch,
/// assigned to the author of the branch's head commit when GitHub knows
/// them. Other failures do not stop the loop.
///
/// # Errors
///
/// Returns [`CumulusError::Batch`] listing every branch that failed for a
/// reason other than a merge conflict.
pub async fn merge_master_to_feature(
    client: &GitHubClient,
    master_branch: &str,
    feature_prefix: &str,
) -> Result<MergeReport, CumulusError> {
    let branches = client.list_branches().await?;
    let mut report = MergeReport::default();
    let mut failures = Vec::new();

    for branch in branches.iter().filter(|b| b.starts_with(feature_prefix)) {
        let message = format!("Merge {master_branch} into {branch}");
        match client.merge(branch, master_branch, &message).await {
            Ok(MergeOutcome::Merged) => {
                info!(%branch, "merged {master_branch}");
                report.merged.push(branch.clone());
            }
            Ok(MergeOutcome::UpToDate) => {
                info!(%branch, "already up to date");
                report.up_to_date.push(branch.clone());
            }
            Err(e) if e.github_status() == Some(409) => {
                warn!(%branch, "merge conflict, opening pull request");
                match open_conflict_pull_request(client, master_branch, branch).await {
                    Ok(number) => report.conflicts.push((branch.clone(), number)),
                    Err(e) => failures.push(format!("{branch}: {e}")),
                }
            }
            Err(e) => {
                warn!(%branch, error = %e, "merge failed");
                failures.push(format!("{branch}: {e}"));
            }
        }
    }

    if failures.is_empty() {
        Ok(report)
    } else {
        Err(CumulusError::Batch(failures))
    }
}

async fn open_conflict_pull_request(
    client: &GitHubClient,
    master_branch: &str,
    branch: &str,
) -> Result<u64, CumulusError> {
    let pull = client
        .create_pull_request(
            &format!("Merge {master_branch} into {branch}"),
            master_branch,
            branch,
            &format!(
                "Merging {master_branch} into {branch} produced conflicts. \
                 Resolve them on this pull request."
            ),
        )
        .await?;

    let head = client.branch_head(branch).await?;
    match client.commit_author_login(&head).await? {
        Some(login) => client.assign_issue(pull.number, &login).await?,
        None => {
            client
                .create_comment(
                    pull.number,
                    "The author of the branch head could not be matched to a GitHub account; \
                     please assign this pull request manually.",
                )
                .await?;
        }
    }
    Ok(pull.number)
}
