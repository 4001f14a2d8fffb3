use chrono::{DateTime, Utc};
use cumulus_core::{CumulusError, TagPrefixes};
use cumulus_notes::provider::{ChangeNoteProvider, ChangeNotes};
use tracing::{debug, info};

use crate::client::GitHubClient;
use crate::models::PullRequest;
use crate::tags::find_previous_release_tag;

/// Change notes taken from the bodies of pull requests merged between two
/// release tags.
///
/// All network access happens in [`fetch`](Self::fetch); iterating the notes
/// afterwards is free and restartable.
#[derive(Debug, Clone)]
pub struct GitHubChangeNotesProvider {
    since: DateTime<Utc>,
    until: DateTime<Utc>,
    last_tag: Option<String>,
    pull_requests: Vec<PullRequest>,
}

impl GitHubChangeNotesProvider {
    /// Collect the pull requests merged into `master_branch` after `last_tag`
    /// and up to and including `current_tag`.
    ///
    /// When `last_tag` is `None` the previous release tag is located among
    /// the repository's tags. Without any previous tag every merged pull
    /// request up to the current tag is included.
    ///
    /// # Errors
    ///
    /// Returns [`CumulusError::Config`] if a tag does not exist,
    /// [`CumulusError::Parse`] if `current_tag` is not a release tag and one
    /// has to be searched for, or any API error.
    pub async fn fetch(
        client: &GitHubClient,
        master_branch: &str,
        prefixes: &TagPrefixes,
        current_tag: &str,
        last_tag: Option<&str>,
    ) -> Result<Self, CumulusError> {
        let until = client.tag_commit_date(current_tag).await?;

        let last_tag = match last_tag {
            Some(tag) => Some(tag.to_string()),
            None => {
                let tags = client.list_tag_names().await?;
                find_previous_release_tag(tags.iter().map(String::as_str), current_tag, prefixes)?
            }
        };
        let since = match &last_tag {
            Some(tag) => client.tag_commit_date(tag).await?,
            None => DateTime::<Utc>::UNIX_EPOCH,
        };
        debug!(?last_tag, %since, %until, "release date range");

        let pulls = client.list_closed_pull_requests().await?;
        let total = pulls.len();
        let pull_requests = select_merged_between(pulls, master_branch, since, until);
        info!(
            current_tag,
            last_tag = last_tag.as_deref().unwrap_or("<none>"),
            closed = total,
            selected = pull_requests.len(),
            "collected pull requests for release notes"
        );

        Ok(Self {
            since,
            until,
            last_tag,
            pull_requests,
        })
    }

    /// Exclusive lower bound of the merge date range.
    pub fn since(&self) -> DateTime<Utc> {
        self.since
    }

    /// Inclusive upper bound of the merge date range.
    pub fn until(&self) -> DateTime<Utc> {
        self.until
    }

    /// The previous release tag used as the lower bound, if any.
    pub fn last_tag(&self) -> Option<&str> {
        self.last_tag.as_deref()
    }

    /// Selected pull requests, oldest merge first.
    pub fn pull_requests(&self) -> &[PullRequest] {
        &self.pull_requests
    }
}

impl ChangeNoteProvider for GitHubChangeNotesProvider {
    fn change_notes(&self) -> Result<ChangeNotes<'_>, CumulusError> {
        Ok(Box::new(
            self.pull_requests
                .iter()
                .filter_map(|pr| pr.body.clone())
                .map(Ok),
        ))
    }
}

/// Keep pull requests merged into `base` with `since < merged_at <= until`,
/// ordered by merge time, oldest first.
pub fn select_merged_between(
    pulls: Vec<PullRequest>,
    base: &str,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Vec<PullRequest> {
    let mut selected: Vec<PullRequest> = pulls
        .into_iter()
        .filter(|pr| pr.base.name == base)
        .filter(|pr| matches!(pr.merged_at, Some(at) if at > since && at <= until))
        .collect();
    selected.sort_by_key(|pr| pr.merged_at);
    selected
}
