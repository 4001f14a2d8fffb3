use chrono::{DateTime, Utc};
use cumulus_core::{CumulusError, GitHubConfig};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::models::{
    Commit, GitRef, IssueComment, NewRelease, PullRequest, RefLookup, Release, RepoCommit, Tag,
};

const PER_PAGE: usize = 100;

/// Result of asking GitHub to merge one branch into another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// A merge commit was created.
    Merged,
    /// The base already contained the head; nothing to do.
    UpToDate,
}

/// Client for the GitHub REST API, bound to one repository.
///
/// Authenticates with basic auth when both username and password are
/// configured, and anonymously otherwise.
///
/// # Examples
///
/// ```
/// use cumulus_core::GitHubConfig;
/// use cumulus_github::GitHubClient;
///
/// let config = GitHubConfig {
///     org_name: Some("SalesforceFoundation".into()),
///     repo_name: Some("Cumulus".into()),
///     ..GitHubConfig::default()
/// };
/// let client = GitHubClient::new(&config).unwrap();
/// assert_eq!(client.repository(), "SalesforceFoundation/Cumulus");
/// ```
pub struct GitHubClient {
    http: reqwest::Client,
    base_url: String,
    owner: String,
    repo: String,
    auth: Option<(String, String)>,
}

impl GitHubClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CumulusError::Config`] if the organization or repository name
    /// is missing, or [`CumulusError::GitHub`] if the HTTP client cannot be
    /// built.
    pub fn new(config: &GitHubConfig) -> Result<Self, CumulusError> {
        let (owner, repo) = config.repository()?;
        let http = reqwest::Client::builder()
            .user_agent("cumulus")
            .build()
            .map_err(|e| CumulusError::GitHub(format!("failed to create GitHub client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            auth: config
                .basic_auth()
                .map(|(u, p)| (u.to_string(), p.to_string())),
        })
    }

    /// `owner/repo`.
    pub fn repository(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    fn request(&self, method: Method, route: &str) -> RequestBuilder {
        let url = format!(
            "{}/repos/{}/{}{route}",
            self.base_url, self.owner, self.repo
        );
        debug!(%method, %url, "GitHub request");
        let request = self
            .http
            .request(method, url)
            .header("Accept", "application/vnd.github.v3+json");
        match &self.auth {
            Some((user, pass)) => request.basic_auth(user, Some(pass)),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, CumulusError> {
        let response = request
            .send()
            .await
            .map_err(|e| CumulusError::GitHub(format!("request failed: {e}")))?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(status_error(response).await)
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, CumulusError> {
        self.send(request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| CumulusError::GitHub(format!("invalid response body: {e}")))
    }

    async fn get<T: DeserializeOwned>(&self, route: &str) -> Result<T, CumulusError> {
        self.send_json(self.request(Method::GET, route)).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        route: &str,
        body: &B,
    ) -> Result<T, CumulusError> {
        self.send_json(self.request(Method::POST, route).json(body))
            .await
    }

    async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        route: &str,
        body: &B,
    ) -> Result<T, CumulusError> {
        self.send_json(self.request(Method::PATCH, route).json(body))
            .await
    }

    /// Fetch every page of a list endpoint.
    async fn get_all<T: DeserializeOwned>(
        &self,
        route: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, CumulusError> {
        let mut items = Vec::new();
        let per_page = PER_PAGE.to_string();
        let mut page = 1u32;
        loop {
            let page_str = page.to_string();
            let request = self
                .request(Method::GET, route)
                .query(query)
                .query(&[("per_page", per_page.as_str()), ("page", page_str.as_str())]);
            let batch: Vec<T> = self.send_json(request).await?;
            let count = batch.len();
            items.extend(batch);
            if count < PER_PAGE {
                break;
            }
            page += 1;
        }
        Ok(items)
    }

    /// All releases of the repository.
    pub async fn list_releases(&self) -> Result<Vec<Release>, CumulusError> {
        self.get_all("/releases", &[]).await
    }

    /// The release whose tag is `tag`, if any.
    pub async fn find_release(&self, tag: &str) -> Result<Option<Release>, CumulusError> {
        Ok(self
            .list_releases()
            .await?
            .into_iter()
            .find(|r| r.tag_name == tag))
    }

    /// Create a release.
    pub async fn create_release(&self, release: &NewRelease<'_>) -> Result<Release, CumulusError> {
        self.post("/releases", release).await
    }

    /// Replace the body of release `id`.
    pub async fn update_release_body(&self, id: u64, body: &str) -> Result<Release, CumulusError> {
        self.patch(
            &format!("/releases/{id}"),
            &serde_json::json!({ "body": body }),
        )
        .await
    }

    /// Names of all tags, without the `refs/tags/` prefix.
    ///
    /// A repository without tags answers 404; that is an empty list.
    pub async fn list_tag_names(&self) -> Result<Vec<String>, CumulusError> {
        let refs: Vec<GitRef> = match self.get_all("/git/refs/tags", &[]).await {
            Ok(refs) => refs,
            Err(e) if e.github_status() == Some(404) => Vec::new(),
            Err(e) => return Err(e),
        };
        Ok(refs
            .into_iter()
            .filter_map(|r| r.name.strip_prefix("refs/tags/").map(str::to_string))
            .collect())
    }

    /// The ref of tag `tag`, or `None` if it does not exist.
    pub async fn find_tag_ref(&self, tag: &str) -> Result<Option<GitRef>, CumulusError> {
        match self.get::<RefLookup>(&format!("/git/refs/tags/{tag}")).await {
            Ok(lookup) => Ok(lookup.exact(&format!("refs/tags/{tag}"))),
            Err(e) if e.github_status() == Some(404) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// An annotated tag object.
    pub async fn get_tag(&self, sha: &str) -> Result<Tag, CumulusError> {
        self.get(&format!("/git/tags/{sha}")).await
    }

    /// Create an annotated tag object pointing at commit `sha`.
    ///
    /// The tag is not visible until a ref is created for it with
    /// [`create_ref`](Self::create_ref).
    pub async fn create_tag(&self, tag: &str, message: &str, sha: &str) -> Result<Tag, CumulusError> {
        self.post(
            "/git/tags",
            &serde_json::json!({
                "tag": tag,
                "message": message,
                "object": sha,
                "type": "commit",
            }),
        )
        .await
    }

    /// Create a ref, e.g. `refs/tags/release/1.2`.
    pub async fn create_ref(&self, full_name: &str, sha: &str) -> Result<GitRef, CumulusError> {
        self.post(
            "/git/refs",
            &serde_json::json!({ "ref": full_name, "sha": sha }),
        )
        .await
    }

    /// A commit from the git data API.
    pub async fn get_commit(&self, sha: &str) -> Result<Commit, CumulusError> {
        self.get(&format!("/git/commits/{sha}")).await
    }

    /// The GitHub login of a commit's author, when GitHub can link one.
    pub async fn commit_author_login(&self, sha: &str) -> Result<Option<String>, CumulusError> {
        let commit: RepoCommit = self.get(&format!("/commits/{sha}")).await?;
        Ok(commit.author.map(|a| a.login))
    }

    /// Commit SHA that tag `tag` resolves to, following annotated tags.
    ///
    /// # Errors
    ///
    /// Returns [`CumulusError::Config`] if the tag does not exist.
    pub async fn tag_commit_sha(&self, tag: &str) -> Result<String, CumulusError> {
        let tag_ref = self
            .find_tag_ref(tag)
            .await?
            .ok_or_else(|| CumulusError::Config(format!("tag '{tag}' not found")))?;
        if tag_ref.object.is_tag() {
            Ok(self.get_tag(&tag_ref.object.sha).await?.object.sha)
        } else {
            Ok(tag_ref.object.sha)
        }
    }

    /// Committer date of the commit that tag `tag` points at.
    pub async fn tag_commit_date(&self, tag: &str) -> Result<DateTime<Utc>, CumulusError> {
        let sha = self.tag_commit_sha(tag).await?;
        Ok(self.get_commit(&sha).await?.committer.date)
    }

    /// Names of all branches, without the `refs/heads/` prefix.
    pub async fn list_branches(&self) -> Result<Vec<String>, CumulusError> {
        let refs: Vec<GitRef> = self.get_all("/git/refs/heads", &[]).await?;
        Ok(refs
            .into_iter()
            .filter_map(|r| r.name.strip_prefix("refs/heads/").map(str::to_string))
            .collect())
    }

    /// Head commit SHA of `branch`.
    pub async fn branch_head(&self, branch: &str) -> Result<String, CumulusError> {
        let lookup: RefLookup = self.get(&format!("/git/refs/heads/{branch}")).await?;
        lookup
            .exact(&format!("refs/heads/{branch}"))
            .map(|r| r.object.sha)
            .ok_or_else(|| CumulusError::Config(format!("branch '{branch}' not found")))
    }

    /// All closed pull requests, oldest pages first as GitHub returns them.
    pub async fn list_closed_pull_requests(&self) -> Result<Vec<PullRequest>, CumulusError> {
        self.get_all("/pulls", &[("state", "closed")]).await
    }

    /// Open a pull request merging `head` into `base`.
    pub async fn create_pull_request(
        &self,
        title: &str,
        head: &str,
        base: &str,
        body: &str,
    ) -> Result<PullRequest, CumulusError> {
        self.post(
            "/pulls",
            &serde_json::json!({
                "title": title,
                "head": head,
                "base": base,
                "body": body,
            }),
        )
        .await
    }

    /// Assign issue or pull request `number` to `login`.
    pub async fn assign_issue(&self, number: u64, login: &str) -> Result<(), CumulusError> {
        let _issue: serde_json::Value = self
            .patch(
                &format!("/issues/{number}"),
                &serde_json::json!({ "assignees": [login] }),
            )
            .await?;
        Ok(())
    }

    /// Comment on issue or pull request `number`.
    pub async fn create_comment(&self, number: u64, body: &str) -> Result<IssueComment, CumulusError> {
        self.post(
            &format!("/issues/{number}/comments"),
            &serde_json::json!({ "body": body }),
        )
        .await
    }

    /// Merge `head` into branch `base`.
    ///
    /// # Errors
    ///
    /// A merge conflict surfaces as [`CumulusError::GitHubStatus`] with
    /// status 409.
    pub async fn merge(
        &self,
        base: &str,
        head: &str,
        message: &str,
    ) -> Result<MergeOutcome, CumulusError> {
        let request = self.request(Method::POST, "/merges").json(&serde_json::json!({
            "base": base,
            "head": head,
            "commit_message": message,
        }));
        let response = self.send(request).await?;
        if response.status() == StatusCode::NO_CONTENT {
            Ok(MergeOutcome::UpToDate)
        } else {
            Ok(MergeOutcome::Merged)
        }
    }
}

/// Turn a non-success response into a typed error, preferring the API's
/// `message` field over the raw body.
async fn status_error(response: Response) -> CumulusError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or(body);
    CumulusError::GitHubStatus { status, message }
}
