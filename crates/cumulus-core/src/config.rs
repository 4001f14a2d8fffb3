use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CumulusError;
use crate::version::TagPrefixes;

/// Top-level configuration loaded from `.cumulus.toml`.
///
/// Resolution order: CLI flags > environment variables > config file > defaults.
/// The struct is built once at start-up and passed by reference into every
/// operation.
///
/// # Examples
///
/// ```
/// use cumulus_core::CumulusConfig;
///
/// let config = CumulusConfig::default();
/// assert_eq!(config.github.master_branch, "master");
/// assert_eq!(config.release.prefixes.beta, "beta/");
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CumulusConfig {
    /// GitHub repository and credentials.
    #[serde(default)]
    pub github: GitHubConfig,
    /// Release tag and notes settings.
    #[serde(default)]
    pub release: ReleaseConfig,
    /// Salesforce packaging org credentials.
    #[serde(default)]
    pub salesforce: SalesforceConfig,
    /// Push upgrade settings.
    #[serde(default)]
    pub push: PushConfig,
    /// package.xml generation settings.
    #[serde(default)]
    pub package: PackageConfig,
    /// Apex test run settings.
    #[serde(default)]
    pub apex: ApexConfig,
}

impl CumulusConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CumulusError::Io`] if the file cannot be read, or
    /// [`CumulusError::Toml`] if the content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use cumulus_core::CumulusConfig;
    /// use std::path::Path;
    ///
    /// let config = CumulusConfig::from_file(Path::new(".cumulus.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, CumulusError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`CumulusError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use cumulus_core::CumulusConfig;
    ///
    /// let toml = r#"
    /// [github]
    /// org_name = "SalesforceFoundation"
    /// repo_name = "Cumulus"
    /// "#;
    /// let config = CumulusConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.github.repo_name.as_deref(), Some("Cumulus"));
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, CumulusError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Overlay values taken from environment variables.
    ///
    /// `lookup` returns the value of a variable, or `None` when unset. Passing
    /// the lookup in keeps environment access at the edge of the program.
    ///
    /// # Errors
    ///
    /// Returns [`CumulusError::Config`] if a boolean variable holds something
    /// other than a recognizable truth value.
    ///
    /// # Examples
    ///
    /// ```
    /// use cumulus_core::CumulusConfig;
    ///
    /// let mut config = CumulusConfig::default();
    /// config
    ///     .apply_env(|name| match name {
    ///         "GITHUB_ORG_NAME" => Some("acme".to_string()),
    ///         "PRINT_ONLY" => Some("True".to_string()),
    ///         _ => None,
    ///     })
    ///     .unwrap();
    /// assert_eq!(config.github.org_name.as_deref(), Some("acme"));
    /// assert!(config.release.print_only);
    /// ```
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), CumulusError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(v) = get("GITHUB_ORG_NAME") {
            self.github.org_name = Some(v);
        }
        if let Some(v) = get("GITHUB_REPO_NAME") {
            self.github.repo_name = Some(v);
        }
        if let Some(v) = get("GITHUB_USERNAME") {
            self.github.username = Some(v);
        }
        if let Some(v) = get("GITHUB_PASSWORD") {
            self.github.password = Some(v);
        }
        if let Some(v) = get("MASTER_BRANCH") {
            self.github.master_branch = v;
        }
        if let Some(v) = get("LAST_REL_TAG") {
            self.release.last_tag = Some(v);
        }
        if let Some(v) = get("CURRENT_REL_TAG") {
            self.release.current_tag = Some(v);
        }
        if let Some(v) = get("PREFIX_BETA") {
            self.release.prefixes.beta = v;
        }
        if let Some(v) = get("PREFIX_RELEASE") {
            self.release.prefixes.release = v;
        }
        if let Some(v) = get("PRINT_ONLY") {
            self.release.print_only = parse_flag("PRINT_ONLY", &v)?;
        }
        if let Some(v) = get("SF_USERNAME") {
            self.salesforce.username = Some(v);
        }
        if let Some(v) = get("SF_PASSWORD") {
            self.salesforce.password = Some(v);
        }
        if let Some(v) = get("SF_SERVERURL") {
            self.salesforce.server_url = v;
        }
        if let Some(v) = get("SF_API_VERSION") {
            self.salesforce.api_version = v;
        }
        if let Some(v) = get("NAMESPACE") {
            self.push.namespace = Some(v);
        }
        if let Some(v) = get("PUSH_REQUEST") {
            self.push.request_id = Some(v);
        }
        if let Some(v) = get("VERSION") {
            self.push.version = Some(v);
        }
        if let Some(v) = get("APEX_TEST_NAME_MATCH") {
            self.apex.test_name_match = v;
        }
        if let Some(v) = get("APEX_NAMESPACE") {
            self.apex.namespace = Some(v);
        }
        Ok(())
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool, CumulusError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(CumulusError::Config(format!(
            "{name} must be true or false, got '{other}'"
        ))),
    }
}

/// GitHub repository settings.
///
/// # Examples
///
/// ```
/// use cumulus_core::GitHubConfig;
///
/// let config = GitHubConfig::default();
/// assert_eq!(config.api_url, "https://api.github.com");
/// assert!(config.repository().is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// Organization (or user) owning the repository.
    pub org_name: Option<String>,
    /// Repository name.
    pub repo_name: Option<String>,
    /// Username for basic authentication.
    pub username: Option<String>,
    /// Password or personal access token for basic authentication.
    pub password: Option<String>,
    /// Branch that releases are cut from (default: `"master"`).
    #[serde(default = "default_master_branch")]
    pub master_branch: String,
    /// Base URL of the GitHub REST API.
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

fn default_master_branch() -> String {
    "master".into()
}

fn default_api_url() -> String {
    "https://api.github.com".into()
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            org_name: None,
            repo_name: None,
            username: None,
            password: None,
            master_branch: default_master_branch(),
            api_url: default_api_url(),
        }
    }
}

impl GitHubConfig {
    /// The `(owner, repo)` pair.
    ///
    /// # Errors
    ///
    /// Returns [`CumulusError::Config`] naming the missing variable.
    pub fn repository(&self) -> Result<(&str, &str), CumulusError> {
        let owner = self
            .org_name
            .as_deref()
            .ok_or_else(|| CumulusError::Config("GITHUB_ORG_NAME not set".into()))?;
        let repo = self
            .repo_name
            .as_deref()
            .ok_or_else(|| CumulusError::Config("GITHUB_REPO_NAME not set".into()))?;
        Ok((owner, repo))
    }

    /// Basic-auth credentials, only when both parts are present.
    pub fn basic_auth(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) => Some((user, pass)),
            _ => None,
        }
    }
}

/// Release tag and release notes settings.
///
/// # Examples
///
/// ```
/// use cumulus_core::ReleaseConfig;
///
/// let config = ReleaseConfig::default();
/// assert_eq!(config.notes_file, "release_notes.md");
/// assert!(!config.print_only);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseConfig {
    /// Tag name prefixes.
    #[serde(flatten)]
    pub prefixes: TagPrefixes,
    /// Tag of the previous release; located automatically when unset.
    pub last_tag: Option<String>,
    /// Tag of the release being described.
    pub current_tag: Option<String>,
    /// Print generated notes without publishing them.
    #[serde(default)]
    pub print_only: bool,
    /// File the generated notes are written to before publishing.
    #[serde(default = "default_notes_file")]
    pub notes_file: String,
    /// Prefix of branches that receive master merges.
    #[serde(default = "default_feature_prefix")]
    pub feature_prefix: String,
}

fn default_notes_file() -> String {
    "release_notes.md".into()
}

fn default_feature_prefix() -> String {
    "feature/".into()
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            prefixes: TagPrefixes::default(),
            last_tag: None,
            current_tag: None,
            print_only: false,
            notes_file: default_notes_file(),
            feature_prefix: default_feature_prefix(),
        }
    }
}

/// Salesforce packaging org connection settings.
///
/// # Examples
///
/// ```
/// use cumulus_core::SalesforceConfig;
///
/// let config = SalesforceConfig::default();
/// assert_eq!(config.server_url, "https://login.salesforce.com");
/// assert_eq!(config.api_version, "38.0");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesforceConfig {
    /// Login username.
    pub username: Option<String>,
    /// Password with the security token appended.
    pub password: Option<String>,
    /// Login server.
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// API version used for SOAP login and REST calls.
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

fn default_server_url() -> String {
    "https://login.salesforce.com".into()
}

fn default_api_version() -> String {
    "38.0".into()
}

impl Default for SalesforceConfig {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            server_url: default_server_url(),
            api_version: default_api_version(),
        }
    }
}

impl SalesforceConfig {
    /// The `(username, password)` pair.
    ///
    /// # Errors
    ///
    /// Returns [`CumulusError::Config`] naming the missing variable.
    pub fn credentials(&self) -> Result<(&str, &str), CumulusError> {
        let username = self
            .username
            .as_deref()
            .ok_or_else(|| CumulusError::Config("SF_USERNAME not set".into()))?;
        let password = self
            .password
            .as_deref()
            .ok_or_else(|| CumulusError::Config("SF_PASSWORD not set".into()))?;
        Ok((username, password))
    }
}

/// Push upgrade settings.
///
/// # Examples
///
/// ```
/// use cumulus_core::PushConfig;
///
/// let config = PushConfig::default();
/// assert_eq!(config.poll_interval_secs, 10);
/// assert_eq!(config.slow_poll_interval_secs, 30);
/// assert_eq!(config.slow_after_polls, 10);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    /// Namespace prefix of the managed package.
    pub namespace: Option<String>,
    /// Version to push, e.g. `1.10`.
    pub version: Option<String>,
    /// Existing push request to report on.
    pub request_id: Option<String>,
    /// Seconds between status polls (default: 10).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Seconds between polls once the schedule escalates (default: 30).
    #[serde(default = "default_slow_poll_interval")]
    pub slow_poll_interval_secs: u64,
    /// Number of polls before escalating (default: 10).
    #[serde(default = "default_slow_after_polls")]
    pub slow_after_polls: u32,
}

fn default_poll_interval() -> u64 {
    10
}

fn default_slow_poll_interval() -> u64 {
    30
}

fn default_slow_after_polls() -> u32 {
    10
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            version: None,
            request_id: None,
            poll_interval_secs: default_poll_interval(),
            slow_poll_interval_secs: default_slow_poll_interval(),
            slow_after_polls: default_slow_after_polls(),
        }
    }
}

/// package.xml generation settings.
///
/// # Examples
///
/// ```
/// use cumulus_core::PackageConfig;
///
/// let config = PackageConfig::default();
/// assert_eq!(config.api_version, "38.0");
/// assert!(config.name.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageConfig {
    /// Package name written to `<fullName>`.
    pub name: Option<String>,
    /// Metadata API version written to `<version>`.
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Apex class run after install.
    pub install_class: Option<String>,
    /// Apex class run on uninstall.
    pub uninstall_class: Option<String>,
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            name: None,
            api_version: default_api_version(),
            install_class: None,
            uninstall_class: None,
        }
    }
}

/// Apex test run settings.
///
/// # Examples
///
/// ```
/// use cumulus_core::ApexConfig;
///
/// let config = ApexConfig::default();
/// assert_eq!(config.test_name_match, "%_TEST");
/// assert!(config.namespace.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApexConfig {
    /// SOQL `LIKE` patterns selecting test classes by name, comma separated.
    #[serde(default = "default_test_name_match")]
    pub test_name_match: String,
    /// Namespace prefix of the classes to run. Unset selects classes outside
    /// any namespace.
    pub namespace: Option<String>,
}

fn default_test_name_match() -> String {
    "%_TEST".into()
}

impl Default for ApexConfig {
    fn default() -> Self {
        Self {
            test_name_match: default_test_name_match(),
            namespace: None,
        }
    }
}
