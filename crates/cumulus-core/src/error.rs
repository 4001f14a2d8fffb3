use std::path::PathBuf;

/// Errors that can occur across the Cumulus toolkit.
///
/// Each variant wraps a specific error domain. Library crates use this type
/// directly; the `miette::Diagnostic` derive lets the binary crate propagate
/// them with `?` into a `miette::Report`.
///
/// # Examples
///
/// ```
/// use cumulus_core::CumulusError;
///
/// let err = CumulusError::Config("GITHUB_ORG_NAME not set".into());
/// assert!(err.to_string().contains("GITHUB_ORG_NAME"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum CumulusError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    #[diagnostic(help("set the value in .cumulus.toml or the matching environment variable"))]
    Config(String),

    /// Malformed input: version strings, change notes, metadata files.
    #[error("parse error: {0}")]
    Parse(String),

    /// GitHub transport or decoding failure.
    #[error("GitHub error: {0}")]
    GitHub(String),

    /// GitHub answered with a non-success status code.
    #[error("GitHub API error {status}: {message}")]
    GitHubStatus {
        /// HTTP status code returned by the API.
        status: u16,
        /// Error message from the response body.
        message: String,
    },

    /// Salesforce login, query, or DML failure.
    #[error("Salesforce error: {0}")]
    Salesforce(String),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A required file was not found.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Several independent operations failed; one message per failure.
    #[error("{} operations failed:\n{}", .0.len(), .0.join("\n"))]
    Batch(Vec<String>),
}

impl CumulusError {
    /// HTTP status of a GitHub API failure, if this is one.
    ///
    /// # Examples
    ///
    /// ```
    /// use cumulus_core::CumulusError;
    ///
    /// let err = CumulusError::GitHubStatus { status: 409, message: "Merge conflict".into() };
    /// assert_eq!(err.github_status(), Some(409));
    /// assert_eq!(CumulusError::GitHub("timeout".into()).github_status(), None);
    /// ```
    pub fn github_status(&self) -> Option<u16> {
        match self {
            CumulusError::GitHubStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}
