use cumulus_core::{CumulusError, ReleaseVersion, TagPrefixes};

/// Find the tag of the release that precedes `current_tag`.
///
/// Candidates are tags carrying the release or beta prefix whose version is
/// strictly lower than the current one. Betas are only considered when the
/// current tag is itself a beta. Unrelated and malformed tags are ignored.
///
/// # Errors
///
/// Returns [`CumulusError::Parse`] if `current_tag` is not a release or beta
/// tag.
///
/// # Examples
///
/// ```
/// use cumulus_core::TagPrefixes;
/// use cumulus_github::find_previous_release_tag;
///
/// let tags = ["release/1.9", "release/1.10", "beta/1.11-Beta_1", "release/1.11"];
/// let prev = find_previous_release_tag(tags, "release/1.11", &TagPrefixes::default()).unwrap();
/// assert_eq!(prev.as_deref(), Some("release/1.10"));
/// ```
pub fn find_previous_release_tag<'a, I>(
    tags: I,
    current_tag: &str,
    prefixes: &TagPrefixes,
) -> Result<Option<String>, CumulusError>
where
    I: IntoIterator<Item = &'a str>,
{
    let current = ReleaseVersion::from_tag(current_tag, prefixes)?;

    Ok(tags
        .into_iter()
        .filter_map(|tag| prefixes.version_of(tag).map(|v| (v, tag)))
        .filter(|(v, _)| *v < current)
        .filter(|(v, _)| current.is_beta() || !v.is_beta())
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, tag)| tag.to_string()))
}
