use cumulus_core::CumulusError;
use cumulus_notes::merge_release_body;
use tracing::info;

use crate::client::GitHubClient;
use crate::models::Release;

/// Merge `notes` into the body of the release tagged `tag` and save it.
///
/// Hand-written text around a previously generated block is preserved; see
/// [`merge_release_body`].
///
/// # Errors
///
/// Returns [`CumulusError::Config`] if no release exists for `tag`, or any
/// API error.
pub async fn publish_release_notes(
    client: &GitHubClient,
    tag: &str,
    notes: &str,
) -> Result<Release, CumulusError> {
    let release = client
        .find_release(tag)
        .await?
        .ok_or_else(|| CumulusError::Config(format!("no release found for tag '{tag}'")))?;

    let body = merge_release_body(release.body.as_deref().unwrap_or_default(), notes);
    let updated = client.update_release_body(release.id, &body).await?;
    info!(
        tag,
        release_id = updated.id,
        repository = %client.repository(),
        "published release notes"
    );
    Ok(updated)
}
