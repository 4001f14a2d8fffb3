use std::path::Path;

use cumulus_core::CumulusError;

/// Read subscriber org Ids from `path`, one per line. Blank lines and lines
/// starting with `#` are skipped.
///
/// # Errors
///
/// Returns [`CumulusError::FileNotFound`] if the file does not exist.
pub fn read_org_ids(path: &Path) -> Result<Vec<String>, CumulusError> {
    if !path.is_file() {
        return Err(CumulusError::FileNotFound(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path)?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}
