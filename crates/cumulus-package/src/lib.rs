//! package.xml generation from a Salesforce metadata source folder.
//!
//! [`scan_metadata`] walks the top-level folders of a source directory and
//! uses the closed [`METADATA_TYPES`] registry to extract member names per
//! metadata type. [`PackageXml`] renders the manifest with members ordered by
//! [`metadata_sort_key`].

pub mod manifest;
pub mod registry;
pub mod scanner;
mod xml;

use std::path::Path;

use cumulus_core::{CumulusError, PackageConfig};

pub use manifest::{metadata_sort_key, PackageXml, METADATA_NAMESPACE};
pub use registry::{parsers_for_folder, MetadataParser, MetadataType, METADATA_TYPES};
pub use scanner::scan_metadata;

/// Scan `root` and render its package.xml using the name, API version and
/// install hooks from `config`.
///
/// # Errors
///
/// Returns [`CumulusError::FileNotFound`] if `root` is not a directory, or
/// any error from [`scan_metadata`].
pub fn generate_package_xml(root: &Path, config: &PackageConfig) -> Result<String, CumulusError> {
    let types = scan_metadata(root)?;
    let manifest = PackageXml {
        name: config.name.clone(),
        api_version: config.api_version.clone(),
        types,
        install_class: config.install_class.clone(),
        uninstall_class: config.uninstall_class.clone(),
    };
    Ok(manifest.render())
}
