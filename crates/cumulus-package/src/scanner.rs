use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use cumulus_core::CumulusError;
use tracing::{debug, warn};

use crate::registry::{parsers_for_folder, MetadataParser};
use crate::xml::MetadataDocument;

/// Collect package members per metadata type from the source folder `root`.
///
/// Top-level folders are visited in name order and each is handed to every
/// registry entry for that folder. Hidden entries, `package.xml` and
/// `-meta.xml` companion files are ignored. Types without members are left
/// out of the result.
///
/// # Errors
///
/// Returns [`CumulusError::FileNotFound`] if `root` is not a directory,
/// [`CumulusError::Parse`] for a folder with no registry entry or an
/// unreadable metadata XML file, and [`CumulusError::Io`] on read failures.
pub fn scan_metadata(root: &Path) -> Result<BTreeMap<String, Vec<String>>, CumulusError> {
    if !root.is_dir() {
        return Err(CumulusError::FileNotFound(root.to_path_buf()));
    }

    let mut types: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for path in visible_entries(root)? {
        let folder = entry_name(&path);
        if !path.is_dir() {
            if folder != "package.xml" {
                debug!(file = %path.display(), "skipping file at source root");
            }
            continue;
        }

        let mut parsers = parsers_for_folder(&folder).peekable();
        if parsers.peek().is_none() {
            return Err(CumulusError::Parse(format!(
                "no metadata parser for folder '{folder}'"
            )));
        }
        for metadata_type in parsers {
            let members = parse_folder(&path, metadata_type.parser)?;
            debug!(
                folder = %folder,
                metadata_type = metadata_type.name,
                count = members.len(),
                "parsed metadata folder"
            );
            if !members.is_empty() {
                types
                    .entry(metadata_type.name.to_string())
                    .or_default()
                    .extend(members);
            }
        }
    }
    Ok(types)
}

fn parse_folder(dir: &Path, parser: MetadataParser) -> Result<Vec<String>, CumulusError> {
    match parser {
        MetadataParser::FileName { extension } => Ok(files_with(dir, extension)?
            .into_iter()
            .map(|(stem, _)| stem)
            .collect()),
        MetadataParser::Folder { extension } => parse_folders(dir, extension),
        MetadataParser::Bundle => Ok(visible_entries(dir)?
            .into_iter()
            .filter(|p| p.is_dir())
            .map(|p| entry_name(&p))
            .collect()),
        MetadataParser::CustomObject => Ok(files_with(dir, "object")?
            .into_iter()
            .map(|(stem, _)| stem)
            .filter(|stem| is_custom(stem))
            .collect()),
        MetadataParser::XmlElement {
            extension,
            element,
            custom_only,
        } => xml_members(dir, extension, |stem, doc| {
            doc.components(element)
                .iter()
                .filter_map(|c| c.full_name.as_deref())
                .filter(|name| !custom_only || is_custom(stem) || is_custom(name))
                .map(|name| format!("{stem}.{name}"))
                .collect()
        }),
        MetadataParser::CustomLabels => xml_members(dir, "labels", |_, doc| {
            doc.labels
                .iter()
                .filter_map(|c| c.full_name.clone())
                .collect()
        }),
        MetadataParser::RecordType => xml_members(dir, "object", |stem, doc| {
            doc.record_types
                .iter()
                .filter(|c| c.active != Some(false))
                .filter_map(|c| c.full_name.as_deref())
                .map(|name| format!("{stem}.{name}"))
                .collect()
        }),
        MetadataParser::BusinessProcess => xml_members(dir, "object", |stem, doc| {
            doc.business_processes
                .iter()
                .filter_map(|c| c.full_name.as_deref())
                .map(|name| format!("{stem}.{}", percent_encode(name)))
                .collect()
        }),
    }
}

/// `Folder/` members for each subfolder followed by `Folder/item` for its
/// files.
fn parse_folders(dir: &Path, extension: Option<&str>) -> Result<Vec<String>, CumulusError> {
    let mut members = Vec::new();
    for sub in visible_entries(dir)?.into_iter().filter(|p| p.is_dir()) {
        let folder = entry_name(&sub);
        members.push(folder.clone());
        match extension {
            Some(ext) => {
                for (stem, _) in files_with(&sub, ext)? {
                    members.push(format!("{folder}/{stem}"));
                }
            }
            None => {
                for file in visible_entries(&sub)? {
                    let name = entry_name(&file);
                    if file.is_file() && !is_meta(&name) {
                        members.push(format!("{folder}/{name}"));
                    }
                }
            }
        }
    }
    Ok(members)
}

fn xml_members<F>(dir: &Path, extension: &str, extract: F) -> Result<Vec<String>, CumulusError>
where
    F: Fn(&str, &MetadataDocument) -> Vec<String>,
{
    let mut members = Vec::new();
    for (stem, path) in files_with(dir, extension)? {
        let text = fs::read_to_string(&path)?;
        let doc = MetadataDocument::parse(&text, &path.display().to_string())?;
        members.extend(extract(&stem, &doc));
    }
    Ok(members)
}

/// `(stem, path)` of every file in `dir` ending in `.extension`. Other files
/// are logged and skipped.
fn files_with(dir: &Path, extension: &str) -> Result<Vec<(String, PathBuf)>, CumulusError> {
    let suffix = format!(".{extension}");
    let mut files = Vec::new();
    for path in visible_entries(dir)? {
        let name = entry_name(&path);
        if !path.is_file() || is_meta(&name) {
            continue;
        }
        match name.strip_suffix(&suffix) {
            Some(stem) => files.push((stem.to_string(), path.clone())),
            None => warn!(file = %path.display(), expected = %suffix, "unexpected file in metadata folder"),
        }
    }
    Ok(files)
}

/// Directory entries sorted by path, without hidden ones.
fn visible_entries(dir: &Path) -> Result<Vec<PathBuf>, CumulusError> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !entry_name(&path).starts_with('.') {
            entries.push(path);
        }
    }
    entries.sort();
    Ok(entries)
}

fn entry_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn is_meta(name: &str) -> bool {
    name.ends_with("-meta.xml")
}

fn is_custom(name: &str) -> bool {
    name.contains("__")
}

fn percent_encode(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || b"-_.~".contains(&byte) {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}
