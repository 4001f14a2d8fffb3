use std::path::{Path, PathBuf};

use cumulus_core::CumulusError;
use tracing::debug;

/// A finite stream of change notes, read lazily.
pub type ChangeNotes<'a> = Box<dyn Iterator<Item = Result<String, CumulusError>> + 'a>;

/// Source of raw change notes.
///
/// Every call to [`change_notes`](ChangeNoteProvider::change_notes) starts the
/// sequence from the beginning.
pub trait ChangeNoteProvider {
    /// Start a new pass over the change notes.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be opened. Failures reading an
    /// individual note surface as `Err` items of the iterator.
    fn change_notes(&self) -> Result<ChangeNotes<'_>, CumulusError>;
}

/// Change notes supplied up front.
///
/// # Examples
///
/// ```
/// use cumulus_notes::{ChangeNoteProvider, StaticChangeNotesProvider};
///
/// let provider = StaticChangeNotesProvider::new(vec!["# Info\nFixed it".into()]);
/// let notes: Vec<String> = provider
///     .change_notes()
///     .unwrap()
///     .collect::<Result<_, _>>()
///     .unwrap();
/// assert_eq!(notes, vec!["# Info\nFixed it"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticChangeNotesProvider {
    notes: Vec<String>,
}

impl StaticChangeNotesProvider {
    /// Wrap an ordered list of change notes.
    pub fn new(notes: Vec<String>) -> Self {
        Self { notes }
    }
}

impl ChangeNoteProvider for StaticChangeNotesProvider {
    fn change_notes(&self) -> Result<ChangeNotes<'_>, CumulusError> {
        Ok(Box::new(self.notes.iter().cloned().map(Ok)))
    }
}

/// Change notes stored one per file in a directory.
///
/// Files are yielded in lexicographic file-name order so that the same
/// directory always produces the same document. Subdirectories are skipped.
///
/// # Examples
///
/// ```no_run
/// use cumulus_notes::{ChangeNoteProvider, DirectoryChangeNotesProvider};
///
/// let provider = DirectoryChangeNotesProvider::new("change_notes");
/// for note in provider.change_notes().unwrap() {
///     println!("{}", note.unwrap());
/// }
/// ```
#[derive(Debug, Clone)]
pub struct DirectoryChangeNotesProvider {
    dir: PathBuf,
}

impl DirectoryChangeNotesProvider {
    /// Read change notes from the files in `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory being read.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ChangeNoteProvider for DirectoryChangeNotesProvider {
    fn change_notes(&self) -> Result<ChangeNotes<'_>, CumulusError> {
        if !self.dir.is_dir() {
            return Err(CumulusError::FileNotFound(self.dir.clone()));
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        debug!(dir = %self.dir.display(), count = files.len(), "listed change note files");

        Ok(Box::new(files.into_iter().map(|path| {
            std::fs::read_to_string(&path).map_err(CumulusError::from)
        })))
    }
}
