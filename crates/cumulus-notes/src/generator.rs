use std::path::{Path, PathBuf};

use cumulus_core::CumulusError;
use tracing::{debug, info};

use crate::parser::{ParserKind, SectionParser};
use crate::provider::{ChangeNoteProvider, DirectoryChangeNotesProvider, StaticChangeNotesProvider};

/// Separator placed between rendered sections.
pub const SECTION_SEPARATOR: &str = "\r\n\r\n";

/// Lifecycle of a [`ReleaseNotesGenerator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    /// Nothing parsed yet.
    Initialized,
    /// Change notes are being fed to the parsers.
    Parsing,
    /// The document has been produced.
    Rendered,
}

/// Feeds change notes from one provider through an ordered list of section
/// parsers and joins the non-empty sections into a document.
///
/// # Examples
///
/// ```
/// use cumulus_notes::ReleaseNotesGenerator;
///
/// let mut generator = ReleaseNotesGenerator::static_notes(vec![
///     "# Warning\nBreaks X".into(),
///     "# Issues\nFixes #9\nFixes #5".into(),
/// ]);
/// let notes = generator.generate().unwrap();
/// assert_eq!(notes, "# Critical Changes\r\nBreaks X\r\n\r\n# Issues Closed\r\n5\r\n9");
/// ```
pub struct ReleaseNotesGenerator {
    provider: Box<dyn ChangeNoteProvider>,
    parsers: Vec<SectionParser>,
    state: GeneratorState,
    document: Option<String>,
}

impl ReleaseNotesGenerator {
    /// Create a generator with an explicit parser list. Sections appear in
    /// the document in the order given here.
    pub fn new(provider: impl ChangeNoteProvider + 'static, parsers: Vec<SectionParser>) -> Self {
        Self {
            provider: Box::new(provider),
            parsers,
            state: GeneratorState::Initialized,
            document: None,
        }
    }

    /// Create a generator with the Critical Changes, Changes, and Issues
    /// Closed sections.
    pub fn with_default_parsers(provider: impl ChangeNoteProvider + 'static) -> Self {
        let parsers = ParserKind::DEFAULT.iter().map(|k| k.build()).collect();
        Self::new(provider, parsers)
    }

    /// Default sections over a fixed list of change notes.
    pub fn static_notes(notes: Vec<String>) -> Self {
        Self::with_default_parsers(StaticChangeNotesProvider::new(notes))
    }

    /// Default sections over the files of a directory.
    pub fn directory(dir: impl Into<PathBuf>) -> Self {
        Self::with_default_parsers(DirectoryChangeNotesProvider::new(dir))
    }

    /// Current lifecycle state.
    pub fn state(&self) -> GeneratorState {
        self.state
    }

    /// The registered parsers, with whatever they collected.
    pub fn parsers(&self) -> &[SectionParser] {
        &self.parsers
    }

    /// Produce the release notes document.
    ///
    /// Once rendered, later calls return the same document without reading
    /// the provider again.
    ///
    /// # Errors
    ///
    /// Any provider or parser error aborts the run; parsers keep none of the
    /// partial results and the generator returns to
    /// [`GeneratorState::Initialized`].
    pub fn generate(&mut self) -> Result<String, CumulusError> {
        if let Some(document) = &self.document {
            return Ok(document.clone());
        }

        self.state = GeneratorState::Parsing;
        match self.run() {
            Ok((parsers, document)) => {
                self.parsers = parsers;
                self.document = Some(document.clone());
                self.state = GeneratorState::Rendered;
                Ok(document)
            }
            Err(e) => {
                self.state = GeneratorState::Initialized;
                Err(e)
            }
        }
    }

    fn run(&self) -> Result<(Vec<SectionParser>, String), CumulusError> {
        let mut parsers = self.parsers.clone();
        let mut note_count = 0usize;

        for note in self.provider.change_notes()? {
            let note = note?;
            for parser in parsers.iter_mut() {
                parser.parse(&note)?;
            }
            note_count += 1;
        }

        for parser in parsers.iter_mut() {
            if let SectionParser::Issues(issues) = parser {
                issues.sort_issues();
            }
        }

        let mut sections = Vec::new();
        for parser in &parsers {
            match parser.render() {
                Some(rendered) => sections.push(rendered),
                None => debug!(section = parser.title(), "section empty, omitted"),
            }
        }
        info!(
            notes = note_count,
            sections = sections.len(),
            "generated release notes"
        );

        Ok((parsers, sections.join(SECTION_SEPARATOR)))
    }
}

/// Write release notes as UTF-8 with CRLF line endings.
///
/// # Errors
///
/// Returns [`CumulusError::Io`] if the file cannot be written.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use cumulus_notes::generator::write_release_notes;
///
/// write_release_notes(Path::new("release_notes.md"), "# Changes\nDid Y").unwrap();
/// ```
pub fn write_release_notes(path: &Path, document: &str) -> Result<(), CumulusError> {
    let normalized = document.replace("\r\n", "\n").replace('\n', "\r\n");
    std::fs::write(path, normalized)?;
    debug!(path = %path.display(), "wrote release notes");
    Ok(())
}

/// Read release notes previously written by [`write_release_notes`].
///
/// # Errors
///
/// Returns [`CumulusError::FileNotFound`] if the file does not exist, or
/// [`CumulusError::Io`] if it cannot be read as UTF-8.
pub fn read_release_notes(path: &Path) -> Result<String, CumulusError> {
    if !path.exists() {
        return Err(CumulusError::FileNotFound(path.to_path_buf()));
    }
    Ok(std::fs::read_to_string(path)?)
}
