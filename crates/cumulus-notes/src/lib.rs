//! Release notes generation from change notes.
//!
//! A [`provider::ChangeNoteProvider`] yields raw change notes (pull request
//! bodies, files, or a fixed list). Each [`parser::SectionParser`] scans every
//! note for its own section, and the [`generator::ReleaseNotesGenerator`]
//! stitches the rendered sections into one document. [`merge`] folds that
//! document into an existing release body.

pub mod generator;
pub mod merge;
pub mod parser;
pub mod provider;

pub use generator::{GeneratorState, ReleaseNotesGenerator, SECTION_SEPARATOR};
pub use merge::merge_release_body;
pub use parser::{ParserKind, SectionParser, GENERATED_HEADINGS};
pub use provider::{ChangeNoteProvider, DirectoryChangeNotesProvider, StaticChangeNotesProvider};
