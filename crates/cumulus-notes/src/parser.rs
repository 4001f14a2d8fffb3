use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use cumulus_core::CumulusError;
use regex::Regex;

/// Headings that mark generated sections in a release body.
pub const GENERATED_HEADINGS: [&str; 3] = ["# Critical Changes", "# Changes", "# Issues Closed"];

/// Line separator used in rendered sections.
pub const LINE_SEPARATOR: &str = "\r\n";

/// Pattern a line must match to count as closing an issue.
pub const FIX_ISSUE_PATTERN: &str = r".*[Ff]ix.* #(\d+).*";

static FIX_ISSUE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(FIX_ISSUE_PATTERN).expect("fix issue pattern is valid"));

/// Lines of `note` that fall inside the section opened by `start_heading`.
///
/// The section opens on a line equal to the heading (surrounding whitespace
/// ignored) and closes on the next blank line or at the end of the note.
/// Trailing whitespace is stripped from returned lines.
fn section_lines<'a>(note: &'a str, start_heading: &str) -> Vec<&'a str> {
    let mut lines = Vec::new();
    let mut in_section = false;

    for raw in note.lines() {
        let line = raw.trim_end();
        if line.trim_start() == start_heading {
            in_section = true;
            continue;
        }
        if !in_section {
            continue;
        }
        if line.trim_start().is_empty() {
            in_section = false;
            continue;
        }
        lines.push(line);
    }

    lines
}

/// Collects every line of one section, verbatim and in order.
///
/// # Examples
///
/// ```
/// use cumulus_notes::parser::LineSectionParser;
///
/// let mut parser = LineSectionParser::new("Changes", "# Info");
/// parser.parse("# Info\nAdded a widget\n\nnot part of it");
/// assert_eq!(parser.render().unwrap(), "# Changes\r\nAdded a widget");
/// ```
#[derive(Debug, Clone)]
pub struct LineSectionParser {
    title: String,
    start_heading: String,
    content: Vec<String>,
}

impl LineSectionParser {
    /// Create a parser that renders under `title` and collects lines
    /// following `start_heading`.
    pub fn new(title: impl Into<String>, start_heading: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            start_heading: start_heading.into(),
            content: Vec::new(),
        }
    }

    /// Section title used in the rendered heading.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Lines collected so far.
    pub fn content(&self) -> &[String] {
        &self.content
    }

    /// Scan one change note and append its section lines.
    pub fn parse(&mut self, note: &str) {
        self.content.extend(
            section_lines(note, &self.start_heading)
                .into_iter()
                .map(str::to_string),
        );
    }

    /// Render the section, or `None` when nothing was collected.
    pub fn render(&self) -> Option<String> {
        if self.content.is_empty() {
            return None;
        }
        Some(format!(
            "# {}{LINE_SEPARATOR}{}",
            self.title,
            self.content.join(LINE_SEPARATOR)
        ))
    }
}

/// Collects the numbers of issues fixed inside one section.
///
/// Only lines matching [`FIX_ISSUE_PATTERN`] contribute; other section lines
/// are dropped. Each issue number is kept once, in first-seen order, until
/// [`sort_issues`](IssuesParser::sort_issues) is called.
///
/// # Examples
///
/// ```
/// use cumulus_notes::parser::IssuesParser;
///
/// let mut parser = IssuesParser::new("Issues Closed", "# Issues");
/// parser.parse("# Issues\nFixes #12\nRefactored stuff\nfixed #3").unwrap();
/// parser.parse("# Issues\nFixes #12").unwrap();
/// assert_eq!(parser.issues(), &[12, 3]);
/// parser.sort_issues();
/// assert_eq!(parser.render().unwrap(), "# Issues Closed\r\n3\r\n12");
/// ```
#[derive(Debug, Clone)]
pub struct IssuesParser {
    title: String,
    start_heading: String,
    issues: Vec<u64>,
}

impl IssuesParser {
    /// Create a parser that renders under `title` and scans lines following
    /// `start_heading`.
    pub fn new(title: impl Into<String>, start_heading: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            start_heading: start_heading.into(),
            issues: Vec::new(),
        }
    }

    /// Section title used in the rendered heading.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Issue numbers collected so far.
    pub fn issues(&self) -> &[u64] {
        &self.issues
    }

    /// Scan one change note for fixed issues.
    ///
    /// # Errors
    ///
    /// Returns [`CumulusError::Parse`] if an issue number does not fit in a `u64`.
    pub fn parse(&mut self, note: &str) -> Result<(), CumulusError> {
        for line in section_lines(note, &self.start_heading) {
            let Some(caps) = FIX_ISSUE_RE.captures(line) else {
                continue;
            };
            let number: u64 = caps[1]
                .parse()
                .map_err(|e| CumulusError::Parse(format!("issue number in '{line}': {e}")))?;
            if !self.issues.contains(&number) {
                self.issues.push(number);
            }
        }
        Ok(())
    }

    /// Put the collected issue numbers in ascending order.
    pub fn sort_issues(&mut self) {
        self.issues.sort_unstable();
    }

    /// Render the section, or `None` when no issue was found.
    pub fn render(&self) -> Option<String> {
        if self.issues.is_empty() {
            return None;
        }
        let numbers: Vec<String> = self.issues.iter().map(u64::to_string).collect();
        Some(format!(
            "# {}{LINE_SEPARATOR}{}",
            self.title,
            numbers.join(LINE_SEPARATOR)
        ))
    }
}

/// One section of the release notes and the parser that fills it.
#[derive(Debug, Clone)]
pub enum SectionParser {
    /// Keeps every section line.
    Lines(LineSectionParser),
    /// Keeps only fixed issue numbers.
    Issues(IssuesParser),
}

impl SectionParser {
    /// Section title.
    pub fn title(&self) -> &str {
        match self {
            SectionParser::Lines(p) => p.title(),
            SectionParser::Issues(p) => p.title(),
        }
    }

    /// Feed one change note to the underlying parser.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`IssuesParser::parse`].
    pub fn parse(&mut self, note: &str) -> Result<(), CumulusError> {
        match self {
            SectionParser::Lines(p) => {
                p.parse(note);
                Ok(())
            }
            SectionParser::Issues(p) => p.parse(note),
        }
    }

    /// Render the section, or `None` when it has no content.
    pub fn render(&self) -> Option<String> {
        match self {
            SectionParser::Lines(p) => p.render(),
            SectionParser::Issues(p) => p.render(),
        }
    }
}

/// The built-in release notes sections.
///
/// # Examples
///
/// ```
/// use cumulus_notes::ParserKind;
///
/// let kind: ParserKind = "issues_closed".parse().unwrap();
/// assert_eq!(kind, ParserKind::IssuesClosed);
/// assert_eq!(kind.start_heading(), "# Issues");
/// assert_eq!(kind.title(), "Issues Closed");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParserKind {
    /// `# Warning` lines, rendered as "Critical Changes".
    CriticalChanges,
    /// `# Info` lines, rendered as "Changes".
    Changes,
    /// Issues fixed under `# Issues`, rendered as "Issues Closed".
    IssuesClosed,
}

impl ParserKind {
    /// Default sections, in document order.
    pub const DEFAULT: [ParserKind; 3] = [
        ParserKind::CriticalChanges,
        ParserKind::Changes,
        ParserKind::IssuesClosed,
    ];

    /// Rendered section title.
    pub fn title(self) -> &'static str {
        match self {
            ParserKind::CriticalChanges => "Critical Changes",
            ParserKind::Changes => "Changes",
            ParserKind::IssuesClosed => "Issues Closed",
        }
    }

    /// Heading that opens the section inside a change note.
    pub fn start_heading(self) -> &'static str {
        match self {
            ParserKind::CriticalChanges => "# Warning",
            ParserKind::Changes => "# Info",
            ParserKind::IssuesClosed => "# Issues",
        }
    }

    /// Construct a fresh parser for this section.
    pub fn build(self) -> SectionParser {
        match self {
            ParserKind::CriticalChanges | ParserKind::Changes => {
                SectionParser::Lines(LineSectionParser::new(self.title(), self.start_heading()))
            }
            ParserKind::IssuesClosed => {
                SectionParser::Issues(IssuesParser::new(self.title(), self.start_heading()))
            }
        }
    }
}

impl fmt::Display for ParserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParserKind::CriticalChanges => write!(f, "critical_changes"),
            ParserKind::Changes => write!(f, "changes"),
            ParserKind::IssuesClosed => write!(f, "issues_closed"),
        }
    }
}

impl FromStr for ParserKind {
    type Err = CumulusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace([' ', '-'], "_").as_str() {
            "critical_changes" => Ok(ParserKind::CriticalChanges),
            "changes" => Ok(ParserKind::Changes),
            "issues_closed" => Ok(ParserKind::IssuesClosed),
            other => Err(CumulusError::Config(format!(
                "unknown release notes section: {other}"
            ))),
        }
    }
}
