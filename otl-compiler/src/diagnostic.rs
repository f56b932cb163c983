//! Reporting errors, warnings, and other information to the user.
//!
//! Each compilation owns a single [`Reporter`]; every stage of the pipeline
//! writes to it, and it is drained into a [`DiagnosticSet`] when compilation
//! finishes (successfully or not).

use std::fmt::{Display, Formatter};

use smol_str::SmolStr;
use write_fonts::types::Tag;

/// The severity of a diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// Informational; an automatic fixup was applied.
    Note,
    /// Questionable input; compilation continues with a defined fallback.
    Warning,
    /// A definite problem. Compilation continues so that more errors can be
    /// reported, but the result is not usable.
    Error,
    /// An unrecoverable problem. Compilation stops.
    Fatal,
}

/// Where a diagnostic originates.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Site {
    /// The feature containing the offending rule, if any
    pub feature: Option<Tag>,
    /// The name of the lookup containing the offending rule, if it has one
    pub lookup: Option<SmolStr>,
    /// The line of the offending statement, if known
    pub line: Option<u32>,
}

/// A message produced during compilation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: Level,
    pub font_name: SmolStr,
    pub feature: Option<Tag>,
    pub lookup: Option<SmolStr>,
    pub line: Option<u32>,
    message: String,
}

/// An ordered collection of diagnostics.
#[derive(Clone, Debug, Default)]
pub struct DiagnosticSet {
    messages: Vec<Diagnostic>,
    max_to_print: usize,
}

/// Returned by [`Reporter::fatal`]; the pipeline must stop.
///
/// This carries no information; the diagnostic itself lives in the reporter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Fatal;

/// The log that collects diagnostics during one compilation.
#[derive(Debug)]
pub(crate) struct Reporter {
    font_name: SmolStr,
    messages: Vec<Diagnostic>,
    // only the top-level reporter forwards to `log`, so that the log output
    // has the same order as the collected messages.
    echo: bool,
}

impl Display for Level {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Level::Note => "NOTE",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
            Level::Fatal => "FATAL",
        })
    }
}

impl Site {
    pub fn new(feature: Option<Tag>, lookup: Option<SmolStr>) -> Self {
        Site {
            feature,
            lookup,
            line: None,
        }
    }

    pub fn at_line(&self, line: Option<u32>) -> Self {
        Site {
            line,
            ..self.clone()
        }
    }
}

impl Diagnostic {
    pub fn new(level: Level, font_name: SmolStr, site: Site, message: impl Into<String>) -> Self {
        Diagnostic {
            level,
            font_name,
            feature: site.feature,
            lookup: site.lookup,
            line: site.line,
            message: message.into(),
        }
    }

    pub fn text(&self) -> &str {
        &self.message
    }

    /// `true` for errors and fatal errors.
    pub fn is_error(&self) -> bool {
        self.level >= Level::Error
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] <{}> {}", self.level, self.font_name, self.message)?;
        if let Some(line) = self.line {
            write!(f, " [line {line}]")?;
        }
        Ok(())
    }
}

impl DiagnosticSet {
    pub(crate) fn new(messages: Vec<Diagnostic>, max_to_print: usize) -> Self {
        DiagnosticSet {
            messages,
            max_to_print,
        }
    }

    /// All messages, in the order they were emitted.
    pub fn messages(&self) -> &[Diagnostic] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The number of messages at exactly this level.
    pub fn count(&self, level: Level) -> usize {
        self.messages.iter().filter(|msg| msg.level == level).count()
    }

    /// The number of errors and fatal errors.
    pub fn count_errors(&self) -> usize {
        self.messages.iter().filter(|msg| msg.is_error()).count()
    }

    /// `true` if any message is an error or fatal error.
    pub fn has_errors(&self) -> bool {
        self.messages.iter().any(Diagnostic::is_error)
    }

    /// The fatal message that stopped compilation, if there was one.
    pub fn fatal(&self) -> Option<&Diagnostic> {
        self.messages.iter().find(|msg| msg.level == Level::Fatal)
    }

    /// Return a type that can display the messages, one per line.
    ///
    /// At most `max_to_print` messages are written (see
    /// [`Opts::max_error_messages`](crate::compile::Opts::max_error_messages)).
    pub fn display(&self) -> impl Display + '_ {
        DiagnosticDisplayer(self)
    }
}

struct DiagnosticDisplayer<'a>(&'a DiagnosticSet);

impl Display for DiagnosticDisplayer<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let set = self.0;
        for msg in set.messages.iter().take(set.max_to_print) {
            writeln!(f, "{msg}")?;
        }
        if let Some(overflow) = set.messages.len().checked_sub(set.max_to_print) {
            if overflow > 0 {
                writeln!(f, "... and {overflow} more")?;
            }
        }
        Ok(())
    }
}

impl Reporter {
    pub(crate) fn new(font_name: impl Into<SmolStr>) -> Self {
        Reporter {
            font_name: font_name.into(),
            messages: Vec::new(),
            echo: true,
        }
    }

    /// A reporter for work that will later be merged with [`Reporter::extend`].
    pub(crate) fn scoped(&self) -> Self {
        Reporter {
            font_name: self.font_name.clone(),
            messages: Vec::new(),
            echo: false,
        }
    }

    pub(crate) fn note(&mut self, site: &Site, message: impl Into<String>) {
        self.emit(Level::Note, site, message);
    }

    pub(crate) fn warning(&mut self, site: &Site, message: impl Into<String>) {
        self.emit(Level::Warning, site, message);
    }

    pub(crate) fn error(&mut self, site: &Site, message: impl Into<String>) {
        self.emit(Level::Error, site, message);
    }

    #[must_use]
    pub(crate) fn fatal(&mut self, site: &Site, message: impl Into<String>) -> Fatal {
        self.emit(Level::Fatal, site, message);
        Fatal
    }

    fn emit(&mut self, level: Level, site: &Site, message: impl Into<String>) {
        let msg = Diagnostic::new(level, self.font_name.clone(), site.clone(), message);
        self.push(msg);
    }

    fn push(&mut self, msg: Diagnostic) {
        if self.echo {
            // callers print the collected set themselves
            log::debug!("{msg}");
        }
        self.messages.push(msg);
    }

    /// Append the messages collected by a scoped reporter.
    pub(crate) fn extend(&mut self, other: Reporter) {
        for msg in other.messages {
            self.push(msg);
        }
    }

    pub(crate) fn has_errors(&self) -> bool {
        self.messages.iter().any(Diagnostic::is_error)
    }

    #[cfg(test)]
    pub(crate) fn has_fatal(&self) -> bool {
        self.messages.iter().any(|msg| msg.level == Level::Fatal)
    }

    #[cfg(test)]
    pub(crate) fn messages(&self) -> &[Diagnostic] {
        &self.messages
    }

    pub(crate) fn into_set(self, max_to_print: usize) -> DiagnosticSet {
        DiagnosticSet::new(self.messages, max_to_print)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_format() {
        let mut reporter = Reporter::new("SourceSans-Test");
        let site = Site::new(Some(Tag::new(b"liga")), None).at_line(Some(12));
        reporter.note(&site, "Removing duplicate single substitution in feature 'liga': a, a");
        let _ = reporter.fatal(&Site::default(), "it all went wrong");
        let set = reporter.into_set(100);
        assert_eq!(
            set.messages()[0].to_string(),
            "[NOTE] <SourceSans-Test> Removing duplicate single substitution in feature 'liga': a, a [line 12]"
        );
        assert_eq!(
            set.messages()[1].to_string(),
            "[FATAL] <SourceSans-Test> it all went wrong"
        );
        assert!(set.has_errors());
        assert_eq!(set.fatal(), Some(&set.messages()[1]));
    }

    #[test]
    fn scoped_messages_keep_order() {
        let mut reporter = Reporter::new("Font");
        let mut first = reporter.scoped();
        let mut second = reporter.scoped();
        second.warning(&Site::default(), "two");
        first.error(&Site::default(), "one");
        reporter.note(&Site::default(), "zero");
        reporter.extend(first);
        reporter.extend(second);
        let texts = reporter
            .messages()
            .iter()
            .map(Diagnostic::text)
            .collect::<Vec<_>>();
        assert_eq!(texts, ["zero", "one", "two"]);
        assert!(reporter.has_errors());
        assert!(!reporter.has_fatal());
    }

    #[test]
    fn truncated_display() {
        let mut reporter = Reporter::new("Font");
        for i in 0..5 {
            reporter.warning(&Site::default(), format!("warning {i}"));
        }
        let set = reporter.into_set(2);
        let text = set.display().to_string();
        assert_eq!(text.lines().count(), 3);
        assert!(text.ends_with("... and 3 more\n"));
        assert_eq!(set.count(Level::Warning), 5);
        assert!(!set.has_errors());
    }
}
