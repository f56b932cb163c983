//! Naming the place a lookup occupies in the font, for diagnostics.

use std::fmt::{Display, Formatter};

use smol_str::SmolStr;
use write_fonts::types::Tag;

use crate::{common::tags::TagDisplay, diagnostic::Site};

/// The feature (if any) and name (if any) of a lookup.
///
/// A lookup referenced by several features is described by the first
/// feature that references it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct LookupLocation {
    pub(crate) feature: Option<Tag>,
    pub(crate) name: Option<SmolStr>,
}

impl LookupLocation {
    pub(crate) fn new(feature: Option<Tag>, name: Option<SmolStr>) -> Self {
        LookupLocation { feature, name }
    }

    pub(crate) fn site(&self) -> Site {
        Site::new(self.feature, self.name.clone())
    }

    pub(crate) fn site_at(&self, line: Option<u32>) -> Site {
        self.site().at_line(line)
    }

    /// The prefix of an overflow message: "In feature 'xxxx' lookup 'name'".
    pub(crate) fn overflow_prefix(&self) -> String {
        let mut prefix = format!("In feature '{}'", TagDisplay::new(self.feature));
        if let Some(name) = &self.name {
            prefix.push_str(&format!(" lookup '{name}'"));
        }
        prefix
    }
}

impl Display for LookupLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match (self.feature, &self.name) {
            (Some(tag), Some(name)) => {
                write!(f, "in feature '{}' lookup '{name}'", TagDisplay::new(Some(tag)))
            }
            (Some(tag), None) => write!(f, "in feature '{}'", TagDisplay::new(Some(tag))),
            (None, Some(name)) => write!(f, "in stand-alone lookup '{name}'"),
            (None, None) => f.write_str("in stand-alone lookup"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_phrases() {
        let liga = Some(Tag::new(b"liga"));
        let name = Some(SmolStr::new("LIGS"));
        assert_eq!(
            LookupLocation::new(liga, name.clone()).to_string(),
            "in feature 'liga' lookup 'LIGS'"
        );
        assert_eq!(LookupLocation::new(liga, None).to_string(), "in feature 'liga'");
        assert_eq!(
            LookupLocation::new(None, name.clone()).to_string(),
            "in stand-alone lookup 'LIGS'"
        );
        assert_eq!(
            LookupLocation::new(None, name).overflow_prefix(),
            "In feature '\\xff\\xff\\xff\\xff' lookup 'LIGS'"
        );
        assert_eq!(LookupLocation::new(liga, None).overflow_prefix(), "In feature 'liga'");
    }
}
