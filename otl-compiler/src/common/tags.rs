//! tags and constants

use std::fmt::{Display, Formatter};

use write_fonts::types::Tag;

pub const LANG_DFLT: Tag = Tag::new(b"dflt");
pub const SCRIPT_DFLT: Tag = Tag::new(b"DFLT");
pub const GSUB: Tag = Tag::new(b"GSUB");
pub const GPOS: Tag = Tag::new(b"GPOS");
pub const GDEF: Tag = Tag::new(b"GDEF");

/// Stands in for the feature tag of lookups that no feature references.
pub const NO_FEATURE: [u8; 4] = [0xff; 4];

/// Writes a tag byte by byte, escaping anything that isn't printable ascii.
pub(crate) struct TagDisplay(pub(crate) [u8; 4]);

impl TagDisplay {
    pub(crate) fn new(tag: Option<Tag>) -> Self {
        TagDisplay(tag.map(Tag::into_bytes).unwrap_or(NO_FEATURE))
    }
}

impl Display for TagDisplay {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for byte in self.0 {
            if (0x20..0x7f).contains(&byte) {
                write!(f, "{}", byte as char)?;
            } else {
                write!(f, "\\x{byte:02x}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_tags() {
        assert_eq!(TagDisplay::new(Some(Tag::new(b"liga"))).to_string(), "liga");
        assert_eq!(TagDisplay::new(None).to_string(), "\\xff\\xff\\xff\\xff");
    }
}
