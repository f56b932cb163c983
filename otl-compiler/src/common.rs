//! Types and helpers shared across modules

use std::fmt::{Display, Formatter};

use smol_str::SmolStr;
pub use write_fonts::types::{GlyphId16, Tag};

mod glyph_class;
mod glyph_map;
pub(crate) mod tags;

pub use glyph_class::GlyphClass;
pub use glyph_map::GlyphMap;

/// The name of a glyph, as it appears in the glyph order.
pub type GlyphName = SmolStr;

/// A glyph or glyph class.
///
/// Pair positioning rules accept either; a rule where both sides are single
/// glyphs is a specific pair, and anything else is class based.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum GlyphOrClass {
    /// A single glyph
    Glyph(GlyphId16),
    /// A set of glyphs
    Class(GlyphClass),
}

impl GlyphOrClass {
    pub(crate) fn is_class(&self) -> bool {
        matches!(self, GlyphOrClass::Class(_))
    }

    /// Convert to a class; a single glyph becomes a one-member class.
    pub(crate) fn to_class(&self) -> GlyphClass {
        match self {
            GlyphOrClass::Glyph(gid) => (*gid).into(),
            GlyphOrClass::Class(class) => class.clone(),
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = GlyphId16> + '_ {
        let (single, class) = match self {
            GlyphOrClass::Glyph(gid) => (Some(*gid), None),
            GlyphOrClass::Class(class) => (None, Some(class.iter())),
        };
        single.into_iter().chain(class.into_iter().flatten())
    }
}

impl From<GlyphId16> for GlyphOrClass {
    fn from(src: GlyphId16) -> Self {
        GlyphOrClass::Glyph(src)
    }
}

impl From<GlyphClass> for GlyphOrClass {
    fn from(src: GlyphClass) -> Self {
        GlyphOrClass::Class(src)
    }
}

/// Formats glyph ids with their names, for use in diagnostics.
pub(crate) struct GlyphsDisplay<'a, I> {
    glyphs: &'a GlyphMap,
    items: I,
}

impl<'a, I> GlyphsDisplay<'a, I>
where
    I: Iterator<Item = GlyphId16> + Clone,
{
    pub(crate) fn new(glyphs: &'a GlyphMap, items: I) -> Self {
        Self { glyphs, items }
    }
}

impl<I> Display for GlyphsDisplay<'_, I>
where
    I: Iterator<Item = GlyphId16> + Clone,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (i, gid) in self.items.clone().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", self.glyphs.display(gid))?;
        }
        Ok(())
    }
}

impl GlyphMap {
    /// Format a glyph or class: classes are written in brackets.
    pub(crate) fn display_token(&self, item: &GlyphOrClass) -> String {
        match item {
            GlyphOrClass::Glyph(gid) => self.display(*gid).to_string(),
            GlyphOrClass::Class(class) => {
                format!("[{}]", GlyphsDisplay::new(self, class.iter()))
            }
        }
    }

    pub(crate) fn display_seq<'a>(
        &'a self,
        glyphs: &'a [GlyphId16],
    ) -> GlyphsDisplay<'a, impl Iterator<Item = GlyphId16> + Clone + 'a> {
        GlyphsDisplay::new(self, glyphs.iter().copied())
    }
}
