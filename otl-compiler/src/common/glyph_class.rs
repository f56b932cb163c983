use std::sync::Arc;

use write_fonts::types::GlyphId16;

/// A set of glyphs.
///
/// The members are always sorted and deduplicated, so two classes with the
/// same members compare equal regardless of how they were written. Where
/// order matters (for instance the pairing of targets and replacements in a
/// reverse chaining rule) the model uses explicit sequences instead.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GlyphClass(Arc<[GlyphId16]>);

impl std::iter::FromIterator<GlyphId16> for GlyphClass {
    fn from_iter<T: IntoIterator<Item = GlyphId16>>(iter: T) -> Self {
        let mut items = iter.into_iter().collect::<Vec<_>>();
        items.sort_unstable();
        items.dedup();
        GlyphClass(items.into())
    }
}

impl<'a> std::iter::IntoIterator for &'a GlyphClass {
    type Item = &'a GlyphId16;

    type IntoIter = std::slice::Iter<'a, GlyphId16>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl GlyphClass {
    pub fn items(&self) -> &[GlyphId16] {
        &self.0
    }

    pub fn empty() -> Self {
        Self(Arc::new([]))
    }

    pub fn iter(&self) -> std::iter::Copied<std::slice::Iter<'_, GlyphId16>> {
        self.items().iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, gid: GlyphId16) -> bool {
        self.0.binary_search(&gid).is_ok()
    }

    /// `true` if any glyph is a member of both classes.
    pub fn intersects(&self, other: &GlyphClass) -> bool {
        let (small, large) = if self.len() < other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small.iter().any(|gid| large.contains(gid))
    }

    /// The lowest glyph id in the class, if any.
    pub fn first(&self) -> Option<GlyphId16> {
        self.0.first().copied()
    }
}

impl Default for GlyphClass {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Vec<GlyphId16>> for GlyphClass {
    fn from(src: Vec<GlyphId16>) -> GlyphClass {
        src.into_iter().collect()
    }
}

impl From<GlyphId16> for GlyphClass {
    fn from(src: GlyphId16) -> GlyphClass {
        let slice: &[_] = &[src];
        GlyphClass(slice.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(ids: &[u16]) -> GlyphClass {
        ids.iter().copied().map(GlyphId16::new).collect()
    }

    #[test]
    fn sorted_and_deduped() {
        let cls = class(&[9, 3, 9, 1]);
        assert_eq!(cls.items(), class(&[1, 3, 9]).items());
        assert_eq!(cls, class(&[1, 9, 3]));
        assert_eq!(cls.first(), Some(GlyphId16::new(1)));
    }

    #[test]
    fn intersection() {
        assert!(class(&[1, 2, 3]).intersects(&class(&[3, 4])));
        assert!(!class(&[1, 2, 3]).intersects(&class(&[4, 5, 6, 7])));
        assert!(!GlyphClass::empty().intersects(&class(&[1])));
    }
}
