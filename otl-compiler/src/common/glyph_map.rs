use super::{GlyphId16, GlyphName};
use std::{borrow::Cow, collections::HashMap, convert::TryInto, iter::FromIterator};

/// A glyph map for mapping between glyph names and numeral `GlyphId16`s.
///
/// The glyph order is the order in which names were collected; the first name
/// receives glyph id 0.
///
/// Currently, the only way to construct this type is by calling `collect()`
/// on an iterator of names.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GlyphMap {
    names: HashMap<GlyphName, GlyphId16>,
    order: Vec<GlyphName>,
}

impl GlyphMap {
    /// The total number of glyphs
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` if this map contains no glyphs
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Return `true` if the map contains the provided name.
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// Return the `GlyphId16` for the provided name
    pub fn get(&self, name: &str) -> Option<GlyphId16> {
        self.names.get(name).copied()
    }

    /// Return the name of the provided glyph, if it is in the map.
    pub fn name(&self, gid: GlyphId16) -> Option<&GlyphName> {
        self.order.get(gid.to_u16() as usize)
    }

    /// Iterate the names in this map, in GID order.
    pub fn iter(&self) -> impl Iterator<Item = &GlyphName> + '_ {
        self.order.iter()
    }

    /// The name of this glyph, or a synthesized `gidN` if it is unknown.
    pub(crate) fn display(&self, gid: GlyphId16) -> Cow<'_, str> {
        match self.name(gid) {
            Some(name) => Cow::Borrowed(name.as_str()),
            None => Cow::Owned(format!("gid{}", gid.to_u16())),
        }
    }
}

impl FromIterator<GlyphName> for GlyphMap {
    fn from_iter<T: IntoIterator<Item = GlyphName>>(iter: T) -> Self {
        let order = iter.into_iter().collect::<Vec<_>>();
        let names = order
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), GlyphId16::new(i.try_into().unwrap())))
            .collect();
        GlyphMap { names, order }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_both_directions() {
        let map: GlyphMap = [".notdef", "a", "b"]
            .into_iter()
            .map(GlyphName::new)
            .collect();
        assert_eq!(map.len(), 3);
        assert_eq!(map.get("b"), Some(GlyphId16::new(2)));
        assert_eq!(map.get("c"), None);
        assert_eq!(map.name(GlyphId16::new(1)).map(|n| n.as_str()), Some("a"));
        assert_eq!(map.display(GlyphId16::new(12)), "gid12");
    }
}
