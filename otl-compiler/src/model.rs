//! The resolved rule model consumed by the compiler.
//!
//! This is what a feature file parser produces once names have been resolved
//! to glyph ids: lookups containing rules, features referencing lookups, mark
//! classes and the inputs to the GDEF table.
//!
//! Lookups live in an arena owned by [`LayoutRules`] and are referenced by
//! [`LookupId`]; a lookup referenced from several features (or from
//! contextual rules) is stored once.

use bitflags::bitflags;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::common::{GlyphClass, GlyphId16, GlyphOrClass, Tag};

/// A handle to a lookup in a [`LayoutRules`] arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LookupId(usize);

bitflags! {
    /// The lower byte of the OpenType LookupFlag field.
    ///
    /// The mark attachment type (upper byte) and the mark filtering set
    /// index are assigned during compilation, from
    /// [`Lookup::mark_attachment`] and [`Lookup::mark_filter_set`].
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct LookupFlag: u16 {
        const RIGHT_TO_LEFT = 0x0001;
        const IGNORE_BASE_GLYPHS = 0x0002;
        const IGNORE_LIGATURES = 0x0004;
        const IGNORE_MARKS = 0x0008;
        const USE_MARK_FILTERING_SET = 0x0010;
    }
}

/// The kind of a lookup; every rule in a lookup must match it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupKind {
    SingleSub,
    MultipleSub,
    AlternateSub,
    LigatureSub,
    ChainContextSub,
    ReverseChainSub,
    SinglePos,
    PairPos,
    CursivePos,
    MarkToBase,
    MarkToLig,
    MarkToMark,
    ChainContextPos,
}

/// Which table a lookup belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LayoutTable {
    Gsub,
    Gpos,
}

/// A position adjustment.
///
/// Fields that are `None` are absent from the value format; an explicit zero
/// is written out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValueRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_placement: Option<i16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_placement: Option<i16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_advance: Option<i16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_advance: Option<i16>,
}

/// An attachment point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Anchor {
    pub x: i16,
    pub y: i16,
    /// An optional contour point; if present the anchor is written in format 2.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contour_point: Option<u16>,
}

/// A named set of mark glyphs, each member with its anchor.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MarkClass {
    pub name: SmolStr,
    pub members: Vec<(GlyphClass, Anchor)>,
}

/// A single input position of a contextual rule.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ContextInput {
    pub glyphs: GlyphClass,
    /// Lookups applied at this position, in order.
    pub lookups: Vec<LookupId>,
}

/// The body of a chained contextual rule.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ChainContext {
    /// Backtrack sequence, in logical order (closest glyph last).
    pub backtrack: Vec<GlyphClass>,
    pub input: Vec<ContextInput>,
    pub lookahead: Vec<GlyphClass>,
}

/// The mark classes attached to a base glyph (or to a ligature component).
pub type MarkAnchors = Vec<(SmolStr, Anchor)>;

/// A single rule, one variant per OpenType rule kind.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RuleBody {
    SingleSub {
        target: GlyphId16,
        replacement: GlyphId16,
    },
    MultipleSub {
        target: GlyphId16,
        replacement: Vec<GlyphId16>,
    },
    AlternateSub {
        target: GlyphId16,
        alternates: Vec<GlyphId16>,
    },
    LigatureSub {
        components: Vec<GlyphId16>,
        replacement: GlyphId16,
    },
    ChainContextSub(ChainContext),
    ReverseChainSub {
        /// Backtrack sequence, in logical order (closest glyph last).
        backtrack: Vec<GlyphClass>,
        /// (target, replacement) pairs for the single input position
        substitutions: Vec<(GlyphId16, GlyphId16)>,
        lookahead: Vec<GlyphClass>,
    },
    SinglePos {
        glyph: GlyphId16,
        value: ValueRecord,
    },
    PairPos {
        first: GlyphOrClass,
        value1: ValueRecord,
        second: GlyphOrClass,
        value2: ValueRecord,
    },
    CursivePos {
        glyph: GlyphId16,
        entry: Option<Anchor>,
        exit: Option<Anchor>,
    },
    MarkToBase {
        base: GlyphClass,
        marks: MarkAnchors,
    },
    MarkToLig {
        ligature: GlyphClass,
        /// one entry per ligature component
        components: Vec<MarkAnchors>,
    },
    MarkToMark {
        base_mark: GlyphClass,
        marks: MarkAnchors,
    },
    ChainContextPos(ChainContext),
}

/// A rule and where it came from.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Rule {
    pub body: RuleBody,
    /// The line of the statement in the source, if known.
    pub line: Option<u32>,
    /// `true` if an explicit subtable break precedes this rule.
    pub subtable_break: bool,
}

/// A lookup: a list of rules of a single kind, and the flags applied to them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lookup {
    pub name: Option<SmolStr>,
    pub kind: LookupKind,
    pub flags: LookupFlag,
    /// The glyphs of the mark filtering set, if [`LookupFlag::USE_MARK_FILTERING_SET`] is set
    pub mark_filter_set: Option<GlyphClass>,
    /// The glyphs of the mark attachment class, if any
    pub mark_attachment: Option<GlyphClass>,
    pub rules: Vec<Rule>,
}

/// A feature, and the language systems under which it is registered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Feature {
    pub tag: Tag,
    /// (script, language) pairs; if empty, `DFLT`/`dflt` is used.
    pub language_systems: Vec<(Tag, Tag)>,
    pub lookups: Vec<LookupId>,
}

/// Caret positions for a ligature glyph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CaretValues {
    /// Design-unit coordinates (CaretValue format 1)
    Positions(Vec<i16>),
    /// Contour point indices (CaretValue format 2)
    ContourPoints(Vec<u16>),
}

/// A ligature caret statement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LigatureCaret {
    pub glyph: GlyphId16,
    pub carets: CaretValues,
    pub line: Option<u32>,
}

/// Explicit glyph class definitions for GDEF.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GlyphClassDefs {
    pub base: GlyphClass,
    pub ligature: GlyphClass,
    pub mark: GlyphClass,
    pub component: GlyphClass,
}

/// The inputs to the GDEF table that do not come from lookups.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GdefRules {
    /// If `None`, glyph classes are inferred from the rules.
    pub glyph_classes: Option<GlyphClassDefs>,
    pub ligature_carets: Vec<LigatureCaret>,
}

/// Everything needed to compile the layout tables of one font.
#[derive(Clone, Debug, Default)]
pub struct LayoutRules {
    pub font_name: SmolStr,
    lookups: Vec<Lookup>,
    pub features: Vec<Feature>,
    pub mark_classes: IndexMap<SmolStr, MarkClass>,
    pub gdef: GdefRules,
}

impl LookupKind {
    pub fn table(self) -> LayoutTable {
        match self {
            LookupKind::SingleSub
            | LookupKind::MultipleSub
            | LookupKind::AlternateSub
            | LookupKind::LigatureSub
            | LookupKind::ChainContextSub
            | LookupKind::ReverseChainSub => LayoutTable::Gsub,
            _ => LayoutTable::Gpos,
        }
    }

    /// The OpenType lookup type.
    pub(crate) fn lookup_type(self) -> u16 {
        match self {
            LookupKind::SingleSub => 1,
            LookupKind::MultipleSub => 2,
            LookupKind::AlternateSub => 3,
            LookupKind::LigatureSub => 4,
            LookupKind::ChainContextSub => 6,
            LookupKind::ReverseChainSub => 8,
            LookupKind::SinglePos => 1,
            LookupKind::PairPos => 2,
            LookupKind::CursivePos => 3,
            LookupKind::MarkToBase => 4,
            LookupKind::MarkToLig => 5,
            LookupKind::MarkToMark => 6,
            LookupKind::ChainContextPos => 8,
        }
    }

    /// How this kind of rule is described in messages.
    pub(crate) fn description(self) -> &'static str {
        match self {
            LookupKind::SingleSub => "single substitution",
            LookupKind::MultipleSub => "multiple substitution",
            LookupKind::AlternateSub => "alternate substitution",
            LookupKind::LigatureSub => "ligature substitution",
            LookupKind::ChainContextSub => "chain contextual substitution",
            LookupKind::ReverseChainSub => "reverse chain contextual substitution",
            LookupKind::SinglePos => "single positioning",
            LookupKind::PairPos => "pair positioning",
            LookupKind::CursivePos => "cursive positioning",
            LookupKind::MarkToBase => "mark to base positioning",
            LookupKind::MarkToLig => "mark to ligature positioning",
            LookupKind::MarkToMark => "mark to mark positioning",
            LookupKind::ChainContextPos => "chain contextual positioning",
        }
    }
}

impl LayoutTable {
    pub(crate) fn tag(self) -> Tag {
        match self {
            LayoutTable::Gsub => crate::common::tags::GSUB,
            LayoutTable::Gpos => crate::common::tags::GPOS,
        }
    }

    /// The extension lookup type for this table.
    pub(crate) fn extension_type(self) -> u16 {
        match self {
            LayoutTable::Gsub => 7,
            LayoutTable::Gpos => 9,
        }
    }

    /// How rules in this table are described in messages.
    pub(crate) fn description(self) -> &'static str {
        match self {
            LayoutTable::Gsub => "substitution",
            LayoutTable::Gpos => "positioning",
        }
    }
}

impl ValueRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_x_placement(mut self, val: i16) -> Self {
        self.x_placement = Some(val);
        self
    }

    pub fn with_y_placement(mut self, val: i16) -> Self {
        self.y_placement = Some(val);
        self
    }

    pub fn with_x_advance(mut self, val: i16) -> Self {
        self.x_advance = Some(val);
        self
    }

    pub fn with_y_advance(mut self, val: i16) -> Self {
        self.y_advance = Some(val);
        self
    }

    /// The OpenType ValueFormat describing the fields present in this record.
    pub fn format(&self) -> u16 {
        let mut format = 0;
        for (bit, field) in [
            (0x0001, self.x_placement),
            (0x0002, self.y_placement),
            (0x0004, self.x_advance),
            (0x0008, self.y_advance),
        ] {
            if field.is_some() {
                format |= bit;
            }
        }
        format
    }
}

impl Anchor {
    pub fn new(x: i16, y: i16) -> Self {
        Anchor {
            x,
            y,
            contour_point: None,
        }
    }
}

impl RuleBody {
    /// The kind of lookup this rule belongs in.
    pub fn kind(&self) -> LookupKind {
        match self {
            RuleBody::SingleSub { .. } => LookupKind::SingleSub,
            RuleBody::MultipleSub { .. } => LookupKind::MultipleSub,
            RuleBody::AlternateSub { .. } => LookupKind::AlternateSub,
            RuleBody::LigatureSub { .. } => LookupKind::LigatureSub,
            RuleBody::ChainContextSub(_) => LookupKind::ChainContextSub,
            RuleBody::ReverseChainSub { .. } => LookupKind::ReverseChainSub,
            RuleBody::SinglePos { .. } => LookupKind::SinglePos,
            RuleBody::PairPos { .. } => LookupKind::PairPos,
            RuleBody::CursivePos { .. } => LookupKind::CursivePos,
            RuleBody::MarkToBase { .. } => LookupKind::MarkToBase,
            RuleBody::MarkToLig { .. } => LookupKind::MarkToLig,
            RuleBody::MarkToMark { .. } => LookupKind::MarkToMark,
            RuleBody::ChainContextPos(_) => LookupKind::ChainContextPos,
        }
    }
}

impl Rule {
    pub fn new(body: RuleBody) -> Self {
        Rule {
            body,
            line: None,
            subtable_break: false,
        }
    }

    pub fn at_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    /// Mark this rule as following an explicit `subtable` statement.
    pub fn after_subtable_break(mut self) -> Self {
        self.subtable_break = true;
        self
    }
}

impl From<RuleBody> for Rule {
    fn from(src: RuleBody) -> Rule {
        Rule::new(src)
    }
}

impl Lookup {
    pub fn new(kind: LookupKind) -> Self {
        Lookup {
            name: None,
            kind,
            flags: LookupFlag::empty(),
            mark_filter_set: None,
            mark_attachment: None,
            rules: Vec::new(),
        }
    }

    pub fn named(kind: LookupKind, name: impl Into<SmolStr>) -> Self {
        Lookup {
            name: Some(name.into()),
            ..Lookup::new(kind)
        }
    }

    pub fn with_flags(mut self, flags: LookupFlag) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_rule(mut self, rule: impl Into<Rule>) -> Self {
        self.rules.push(rule.into());
        self
    }

    pub fn with_rules(mut self, rules: impl IntoIterator<Item = impl Into<Rule>>) -> Self {
        self.rules.extend(rules.into_iter().map(Into::into));
        self
    }
}

impl Feature {
    pub fn new(tag: Tag, lookups: Vec<LookupId>) -> Self {
        Feature {
            tag,
            language_systems: Vec::new(),
            lookups,
        }
    }
}

impl LayoutRules {
    pub fn new(font_name: impl Into<SmolStr>) -> Self {
        LayoutRules {
            font_name: font_name.into(),
            ..Default::default()
        }
    }

    /// Add a lookup to the arena, returning its id.
    pub fn add_lookup(&mut self, lookup: Lookup) -> LookupId {
        self.lookups.push(lookup);
        LookupId(self.lookups.len() - 1)
    }

    pub fn add_feature(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    pub fn add_mark_class(&mut self, class: MarkClass) {
        self.mark_classes.insert(class.name.clone(), class);
    }

    pub fn lookup(&self, id: LookupId) -> Option<&Lookup> {
        self.lookups.get(id.0)
    }

    pub fn lookup_mut(&mut self, id: LookupId) -> Option<&mut Lookup> {
        self.lookups.get_mut(id.0)
    }

    pub fn lookups(&self) -> &[Lookup] {
        &self.lookups
    }

    /// Iterate over all lookups along with their ids.
    pub fn iter_lookups(&self) -> impl Iterator<Item = (LookupId, &Lookup)> + '_ {
        self.lookups
            .iter()
            .enumerate()
            .map(|(i, lookup)| (LookupId(i), lookup))
    }
}

impl LookupId {
    pub(crate) fn to_raw(self) -> usize {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_format() {
        assert_eq!(ValueRecord::new().format(), 0);
        assert_eq!(ValueRecord::new().with_x_advance(0).format(), 0x0004);
        assert_eq!(
            ValueRecord::new()
                .with_x_placement(-5)
                .with_y_advance(10)
                .format(),
            0x0009
        );
    }

    #[test]
    fn lookup_arena() {
        let mut rules = LayoutRules::new("Test");
        let one = rules.add_lookup(Lookup::new(LookupKind::SingleSub));
        let two = rules.add_lookup(Lookup::named(LookupKind::PairPos, "kern1"));
        assert_ne!(one, two);
        assert_eq!(rules.lookup(two).unwrap().kind.table(), LayoutTable::Gpos);
        assert_eq!(
            rules.lookup(two).unwrap().name.as_deref(),
            Some("kern1")
        );
        assert_eq!(rules.iter_lookups().count(), 2);
    }
}
