//! Checking mark classes and anchor assignments.
//!
//! Validation reports problems but never stops compilation; the rules are
//! still compiled (the first assignment wins) so that every problem in the
//! font can be reported in one run.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::{
    common::{tags::TagDisplay, GlyphClass, GlyphId16, GlyphMap},
    diagnostic::{Reporter, Site},
    model::{Anchor, LayoutRules, LookupFlag, LookupKind, MarkAnchors, MarkClass, Rule, RuleBody},
};

use super::{location::LookupLocation, tables::gpos::MarkRecords};

/// The mark classes used by one mark attachment lookup.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct MarkSet {
    /// Class names in order of first reference; the position is the class id.
    pub(crate) classes: Vec<SmolStr>,
    /// Every mark glyph, with its class id and anchor.
    pub(crate) marks: MarkRecords,
}

impl MarkSet {
    pub(crate) fn class_id(&self, name: &str) -> Option<u16> {
        self.classes
            .iter()
            .position(|cls| cls == name)
            .map(|idx| idx as u16)
    }

    pub(crate) fn class_count(&self) -> u16 {
        self.classes.len() as u16
    }
}

/// Validate the resolved rules of a lookup.
///
/// For mark attachment lookups this returns the mark classes the lookup uses.
pub(crate) fn validate_lookup(
    kind: LookupKind,
    rules: &[Rule],
    mark_classes: &IndexMap<SmolStr, MarkClass>,
    location: &LookupLocation,
    glyphs: &GlyphMap,
    reporter: &mut Reporter,
) -> Option<MarkSet> {
    let mut ctx = ValidationCtx {
        location,
        glyphs,
        reporter,
    };
    match kind {
        LookupKind::CursivePos => {
            ctx.validate_cursive(rules);
            None
        }
        LookupKind::MarkToBase | LookupKind::MarkToMark => {
            let marks = ctx.collect_marks(rules, mark_classes);
            ctx.validate_bases(kind, rules, &marks);
            Some(marks)
        }
        LookupKind::MarkToLig => {
            let marks = ctx.collect_marks(rules, mark_classes);
            ctx.validate_ligatures(rules, &marks);
            Some(marks)
        }
        _ => None,
    }
}

/// Checks that span lookups: mark attachment classes, mark filtering flags
/// and lookup references.
const MAX_MARK_ATTACH_CLASSES: usize = 255;

pub(crate) fn validate_font(rules: &LayoutRules, reporter: &mut Reporter) {
    let mut attach_classes: Vec<(&GlyphClass, &str)> = Vec::new();
    for lookup in rules.lookups() {
        let location = LookupLocation::new(None, lookup.name.clone());
        let name = lookup.name.as_deref().unwrap_or("<anonymous>");
        if let Some(class) = &lookup.mark_attachment {
            if let Some((_, other)) = attach_classes
                .iter()
                .find(|(prev, _)| *prev != class && prev.intersects(class))
            {
                reporter.error(
                    &location.site(),
                    format!(
                        "Mark attachment class of lookup '{name}' overlaps the mark attachment class of lookup '{other}'"
                    ),
                );
            } else if !attach_classes.iter().any(|(prev, _)| *prev == class) {
                attach_classes.push((class, name));
            }
        }
        if lookup.flags.contains(LookupFlag::USE_MARK_FILTERING_SET)
            && lookup.mark_filter_set.is_none()
        {
            reporter.error(
                &location.site(),
                format!("UseMarkFilteringSet is set without a mark glyph set {location}"),
            );
        }
        for rule in &lookup.rules {
            let inputs = match &rule.body {
                RuleBody::ChainContextSub(context) | RuleBody::ChainContextPos(context) => {
                    &context.input
                }
                _ => continue,
            };
            for referenced in inputs.iter().flat_map(|input| input.lookups.iter()) {
                match rules.lookup(*referenced) {
                    None => reporter.error(
                        &location.site_at(rule.line),
                        format!(
                            "Contextual rule {location} references a lookup that does not exist"
                        ),
                    ),
                    Some(other) if other.kind.table() != lookup.kind.table() => reporter.error(
                        &location.site_at(rule.line),
                        format!(
                            "Contextual rule {location} references lookup '{}' of the other layout table",
                            other.name.as_deref().unwrap_or("<anonymous>")
                        ),
                    ),
                    Some(_) => (),
                }
            }
        }
    }
    // the class id is stored in the high byte of the lookup flag
    if attach_classes.len() > MAX_MARK_ATTACH_CLASSES {
        reporter.error(
            &Site::default(),
            format!(
                "Too many mark attachment classes ({}); a lookup flag can refer to at most {MAX_MARK_ATTACH_CLASSES}",
                attach_classes.len()
            ),
        );
    }
    for feature in &rules.features {
        if feature.lookups.iter().any(|id| rules.lookup(*id).is_none()) {
            reporter.error(
                &Site::new(Some(feature.tag), None),
                format!(
                    "Feature '{}' references a lookup that does not exist",
                    TagDisplay::new(Some(feature.tag))
                ),
            );
        }
    }
}

struct ValidationCtx<'a> {
    location: &'a LookupLocation,
    glyphs: &'a GlyphMap,
    reporter: &'a mut Reporter,
}

impl ValidationCtx<'_> {
    fn validate_cursive(&mut self, rules: &[Rule]) {
        let mut seen = HashSet::new();
        for rule in rules {
            let RuleBody::CursivePos { glyph, .. } = &rule.body else {
                continue;
            };
            if !seen.insert(*glyph) {
                self.reporter.error(
                    &self.location.site_at(rule.line),
                    format!(
                        "Cursive positioning {}: previous statement already referenced the same glyph '{}'",
                        self.location,
                        self.glyphs.display(*glyph)
                    ),
                );
            }
        }
    }

    /// Gather the marks of every class referenced by these rules.
    fn collect_marks(
        &mut self,
        rules: &[Rule],
        mark_classes: &IndexMap<SmolStr, MarkClass>,
    ) -> MarkSet {
        let mut classes: Vec<SmolStr> = Vec::new();
        let mut unknown = HashSet::new();
        for rule in rules {
            for (name, _) in rule_mark_anchors(&rule.body) {
                if classes.contains(name) {
                    continue;
                }
                if mark_classes.contains_key(name) {
                    classes.push(name.clone());
                } else if unknown.insert(name) {
                    self.reporter.error(
                        &self.location.site_at(rule.line),
                        format!("Mark class '{name}' is not defined {}", self.location),
                    );
                }
            }
        }

        let mut marks: BTreeMap<GlyphId16, (u16, Anchor)> = BTreeMap::new();
        for (class_id, name) in classes.iter().enumerate() {
            let Some(class) = mark_classes.get(name) else {
                continue;
            };
            for (members, anchor) in &class.members {
                for gid in members.iter() {
                    match marks.get(&gid) {
                        None => {
                            marks.insert(gid, (class_id as u16, *anchor));
                        }
                        Some((prev_id, _)) if *prev_id as usize != class_id => {
                            self.reporter.error(
                                &self.location.site(),
                                format!(
                                    "Glyph '{}' is in mark classes '{}' and '{}' {}",
                                    self.glyphs.display(gid),
                                    classes[*prev_id as usize],
                                    name,
                                    self.location
                                ),
                            );
                        }
                        Some((_, prev_anchor)) if prev_anchor != anchor => {
                            self.reporter.error(
                                &self.location.site(),
                                format!(
                                    "Glyph '{}' has two different anchors in mark class '{name}' {}",
                                    self.glyphs.display(gid),
                                    self.location
                                ),
                            );
                        }
                        Some(_) => (),
                    }
                }
            }
        }
        MarkSet {
            classes,
            marks: Arc::new(marks),
        }
    }

    fn validate_bases(&mut self, kind: LookupKind, rules: &[Rule], marks: &MarkSet) {
        let what = if kind == LookupKind::MarkToMark {
            "Base mark"
        } else {
            "Base"
        };
        // (base, class id) -> anchor
        let mut anchors: HashMap<(GlyphId16, u16), Anchor> = HashMap::new();
        let mut seen = HashSet::new();
        let mut bases: Vec<GlyphId16> = Vec::new();
        for rule in rules {
            let (RuleBody::MarkToBase {
                base,
                marks: attached,
            }
            | RuleBody::MarkToMark {
                base_mark: base,
                marks: attached,
            }) = &rule.body
            else {
                continue;
            };
            for gid in base.iter() {
                for (name, anchor) in attached {
                    let Some(class_id) = marks.class_id(name) else {
                        continue;
                    };
                    match anchors.get(&(gid, class_id)) {
                        None => {
                            if seen.insert(gid) {
                                bases.push(gid);
                            }
                            anchors.insert((gid, class_id), *anchor);
                        }
                        Some(prev) if prev != anchor => self.reporter.error(
                            &self.location.site_at(rule.line),
                            format!(
                                "{what} glyph '{}' has two different anchors for mark class '{name}' {}",
                                self.glyphs.display(gid),
                                self.location
                            ),
                        ),
                        Some(_) => (),
                    }
                }
            }
        }
        for gid in bases {
            for (class_id, name) in marks.classes.iter().enumerate() {
                if !anchors.contains_key(&(gid, class_id as u16)) {
                    self.reporter.warning(
                        &self.location.site(),
                        format!(
                            "{what} glyph '{}' has no anchor for mark class '{name}' {}; using (0,0)",
                            self.glyphs.display(gid),
                            self.location
                        ),
                    );
                }
            }
        }
    }

    fn validate_ligatures(&mut self, rules: &[Rule], marks: &MarkSet) {
        // (ligature, component, class id) -> index of the rule that set it
        let mut assigned: HashMap<(GlyphId16, usize, u16), usize> = HashMap::new();
        for (rule_idx, rule) in rules.iter().enumerate() {
            let RuleBody::MarkToLig {
                ligature,
                components,
            } = &rule.body
            else {
                continue;
            };
            let site = self.location.site_at(rule.line);
            for gid in ligature.iter() {
                for (component, anchors) in components.iter().enumerate() {
                    for (name, _) in anchors {
                        let Some(class_id) = marks.class_id(name) else {
                            continue;
                        };
                        match assigned.get(&(gid, component, class_id)) {
                            None => {
                                assigned.insert((gid, component, class_id), rule_idx);
                            }
                            Some(prev) if *prev == rule_idx => self.reporter.error(
                                &site,
                                format!(
                                    "Mark class '{name}' is used twice for component {} of ligature glyph '{}' in the same statement {}",
                                    component + 1,
                                    self.glyphs.display(gid),
                                    self.location
                                ),
                            ),
                            Some(_) => self.reporter.error(
                                &site,
                                format!(
                                    "Component {} of ligature glyph '{}' already has an anchor for mark class '{name}' from a previous statement {}",
                                    component + 1,
                                    self.glyphs.display(gid),
                                    self.location
                                ),
                            ),
                        }
                    }
                }
            }
        }
    }
}

/// The (mark class, anchor) pairs of a mark attachment rule.
pub(crate) fn rule_mark_anchors(
    body: &RuleBody,
) -> Box<dyn Iterator<Item = &(SmolStr, Anchor)> + '_> {
    match body {
        RuleBody::MarkToBase { marks, .. } | RuleBody::MarkToMark { marks, .. } => {
            Box::new(marks.iter())
        }
        RuleBody::MarkToLig { components, .. } => {
            Box::new(components.iter().flat_map(|anchors: &MarkAnchors| anchors.iter()))
        }
        _ => Box::new(std::iter::empty()),
    }
}
