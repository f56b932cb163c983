//! Assembling the GDEF table, and the lookup flag ids that point into it.

use std::collections::BTreeMap;

use indexmap::IndexMap;

use crate::{
    common::{GlyphClass, GlyphId16, GlyphMap},
    diagnostic::{Fatal, Reporter, Site},
    model::{LayoutRules, Lookup, LookupFlag, RuleBody},
    write::dump_table,
};

use super::tables::{
    gdef::{Gdef, GlyphClassDef},
    layout::CoverageTable,
};

/// Mark attachment class ids and mark filtering set indices.
///
/// Both are assigned in order of first use, walking the lookups in order.
#[derive(Clone, Debug, Default)]
pub(crate) struct MarkClassIds {
    // ids start at 1; 0 means 'no attachment class'
    attach_classes: IndexMap<GlyphClass, u16>,
    filter_sets: IndexMap<GlyphClass, u16>,
}

impl MarkClassIds {
    pub(crate) fn new(rules: &LayoutRules) -> Self {
        let mut ids = MarkClassIds::default();
        for lookup in rules.lookups() {
            if let Some(class) = &lookup.mark_attachment {
                let next = ids.attach_classes.len() as u16 + 1;
                ids.attach_classes.entry(class.clone()).or_insert(next);
            }
            if let Some(set) = &lookup.mark_filter_set {
                let next = ids.filter_sets.len() as u16;
                ids.filter_sets.entry(set.clone()).or_insert(next);
            }
        }
        ids
    }

    /// The LookupFlag field and mark filtering set index for this lookup.
    pub(crate) fn lookup_flag(&self, lookup: &Lookup) -> (u16, Option<u16>) {
        let mut flags = lookup.flags - LookupFlag::USE_MARK_FILTERING_SET;
        let filter_set = lookup
            .mark_filter_set
            .as_ref()
            .and_then(|set| self.filter_sets.get(set).copied());
        if filter_set.is_some() {
            flags |= LookupFlag::USE_MARK_FILTERING_SET;
        }
        let attach_id = lookup
            .mark_attachment
            .as_ref()
            .and_then(|class| self.attach_classes.get(class).copied())
            .unwrap_or_default();
        (flags.bits() | (attach_id << 8), filter_set)
    }
}

/// Build the GDEF table, or `None` if it would be empty.
pub(crate) fn compile_gdef(
    rules: &LayoutRules,
    ids: &MarkClassIds,
    glyphs: &GlyphMap,
    reporter: &mut Reporter,
) -> Result<Option<Vec<u8>>, Fatal> {
    let mut gdef = Gdef {
        glyph_classes: match &rules.gdef.glyph_classes {
            Some(explicit) => [
                (&explicit.base, GlyphClassDef::Base),
                (&explicit.ligature, GlyphClassDef::Ligature),
                (&explicit.mark, GlyphClassDef::Mark),
                (&explicit.component, GlyphClassDef::Component),
            ]
            .into_iter()
            .flat_map(|(class, id)| class.iter().map(move |gid| (gid, id)))
            .collect(),
            None => infer_glyph_classes(rules),
        },
        ..Default::default()
    };

    for caret in &rules.gdef.ligature_carets {
        if gdef.ligature_carets.contains_key(&caret.glyph) {
            reporter.warning(
                &Site::default().at_line(caret.line),
                format!(
                    "Ligature caret for glyph '{}' is already defined; ignoring this one",
                    glyphs.display(caret.glyph)
                ),
            );
            continue;
        }
        gdef.ligature_carets
            .insert(caret.glyph, caret.carets.clone());
    }

    for (class, id) in &ids.attach_classes {
        for gid in class.iter() {
            gdef.mark_attach_classes.entry(gid).or_insert(*id);
        }
    }
    gdef.mark_glyph_sets = ids
        .filter_sets
        .keys()
        .map(|set| set.iter().collect::<CoverageTable>())
        .collect();

    if gdef.is_empty() {
        log::debug!("GDEF is empty, skipping");
        return Ok(None);
    }
    dump_table(&gdef).map(Some).map_err(|overflow| {
        reporter.fatal(
            &Site::default(),
            format!(
                "GDEF table causes an offset overflow (0x{:x}) to {}",
                overflow.value, overflow.target
            ),
        )
    })
}

/// Classes implied by the rules: bases, then ligatures, then marks, with
/// later passes overriding earlier ones.
fn infer_glyph_classes(rules: &LayoutRules) -> BTreeMap<GlyphId16, GlyphClassDef> {
    let mut classes = BTreeMap::new();
    let all_rules = || rules.lookups().iter().flat_map(|lookup| lookup.rules.iter());
    for rule in all_rules() {
        if let RuleBody::MarkToBase { base, .. } = &rule.body {
            classes.extend(base.iter().map(|gid| (gid, GlyphClassDef::Base)));
        }
    }
    for rule in all_rules() {
        match &rule.body {
            RuleBody::MarkToLig { ligature, .. } => {
                classes.extend(ligature.iter().map(|gid| (gid, GlyphClassDef::Ligature)));
            }
            RuleBody::LigatureSub { replacement, .. } => {
                classes.insert(*replacement, GlyphClassDef::Ligature);
            }
            _ => (),
        }
    }
    for rule in all_rules() {
        if let RuleBody::MarkToMark { base_mark, .. } = &rule.body {
            classes.extend(base_mark.iter().map(|gid| (gid, GlyphClassDef::Mark)));
        }
    }
    for glyph in rules
        .mark_classes
        .values()
        .flat_map(|class| class.members.iter().flat_map(|(cls, _)| cls.iter()))
    {
        classes.insert(glyph, GlyphClassDef::Mark);
    }
    classes
}
