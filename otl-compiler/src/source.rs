//! Loading rules from a JSON document.
//!
//! The document names glyphs, classes and lookups; loading it resolves those
//! names against its glyph order and produces a [`LayoutRules`] and the
//! matching [`GlyphMap`].
//!
//! A glyph set is written either as a list of names, or as a single string;
//! a string starting with `@` names an entry of `classes`. In pair
//! positioning rules a single glyph name is a specific glyph, and anything
//! else is a class.
//!
//! ```json
//! {
//!   "font_name": "Example",
//!   "glyph_order": [".notdef", "f", "i", "f_i", "acute"],
//!   "classes": { "LIGS": ["f_i"] },
//!   "mark_classes": { "TOP": [{ "glyphs": ["acute"], "anchor": { "x": 0, "y": 500 } }] },
//!   "lookups": [
//!     {
//!       "name": "LIGA",
//!       "kind": "ligature_sub",
//!       "rules": [{ "type": "ligature_sub", "components": ["f", "i"], "replacement": "f_i" }]
//!     }
//!   ],
//!   "features": [{ "tag": "liga", "lookups": ["LIGA"] }]
//! }
//! ```

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    str::FromStr,
};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use write_fonts::types::Tag;

use crate::{
    common::{GlyphClass, GlyphId16, GlyphMap, GlyphName, GlyphOrClass},
    diagnostic::{Reporter, Site},
    model::{
        Anchor, CaretValues, ChainContext, ContextInput, Feature, GlyphClassDefs, LayoutRules,
        LigatureCaret, Lookup, LookupFlag, LookupId, LookupKind, MarkAnchors, MarkClass, Rule,
        RuleBody, ValueRecord,
    },
    DiagnosticSet,
};

/// An error encountered while loading a rule source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Failed to read '{path}': {cause}")]
    Io {
        path: PathBuf,
        #[source]
        cause: std::io::Error,
    },
    #[error("Malformed rule source: {0}")]
    Json(#[from] serde_json::Error),
    /// The document could be read, but names in it could not be resolved.
    #[error("{} errors in rule source\n{}", .0.count_errors(), .0.display())]
    Unresolved(DiagnosticSet),
}

/// A rule source document, before names are resolved.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RuleSource {
    #[serde(default)]
    pub font_name: SmolStr,
    pub glyph_order: Vec<GlyphName>,
    #[serde(default)]
    pub classes: IndexMap<SmolStr, GlyphSetRepr>,
    #[serde(default)]
    pub mark_classes: IndexMap<SmolStr, Vec<MarkMemberRepr>>,
    #[serde(default)]
    pub lookups: Vec<LookupRepr>,
    #[serde(default)]
    pub features: Vec<FeatureRepr>,
    #[serde(default)]
    pub gdef: GdefRepr,
}

/// One glyph name, a `@class` reference, or a list of glyph names.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GlyphSetRepr {
    One(SmolStr),
    Many(Vec<SmolStr>),
}

/// A lookup, by name or by position in `lookups`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LookupRef {
    Index(usize),
    Name(SmolStr),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MarkMemberRepr {
    pub glyphs: GlyphSetRepr,
    pub anchor: Anchor,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagRepr {
    RightToLeft,
    IgnoreBaseGlyphs,
    IgnoreLigatures,
    IgnoreMarks,
    UseMarkFilteringSet,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LookupRepr {
    #[serde(default)]
    pub name: Option<SmolStr>,
    pub kind: LookupKind,
    #[serde(default)]
    pub flags: Vec<FlagRepr>,
    #[serde(default)]
    pub mark_filter_set: Option<GlyphSetRepr>,
    #[serde(default)]
    pub mark_attachment: Option<GlyphSetRepr>,
    #[serde(default)]
    pub rules: Vec<RuleRepr>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RuleRepr {
    #[serde(flatten)]
    pub body: RuleBodyRepr,
    #[serde(default)]
    pub line: Option<u32>,
    /// An explicit subtable break precedes this rule
    #[serde(default)]
    pub subtable_break: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MarkAnchorRepr {
    pub class: SmolStr,
    pub anchor: Anchor,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContextInputRepr {
    pub glyphs: GlyphSetRepr,
    #[serde(default)]
    pub lookups: Vec<LookupRef>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleBodyRepr {
    /// One rule per target; a single replacement applies to every target.
    SingleSub {
        target: GlyphSetRepr,
        replacement: GlyphSetRepr,
    },
    MultipleSub {
        target: SmolStr,
        replacement: Vec<SmolStr>,
    },
    AlternateSub {
        target: SmolStr,
        alternates: GlyphSetRepr,
    },
    LigatureSub {
        components: Vec<SmolStr>,
        replacement: SmolStr,
    },
    ChainContextSub {
        #[serde(default)]
        backtrack: Vec<GlyphSetRepr>,
        input: Vec<ContextInputRepr>,
        #[serde(default)]
        lookahead: Vec<GlyphSetRepr>,
    },
    ReverseChainSub {
        #[serde(default)]
        backtrack: Vec<GlyphSetRepr>,
        target: GlyphSetRepr,
        replacement: GlyphSetRepr,
        #[serde(default)]
        lookahead: Vec<GlyphSetRepr>,
    },
    /// One rule per glyph
    SinglePos {
        glyphs: GlyphSetRepr,
        value: ValueRecord,
    },
    PairPos {
        first: GlyphSetRepr,
        second: GlyphSetRepr,
        #[serde(default)]
        value1: ValueRecord,
        #[serde(default)]
        value2: ValueRecord,
    },
    CursivePos {
        glyph: SmolStr,
        #[serde(default)]
        entry: Option<Anchor>,
        #[serde(default)]
        exit: Option<Anchor>,
    },
    MarkToBase {
        base: GlyphSetRepr,
        marks: Vec<MarkAnchorRepr>,
    },
    MarkToLig {
        ligature: GlyphSetRepr,
        components: Vec<Vec<MarkAnchorRepr>>,
    },
    MarkToMark {
        base_mark: GlyphSetRepr,
        marks: Vec<MarkAnchorRepr>,
    },
    ChainContextPos {
        #[serde(default)]
        backtrack: Vec<GlyphSetRepr>,
        input: Vec<ContextInputRepr>,
        #[serde(default)]
        lookahead: Vec<GlyphSetRepr>,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeatureRepr {
    pub tag: SmolStr,
    /// (script, language) pairs; if empty, the feature is registered for `DFLT`/`dflt`
    #[serde(default)]
    pub language_systems: Vec<(SmolStr, SmolStr)>,
    pub lookups: Vec<LookupRef>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GdefRepr {
    /// If absent, glyph classes are inferred from the rules.
    #[serde(default)]
    pub glyph_classes: Option<GlyphClassesRepr>,
    #[serde(default)]
    pub ligature_carets: Vec<CaretRepr>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GlyphClassesRepr {
    #[serde(default)]
    pub base: GlyphSetRepr,
    #[serde(default)]
    pub ligature: GlyphSetRepr,
    #[serde(default)]
    pub mark: GlyphSetRepr,
    #[serde(default)]
    pub component: GlyphSetRepr,
}

/// Caret positions or contour points; positions win if both are given.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CaretRepr {
    pub glyph: SmolStr,
    #[serde(default)]
    pub positions: Vec<i16>,
    #[serde(default)]
    pub contour_points: Vec<u16>,
    #[serde(default)]
    pub line: Option<u32>,
}

impl Default for GlyphSetRepr {
    fn default() -> Self {
        GlyphSetRepr::Many(Vec::new())
    }
}

/// Read a rule source from disk and resolve it.
pub fn load(path: impl AsRef<Path>) -> Result<(LayoutRules, GlyphMap), SourceError> {
    RuleSource::from_path(path)?.resolve()
}

impl RuleSource {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|cause| SourceError::Io {
            path: path.to_owned(),
            cause,
        })?;
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> Result<Self, SourceError> {
        serde_json::from_str(json).map_err(Into::into)
    }

    /// Resolve every name in the document.
    ///
    /// All unresolved names are reported together, as errors.
    pub fn resolve(&self) -> Result<(LayoutRules, GlyphMap), SourceError> {
        let mut reporter = Reporter::new(self.font_name.clone());
        let glyphs = self.glyph_map(&mut reporter);
        let mut loader = Loader {
            glyphs: &glyphs,
            classes: HashMap::new(),
            lookups: HashMap::new(),
            ids: Vec::with_capacity(self.lookups.len()),
            reporter,
            site: Site::default(),
        };
        let rules = loader.load(self);
        let Loader { reporter, .. } = loader;
        if reporter.has_errors() {
            return Err(SourceError::Unresolved(reporter.into_set(usize::MAX)));
        }
        log::debug!(
            "loaded {} lookups and {} features for {} glyphs",
            rules.lookups().len(),
            rules.features.len(),
            glyphs.len()
        );
        Ok((rules, glyphs))
    }

    fn glyph_map(&self, reporter: &mut Reporter) -> GlyphMap {
        let mut seen = HashSet::new();
        for name in &self.glyph_order {
            if !seen.insert(name) {
                reporter.error(
                    &Site::default(),
                    format!("Glyph '{name}' appears more than once in the glyph order"),
                );
            }
        }
        let max_glyphs = u16::MAX as usize + 1;
        if self.glyph_order.len() > max_glyphs {
            reporter.error(
                &Site::default(),
                format!("Too many glyphs ({})", self.glyph_order.len()),
            );
        }
        self.glyph_order.iter().take(max_glyphs).cloned().collect()
    }
}

struct Loader<'a> {
    glyphs: &'a GlyphMap,
    // in written order
    classes: HashMap<SmolStr, Vec<GlyphId16>>,
    lookups: HashMap<SmolStr, LookupId>,
    ids: Vec<LookupId>,
    reporter: Reporter,
    // where the current statement is, for messages
    site: Site,
}

impl Loader<'_> {
    fn load(&mut self, source: &RuleSource) -> LayoutRules {
        let mut rules = LayoutRules::new(source.font_name.clone());

        for (name, set) in &source.classes {
            let glyphs = self.glyph_list(set);
            self.classes.insert(name.clone(), glyphs);
        }

        for (name, members) in &source.mark_classes {
            let members = members
                .iter()
                .map(|member| (self.glyph_set(&member.glyphs), member.anchor))
                .collect();
            rules.add_mark_class(MarkClass {
                name: name.clone(),
                members,
            });
        }

        // lookups are created first, so that rules can reference later lookups
        for repr in &source.lookups {
            self.site = Site::new(None, repr.name.clone());
            let mut lookup = Lookup::new(repr.kind);
            lookup.name = repr.name.clone();
            lookup.flags = repr.flags.iter().map(|flag| flag.to_flag()).collect();
            lookup.mark_filter_set = repr.mark_filter_set.as_ref().map(|set| self.glyph_set(set));
            lookup.mark_attachment = repr.mark_attachment.as_ref().map(|set| self.glyph_set(set));
            if lookup.mark_filter_set.is_some() {
                lookup.flags |= LookupFlag::USE_MARK_FILTERING_SET;
            }
            let id = rules.add_lookup(lookup);
            if let Some(name) = &repr.name {
                if self.lookups.insert(name.clone(), id).is_some() {
                    self.error(format!("Lookup name '{name}' is used more than once"));
                }
            }
            self.ids.push(id);
        }

        for (repr, id) in source.lookups.iter().zip(self.ids.clone()) {
            self.site = Site::new(None, repr.name.clone());
            let mut loaded = Vec::with_capacity(repr.rules.len());
            for rule in &repr.rules {
                self.site = self.site.at_line(rule.line);
                let mut bodies = self.rule_bodies(&rule.body).into_iter();
                if let Some(first) = bodies.next() {
                    loaded.push(Rule {
                        body: first,
                        line: rule.line,
                        subtable_break: rule.subtable_break,
                    });
                }
                loaded.extend(bodies.map(|body| Rule {
                    body,
                    line: rule.line,
                    subtable_break: false,
                }));
            }
            if let Some(lookup) = rules.lookup_mut(id) {
                lookup.rules = loaded;
            }
        }

        for repr in &source.features {
            self.site = Site::default();
            let Some(tag) = self.tag(&repr.tag) else {
                continue;
            };
            self.site = Site::new(Some(tag), None);
            let language_systems = repr
                .language_systems
                .iter()
                .filter_map(|(script, lang)| Some((self.tag(script)?, self.tag(lang)?)))
                .collect();
            let lookups = repr
                .lookups
                .iter()
                .filter_map(|lookup| self.lookup(lookup))
                .collect();
            rules.add_feature(Feature {
                tag,
                language_systems,
                lookups,
            });
        }

        self.site = Site::default();
        if let Some(classes) = &source.gdef.glyph_classes {
            rules.gdef.glyph_classes = Some(GlyphClassDefs {
                base: self.glyph_set(&classes.base),
                ligature: self.glyph_set(&classes.ligature),
                mark: self.glyph_set(&classes.mark),
                component: self.glyph_set(&classes.component),
            });
        }
        for caret in &source.gdef.ligature_carets {
            self.site = Site::default().at_line(caret.line);
            let Some(glyph) = self.glyph(&caret.glyph) else {
                continue;
            };
            let carets = if caret.positions.is_empty() && !caret.contour_points.is_empty() {
                CaretValues::ContourPoints(caret.contour_points.clone())
            } else {
                CaretValues::Positions(caret.positions.clone())
            };
            rules.gdef.ligature_carets.push(LigatureCaret {
                glyph,
                carets,
                line: caret.line,
            });
        }
        rules
    }

    /// A rule in the source may stand for several rules in the model.
    fn rule_bodies(&mut self, repr: &RuleBodyRepr) -> Vec<RuleBody> {
        match repr {
            RuleBodyRepr::SingleSub {
                target,
                replacement,
            } => {
                let targets = self.glyph_list(target);
                let replacements = self.glyph_list(replacement);
                match self.zip_sets(&targets, &replacements) {
                    Some(pairs) => pairs
                        .into_iter()
                        .map(|(target, replacement)| RuleBody::SingleSub {
                            target,
                            replacement,
                        })
                        .collect(),
                    None => Vec::new(),
                }
            }
            RuleBodyRepr::MultipleSub {
                target,
                replacement,
            } => {
                let target = self.glyph(target);
                let replacement = self.glyph_seq(replacement);
                target
                    .zip(replacement)
                    .map(|(target, replacement)| RuleBody::MultipleSub {
                        target,
                        replacement,
                    })
                    .into_iter()
                    .collect()
            }
            RuleBodyRepr::AlternateSub { target, alternates } => {
                let alternates = self.glyph_list(alternates);
                self.glyph(target)
                    .map(|target| RuleBody::AlternateSub { target, alternates })
                    .into_iter()
                    .collect()
            }
            RuleBodyRepr::LigatureSub {
                components,
                replacement,
            } => {
                let components = self.glyph_seq(components);
                let replacement = self.glyph(replacement);
                components
                    .zip(replacement)
                    .map(|(components, replacement)| RuleBody::LigatureSub {
                        components,
                        replacement,
                    })
                    .into_iter()
                    .collect()
            }
            RuleBodyRepr::ChainContextSub {
                backtrack,
                input,
                lookahead,
            } => vec![RuleBody::ChainContextSub(
                self.chain_context(backtrack, input, lookahead),
            )],
            RuleBodyRepr::ChainContextPos {
                backtrack,
                input,
                lookahead,
            } => vec![RuleBody::ChainContextPos(
                self.chain_context(backtrack, input, lookahead),
            )],
            RuleBodyRepr::ReverseChainSub {
                backtrack,
                target,
                replacement,
                lookahead,
            } => {
                let targets = self.glyph_list(target);
                let replacements = self.glyph_list(replacement);
                let Some(substitutions) = self.zip_sets(&targets, &replacements) else {
                    return Vec::new();
                };
                vec![RuleBody::ReverseChainSub {
                    backtrack: backtrack.iter().map(|set| self.glyph_set(set)).collect(),
                    substitutions,
                    lookahead: lookahead.iter().map(|set| self.glyph_set(set)).collect(),
                }]
            }
            RuleBodyRepr::SinglePos { glyphs, value } => self
                .glyph_set(glyphs)
                .iter()
                .map(|glyph| RuleBody::SinglePos {
                    glyph,
                    value: *value,
                })
                .collect(),
            RuleBodyRepr::PairPos {
                first,
                second,
                value1,
                value2,
            } => {
                let first = self.glyph_or_class(first);
                let second = self.glyph_or_class(second);
                vec![RuleBody::PairPos {
                    first,
                    value1: *value1,
                    second,
                    value2: *value2,
                }]
            }
            RuleBodyRepr::CursivePos { glyph, entry, exit } => self
                .glyph(glyph)
                .map(|glyph| RuleBody::CursivePos {
                    glyph,
                    entry: *entry,
                    exit: *exit,
                })
                .into_iter()
                .collect(),
            RuleBodyRepr::MarkToBase { base, marks } => vec![RuleBody::MarkToBase {
                base: self.glyph_set(base),
                marks: mark_anchors(marks),
            }],
            RuleBodyRepr::MarkToLig {
                ligature,
                components,
            } => vec![RuleBody::MarkToLig {
                ligature: self.glyph_set(ligature),
                components: components.iter().map(|marks| mark_anchors(marks)).collect(),
            }],
            RuleBodyRepr::MarkToMark { base_mark, marks } => vec![RuleBody::MarkToMark {
                base_mark: self.glyph_set(base_mark),
                marks: mark_anchors(marks),
            }],
        }
    }

    fn chain_context(
        &mut self,
        backtrack: &[GlyphSetRepr],
        input: &[ContextInputRepr],
        lookahead: &[GlyphSetRepr],
    ) -> ChainContext {
        ChainContext {
            backtrack: backtrack.iter().map(|set| self.glyph_set(set)).collect(),
            input: input
                .iter()
                .map(|input| ContextInput {
                    glyphs: self.glyph_set(&input.glyphs),
                    lookups: input
                        .lookups
                        .iter()
                        .filter_map(|lookup| self.lookup(lookup))
                        .collect(),
                })
                .collect(),
            lookahead: lookahead.iter().map(|set| self.glyph_set(set)).collect(),
        }
    }

    /// Pair up targets and replacements; a single replacement applies to all targets.
    ///
    /// An empty side produces no pairs; its unknown glyphs were already reported.
    fn zip_sets(
        &mut self,
        targets: &[GlyphId16],
        replacements: &[GlyphId16],
    ) -> Option<Vec<(GlyphId16, GlyphId16)>> {
        match (targets.len(), replacements.len()) {
            (0, _) | (_, 0) => None,
            (_, 1) => {
                let replacement = replacements[0];
                Some(targets.iter().map(|gid| (*gid, replacement)).collect())
            }
            (n, m) if n == m => Some(
                targets
                    .iter()
                    .copied()
                    .zip(replacements.iter().copied())
                    .collect(),
            ),
            (n, m) => {
                self.error(format!(
                    "{n} target glyphs but {m} replacement glyphs in a substitution"
                ));
                None
            }
        }
    }

    fn glyph(&mut self, name: &str) -> Option<GlyphId16> {
        let gid = self.glyphs.get(name);
        if gid.is_none() {
            self.error(format!("Unknown glyph '{name}'"));
        }
        gid
    }

    /// Resolve a sequence of glyphs; `None` if any is unknown.
    fn glyph_seq(&mut self, names: &[SmolStr]) -> Option<Vec<GlyphId16>> {
        let resolved = names
            .iter()
            .map(|name| self.glyph(name))
            .collect::<Vec<_>>();
        resolved.into_iter().collect()
    }

    /// Resolve a glyph set, keeping the order it was written in.
    ///
    /// Unknown members are reported and left out.
    fn glyph_list(&mut self, set: &GlyphSetRepr) -> Vec<GlyphId16> {
        match set {
            GlyphSetRepr::One(name) => match name.strip_prefix('@') {
                Some(class_name) => match self.classes.get(class_name) {
                    Some(glyphs) => glyphs.clone(),
                    None => {
                        self.error(format!("Unknown glyph class '@{class_name}'"));
                        Vec::new()
                    }
                },
                None => self.glyph(name).into_iter().collect(),
            },
            GlyphSetRepr::Many(names) => names
                .iter()
                .filter_map(|name| self.glyph(name))
                .collect(),
        }
    }

    fn glyph_set(&mut self, set: &GlyphSetRepr) -> GlyphClass {
        self.glyph_list(set).into()
    }

    fn glyph_or_class(&mut self, set: &GlyphSetRepr) -> GlyphOrClass {
        match set {
            GlyphSetRepr::One(name) if !name.starts_with('@') => self
                .glyph(name)
                .map(GlyphOrClass::Glyph)
                .unwrap_or_else(|| GlyphOrClass::Class(GlyphClass::empty())),
            _ => GlyphOrClass::Class(self.glyph_set(set)),
        }
    }

    fn lookup(&mut self, lookup: &LookupRef) -> Option<LookupId> {
        let id = match lookup {
            LookupRef::Index(idx) => self.ids.get(*idx).copied(),
            LookupRef::Name(name) => self.lookups.get(name).copied(),
        };
        if id.is_none() {
            let name = match lookup {
                LookupRef::Index(idx) => idx.to_string(),
                LookupRef::Name(name) => name.to_string(),
            };
            self.error(format!("Unknown lookup '{name}'"));
        }
        id
    }

    fn tag(&mut self, raw: &str) -> Option<Tag> {
        let tag = Tag::from_str(raw).ok();
        if tag.is_none() {
            self.error(format!("Invalid tag '{raw}'"));
        }
        tag
    }

    fn error(&mut self, message: String) {
        let site = self.site.clone();
        self.reporter.error(&site, message);
    }
}

fn mark_anchors(marks: &[MarkAnchorRepr]) -> MarkAnchors {
    marks
        .iter()
        .map(|mark| (mark.class.clone(), mark.anchor))
        .collect()
}

impl FlagRepr {
    fn to_flag(self) -> LookupFlag {
        match self {
            FlagRepr::RightToLeft => LookupFlag::RIGHT_TO_LEFT,
            FlagRepr::IgnoreBaseGlyphs => LookupFlag::IGNORE_BASE_GLYPHS,
            FlagRepr::IgnoreLigatures => LookupFlag::IGNORE_LIGATURES,
            FlagRepr::IgnoreMarks => LookupFlag::IGNORE_MARKS,
            FlagRepr::UseMarkFilteringSet => LookupFlag::USE_MARK_FILTERING_SET,
        }
    }
}
