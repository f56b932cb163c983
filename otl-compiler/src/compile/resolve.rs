//! Removing duplicate rules, and detecting conflicting ones.
//!
//! Each lookup is resolved independently. Exact duplicates are dropped (with a
//! note); a substitution or single positioning rule whose input has already
//! been given a different output is fatal. Conflicting pair positioning rules
//! are allowed, with a warning: the first rule wins.

use std::collections::{HashMap, HashSet};

use crate::{
    common::{GlyphId16, GlyphMap, GlyphOrClass},
    diagnostic::{Fatal, Reporter, Site},
    model::{Lookup, Rule, RuleBody},
};

use super::location::LookupLocation;

/// The outcome of checking one rule.
enum Verdict {
    Keep,
    Drop,
}

/// Tracks the rules already kept for one lookup.
#[derive(Default)]
struct Resolver<'a> {
    // input sequence -> the rule that first used it
    substitutions: HashMap<Vec<GlyphId16>, &'a RuleBody>,
    single_pos: HashMap<GlyphId16, &'a RuleBody>,
    pairs: HashMap<(&'a GlyphOrClass, &'a GlyphOrClass), &'a RuleBody>,
    other: HashSet<&'a RuleBody>,
}

/// Return the rules of this lookup with duplicates removed.
///
/// If a dropped rule followed an explicit subtable break, the break is moved to
/// the next rule that is kept.
pub(crate) fn resolve_lookup(
    lookup: &Lookup,
    location: &LookupLocation,
    glyphs: &GlyphMap,
    reporter: &mut Reporter,
) -> Result<Vec<Rule>, Fatal> {
    let mut resolver = Resolver::default();
    let mut kept = Vec::with_capacity(lookup.rules.len());
    let mut pending_break = false;
    for rule in &lookup.rules {
        pending_break |= rule.subtable_break;
        let kind = rule.body.kind();
        if kind != lookup.kind {
            reporter.error(
                &location.site_at(rule.line),
                format!(
                    "Rule of kind '{}' does not belong in a {} lookup {location}",
                    kind.description(),
                    lookup.kind.description()
                ),
            );
            continue;
        }
        if let Verdict::Keep = resolver.check(rule, location, glyphs, reporter)? {
            let mut rule = rule.clone();
            rule.subtable_break = pending_break;
            pending_break = false;
            kept.push(rule);
        }
    }
    Ok(kept)
}

impl<'a> Resolver<'a> {
    fn check(
        &mut self,
        rule: &'a Rule,
        location: &LookupLocation,
        glyphs: &GlyphMap,
        reporter: &mut Reporter,
    ) -> Result<Verdict, Fatal> {
        let site = location.site_at(rule.line);
        let kind = rule.body.kind().description();
        match &rule.body {
            RuleBody::SingleSub { target, .. }
            | RuleBody::MultipleSub { target, .. }
            | RuleBody::AlternateSub { target, .. } => {
                let display = glyphs.display(*target);
                let what = format!("{kind} {location}");
                let input = vec![*target];
                self.check_substitution(input, &rule.body, &what, &display, &site, reporter)
            }
            RuleBody::LigatureSub { components, .. } => {
                let display = glyphs.display_seq(components).to_string();
                let what = format!("{kind} {location}");
                let input = components.clone();
                self.check_substitution(input, &rule.body, &what, &display, &site, reporter)
            }
            RuleBody::SinglePos { glyph, .. } => {
                let Some(existing) = self.single_pos.get(glyph) else {
                    self.single_pos.insert(*glyph, &rule.body);
                    return Ok(Verdict::Keep);
                };
                let input = glyphs.display(*glyph);
                if *existing == &rule.body {
                    reporter.note(&site, format!("Removing duplicate {kind} {location}: {input}"));
                    Ok(Verdict::Drop)
                } else {
                    Err(reporter.fatal(
                        &site,
                        format!("Conflicting values for {kind} {location}: {input}"),
                    ))
                }
            }
            RuleBody::PairPos { first, second, .. } => {
                let Some(existing) = self.pairs.get(&(first, second)) else {
                    self.pairs.insert((first, second), &rule.body);
                    return Ok(Verdict::Keep);
                };
                let input = format!(
                    "{} {}",
                    glyphs.display_token(first),
                    glyphs.display_token(second)
                );
                if *existing == &rule.body {
                    reporter.note(&site, format!("Removing duplicate {kind} {location}: {input}"));
                } else {
                    reporter.warning(
                        &site,
                        format!(
                            "Conflicting {kind} {location}: {input}; choosing the first value"
                        ),
                    );
                }
                Ok(Verdict::Drop)
            }
            other => {
                if self.other.insert(other) {
                    Ok(Verdict::Keep)
                } else {
                    reporter.note(&site, format!("Removing duplicate {kind} rule {location}"));
                    Ok(Verdict::Drop)
                }
            }
        }
    }

    /// Fatal if the input was already used with a different output.
    fn check_substitution(
        &mut self,
        input: Vec<GlyphId16>,
        body: &'a RuleBody,
        what: &str,
        display: &str,
        site: &Site,
        reporter: &mut Reporter,
    ) -> Result<Verdict, Fatal> {
        match self.substitutions.get(&input) {
            None => {
                self.substitutions.insert(input, body);
                Ok(Verdict::Keep)
            }
            Some(existing) if *existing == body => {
                reporter.note(site, format!("Removing duplicate {what}: {display}, {display}"));
                Ok(Verdict::Drop)
            }
            Some(_) => Err(reporter.fatal(
                site,
                format!("Duplicate target glyph for {what}: {display}"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use write_fonts::types::Tag;

    use super::*;
    use crate::{
        common::{GlyphClass, GlyphName},
        diagnostic::Level,
        model::{LookupKind, ValueRecord},
    };

    fn glyph_map() -> GlyphMap {
        [".notdef", "a", "b", "c", "f", "i", "f_i"]
            .into_iter()
            .map(GlyphName::new)
            .collect()
    }

    fn gid(id: u16) -> GlyphId16 {
        GlyphId16::new(id)
    }

    fn liga() -> LookupLocation {
        LookupLocation::new(Some(Tag::new(b"liga")), None)
    }

    fn single(target: u16, replacement: u16) -> Rule {
        Rule::new(RuleBody::SingleSub {
            target: gid(target),
            replacement: gid(replacement),
        })
    }

    #[test]
    fn duplicate_single_sub_is_noted() {
        let lookup = Lookup::new(LookupKind::SingleSub)
            .with_rules([single(1, 2), single(1, 2).at_line(7)]);
        let mut reporter = Reporter::new("Test");
        let rules = resolve_lookup(&lookup, &liga(), &glyph_map(), &mut reporter).unwrap();
        assert_eq!(rules.len(), 1);
        let messages = reporter.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].level, Level::Note);
        assert_eq!(
            messages[0].text(),
            "Removing duplicate single substitution in feature 'liga': a, a"
        );
        assert_eq!(messages[0].line, Some(7));
    }

    #[test]
    fn conflicting_single_sub_is_fatal() {
        let lookup = Lookup::named(LookupKind::SingleSub, "SMCP")
            .with_rules([single(1, 2), single(1, 3), single(2, 3)]);
        let location = LookupLocation::new(Some(Tag::new(b"smcp")), lookup.name.clone());
        let mut reporter = Reporter::new("Test");
        assert!(resolve_lookup(&lookup, &location, &glyph_map(), &mut reporter).is_err());
        assert!(reporter.has_fatal());
        assert_eq!(
            reporter.messages()[0].text(),
            "Duplicate target glyph for single substitution in feature 'smcp' lookup 'SMCP': a"
        );
    }

    #[test]
    fn ligature_input_is_the_whole_sequence() {
        let lig = |components: &[u16], glyph| {
            Rule::new(RuleBody::LigatureSub {
                components: components.iter().copied().map(gid).collect(),
                replacement: gid(glyph),
            })
        };
        let lookup = Lookup::new(LookupKind::LigatureSub).with_rules([
            lig(&[4, 5], 6),
            lig(&[4, 5, 5], 6),
            lig(&[4, 5], 6),
        ]);
        let mut reporter = Reporter::new("Test");
        let rules = resolve_lookup(&lookup, &liga(), &glyph_map(), &mut reporter).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(
            reporter.messages()[0].text(),
            "Removing duplicate ligature substitution in feature 'liga': f i, f i"
        );
    }

    #[test]
    fn pair_conflict_keeps_first() {
        let pair = |first: GlyphOrClass, x| {
            Rule::new(RuleBody::PairPos {
                first,
                value1: ValueRecord::new().with_x_advance(x),
                second: gid(2).into(),
                value2: ValueRecord::new(),
            })
        };
        let class: GlyphClass = [gid(1), gid(3)].into_iter().collect();
        let lookup = Lookup::new(LookupKind::PairPos).with_rules([
            pair(gid(1).into(), -10),
            pair(gid(1).into(), -20),
            // a class pair covering the same glyphs is not a conflict
            pair(class.into(), -30),
        ]);
        let kern = LookupLocation::new(Some(Tag::new(b"kern")), None);
        let mut reporter = Reporter::new("Test");
        let rules = resolve_lookup(&lookup, &kern, &glyph_map(), &mut reporter).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0], lookup.rules[0]);
        assert_eq!(reporter.messages().len(), 1);
        assert_eq!(reporter.messages()[0].level, Level::Warning);
        assert_eq!(
            reporter.messages()[0].text(),
            "Conflicting pair positioning in feature 'kern': a b; choosing the first value"
        );
    }

    #[test]
    fn conflicting_single_pos_is_fatal() {
        let pos = |x| {
            Rule::new(RuleBody::SinglePos {
                glyph: gid(3),
                value: ValueRecord::new().with_x_advance(x),
            })
        };
        let lookup = Lookup::new(LookupKind::SinglePos).with_rules([pos(5), pos(5), pos(6)]);
        let mut reporter = Reporter::new("Test");
        let result = resolve_lookup(&lookup, &liga(), &glyph_map(), &mut reporter);
        assert!(result.is_err());
        let levels = reporter
            .messages()
            .iter()
            .map(|msg| msg.level)
            .collect::<Vec<_>>();
        assert_eq!(levels, [Level::Note, Level::Fatal]);
    }

    #[test]
    fn idempotent() {
        let lookup = Lookup::new(LookupKind::SingleSub).with_rules([
            single(1, 2),
            single(1, 2).after_subtable_break(),
            single(3, 4),
            single(2, 4),
            single(3, 4),
        ]);
        let mut reporter = Reporter::new("Test");
        let once = resolve_lookup(&lookup, &liga(), &glyph_map(), &mut reporter).unwrap();
        // the dropped rule's break moves to the next kept rule
        assert!(once[1].subtable_break);

        let again = Lookup {
            rules: once.clone(),
            ..lookup
        };
        let mut reporter = Reporter::new("Test");
        let twice = resolve_lookup(&again, &liga(), &glyph_map(), &mut reporter).unwrap();
        assert_eq!(once, twice);
        assert!(reporter.messages().is_empty());
    }

    #[test]
    fn mismatched_rule_kind_is_an_error() {
        let lookup = Lookup::new(LookupKind::MultipleSub).with_rule(single(1, 2));
        let mut reporter = Reporter::new("Test");
        let rules = resolve_lookup(&lookup, &liga(), &glyph_map(), &mut reporter).unwrap();
        assert!(rules.is_empty());
        assert!(reporter.has_errors());
    }
}
