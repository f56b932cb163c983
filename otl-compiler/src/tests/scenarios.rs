//! Compiling small rule sets that exercise each kind of diagnostic

use pretty_assertions::assert_eq;
use rstest::rstest;
use smol_str::SmolStr;
use write_fonts::types::Tag;

use super::{init_logging, subtable_count};
use crate::{
    common::{GlyphClass, GlyphId16, GlyphOrClass},
    model::{Anchor, Feature, Lookup, LookupKind, MarkClass, Rule, RuleBody, ValueRecord},
    Compiler, CompilerError, GlyphMap, GlyphName, LayoutRules, Level, Opts,
};

fn glyph_map(n_glyphs: u32) -> GlyphMap {
    (0..n_glyphs)
        .map(|i| match i {
            0 => GlyphName::new(".notdef"),
            i => GlyphName::new(format!("g{i}")),
        })
        .collect()
}

fn named_glyphs(names: &[&str]) -> GlyphMap {
    names.iter().copied().map(GlyphName::new).collect()
}

fn gid(id: u16) -> GlyphId16 {
    GlyphId16::new(id)
}

fn single_sub(target: u16, replacement: u16, line: u32) -> Rule {
    Rule::new(RuleBody::SingleSub {
        target: gid(target),
        replacement: gid(replacement),
    })
    .at_line(line)
}

/// Add the lookup, and a feature that references it.
fn with_feature(rules: &mut LayoutRules, tag: &[u8; 4], lookup: Lookup) {
    let id = rules.add_lookup(lookup);
    rules.add_feature(Feature::new(Tag::new(tag), vec![id]));
}

fn expect_fatal(result: Result<crate::Compilation, CompilerError>) -> String {
    match result {
        Err(CompilerError::Fatal(diagnostics)) => diagnostics
            .fatal()
            .map(|msg| msg.text().to_string())
            .unwrap_or_default(),
        Err(other) => panic!("expected a fatal error, got {other}"),
        Ok(_) => panic!("expected a fatal error"),
    }
}

#[test]
fn duplicate_single_substitution_is_noted() {
    init_logging();
    let glyphs = named_glyphs(&[".notdef", "a", "a.sc"]);
    let mut rules = LayoutRules::new("Dupes");
    with_feature(
        &mut rules,
        b"smcp",
        Lookup::new(LookupKind::SingleSub).with_rules([single_sub(1, 2, 3), single_sub(1, 2, 4)]),
    );
    let compilation = Compiler::new(&rules, &glyphs).compile().unwrap();
    let messages = compilation.diagnostics.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].level, Level::Note);
    assert_eq!(messages[0].line, Some(4));
    assert_eq!(
        messages[0].to_string(),
        "[NOTE] <Dupes> Removing duplicate single substitution in feature 'smcp': a, a [line 4]"
    );
    let gsub = compilation.gsub.unwrap();
    assert_eq!(subtable_count(&gsub, 0), 1);
    assert!(compilation.gpos.is_none());
}

#[test]
fn conflicting_single_substitution_is_fatal() {
    let glyphs = named_glyphs(&[".notdef", "a", "a.sc", "a.alt"]);
    let mut rules = LayoutRules::new("Conflicts");
    with_feature(
        &mut rules,
        b"smcp",
        Lookup::named(LookupKind::SingleSub, "SMCP")
            .with_rules([single_sub(1, 2, 3), single_sub(1, 3, 4)]),
    );
    let message = expect_fatal(Compiler::new(&rules, &glyphs).compile());
    assert_eq!(
        message,
        "Duplicate target glyph for single substitution in feature 'smcp' lookup 'SMCP': a"
    );
}

#[test]
fn glyph_in_two_mark_classes_is_an_error() {
    let glyphs = named_glyphs(&[".notdef", "a", "acutecomb", "cedillacomb"]);
    let mut rules = LayoutRules::new("Marks");
    rules.add_mark_class(MarkClass {
        name: SmolStr::new("TOP"),
        members: vec![(gid(2).into(), Anchor::new(0, 500))],
    });
    rules.add_mark_class(MarkClass {
        name: SmolStr::new("BOTTOM"),
        members: vec![([gid(2), gid(3)].into_iter().collect(), Anchor::new(0, 0))],
    });
    with_feature(
        &mut rules,
        b"mark",
        Lookup::new(LookupKind::MarkToBase).with_rule(RuleBody::MarkToBase {
            base: gid(1).into(),
            marks: vec![
                (SmolStr::new("TOP"), Anchor::new(250, 600)),
                (SmolStr::new("BOTTOM"), Anchor::new(250, 0)),
            ],
        }),
    );
    let Err(CompilerError::CompilationFail(diagnostics)) =
        Compiler::new(&rules, &glyphs).compile()
    else {
        panic!("expected compilation to fail");
    };
    assert_eq!(diagnostics.count_errors(), 1);
    assert!(diagnostics.fatal().is_none());
    assert_eq!(
        diagnostics.messages()[0].text(),
        "Glyph 'acutecomb' is in mark classes 'TOP' and 'BOTTOM' in feature 'mark'"
    );
}

/// Two class pairs whose combined class definitions do not fit in one subtable.
///
/// Each first class has 10000 glyphs at odd ids, so the coverage table and
/// the first class definition are each 40004 bytes, and the offset to the
/// second class definition is 24 + 40004 + 40004.
fn large_class_pairs() -> (LayoutRules, GlyphMap) {
    let value = ValueRecord::new().with_x_advance(-20);
    let classes = [1u16..=19999, 20001..=39999]
        .map(|range| range.step_by(2).map(GlyphId16::new).collect::<GlyphClass>());
    let pairs = classes.into_iter().map(|first| RuleBody::PairPos {
        first: GlyphOrClass::Class(first),
        value1: value,
        second: GlyphOrClass::Glyph(gid(2)),
        value2: ValueRecord::new(),
    });
    let mut rules = LayoutRules::new("Kerning");
    with_feature(
        &mut rules,
        b"kern",
        Lookup::new(LookupKind::PairPos).with_rules(pairs),
    );
    (rules, glyph_map(40001))
}

#[test]
fn class_pair_overflow_without_splitting() {
    let (rules, glyphs) = large_class_pairs();
    let message = expect_fatal(
        Compiler::new(&rules, &glyphs)
            .with_opts(Opts::new().auto_split(false))
            .compile(),
    );
    assert_eq!(
        message,
        "In feature 'kern' pair positioning rules cause an offset overflow (0x138a0) to a class 2 definition table"
    );
}

#[rstest]
// the estimate alone splits the lookup
#[case::default_budget(Opts::new(), 2)]
// 0x3ffff and 0x1ffff keep one subtable; 0xffff splits it
#[case::after_retries(Opts::new().subtable_budget(0x3FFFF), 2)]
#[case::extension(Opts::new().extension_lookups(true), 2)]
fn class_pairs_are_split(#[case] opts: Opts, #[case] expected_subtables: u16) {
    init_logging();
    let (rules, glyphs) = large_class_pairs();
    let compilation = Compiler::new(&rules, &glyphs)
        .with_opts(opts)
        .compile()
        .unwrap();
    assert!(compilation.diagnostics.is_empty());
    let gpos = compilation.gpos.unwrap();
    assert_eq!(subtable_count(&gpos, 0), expected_subtables);
}

#[test]
fn retries_are_bounded() {
    let (rules, glyphs) = large_class_pairs();
    let message = expect_fatal(
        Compiler::new(&rules, &glyphs)
            .with_opts(Opts::new().subtable_budget(0x3FFFF).max_pack_retries(1))
            .compile(),
    );
    assert!(message.ends_with("offset overflow (0x138a0) to a class 2 definition table"));
}

/// Single substitutions with a different delta for each glyph.
///
/// The first subtable holds 16381 rules: 6 + 2 * 16381 bytes for the subtable
/// and 4 + 2 * 16381 for its coverage. The second subtable starts 10 bytes
/// after the lookup, plus those 65534 bytes.
#[test]
fn large_substitution_lookup_overflows_subtable_offset() {
    let rules = (0..16382u16).map(|i| single_sub(2 * i + 1, 40000 + i, 0));
    let mut rules_set = LayoutRules::new("Subs");
    with_feature(
        &mut rules_set,
        b"tss2",
        Lookup::named(LookupKind::SingleSub, "BIG").with_rules(rules),
    );
    let glyphs = glyph_map(56382);
    let message = expect_fatal(Compiler::new(&rules_set, &glyphs).compile());
    assert_eq!(
        message,
        "In feature 'tss2' lookup 'BIG' substitution rules cause an offset overflow (0x10008) to a lookup subtable"
    );
}

/// Class pairs that share a large second class, one pair per subtable.
///
/// Each subtable is 20 bytes, with a 6 byte coverage, an empty first class
/// definition, and a format 1 second class definition of 4 + 4 * 8200 bytes.
#[test]
fn class_pair_subtables_overflow_subtable_offset() {
    let value = ValueRecord::new().with_x_advance(-20);
    let second = (1u16..16400)
        .step_by(2)
        .map(GlyphId16::new)
        .collect::<GlyphClass>();
    assert_eq!(second.len(), 8200);
    let pairs = [2u16, 4, 6].map(|first| {
        Rule::new(RuleBody::PairPos {
            first: GlyphOrClass::Class(gid(first).into()),
            value1: value,
            second: GlyphOrClass::Class(second.clone()),
            value2: ValueRecord::new(),
        })
        .after_subtable_break()
    });
    let mut rules = LayoutRules::new("Kerning");
    with_feature(
        &mut rules,
        b"kern",
        Lookup::new(LookupKind::PairPos).with_rules(pairs),
    );
    let glyphs = glyph_map(16400);
    let message = expect_fatal(Compiler::new(&rules, &glyphs).compile());
    assert_eq!(
        message,
        "In feature 'kern' positioning rules cause an offset overflow (0x10090) to a lookup subtable"
    );
}

#[test]
fn oversized_mark_coverage_cannot_be_split() {
    let glyphs = glyph_map(65534);
    let marks = (1u16..=65533)
        .step_by(2)
        .map(GlyphId16::new)
        .collect::<GlyphClass>();
    assert_eq!(marks.len(), 32767);
    let mut rules = LayoutRules::new("Marks");
    rules.add_mark_class(MarkClass {
        name: SmolStr::new("TOP"),
        members: vec![(marks, Anchor::new(0, 500))],
    });
    with_feature(
        &mut rules,
        b"mark",
        Lookup::new(LookupKind::MarkToBase).with_rule(RuleBody::MarkToBase {
            base: gid(2).into(),
            marks: vec![(SmolStr::new("TOP"), Anchor::new(250, 600))],
        }),
    );
    let message = expect_fatal(Compiler::new(&rules, &glyphs).compile());
    assert_eq!(
        message,
        "In feature 'mark' mark to base positioning rules cause an offset overflow (0x1000e) to a base coverage table"
    );
}

#[test]
fn tables_can_be_skipped() {
    let glyphs = named_glyphs(&[".notdef", "a", "a.sc"]);
    let mut rules = LayoutRules::new("Skip");
    with_feature(
        &mut rules,
        b"smcp",
        Lookup::new(LookupKind::SingleSub).with_rule(single_sub(1, 2, 1)),
    );
    with_feature(
        &mut rules,
        b"kern",
        Lookup::new(LookupKind::SinglePos).with_rule(RuleBody::SinglePos {
            glyph: gid(1),
            value: ValueRecord::new().with_x_advance(10),
        }),
    );
    let compilation = Compiler::new(&rules, &glyphs)
        .with_opts(Opts::new().compile_gsub(false))
        .compile()
        .unwrap();
    assert!(compilation.gsub.is_none());
    assert!(compilation.gpos.is_some());
    // no glyph classes can be inferred, and there are no carets
    assert!(compilation.gdef.is_none());
}
