//! The main public API for compilation

use std::collections::HashMap;

use rayon::prelude::*;

use crate::{
    common::GlyphMap,
    diagnostic::{Fatal, Reporter},
    model::{LayoutRules, LayoutTable, LookupId, Rule},
};

use super::{
    assemble::{PreparedLookup, TableInput},
    error::CompilerError,
    gdef::{compile_gdef, MarkClassIds},
    location::LookupLocation,
    opts::Opts,
    resolve::resolve_lookup,
    validate::{validate_font, validate_lookup, MarkSet},
    Compilation,
};

/// A builder-style entry point for the compiler.
///
/// ```no_run
/// # use otl_compiler::{Compiler, GlyphMap, LayoutRules};
/// # fn load() -> (LayoutRules, GlyphMap) { todo!() }
/// let (rules, glyph_map) = load();
/// let compilation = Compiler::new(&rules, &glyph_map).compile().unwrap();
/// let font_bytes = compilation.to_font_bytes();
/// ```
pub struct Compiler<'a> {
    rules: &'a LayoutRules,
    glyph_map: &'a GlyphMap,
    opts: Opts,
}

/// The resolved rules of one lookup, and the mark classes it uses.
type Resolved = (Vec<Rule>, Option<MarkSet>);

impl<'a> Compiler<'a> {
    /// Configure a new compilation run for a set of rules and a glyph map.
    pub fn new(rules: &'a LayoutRules, glyph_map: &'a GlyphMap) -> Self {
        Compiler {
            rules,
            glyph_map,
            opts: Default::default(),
        }
    }

    /// Specify additional compiler options.
    pub fn with_opts(mut self, opts: Opts) -> Self {
        self.opts = opts;
        self
    }

    /// Resolve, validate and compile these rules.
    ///
    /// On success the returned [`Compilation`] holds the bytes of each table
    /// that has content, along with any notes and warnings.
    pub fn compile(self) -> Result<Compilation, CompilerError> {
        let mut reporter = Reporter::new(self.rules.font_name.clone());
        match self.compile_impl(&mut reporter) {
            Ok(mut compilation) if !reporter.has_errors() => {
                compilation.diagnostics = reporter.into_set(self.opts.max_n_errors);
                Ok(compilation)
            }
            Ok(_) => Err(CompilerError::CompilationFail(
                reporter.into_set(self.opts.max_n_errors),
            )),
            Err(Fatal) => Err(CompilerError::Fatal(
                reporter.into_set(self.opts.max_n_errors),
            )),
        }
    }

    /// Compile, and wrap the tables in a minimal font file.
    pub fn compile_binary(self) -> Result<Vec<u8>, CompilerError> {
        Ok(self.compile()?.to_font_bytes())
    }

    fn compile_impl(&self, reporter: &mut Reporter) -> Result<Compilation, Fatal> {
        let rules = self.rules;
        validate_font(rules, reporter);
        let locations = lookup_locations(rules);

        let shared: &Reporter = reporter;
        let results = rules
            .lookups()
            .par_iter()
            .zip(locations.par_iter())
            .map(|(lookup, location)| {
                let mut local = shared.scoped();
                let result = resolve_lookup(lookup, location, self.glyph_map, &mut local).map(
                    |resolved| {
                        let marks = validate_lookup(
                            lookup.kind,
                            &resolved,
                            &rules.mark_classes,
                            location,
                            self.glyph_map,
                            &mut local,
                        );
                        (resolved, marks)
                    },
                );
                (result, local)
            })
            .collect::<Vec<_>>();

        // merge in lookup order, stopping at the first fatal error
        let mut resolved: Vec<Resolved> = Vec::with_capacity(results.len());
        for (result, local) in results {
            reporter.extend(local);
            resolved.push(result?);
        }

        let ids = MarkClassIds::new(rules);
        let mut compilation = Compilation::default();
        for (table, enabled) in [
            (LayoutTable::Gsub, self.opts.compile_gsub),
            (LayoutTable::Gpos, self.opts.compile_gpos),
        ] {
            if !enabled {
                continue;
            }
            let lookup_indices = table_lookup_indices(rules, table);
            if lookup_indices.is_empty() {
                log::debug!("no {} lookups", table.tag());
                continue;
            }
            let lookups = rules
                .iter_lookups()
                .zip(&resolved)
                .zip(&locations)
                .filter(|(((_, lookup), _), _)| lookup.kind.table() == table)
                .map(|(((_, lookup), (lookup_rules, marks)), location)| {
                    let (flag, mark_filtering_set) = ids.lookup_flag(lookup);
                    PreparedLookup {
                        kind: lookup.kind,
                        rules: lookup_rules.clone(),
                        marks: marks.clone(),
                        location,
                        flag,
                        mark_filtering_set,
                    }
                })
                .collect();
            let input = TableInput {
                table,
                lookups,
                features: &rules.features,
                lookup_indices: &lookup_indices,
            };
            let bytes = input.assemble(&self.opts, reporter)?;
            match table {
                LayoutTable::Gsub => compilation.gsub = Some(bytes),
                LayoutTable::Gpos => compilation.gpos = Some(bytes),
            }
        }

        if self.opts.compile_gdef {
            compilation.gdef = compile_gdef(rules, &ids, self.glyph_map, reporter)?;
        }
        Ok(compilation)
    }
}

/// Each lookup is described by the first feature that references it.
fn lookup_locations(rules: &LayoutRules) -> Vec<LookupLocation> {
    let mut features = vec![None; rules.lookups().len()];
    for feature in &rules.features {
        for id in &feature.lookups {
            if let Some(slot) = features.get_mut(id.to_raw()) {
                slot.get_or_insert(feature.tag);
            }
        }
    }
    rules
        .lookups()
        .iter()
        .zip(features)
        .map(|(lookup, feature)| LookupLocation::new(feature, lookup.name.clone()))
        .collect()
}

/// The position of each of the table's lookups in its lookup list.
fn table_lookup_indices(rules: &LayoutRules, table: LayoutTable) -> HashMap<LookupId, u16> {
    rules
        .iter_lookups()
        .filter(|(_, lookup)| lookup.kind.table() == table)
        .enumerate()
        .map(|(idx, (id, _))| (id, idx as u16))
        .collect()
}

#[cfg(test)]
mod tests {
    use write_fonts::types::Tag;

    use super::*;
    use crate::model::{Feature, Lookup, LookupKind};

    #[test]
    fn first_feature_names_the_lookup() {
        let mut rules = LayoutRules::new("Test");
        let one = rules.add_lookup(Lookup::named(LookupKind::SingleSub, "ONE"));
        let two = rules.add_lookup(Lookup::new(LookupKind::SinglePos));
        let three = rules.add_lookup(Lookup::new(LookupKind::SingleSub));
        rules.add_feature(Feature::new(Tag::new(b"smcp"), vec![one]));
        rules.add_feature(Feature::new(Tag::new(b"c2sc"), vec![one, two]));
        let locations = lookup_locations(&rules);
        assert_eq!(locations[0].to_string(), "in feature 'smcp' lookup 'ONE'");
        assert_eq!(locations[1].to_string(), "in feature 'c2sc'");
        assert_eq!(locations[2].to_string(), "in stand-alone lookup");

        let gsub = table_lookup_indices(&rules, LayoutTable::Gsub);
        assert_eq!(gsub.get(&one), Some(&0));
        assert_eq!(gsub.get(&three), Some(&1));
        assert!(!gsub.contains_key(&two));
        let gpos = table_lookup_indices(&rules, LayoutTable::Gpos);
        assert_eq!(gpos.get(&two), Some(&0));
    }
}
