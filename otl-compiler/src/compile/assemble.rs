//! Laying out a whole GSUB or GPOS table.
//!
//! The table is serialized in one pass; the first offset that does not fit
//! stops the pass. If the overflow is inside the subtables of a lookup, that
//! lookup is packed again with half the budget and the table is laid out
//! again, a bounded number of times.

use std::collections::HashMap;

use crate::{
    diagnostic::{Fatal, Reporter},
    model::{Feature, LayoutTable, LookupId, LookupKind, Rule},
    write::{dump_table, Overflow},
};

use super::{
    features::FeatureListBuilder,
    location::LookupLocation,
    opts::Opts,
    pack::{pack_lookup, PackCtx},
    tables::{
        layout::{self, LayoutHeader, LookupList},
        Subtable,
    },
    validate::MarkSet,
};

/// A lookup that has been resolved and validated, ready to be packed.
#[derive(Clone, Debug)]
pub(crate) struct PreparedLookup<'a> {
    pub(crate) kind: LookupKind,
    pub(crate) rules: Vec<Rule>,
    pub(crate) marks: Option<MarkSet>,
    pub(crate) location: &'a LookupLocation,
    pub(crate) flag: u16,
    pub(crate) mark_filtering_set: Option<u16>,
}

/// The lookups and features of one table.
pub(crate) struct TableInput<'a> {
    pub(crate) table: LayoutTable,
    /// In lookup list order
    pub(crate) lookups: Vec<PreparedLookup<'a>>,
    pub(crate) features: &'a [Feature],
    pub(crate) lookup_indices: &'a HashMap<LookupId, u16>,
}

impl TableInput<'_> {
    /// Build the table's bytes, re-packing lookups whose subtables overflow.
    pub(crate) fn assemble(
        &self,
        opts: &Opts,
        reporter: &mut Reporter,
    ) -> Result<Vec<u8>, Fatal> {
        let (script_list, feature_list) =
            FeatureListBuilder::new(self.features, self.lookup_indices).build();
        let initial_budget = if opts.auto_split {
            opts.subtable_budget
        } else {
            usize::MAX
        };
        let mut budgets = vec![initial_budget; self.lookups.len()];
        let mut retries = vec![0; self.lookups.len()];
        let mut subtables = self
            .lookups
            .iter()
            .map(|lookup| self.pack(lookup, initial_budget, reporter))
            .collect::<Vec<_>>();

        loop {
            let header = LayoutHeader {
                script_list: script_list.clone(),
                feature_list: feature_list.clone(),
                lookup_list: self.lookup_list(&subtables, opts),
            };
            let overflow = match dump_table(&header) {
                Ok(bytes) => {
                    log::debug!("{} is {} bytes", self.table.tag(), bytes.len());
                    return Ok(bytes);
                }
                Err(overflow) => overflow,
            };
            let message = self.overflow_message(&overflow);
            let Some(idx) = overflow.lookup.map(usize::from) else {
                return Err(reporter.fatal(&Default::default(), message));
            };
            let lookup = &self.lookups[idx];
            if !opts.auto_split || overflow.target.is_lookup_subtable() {
                return Err(reporter.fatal(&lookup.location.site(), message));
            }
            log::debug!("{message}; packing again");

            // repacking reports nothing new
            let mut scratch = reporter.scoped();
            loop {
                if retries[idx] >= opts.max_pack_retries {
                    return Err(reporter.fatal(&lookup.location.site(), message));
                }
                retries[idx] += 1;
                budgets[idx] /= 2;
                let repacked = self.pack(lookup, budgets[idx], &mut scratch);
                log::trace!(
                    "budget 0x{:x} gives {} subtables {}",
                    budgets[idx],
                    repacked.len(),
                    lookup.location
                );
                if repacked.len() > subtables[idx].len() {
                    subtables[idx] = repacked;
                    break;
                }
            }
        }
    }

    fn pack(
        &self,
        lookup: &PreparedLookup,
        budget: usize,
        reporter: &mut Reporter,
    ) -> Vec<Subtable> {
        let ctx = PackCtx {
            budget,
            marks: lookup.marks.as_ref(),
            lookup_indices: self.lookup_indices,
            location: lookup.location,
        };
        pack_lookup(lookup.kind, &lookup.rules, &ctx, reporter)
    }

    fn lookup_list(&self, subtables: &[Vec<Subtable>], opts: &Opts) -> LookupList {
        let extension_type = opts
            .extension_lookups
            .then(|| self.table.extension_type());
        let lookups = self
            .lookups
            .iter()
            .zip(subtables)
            .map(|(lookup, subtables)| layout::Lookup {
                lookup_type: lookup.kind.lookup_type(),
                flag: lookup.flag,
                mark_filtering_set: lookup.mark_filtering_set,
                subtables: subtables.clone(),
                extension_type,
            })
            .collect();
        LookupList { lookups }
    }

    fn overflow_message(&self, overflow: &Overflow) -> String {
        let Some(lookup) = overflow
            .lookup
            .and_then(|idx| self.lookups.get(usize::from(idx)))
        else {
            return format!(
                "{} table causes an offset overflow (0x{:x}) to {}",
                self.table.tag(),
                overflow.value,
                overflow.target
            );
        };
        let rules = if overflow.target.is_lookup_subtable() {
            self.table.description()
        } else {
            lookup.kind.description()
        };
        format!(
            "{} {rules} rules cause an offset overflow (0x{:x}) to {}",
            lookup.location.overflow_prefix(),
            overflow.value,
            overflow.target
        )
    }
}
