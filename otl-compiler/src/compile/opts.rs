//! Options used during compilation

const DEFAULT_N_MESSAGES_TO_PRINT: usize = 100;
const DEFAULT_SUBTABLE_BUDGET: usize = 0xFFFF;
const DEFAULT_MAX_PACK_RETRIES: usize = 4;

/// Options for configuring compilation behaviour.
#[derive(Clone, Debug)]
pub struct Opts {
    pub(crate) max_n_errors: usize,
    pub(crate) compile_gsub: bool,
    pub(crate) compile_gpos: bool,
    pub(crate) compile_gdef: bool,
    pub(crate) extension_lookups: bool,
    pub(crate) auto_split: bool,
    pub(crate) subtable_budget: usize,
    pub(crate) max_pack_retries: usize,
}

impl Opts {
    /// Create a new empty set of options
    pub fn new() -> Self {
        Self::default()
    }

    /// Specify the number of errors to print when printing a [`DiagnosticSet`].
    ///
    /// Default is some arbitrary 'reasonable' number (currently 100.) To
    /// suppress errors, pass `0`. For 'all errors', pass `usize::MAX`.
    ///
    /// [`DiagnosticSet`]: crate::DiagnosticSet
    pub fn max_error_messages(mut self, max_n_errors: usize) -> Self {
        self.max_n_errors = max_n_errors;
        self
    }

    /// Specify whether or not we should compile the GPOS table. Default is `true`.
    pub fn compile_gpos(mut self, flag: bool) -> Self {
        self.compile_gpos = flag;
        self
    }

    /// Specify whether or not we should compile the GSUB table. Default is `true`.
    pub fn compile_gsub(mut self, flag: bool) -> Self {
        self.compile_gsub = flag;
        self
    }

    /// Specify whether or not we should compile the GDEF table. Default is `true`.
    pub fn compile_gdef(mut self, flag: bool) -> Self {
        self.compile_gdef = flag;
        self
    }

    /// If `true`, every lookup is written as an extension lookup.
    ///
    /// Extension subtables are reached through 32-bit offsets, so a lookup
    /// list with very large subtables can still be addressed. Default is `false`.
    pub fn extension_lookups(mut self, flag: bool) -> Self {
        self.extension_lookups = flag;
        self
    }

    /// Specify whether lookups are split into subtables automatically.
    ///
    /// When `false`, subtables are only started at explicit subtable breaks
    /// (and where a rule cannot share a subtable with its predecessors), and
    /// an overflowing subtable is reported without attempting to re-split it.
    /// Default is `true`.
    pub fn auto_split(mut self, flag: bool) -> Self {
        self.auto_split = flag;
        self
    }

    /// The estimated size, in bytes, above which a new subtable is started.
    ///
    /// Default is `0xFFFF`, the largest distance a 16-bit offset can span.
    pub fn subtable_budget(mut self, budget: usize) -> Self {
        self.subtable_budget = budget;
        self
    }

    /// The number of times a lookup whose subtables overflow is re-split
    /// with a smaller budget before the overflow is reported. Default is 4.
    pub fn max_pack_retries(mut self, retries: usize) -> Self {
        self.max_pack_retries = retries;
        self
    }
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            max_n_errors: DEFAULT_N_MESSAGES_TO_PRINT,
            compile_gsub: true,
            compile_gpos: true,
            compile_gdef: true,
            extension_lookups: false,
            auto_split: true,
            subtable_budget: DEFAULT_SUBTABLE_BUDGET,
            max_pack_retries: DEFAULT_MAX_PACK_RETRIES,
        }
    }
}
