//! Compiling OpenType Layout tables

pub use compiler::Compiler;
pub use error::CompilerError;
pub use opts::Opts;
pub use output::Compilation;

use crate::{common::GlyphMap, model::LayoutRules};

mod assemble;
mod compiler;
mod error;
mod features;
mod gdef;
mod location;
mod opts;
mod output;
mod pack;
mod resolve;
mod tables;
mod validate;

/// Compile a set of rules with the default options.
///
/// This is a shorthand for [`Compiler::new`] followed by [`Compiler::compile`].
pub fn compile(rules: &LayoutRules, glyph_map: &GlyphMap) -> Result<Compilation, CompilerError> {
    Compiler::new(rules, glyph_map).compile()
}
