//! Building OpenType layout tables from resolved rules.
//!
//! The input is a [`LayoutRules`]: lookups of rules on glyph ids, features
//! referencing those lookups, and mark classes. The output is the binary
//! GDEF, GSUB and GPOS tables, or a set of [`Diagnostic`]s explaining why
//! they could not be built.
//!
//! Rules can be built in memory with the types in [`model`], or loaded from
//! a JSON document with [`source`].

pub mod common;
pub mod compile;
mod diagnostic;
pub mod model;
pub mod source;
mod write;


pub use common::{GlyphClass, GlyphMap, GlyphName};
pub use compile::{compile, Compilation, Compiler, CompilerError, Opts};
pub use diagnostic::{Diagnostic, DiagnosticSet, Level, Site};
pub use model::LayoutRules;
pub use write::{Overflow, Structure};
