//! Compile a JSON rule source into layout tables

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use clap::Parser;
use otl_compiler::{source::SourceError, Compilation, Compiler, CompilerError, Opts};

/// Compile the rules in a JSON document into GDEF, GSUB and GPOS.
///
/// Diagnostics are written to stderr. The exit status is 1 if any error
/// (or a fatal error) was reported.
fn main() {
    env_logger::builder()
        .format(|buf, record| {
            writeln!(
                buf,
                "{}: {}: {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let args = Args::parse();
    if let Err(err) = run(&args) {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Error> {
    let (rules, glyph_map) = otl_compiler::source::load(&args.input)?;
    let compilation = Compiler::new(&rules, &glyph_map)
        .with_opts(args.opts())
        .compile()?;
    eprint!("{}", compilation.diagnostics.display());

    if let Some(dir) = &args.tables_dir {
        write_tables(&compilation, dir)?;
    }
    let path = args.out_path();
    let font = compilation.to_font_bytes();
    println!("writing {} bytes to {}", font.len(), path.display());
    std::fs::write(path, font).map_err(|cause| Error::Write {
        path: path.to_owned(),
        cause,
    })
}

/// Write each table to its own file, named after its tag.
fn write_tables(compilation: &Compilation, dir: &Path) -> Result<(), Error> {
    std::fs::create_dir_all(dir).map_err(|cause| Error::Write {
        path: dir.to_owned(),
        cause,
    })?;
    for (tag, bytes) in compilation.tables() {
        let path = dir.join(format!("{tag}.bin"));
        log::info!("writing {} ({} bytes)", path.display(), bytes.len());
        std::fs::write(&path, bytes).map_err(|cause| Error::Write { path, cause })?;
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
enum Error {
    #[error("{0}")]
    Source(#[from] SourceError),
    #[error("{0}")]
    Compile(#[from] CompilerError),
    #[error("Failed to write '{path}': {cause}")]
    Write {
        path: PathBuf,
        #[source]
        cause: std::io::Error,
    },
}

/// Compile layout rules to OpenType tables
#[derive(Parser, Debug)]
#[command(author, version, long_about = None)]
struct Args {
    /// The JSON rule source
    input: PathBuf,

    /// Path to write a font containing the compiled tables. Defaults to 'otl-out.ttf'
    #[arg(short, long)]
    out_path: Option<PathBuf>,

    /// A directory in which to also write each table as a separate file
    #[arg(long)]
    tables_dir: Option<PathBuf>,

    /// Write every lookup as an extension lookup
    #[arg(long)]
    extension_lookups: bool,

    /// Only start new subtables at explicit subtable breaks
    #[arg(long)]
    no_auto_split: bool,

    /// The maximum number of messages to print
    #[arg(long, default_value_t = 100)]
    max_messages: usize,
}

impl Args {
    fn opts(&self) -> Opts {
        Opts::new()
            .extension_lookups(self.extension_lookups)
            .auto_split(!self.no_auto_split)
            .max_error_messages(self.max_messages)
    }

    fn out_path(&self) -> &Path {
        self.out_path
            .as_deref()
            .unwrap_or_else(|| Path::new("otl-out.ttf"))
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsStr;

    use super::*;

    #[test]
    fn writes_font_and_tables() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("rules.json");
        std::fs::write(
            &input,
            r#"{
                "glyph_order": [".notdef", "a", "a.sc"],
                "lookups": [{
                    "kind": "single_sub",
                    "rules": [{ "type": "single_sub", "target": "a", "replacement": "a.sc" }]
                }],
                "features": [{ "tag": "smcp", "lookups": [0] }]
            }"#,
        )
        .unwrap();
        let out_path = dir.path().join("out.ttf");
        let tables_dir = dir.path().join("tables");
        let args = Args::parse_from([
            OsStr::new("otl-compile"),
            input.as_os_str(),
            OsStr::new("--out-path"),
            out_path.as_os_str(),
            OsStr::new("--tables-dir"),
            tables_dir.as_os_str(),
        ]);
        run(&args).unwrap();
        assert!(out_path.exists());
        assert!(tables_dir.join("GSUB.bin").exists());
        assert!(!tables_dir.join("GPOS.bin").exists());
    }

    #[test]
    fn unknown_glyph_fails() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("rules.json");
        std::fs::write(
            &input,
            r#"{
                "glyph_order": [".notdef", "a"],
                "lookups": [{
                    "kind": "single_sub",
                    "rules": [{ "type": "single_sub", "target": "a", "replacement": "b" }]
                }]
            }"#,
        )
        .unwrap();
        let args = Args::parse_from([OsStr::new("otl-compile"), input.as_os_str()]);
        let err = run(&args).unwrap_err();
        assert!(matches!(err, Error::Source(SourceError::Unresolved(_))));
    }
}
