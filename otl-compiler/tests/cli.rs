//! Running the otl-compile binary
#![cfg(feature = "cli")]

use std::process::Command;

#[test]
fn fatal_error_is_printed_once() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("rules.json");
    std::fs::write(
        &input,
        r#"{
            "glyph_order": [".notdef", "a", "a.sc", "a.alt"],
            "lookups": [{
                "kind": "single_sub",
                "rules": [
                    { "type": "single_sub", "target": "a", "replacement": "a.sc" },
                    { "type": "single_sub", "target": "a", "replacement": "a.alt" }
                ]
            }],
            "features": [{ "tag": "smcp", "lookups": [0] }]
        }"#,
    )
    .unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_otl-compile"))
        .arg(&input)
        .arg("--out-path")
        .arg(dir.path().join("out.ttf"))
        .env_remove("RUST_LOG")
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert_eq!(
        stderr
            .matches("Duplicate target glyph for single substitution in feature 'smcp'")
            .count(),
        1,
        "{stderr}"
    );
    assert!(!dir.path().join("out.ttf").exists());
}
