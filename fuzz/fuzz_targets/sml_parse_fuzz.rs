//! SML parser fuzz target: feed arbitrary text to the parser.
//! The parser must not panic; it returns messages plus diagnostics.
//! Build with: cargo fuzz run sml_parse_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let s = match std::str::from_utf8(data) {
        Ok(x) => x,
        Err(_) => return,
    };
    let output = secsml::parse(s);
    // Printed messages must re-parse cleanly.
    for msg in &output.messages {
        let reparsed = secsml::parse(&msg.to_string());
        assert!(reparsed.errors.is_empty());
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run sml_parse_fuzz");
}
