//! HSMS decoder fuzz target: feed arbitrary bytes to the frame decoder.
//! The decoder must not panic, and whatever it accepts must re-encode.
//! Build with: cargo fuzz run hsms_decode_fuzz.

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    if let Ok(msg) = secsml::decode(data) {
        let _ = msg.to_bytes();
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run hsms_decode_fuzz");
}
