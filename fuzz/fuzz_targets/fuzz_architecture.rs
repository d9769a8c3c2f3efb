#![no_main]
use libfuzzer_sys::fuzz_target;
use tmdiff::parsers::{ArchitectureParser, ArchitectureSource};

/// Fuzz architecture description validation.
fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = ArchitectureParser::new().parse(&ArchitectureSource::new("fuzz.yaml", s));
    }
});
