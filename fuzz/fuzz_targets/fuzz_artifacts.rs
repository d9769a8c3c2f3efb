#![no_main]
use libfuzzer_sys::fuzz_target;
use tmdiff::parsers::SecurityArtifactParser;

/// Fuzz the threat and countermeasure collection parsers, raw and inside
/// the paged envelope.
fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let parser = SecurityArtifactParser::new();
        let _ = parser.parse_threats(s);
        let _ = parser.parse_countermeasures(s);

        if s.len() < 10_000 {
            let wrapped = format!(r#"{{"_embedded":{{"items":[{s}]}}}}"#);
            let _ = parser.parse(&wrapped, &wrapped);
        }
    }
});
