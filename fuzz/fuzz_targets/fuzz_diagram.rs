#![no_main]
use libfuzzer_sys::fuzz_target;
use tmdiff::parsers::DiagramParser;

const MAX_WRAPPED_INPUT_LEN: usize = 10_000;

/// Fuzz the diagram parser.
///
/// Wraps input in a graph model envelope so cell handling is reached
/// instead of failing on the missing root element.
fuzz_target!(|data: &[u8]| {
    let parser = DiagramParser::new();
    let _ = parser.parse(data);

    if let Ok(s) = std::str::from_utf8(data) {
        if s.len() < MAX_WRAPPED_INPUT_LEN {
            let wrapped = format!(
                r#"<mxfile><diagram id="d"><mxGraphModel><root><mxCell id="0"/><mxCell id="1" parent="0"/>{s}</root></mxGraphModel></diagram></mxfile>"#,
            );
            let _ = parser.parse_str(&wrapped);
        }
    }
});
