#![no_main]
// Resource-name grammar fuzzer
// Feeds arbitrary strings through the parser and checks that every
// accepted name renders to a canonical form that reparses to an equal record

use instrctl::rname::ResourceName;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(name) = core::str::from_utf8(data) {
        // Limit name length to avoid excessive runtime
        if name.len() > 512 {
            return;
        }

        if let Ok(parsed) = ResourceName::parse(name) {
            let rendered = parsed.to_string();
            let reparsed =
                ResourceName::parse(&rendered).expect("canonical rendering must reparse");
            assert_eq!(parsed, reparsed);

            // Rendering is a fixed point: canonical input stays canonical.
            assert_eq!(reparsed.to_string(), rendered);
        }
    }
});
