#![no_main]
// Binary-block header fuzzer
// Checks that header decoding never panics and that reported offsets and
// lengths stay consistent with the scanned buffer

use instrctl::codec::{parse_hp_header, parse_ieee_header, DEFAULT_HEADER_SCAN_WINDOW};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 1 << 16 {
        return;
    }

    if let Ok(header) = parse_ieee_header(data, DEFAULT_HEADER_SCAN_WINDOW) {
        // The offset always lands just past the header bytes.
        assert!(header.payload_offset >= 2);
        assert!(header.payload_offset <= data.len());
        match header.payload_length {
            Some(_) => assert!(header.data_length() >= 0),
            None => assert_eq!(header.data_length(), -1),
        }
    }

    if let Ok(header) = parse_hp_header(data, DEFAULT_HEADER_SCAN_WINDOW) {
        assert!(header.payload_offset >= 4);
        assert!(header.payload_offset <= data.len());
        assert!(header.payload_length.is_some());
    }
});
