//! Property tests exercising the full query path through the loopback
//! backend. Heavier than the unit laws, so they stay behind the
//! `property-based-tests` feature like the rest of the optional suites.
#![cfg(feature = "property-based-tests")]

use instr_testing::park;
use instrctl::codec::{ByteOrder, HeaderFormat};
use instrctl::resource::{BinaryReadOptions, Messaging, Resource};
use instrctl::rm::OpenOptions;
use proptest::prelude::*;

const NAME: &str = "GPIB0::7::INSTR";

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn ascii_query_round_trips(values in proptest::collection::vec(-1.0e6f64..1.0e6, 1..64)) {
        let (rm, backend) = park(&[NAME]);
        let Resource::Gpib(instrument) = rm.open_resource(NAME, OpenOptions::default()).unwrap() else {
            panic!("expected gpib");
        };
        instrument.set_read_termination(Some("\n")).unwrap();

        let response = values
            .iter()
            .map(|v| format!("{v:E}"))
            .collect::<Vec<_>>()
            .join(",");
        backend.set_responder(move |command| {
            (command == "CURV?").then(|| format!("{response}\n").into_bytes())
        });

        let read: Vec<f64> = instrument.query_ascii_values("CURV?").unwrap();
        prop_assert_eq!(read, values);
    }

    #[test]
    fn binary_query_round_trips(values in proptest::collection::vec(proptest::num::i32::ANY, 0..256)) {
        let (rm, backend) = park(&[NAME]);
        let Resource::Gpib(instrument) = rm.open_resource(NAME, OpenOptions::default()).unwrap() else {
            panic!("expected gpib");
        };
        instrument.set_read_termination(Some("\n")).unwrap();

        let mut block = instrctl::codec::to_ieee_block(&values, ByteOrder::Big).unwrap();
        block.push(b'\n');
        backend.set_responder(move |command| (command == "WAV?").then(|| block.clone()));

        let options = BinaryReadOptions {
            header: HeaderFormat::Ieee,
            byte_order: ByteOrder::Big,
            ..BinaryReadOptions::default()
        };
        let read: Vec<i32> = instrument.query_binary_values("WAV?", &options).unwrap();
        prop_assert_eq!(read, values);
    }
}
