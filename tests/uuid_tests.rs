//! Randomized tests for the domain identifier formatter.

use libvirt_exporter::domain::{format_uuid, parse_uuid, DomainUuid};
use rand::Rng;

const ITERATIONS: usize = 1000;

#[test]
fn test_formatted_uuid_shape() {
    let mut rng = rand::thread_rng();

    for _ in 0..ITERATIONS {
        let raw: DomainUuid = rng.gen();
        let s = format_uuid(&raw);

        assert_eq!(s.len(), 36, "{s}");
        for (i, c) in s.char_indices() {
            if [8, 13, 18, 23].contains(&i) {
                assert_eq!(c, '-', "{s}");
            } else {
                assert!(c.is_ascii_hexdigit() && !c.is_ascii_uppercase(), "{s}");
            }
        }

        assert_eq!(parse_uuid(&s).unwrap(), raw);
    }
}

#[test]
fn test_extreme_values() {
    assert_eq!(
        format_uuid(&[0u8; 16]),
        "00000000-0000-0000-0000-000000000000"
    );
    assert_eq!(
        format_uuid(&[0xffu8; 16]),
        "ffffffff-ffff-ffff-ffff-ffffffffffff"
    );
}
