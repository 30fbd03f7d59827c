#![cfg(feature = "serde")]

mod common;

use std::{fmt::Debug, fs, ops::Range, path::PathBuf};

use blockbloom::{Config, Filter};
use common::key_hash;

/// Fixed key range to insert into the filter.
const VALUES: Range<u64> = Range { start: 42, end: 100 };

#[test]
fn test_serde_fixture_filter() {
    let mut f = Filter::new(1024, 3).unwrap();
    for i in VALUES {
        f.add64(key_hash(i));
    }

    assert_fixture(f, "filter");
}

#[test]
fn test_bincode_round_trip() {
    let mut f = Filter::new_optimized(Config::new(0.01, 1_000)).unwrap();
    for i in VALUES {
        f.add_atomic64(key_hash(i));
    }

    let encoded = bincode::serialize(&f).expect("must serialise");
    let decoded: Filter = bincode::deserialize(&encoded).expect("must deserialise");

    assert_eq!(decoded, f);
    for i in VALUES {
        assert!(decoded.contains64(key_hash(i)));
    }
}

#[test]
fn test_config_round_trip() {
    let config = Config::new(0.001, 42).max_bits(1 << 20);
    let encoded = serde_json::to_string(&config).unwrap();
    assert_eq!(
        encoded,
        r#"{"fp_rate":0.001,"nkeys":42,"max_bits":1048576}"#
    );

    let decoded: Config = serde_json::from_str(&encoded).unwrap();
    assert_eq!(decoded, config);
}

/// Serialise `t` as JSON and assert it matches a fixture value stored in a
/// file, and that deserialising the fixture results in the same filter state.
///
/// # Panics
///
/// This fn panics if the serialised output of `t` does not match the fixture
/// value read from `tests/fixtures/$name.json`, and writes the actual result to
/// `tests/fixtures/$name.actual.json` for review.
#[track_caller]
fn assert_fixture<T>(t: T, name: &str)
where
    for<'a> T: serde::Serialize + serde::Deserialize<'a> + PartialEq + Debug,
{
    let mut path = PathBuf::default();
    path.push("tests");
    path.push("fixtures");
    path.push(format!("{name}.json"));

    // Serialise the filter.
    let got = serde_json::to_string_pretty(&t).expect("must serialise");

    // Reconstruct an instance from the serialised form.
    let round_trip = serde_json::from_str(&got).expect("must deserialise from serialised form");
    assert_eq!(t, round_trip, "must round-trip through serialisation");

    // Read the existing fixture and ensure they match.
    let want = fs::read_to_string(&path).unwrap_or_else(|_| "<no fixture found>".to_string());
    if got != want {
        // They do not - write the new repr for use with `diff`.
        path.set_file_name(format!("{name}.actual.json"));
        fs::write(&path, &got).expect("failed to create fixture output file");
    }

    // Assert the serialised form matches.
    assert!(
        got == want,
        "fixture output differs, wrote actual fixture output to {}",
        path.display()
    );
}
