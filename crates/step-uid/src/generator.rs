//! Per-(domain, prefix) monotonic uid generator tied to coarse time slices.

use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use crate::base36;

/// Arbitrary epoch the original scheme was built on; only the age relative
/// to it matters, so any fixed instant works as long as it never moves.
const UID_BEGIN_TIME_MS: u64 = 1_635_696_000_000;

static GENERATORS: LazyLock<Mutex<HashMap<String, Generator>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

struct Generator {
    prefix: String,
    last_slice: u64,
    inc: u64,
}

impl Generator {
    fn gen_at(&mut self, now_ms: u64) -> String {
        let slice = (now_ms - UID_BEGIN_TIME_MS) / 10;
        if slice != self.last_slice {
            self.inc = 0;
            self.last_slice = slice;
        } else {
            self.inc += 1;
        }

        let period = base36::encode(slice);
        if self.prefix.is_empty() {
            format!("{}{}{}", base36::encode(period.len() as u64), period, base36::encode(self.inc))
        } else {
            format!(
                "{}{}{}{}{}",
                base36::encode(self.prefix.len() as u64),
                self.prefix,
                base36::encode(period.len() as u64),
                period,
                base36::encode(self.inc)
            )
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as u64
}

/// Generates the next uid for the (domain, prefix) pair, creating a fresh
/// generator on first use. `domain` and `prefix` are concatenated to form
/// the registry key, matching the original scheme's key derivation.
pub fn gen(domain: &str, prefix: &str) -> String {
    let key = format!("{domain}{prefix}");
    let mut generators = GENERATORS.lock();
    let generator = generators.entry(key).or_insert_with(|| Generator {
        prefix: prefix.to_string(),
        last_slice: u64::MAX,
        inc: 0,
    });
    generator.gen_at(now_ms())
}

/// Extracts the `prefix` segment embedded by [`gen`]: one base36 character
/// encoding the prefix's length, followed by the prefix itself.
pub fn prefix(uid: &str) -> Option<&str> {
    if uid.is_empty() {
        return None;
    }
    let first_char = &uid[..1];
    let prefix_len = base36::decode(first_char)? as usize;
    if prefix_len > uid.len() - 1 {
        return None;
    }
    Some(&uid[1..1 + prefix_len])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s3_literal_scenario() {
        // prefix "FG" has length 2, which base36-encodes to "G".
        assert_eq!(base36::encode(2), "G");
        let mut generator = Generator { prefix: "FG".to_string(), last_slice: u64::MAX, inc: 0 };
        let uid = generator.gen_at(UID_BEGIN_TIME_MS + 1_000);
        assert!(uid.starts_with('G'));
        assert_eq!(&uid[1..3], "FG");
    }

    #[test]
    fn uids_within_one_slice_are_distinct_and_ordered() {
        let domain = "test-domain-distinct";
        let mut seen = Vec::new();
        for _ in 0..50 {
            seen.push(gen(domain, "P"));
        }
        for pair in seen.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
    }

    #[test]
    fn prefix_round_trips_through_gen() {
        let uid = gen("test-domain-prefix-rt", "XYZ");
        assert_eq!(prefix(&uid), Some("XYZ"));
    }

    #[test]
    fn prefix_of_empty_string_is_none() {
        assert_eq!(prefix(""), None);
    }

    #[test]
    fn empty_prefix_omits_length_segment() {
        let mut generator = Generator { prefix: String::new(), last_slice: u64::MAX, inc: 0 };
        let uid = generator.gen_at(UID_BEGIN_TIME_MS);
        // first char is the length of the period segment, not a prefix marker
        let period = base36::encode(0);
        assert_eq!(&uid[..1], &base36::encode(period.len() as u64));
    }
}
