//! UID sets as used by `UID FETCH`, `UID STORE`, `UID EXPUNGE` and friends.

use std::fmt;

use super::Uid;

/// One contiguous run of UIDs. `end == None` stands for `*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct UidRange {
    start: u32,
    end: Option<u32>,
}

/// A set of UIDs rendered in compact IMAP syntax (`1:4,9,12:*`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UidSet {
    ranges: Vec<UidRange>,
}

impl UidSet {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self { ranges: Vec::new() }
    }

    /// A single UID.
    #[must_use]
    pub fn single(uid: Uid) -> Self {
        Self {
            ranges: vec![UidRange {
                start: uid.get(),
                end: Some(uid.get()),
            }],
        }
    }

    /// `start:*`, i.e. every UID from `start` upwards.
    #[must_use]
    pub fn from_start(start: Uid) -> Self {
        Self {
            ranges: vec![UidRange {
                start: start.get(),
                end: None,
            }],
        }
    }

    /// `1:*`.
    #[must_use]
    pub fn all() -> Self {
        Self {
            ranges: vec![UidRange {
                start: 1,
                end: None,
            }],
        }
    }

    /// Builds a set from arbitrary UIDs, coalescing adjacent values.
    pub fn from_uids(uids: impl IntoIterator<Item = Uid>) -> Self {
        let mut values: Vec<u32> = uids.into_iter().map(Uid::get).collect();
        values.sort_unstable();
        values.dedup();

        let mut ranges: Vec<UidRange> = Vec::new();
        for v in values {
            match ranges.last_mut() {
                Some(UidRange {
                    end: Some(end), ..
                }) if end.checked_add(1) == Some(v) => *end = v,
                _ => ranges.push(UidRange {
                    start: v,
                    end: Some(v),
                }),
            }
        }
        Self { ranges }
    }

    /// Parses `1:4,9,12:*` as found in `COPYUID`, `APPENDUID` and `VANISHED`.
    ///
    /// Returns `None` on malformed input or a zero UID.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let mut ranges = Vec::new();
        for part in s.split(',') {
            let (a, b) = part.split_once(':').unwrap_or((part, part));
            let a = parse_bound(a)?;
            let b = parse_bound(b)?;
            let range = match (a, b) {
                (Some(a), Some(b)) => UidRange {
                    start: a.min(b),
                    end: Some(a.max(b)),
                },
                (Some(n), None) | (None, Some(n)) => UidRange {
                    start: n,
                    end: None,
                },
                (None, None) => UidRange {
                    start: u32::MAX,
                    end: None,
                },
            };
            ranges.push(range);
        }
        Some(Self { ranges })
    }

    /// Returns true if the set contains no ranges.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Returns true if `uid` is a member.
    #[must_use]
    pub fn contains(&self, uid: Uid) -> bool {
        let v = uid.get();
        self.ranges
            .iter()
            .any(|r| v >= r.start && r.end.is_none_or(|end| v <= end))
    }

    /// Expands bounded ranges into individual UIDs.
    ///
    /// Open ranges (`n:*`) contribute only their start value, since the
    /// upper end is only known to the server.
    #[must_use]
    pub fn expand(&self) -> Vec<Uid> {
        self.ranges
            .iter()
            .flat_map(|r| r.start..=r.end.unwrap_or(r.start))
            .filter_map(Uid::new)
            .collect()
    }

    /// Splits the set into chunks of at most `max` UIDs each.
    ///
    /// Used to keep command lines within server limits.
    #[must_use]
    pub fn chunks(uids: &[Uid], max: usize) -> Vec<Self> {
        uids.chunks(max.max(1))
            .map(|c| Self::from_uids(c.iter().copied()))
            .collect()
    }
}

fn parse_bound(s: &str) -> Option<Option<u32>> {
    if s == "*" {
        return Some(None);
    }
    match s.parse::<u32>() {
        Ok(0) | Err(_) => None,
        Ok(n) => Some(Some(n)),
    }
}

impl fmt::Display for UidSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, r) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            match r.end {
                Some(end) if end == r.start => write!(f, "{}", r.start)?,
                Some(end) => write!(f, "{}:{end}", r.start)?,
                None => write!(f, "{}:*", r.start)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn uid(n: u32) -> Uid {
        Uid::new(n).unwrap()
    }

    #[test]
    fn coalesces_adjacent_uids() {
        let set = UidSet::from_uids([5, 1, 2, 3, 9, 10].map(uid));
        assert_eq!(set.to_string(), "1:3,5,9:10");
    }

    #[test]
    fn open_range_renders_star() {
        assert_eq!(UidSet::from_start(uid(42)).to_string(), "42:*");
        assert_eq!(UidSet::all().to_string(), "1:*");
    }

    #[test]
    fn parse_copyuid_set() {
        let set = UidSet::parse("304,319:320").unwrap();
        assert_eq!(set.expand(), vec![uid(304), uid(319), uid(320)]);
    }

    #[test]
    fn parse_rejects_zero() {
        assert!(UidSet::parse("0:4").is_none());
        assert!(UidSet::parse("abc").is_none());
    }

    #[test]
    fn contains_checks_open_ranges() {
        let set = UidSet::parse("3:5,100:*").unwrap();
        assert!(set.contains(uid(4)));
        assert!(!set.contains(uid(6)));
        assert!(set.contains(uid(5000)));
    }

    #[test]
    fn chunks_split_large_lists() {
        let uids: Vec<Uid> = (1..=7).map(uid).collect();
        let chunks = UidSet::chunks(&uids, 3);
        let rendered: Vec<String> = chunks.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["1:3", "4:6", "7"]);
    }

    proptest! {
        #[test]
        fn rendered_set_parses_back_to_same_members(values in proptest::collection::btree_set(1u32..5000, 1..60)) {
            let set = UidSet::from_uids(values.iter().copied().map(uid));
            let parsed = UidSet::parse(&set.to_string()).unwrap();
            let expanded: Vec<u32> = parsed.expand().into_iter().map(Uid::get).collect();
            let expected: Vec<u32> = values.into_iter().collect();
            prop_assert_eq!(expanded, expected);
        }
    }
}
