//! Version strings and cache ranking

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::version::error::VersionError;
use crate::version::id::VersionId;
use crate::version::range::VersionRange;

const RANGE_SEPARATOR: char = ' ';

/// Space-separated list of version ranges; a candidate is accepted if any
/// range matches it
#[derive(Debug, Clone, PartialEq)]
pub struct VersionString {
    ranges: Vec<VersionRange>,
}

impl VersionString {
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let ranges = s
            .split(RANGE_SEPARATOR)
            .map(|range| {
                VersionRange::parse(range)
                    .map_err(|_| VersionError::InvalidVersionString(s.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { ranges })
    }

    pub(crate) fn from_version_id(id: VersionId) -> Self {
        Self {
            ranges: vec![VersionRange::from_version_id(id)],
        }
    }

    pub fn ranges(&self) -> &[VersionRange] {
        &self.ranges
    }

    pub fn contains(&self, id: &VersionId) -> bool {
        self.ranges.iter().any(|range| range.matches(id))
    }

    pub fn contains_str(&self, id: &str) -> Result<bool, VersionError> {
        Ok(self.contains(&VersionId::parse(id)?))
    }

    /// True if any range's version is greater than `id`
    pub fn contains_greater_than(&self, id: &VersionId) -> bool {
        self.ranges.iter().any(|range| range.is_greater_than(id))
    }

    pub fn contains_single_version_id(&self) -> bool {
        self.ranges.len() == 1
    }

    /// The requested version when this string names exactly one version
    /// without modifiers
    pub fn exact_version_id(&self) -> Option<&VersionId> {
        match self.ranges.as_slice() {
            [range] if range.is_exact_version() => Some(range.version_id()),
            _ => None,
        }
    }

    /// Index of the first range containing `id`
    fn position(&self, id: &VersionId) -> Option<usize> {
        self.ranges.iter().position(|range| range.matches(id))
    }
}

impl fmt::Display for VersionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", RANGE_SEPARATOR)?;
            }
            write!(f, "{}", range)?;
        }
        Ok(())
    }
}

impl FromStr for VersionString {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Orders version ids by preference with respect to a requested version string.
///
/// An id contained in an earlier range ranks above one contained in a later
/// range, and any contained id ranks above an id that is not contained.
/// Otherwise (same range, neither contained, or no version string) the natural
/// version order applies. The greatest id is the best cache candidate.
#[derive(Debug, Clone, Default)]
pub struct VersionIdComparator {
    version_string: Option<VersionString>,
}

impl VersionIdComparator {
    pub fn new(version_string: Option<VersionString>) -> Self {
        Self { version_string }
    }

    pub fn compare(&self, a: &VersionId, b: &VersionId) -> Ordering {
        let Some(version_string) = &self.version_string else {
            return a.cmp(b);
        };

        match (version_string.position(a), version_string.position(b)) {
            (Some(pos_a), Some(pos_b)) if pos_a != pos_b => pos_b.cmp(&pos_a),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            _ => a.cmp(b),
        }
    }

    /// Picks the most preferred id
    pub fn best<'a, I>(&self, ids: I) -> Option<&'a VersionId>
    where
        I: IntoIterator<Item = &'a VersionId>,
    {
        ids.into_iter().max_by(|a, b| self.compare(a, b))
    }
}
