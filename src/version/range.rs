//! Simple and compound version ranges

use std::fmt;
use std::str::FromStr;

use crate::version::error::VersionError;
use crate::version::id::{Modifier, VersionId};

/// A single version id with an optional modifier, e.g. `1.2`, `1.2*`, `1.2+`
#[derive(Debug, Clone)]
pub struct SimpleRange {
    id: VersionId,
}

impl SimpleRange {
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let id = VersionId::parse(s).map_err(|_| VersionError::InvalidVersionRange(s.to_string()))?;
        if id.is_compound() {
            return Err(VersionError::InvalidVersionRange(s.to_string()));
        }
        Ok(Self { id })
    }

    pub fn version_id(&self) -> &VersionId {
        &self.id
    }

    pub fn modifier(&self) -> Option<Modifier> {
        self.id.modifier()
    }

    pub fn is_exact(&self) -> bool {
        self.id.is_exact()
    }

    pub fn matches(&self, candidate: &VersionId) -> bool {
        self.id.matches(candidate)
    }
}

impl PartialEq for SimpleRange {
    fn eq(&self, other: &Self) -> bool {
        self.id.is_same_range_as(&other.id)
    }
}

impl fmt::Display for SimpleRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.id, f)
    }
}

/// One or more simple ranges joined by `&`; a candidate must match all of them
#[derive(Debug, Clone)]
pub struct VersionRange {
    id: VersionId,
}

impl VersionRange {
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let id = VersionId::parse(s).map_err(|_| VersionError::InvalidVersionRange(s.to_string()))?;
        Ok(Self { id })
    }

    pub(crate) fn from_version_id(id: VersionId) -> Self {
        Self { id }
    }

    pub fn is_simple_range(&self) -> bool {
        !self.id.is_compound()
    }

    /// True for a single simple range without a modifier
    pub fn is_exact_version(&self) -> bool {
        self.id.is_exact()
    }

    pub fn simple_ranges(&self) -> Vec<SimpleRange> {
        self.id
            .as_str()
            .split('&')
            .filter_map(|part| SimpleRange::parse(part).ok())
            .collect()
    }

    /// The range as a (possibly compound) version id
    pub fn version_id(&self) -> &VersionId {
        &self.id
    }

    pub fn matches(&self, candidate: &VersionId) -> bool {
        self.id.matches(candidate)
    }

    pub fn is_greater_than(&self, other: &VersionId) -> bool {
        self.id.is_greater_than(other)
    }
}

impl PartialEq for VersionRange {
    fn eq(&self, other: &Self) -> bool {
        self.id.is_same_range_as(&other.id)
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.id, f)
    }
}

impl FromStr for VersionRange {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn id(s: &str) -> VersionId {
        VersionId::parse(s).unwrap()
    }

    #[rstest]
    #[case("1.5+", "1.5+", true)]
    #[case("1.5+", "1.5*", false)]
    #[case("1.5", "1.5+", false)]
    #[case("1.5", "1.5.0", true)]
    #[case("1.5*", "1.5.0*", true)]
    fn simple_range_equality_considers_modifiers(
        #[case] a: &str,
        #[case] b: &str,
        #[case] expected: bool,
    ) {
        assert_eq!(
            SimpleRange::parse(a).unwrap() == SimpleRange::parse(b).unwrap(),
            expected
        );
    }

    #[test]
    fn simple_range_rejects_compound_input() {
        assert_eq!(
            SimpleRange::parse("1.0*&1.0.4").unwrap_err(),
            VersionError::InvalidVersionRange("1.0*&1.0.4".to_string())
        );
    }

    #[rstest]
    #[case("1.0*&1.0.4+", "1.0.4", true)]
    #[case("1.0*&1.0.4+", "1.0.9", true)]
    #[case("1.0*&1.0.4+", "1.0.3", false)]
    #[case("1.0*&1.0.4+", "1.1", false)]
    #[case("2.0*", "2.0.1", true)]
    fn version_range_requires_all_simple_ranges(
        #[case] range: &str,
        #[case] candidate: &str,
        #[case] expected: bool,
    ) {
        assert_eq!(
            VersionRange::parse(range).unwrap().matches(&id(candidate)),
            expected
        );
    }

    #[test]
    fn version_range_exposes_its_simple_ranges() {
        let range = VersionRange::parse("1.0*&1.0.4+").unwrap();

        assert!(!range.is_simple_range());
        assert!(!range.is_exact_version());
        assert_eq!(
            range.simple_ranges(),
            vec![
                SimpleRange::parse("1.0*").unwrap(),
                SimpleRange::parse("1.0.4+").unwrap()
            ]
        );
    }

    #[rstest]
    #[case("1.0*&1.0.4", "1.0*&1.0.4", true)]
    #[case("1.0*&1.0.4", "1.0+&1.0.4", false)]
    #[case("1.0*&1.0.4", "1.0*", false)]
    fn version_range_equality_is_structural(
        #[case] a: &str,
        #[case] b: &str,
        #[case] expected: bool,
    ) {
        assert_eq!(
            VersionRange::parse(a).unwrap() == VersionRange::parse(b).unwrap(),
            expected
        );
    }

    #[rstest]
    #[case("1.0 2.0")]
    #[case("1.0.")]
    #[case("")]
    fn version_range_rejects_malformed_input(#[case] input: &str) {
        assert_eq!(
            VersionRange::parse(input).unwrap_err(),
            VersionError::InvalidVersionRange(input.to_string())
        );
    }
}
