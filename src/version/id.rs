//! Version identifiers

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::version::error::VersionError;
use crate::version::string::VersionString;

const COMPOUND_SEPARATOR: char = '&';
const ELEMENT_SEPARATORS: [char; 3] = ['.', '-', '_'];

/// Element used to pad the shorter tuple before comparing
const ZERO_ELEMENT: &str = "0";

/// `string (separator string)* modifier?` where `string` excludes whitespace,
/// `&`, separators and modifiers
static SIMPLE_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s&._*+\-]+(?:[._\-][^\s&._*+\-]+)*[*+]?$").unwrap()
});

/// Trailing match modifier of a version id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    /// `*`: the candidate must start with this id
    Prefix,
    /// `+`: the candidate must be greater than or equal to this id
    AtLeast,
}

impl Modifier {
    fn from_char(c: char) -> Option<Self> {
        match c {
            '*' => Some(Modifier::Prefix),
            '+' => Some(Modifier::AtLeast),
            _ => None,
        }
    }
}

fn is_numeric(element: &str) -> bool {
    !element.is_empty() && element.bytes().all(|b| b.is_ascii_digit())
}

/// Compares two digit strings by value without overflowing on long numbers
fn compare_numeric(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Element ordering: numbers by value, a non-numeric element above any
/// numeric one, otherwise by character
fn compare_elements(a: &str, b: &str) -> Ordering {
    match (is_numeric(a), is_numeric(b)) {
        (true, true) => compare_numeric(a, b),
        (false, true) => Ordering::Greater,
        (true, false) => Ordering::Less,
        (false, false) => a.cmp(b),
    }
}

/// One `&`-separated part of a version id
#[derive(Debug, Clone)]
struct Part {
    /// Text without the modifier
    exact: String,
    elements: Vec<String>,
    modifier: Option<Modifier>,
}

impl Part {
    fn parse(s: &str) -> Option<Self> {
        if !SIMPLE_ID_RE.is_match(s) {
            return None;
        }

        let (exact, modifier) = match s.chars().last().and_then(Modifier::from_char) {
            Some(modifier) => (&s[..s.len() - 1], Some(modifier)),
            None => (s, None),
        };

        Some(Self {
            exact: exact.to_string(),
            elements: exact.split(ELEMENT_SEPARATORS).map(str::to_string).collect(),
            modifier,
        })
    }

    /// Elements right-padded with the zero element up to `len`
    fn normalized(&self, len: usize) -> impl Iterator<Item = &str> {
        self.elements
            .iter()
            .map(String::as_str)
            .chain(std::iter::repeat(ZERO_ELEMENT))
            .take(len.max(self.elements.len()))
    }

    fn compare(&self, other: &Part) -> Ordering {
        let len = self.elements.len().max(other.elements.len());
        self.normalized(len)
            .zip(other.normalized(len))
            .map(|(a, b)| compare_elements(a, b))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }

    fn is_equal_to(&self, other: &Part) -> bool {
        self.compare(other).is_eq()
    }

    fn is_prefix_match_of(&self, other: &Part) -> bool {
        let len = self.elements.len();
        self.elements
            .iter()
            .map(String::as_str)
            .zip(other.normalized(len))
            .all(|(a, b)| compare_elements(a, b).is_eq())
    }

    fn matches(&self, candidate: &Part) -> bool {
        match self.modifier {
            None => self.is_equal_to(candidate),
            Some(Modifier::Prefix) => self.is_prefix_match_of(candidate),
            Some(Modifier::AtLeast) => candidate.compare(self).is_ge(),
        }
    }
}

/// A parsed version id such as `1.2.3`, `1.2*`, `1.4+` or `1.4*&1.4.5`
///
/// Elements are compared after right-padding both tuples with `"0"`, so `1`,
/// `1.0` and `1.0.0` compare as equal. Equality via `==` is textual; use
/// [`VersionId::is_equal_to`] for the padded comparison.
#[derive(Debug, Clone)]
pub struct VersionId {
    raw: String,
    parts: Vec<Part>,
}

impl VersionId {
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let parts = s
            .split(COMPOUND_SEPARATOR)
            .map(|part| Part::parse(part).ok_or_else(|| VersionError::InvalidVersionId(s.to_string())))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            raw: s.to_string(),
            parts,
        })
    }

    /// The part that decides ordering and what a candidate is compared with
    fn effective(&self) -> &Part {
        // parse guarantees at least one part
        &self.parts[self.parts.len() - 1]
    }

    pub fn is_compound(&self) -> bool {
        self.parts.len() > 1
    }

    /// True for a single part without a modifier
    pub fn is_exact(&self) -> bool {
        !self.is_compound() && self.parts[0].modifier.is_none()
    }

    /// Modifier of the first part
    pub fn modifier(&self) -> Option<Modifier> {
        self.parts[0].modifier
    }

    /// First part with its modifier stripped (`1.0.0*&1.0.5+` → `1.0.0`)
    pub fn to_exact_string(&self) -> String {
        self.parts[0].exact.clone()
    }

    /// Padded, element-wise equality ignoring modifiers
    pub fn is_equal_to(&self, other: &VersionId) -> bool {
        self.parts.len() == other.parts.len()
            && self
                .parts
                .iter()
                .zip(&other.parts)
                .all(|(a, b)| a.is_equal_to(b))
    }

    /// Like [`is_equal_to`](Self::is_equal_to) but modifiers must agree too
    pub(crate) fn is_same_range_as(&self, other: &VersionId) -> bool {
        self.is_equal_to(other)
            && self
                .parts
                .iter()
                .zip(&other.parts)
                .all(|(a, b)| a.modifier == b.modifier)
    }

    /// True if every part of `self` is a prefix of `other`'s effective part
    pub fn is_prefix_match_of(&self, other: &VersionId) -> bool {
        let candidate = other.effective();
        self.parts.iter().all(|part| part.is_prefix_match_of(candidate))
    }

    pub fn is_greater_than(&self, other: &VersionId) -> bool {
        self.effective().compare(other.effective()).is_gt()
    }

    pub fn is_greater_or_equal(&self, other: &VersionId) -> bool {
        self.effective().compare(other.effective()).is_ge()
    }

    /// True if `candidate` satisfies every part of `self` under that part's
    /// modifier: exact without one, prefix for `*`, at-least for `+`
    pub fn matches(&self, candidate: &VersionId) -> bool {
        let candidate = candidate.effective();
        self.parts.iter().all(|part| part.matches(candidate))
    }

    pub fn as_version_string(&self) -> VersionString {
        VersionString::from_version_id(self.clone())
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for VersionId {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl PartialEq for VersionId {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for VersionId {}

impl Hash for VersionId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl Ord for VersionId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.effective()
            .compare(other.effective())
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl PartialOrd for VersionId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
