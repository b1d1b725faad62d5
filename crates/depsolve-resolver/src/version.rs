//! Version parsing, comparison, and selector matching.
//!
//! Versions follow Gradle-style ordering rather than semver:
//! - Parts are split on `.`, `-`, `_` and at digit/letter boundaries
//! - Anything after the first `+` is build metadata and only breaks ties
//! - Numeric parts compare as numbers and are greater than text parts
//! - Text qualifiers have a special ordering:
//!   `dev` < any other text < `rc` < `snapshot` < `final` < `ga` < `release` < `sp`
//! - An extra trailing numeric part makes a version greater (`1.0 < 1.0.0`),
//!   an extra trailing text part makes it smaller (`1.0-rc < 1.0`)
//! - Strings that are not well-formed versions sort below every well-formed
//!   version and lexicographically among themselves

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use depsolve_core::metadata::ComponentStatus;

/// A parsed version with comparable parts.
#[derive(Debug, Clone)]
pub struct Version {
    pub original: String,
    parts: Vec<Part>,
    build: Option<String>,
    well_formed: bool,
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
enum Part {
    /// Digits with leading zeros stripped, so numbers of any size compare.
    Numeric(String),
    Qualifier(QualifierKind),
    Text(String),
}

/// Text parts with a defined ordering relative to other text.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
enum QualifierKind {
    Dev,
    Rc,
    Snapshot,
    Final,
    Ga,
    Release,
    Sp,
}

impl Version {
    pub fn parse(version: &str) -> Self {
        let well_formed = is_well_formed(version);
        if !well_formed {
            tracing::debug!(
                version,
                "version is not well-formed, ordering it lexicographically below well-formed versions"
            );
        }
        let (base, build) = match version.split_once('+') {
            Some((base, build)) => (base, Some(build.to_string())),
            None => (version, None),
        };
        Self {
            original: version.to_string(),
            parts: if well_formed { parse_parts(base) } else { Vec::new() },
            build,
            well_formed,
        }
    }

    /// Whether the string parsed as a regular version. Comparisons involving
    /// a version that is not well-formed fall back to plain string order.
    pub fn is_well_formed(&self) -> bool {
        self.well_formed
    }

    pub fn build_metadata(&self) -> Option<&str> {
        self.build.as_deref()
    }
}

fn is_well_formed(version: &str) -> bool {
    !version.is_empty()
        && version
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '+' | '~'))
        && version.chars().next().is_some_and(|c| c.is_ascii_alphanumeric())
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.well_formed.hash(state);
        if self.well_formed {
            self.parts.hash(state);
            self.build.hash(state);
        } else {
            self.original.hash(state);
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.well_formed, other.well_formed) {
            (false, false) => return self.original.cmp(&other.original),
            (false, true) => return Ordering::Less,
            (true, false) => return Ordering::Greater,
            (true, true) => {}
        }
        for (a, b) in self.parts.iter().zip(other.parts.iter()) {
            let ord = compare_parts(a, b);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        let common = self.parts.len().min(other.parts.len());
        let by_length = match (self.parts.get(common), other.parts.get(common)) {
            (Some(extra), None) => extra_part_ordering(extra),
            (None, Some(extra)) => extra_part_ordering(extra).reverse(),
            _ => Ordering::Equal,
        };
        by_length.then_with(|| self.build.cmp(&other.build))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn extra_part_ordering(extra: &Part) -> Ordering {
    match extra {
        Part::Numeric(_) => Ordering::Greater,
        _ => Ordering::Less,
    }
}

fn compare_parts(a: &Part, b: &Part) -> Ordering {
    match (a, b) {
        (Part::Numeric(a), Part::Numeric(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
        (Part::Numeric(_), _) => Ordering::Greater,
        (_, Part::Numeric(_)) => Ordering::Less,
        (Part::Qualifier(a), Part::Qualifier(b)) => a.cmp(b),
        (Part::Text(a), Part::Text(b)) => a.cmp(b),
        (Part::Qualifier(q), Part::Text(_)) => {
            if *q == QualifierKind::Dev {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
        (Part::Text(_), Part::Qualifier(q)) => {
            if *q == QualifierKind::Dev {
                Ordering::Greater
            } else {
                Ordering::Less
            }
        }
    }
}

fn parse_parts(version: &str) -> Vec<Part> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut current_is_digit = false;

    for ch in version.chars() {
        if matches!(ch, '.' | '-' | '_' | '~') {
            if !current.is_empty() {
                parts.push(classify(&current));
                current.clear();
            }
            continue;
        }
        let is_digit = ch.is_ascii_digit();
        if !current.is_empty() && is_digit != current_is_digit {
            parts.push(classify(&current));
            current.clear();
        }
        current_is_digit = is_digit;
        current.push(ch);
    }
    if !current.is_empty() {
        parts.push(classify(&current));
    }

    parts
}

fn classify(token: &str) -> Part {
    if token.chars().all(|c| c.is_ascii_digit()) {
        let trimmed = token.trim_start_matches('0');
        return Part::Numeric(if trimmed.is_empty() { "0" } else { trimmed }.to_string());
    }
    match token.to_lowercase().as_str() {
        "dev" => Part::Qualifier(QualifierKind::Dev),
        "rc" => Part::Qualifier(QualifierKind::Rc),
        "snapshot" => Part::Qualifier(QualifierKind::Snapshot),
        "final" => Part::Qualifier(QualifierKind::Final),
        "ga" => Part::Qualifier(QualifierKind::Ga),
        "release" => Part::Qualifier(QualifierKind::Release),
        "sp" => Part::Qualifier(QualifierKind::Sp),
        _ => Part::Text(token.to_string()),
    }
}

/// An interval of versions.
///
/// Supports: `[1.0,2.0)`, `]1.0,2.0[`, `[1.0,)`, `(,2.0]`, `[1.0]` (exact),
/// and the comparison shorthands `>=1.0`, `>1.0`, `<=2.0`, `<2.0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionRange {
    pub lower: Option<Bound>,
    pub upper: Option<Bound>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bound {
    pub version: Version,
    pub inclusive: bool,
}

impl Bound {
    fn new(version: &str, inclusive: bool) -> Option<Self> {
        let version = version.trim();
        if version.is_empty() {
            return None;
        }
        Some(Self {
            version: Version::parse(version),
            inclusive,
        })
    }
}

impl VersionRange {
    /// Parse a range expression.
    ///
    /// Returns `None` for anything that is not range syntax, including
    /// malformed brackets; those are treated as exact versions by
    /// [`VersionSelector::parse`].
    pub fn parse(spec: &str) -> Option<Self> {
        let s = spec.trim();
        if let Some(rest) = s.strip_prefix(">=") {
            return Some(Self::at_least(rest, true));
        }
        if let Some(rest) = s.strip_prefix('>') {
            return Some(Self::at_least(rest, false));
        }
        if let Some(rest) = s.strip_prefix("<=") {
            return Some(Self::at_most(rest, true));
        }
        if let Some(rest) = s.strip_prefix('<') {
            return Some(Self::at_most(rest, false));
        }

        if s.len() < 3 {
            return None;
        }
        let open_inclusive = match s.as_bytes()[0] {
            b'[' => true,
            b'(' | b']' => false,
            _ => return None,
        };
        let close_inclusive = match s.as_bytes()[s.len() - 1] {
            b']' => true,
            b')' | b'[' => false,
            _ => return None,
        };
        let inner = &s[1..s.len() - 1];

        if let Some((lower, upper)) = inner.split_once(',') {
            if upper.contains(',') {
                return None;
            }
            let range = VersionRange {
                lower: Bound::new(lower, open_inclusive),
                upper: Bound::new(upper, close_inclusive),
            };
            if range.lower.is_none() && range.upper.is_none() {
                return None;
            }
            Some(range)
        } else {
            // [1.0] means exactly 1.0
            if !open_inclusive || !close_inclusive {
                return None;
            }
            let bound = Bound::new(inner, true)?;
            Some(VersionRange {
                lower: Some(bound.clone()),
                upper: Some(bound),
            })
        }
    }

    fn at_least(version: &str, inclusive: bool) -> Self {
        Self {
            lower: Bound::new(version, inclusive),
            upper: None,
        }
    }

    fn at_most(version: &str, inclusive: bool) -> Self {
        Self {
            lower: None,
            upper: Bound::new(version, inclusive),
        }
    }

    /// Check if a version satisfies this range.
    pub fn contains(&self, version: &Version) -> bool {
        if let Some(ref lower) = self.lower {
            let cmp = version.cmp(&lower.version);
            if lower.inclusive {
                if cmp == Ordering::Less {
                    return false;
                }
            } else if cmp != Ordering::Greater {
                return false;
            }
        }
        if let Some(ref upper) = self.upper {
            let cmp = version.cmp(&upper.version);
            if upper.inclusive {
                if cmp == Ordering::Greater {
                    return false;
                }
            } else if cmp != Ordering::Less {
                return false;
            }
        }
        true
    }

    /// A range pinned to a single version, e.g. `[1.5]`.
    pub fn as_single_version(&self) -> Option<&Version> {
        match (&self.lower, &self.upper) {
            (Some(l), Some(u)) if l.inclusive && u.inclusive && l.version == u.version => {
                Some(&l.version)
            }
            _ => None,
        }
    }
}

/// A parsed version selector.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VersionSelector {
    /// A single version, e.g. `1.5`.
    Exact(Version),
    /// An interval, e.g. `[1.0,2.0)`.
    Range { spec: String, range: VersionRange },
    /// `1.+` matches every version starting with `1.`; `+` matches anything.
    Prefix(String),
    /// `latest.<status>`: highest version with at least the given status.
    Latest(ComponentStatus),
}

impl VersionSelector {
    pub fn parse(spec: &str) -> Self {
        let s = spec.trim();
        if let Some(status) = s.strip_prefix("latest.") {
            if let Some(status) = ComponentStatus::parse(status) {
                return Self::Latest(status);
            }
        }
        if let Some(prefix) = s.strip_suffix('+') {
            if prefix.is_empty() || prefix.ends_with('.') {
                return Self::Prefix(prefix.to_string());
            }
        }
        if let Some(range) = VersionRange::parse(s) {
            return match range.as_single_version() {
                Some(v) => Self::Exact(v.clone()),
                None => Self::Range {
                    spec: s.to_string(),
                    range,
                },
            };
        }
        Self::Exact(Version::parse(s))
    }

    /// Whether `version` satisfies this selector. `latest.*` selectors accept
    /// any version here; their status requirement is checked by
    /// [`VersionSelector::accepts_status`].
    pub fn accepts(&self, version: &Version) -> bool {
        match self {
            Self::Exact(v) => v == version,
            Self::Range { range, .. } => range.contains(version),
            Self::Prefix(prefix) => version.original.starts_with(prefix.as_str()),
            Self::Latest(_) => true,
        }
    }

    pub fn accepts_status(&self, status: ComponentStatus) -> bool {
        match self {
            Self::Latest(required) => status >= *required,
            _ => true,
        }
    }

    /// Dynamic selectors need the list of available versions to pick a
    /// candidate.
    pub fn is_dynamic(&self) -> bool {
        !matches!(self, Self::Exact(_))
    }

    /// `latest.*` selectors also need each candidate's metadata.
    pub fn requires_metadata(&self) -> bool {
        matches!(self, Self::Latest(_))
    }

    pub fn as_exact(&self) -> Option<&Version> {
        match self {
            Self::Exact(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for VersionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(v) => write!(f, "{v}"),
            Self::Range { spec, .. } => f.write_str(spec),
            Self::Prefix(prefix) => write!(f, "{prefix}+"),
            Self::Latest(status) => write!(f, "latest.{status}"),
        }
    }
}
