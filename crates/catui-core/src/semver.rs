//! Three-part semantic versions and the catui compatibility rule.
//!
//! Only `MAJOR.MINOR.PATCH` is supported; there are no pre-release or build
//! extensions. The textual grammar is strict:
//!
//! ```text
//! version   = component "." component "." component
//! component = "0" | nonzero-digit *digit
//! ```
//!
//! Major and minor must fit in 16 bits, patch in 32 bits.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest value accepted for the major and minor components.
pub const MAX_MAJOR_MINOR: u32 = u16::MAX as u32;

/// Largest value accepted for the patch component.
pub const MAX_PATCH: u32 = u32::MAX;

/// Names one of the three components of a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    /// The first component.
    Major,
    /// The second component.
    Minor,
    /// The third component.
    Patch,
}

impl Component {
    fn max(self) -> u32 {
        match self {
            Self::Major | Self::Minor => MAX_MAJOR_MINOR,
            Self::Patch => MAX_PATCH,
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Major => f.write_str("major"),
            Self::Minor => f.write_str("minor"),
            Self::Patch => f.write_str("patch"),
        }
    }
}

/// Errors produced while parsing a version string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SemVerError {
    /// A component was absent (too few dots).
    #[error("missing {0} version component")]
    MissingComponent(Component),

    /// A component was present but empty.
    #[error("empty {0} version component")]
    EmptyComponent(Component),

    /// A component contained something other than ASCII digits.
    #[error("{component} version component '{text}' is not a decimal number")]
    InvalidDigit { component: Component, text: String },

    /// A multi-digit component started with `0`.
    #[error("{component} version component '{text}' has a leading zero")]
    LeadingZero { component: Component, text: String },

    /// A component does not fit its field.
    #[error("{component} version component '{text}' exceeds {max}")]
    OutOfRange {
        component: Component,
        text: String,
        max: u32,
    },

    /// Input continued after the patch component.
    #[error("unexpected trailing characters after version: '{0}'")]
    TrailingCharacters(String),
}

/// A `MAJOR.MINOR.PATCH` version number.
///
/// Ordering is lexicographic on (major, minor, patch). In serde data formats
/// the version is an ordered triple of unsigned integers; the dotted text form
/// is only produced by [`Display`](fmt::Display) and consumed by
/// [`SemVer::parse`].
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "(u32, u32, u32)", into = "(u32, u32, u32)")]
pub struct SemVer {
    major: u32,
    minor: u32,
    patch: u32,
}

impl SemVer {
    /// Creates a version from its components.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Returns the major component.
    pub const fn major(&self) -> u32 {
        self.major
    }

    /// Returns the minor component.
    pub const fn minor(&self) -> u32 {
        self.minor
    }

    /// Returns the patch component.
    pub const fn patch(&self) -> u32 {
        self.patch
    }

    /// Parses the strict dotted form, e.g. `"1.2.3"`.
    ///
    /// The whole input must be consumed by exactly three components and two
    /// dots.
    pub fn parse(text: &str) -> Result<Self, SemVerError> {
        let mut parts = text.splitn(3, '.');

        let major = parse_component(parts.next(), Component::Major)?;
        let minor = parse_component(parts.next(), Component::Minor)?;

        // splitn leaves any further dots inside the last piece
        let rest = parts
            .next()
            .ok_or(SemVerError::MissingComponent(Component::Patch))?;
        let (patch_text, trailing) = match rest.find('.') {
            Some(idx) => rest.split_at(idx),
            None => (rest, ""),
        };
        let patch = parse_component(Some(patch_text), Component::Patch)?;

        if !trailing.is_empty() {
            return Err(SemVerError::TrailingCharacters(trailing.to_string()));
        }

        Ok(Self::new(major, minor, patch))
    }

    /// Writes the dotted form into `buf`, truncating if it does not fit.
    ///
    /// Returns the length of the full, untruncated text so callers can detect
    /// truncation by comparing it with `buf.len()`.
    pub fn write_to(&self, buf: &mut [u8]) -> usize {
        let text = self.to_string();
        let n = text.len().min(buf.len());
        buf[..n].copy_from_slice(&text.as_bytes()[..n]);
        text.len()
    }

    /// Returns true if a consumer requiring `self` can operate against an
    /// implementation advertising `api`.
    ///
    /// Majors must match. Major `0` is unstable: minors must match exactly and
    /// the api patch must be at least the consumer's. Otherwise a newer api
    /// minor is always usable, and an equal minor needs a patch at least as
    /// new.
    pub fn can_use(&self, api: &SemVer) -> bool {
        if self.major != api.major {
            return false;
        }

        if self.major == 0 {
            return self.minor == api.minor && self.patch <= api.patch;
        }

        if self.minor != api.minor {
            return self.minor < api.minor;
        }

        self.patch <= api.patch
    }

    /// Returns true if an implementation advertising `self` supports a
    /// consumer requiring `consumer`.
    pub fn can_support(&self, consumer: &SemVer) -> bool {
        consumer.can_use(self)
    }
}

/// [`SemVer::can_use`] where either side may be missing.
///
/// A missing operand is never compatible.
pub fn can_use(consumer: Option<&SemVer>, api: Option<&SemVer>) -> bool {
    match (consumer, api) {
        (Some(consumer), Some(api)) => consumer.can_use(api),
        _ => false,
    }
}

/// [`SemVer::can_support`] where either side may be missing.
pub fn can_support(api: Option<&SemVer>, consumer: Option<&SemVer>) -> bool {
    can_use(consumer, api)
}

fn parse_component(text: Option<&str>, component: Component) -> Result<u32, SemVerError> {
    let text = text.ok_or(SemVerError::MissingComponent(component))?;

    if text.is_empty() {
        return Err(SemVerError::EmptyComponent(component));
    }

    if !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SemVerError::InvalidDigit {
            component,
            text: text.to_string(),
        });
    }

    if text.len() > 1 && text.starts_with('0') {
        return Err(SemVerError::LeadingZero {
            component,
            text: text.to_string(),
        });
    }

    let out_of_range = || SemVerError::OutOfRange {
        component,
        text: text.to_string(),
        max: component.max(),
    };

    // digits only at this point, so a parse failure is overflow
    let value = text.parse::<u32>().map_err(|_| out_of_range())?;
    if value > component.max() {
        return Err(out_of_range());
    }

    Ok(value)
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SemVer {
    type Err = SemVerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<(u32, u32, u32)> for SemVer {
    type Error = SemVerError;

    fn try_from((major, minor, patch): (u32, u32, u32)) -> Result<Self, Self::Error> {
        for (component, value) in [
            (Component::Major, major),
            (Component::Minor, minor),
            (Component::Patch, patch),
        ] {
            if value > component.max() {
                return Err(SemVerError::OutOfRange {
                    component,
                    text: value.to_string(),
                    max: component.max(),
                });
            }
        }
        Ok(Self::new(major, minor, patch))
    }
}

impl From<SemVer> for (u32, u32, u32) {
    fn from(v: SemVer) -> Self {
        (v.major, v.minor, v.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(major: u32, minor: u32, patch: u32) -> SemVer {
        SemVer::new(major, minor, patch)
    }

    #[test]
    fn version_pieces() {
        let version = v(1, 2, 3);
        assert_eq!(version.major(), 1);
        assert_eq!(version.minor(), 2);
        assert_eq!(version.patch(), 3);
    }

    #[test]
    fn parse_basic_version() {
        assert_eq!(SemVer::parse("1.2.3").unwrap(), v(1, 2, 3));
        assert_eq!(SemVer::parse("0.0.0").unwrap(), v(0, 0, 0));
        assert_eq!(SemVer::parse("10.20.30").unwrap(), v(10, 20, 30));
    }

    #[test]
    fn parse_field_limits() {
        assert_eq!(
            SemVer::parse("65535.65535.4294967295").unwrap(),
            v(65535, 65535, u32::MAX)
        );
        assert!(matches!(
            SemVer::parse("65536.0.0"),
            Err(SemVerError::OutOfRange {
                component: Component::Major,
                ..
            })
        ));
        assert!(matches!(
            SemVer::parse("0.65536.0"),
            Err(SemVerError::OutOfRange {
                component: Component::Minor,
                ..
            })
        ));
        assert!(matches!(
            SemVer::parse("0.0.4294967296"),
            Err(SemVerError::OutOfRange {
                component: Component::Patch,
                ..
            })
        ));
        assert!(SemVer::parse("99999999999.1.1").is_err());
    }

    #[test]
    fn parse_rejects_malformed_input() {
        let bad = [
            "",
            "1",
            "1.2",
            "1.2.",
            ".1.2",
            "1..2",
            "1.2.3.",
            "1.2.3.4",
            "-1.2.3",
            "1.-2.3",
            "1.2.-3",
            "+1.2.3",
            " 1.2.3",
            "1.2.3 ",
            "1.2.3-beta",
            "01.2.3",
            "1.02.3",
            "1.2.03",
            "00.0.0",
            "a.b.c",
            "1.2.3\n",
            "cookie-monster",
        ];
        for text in bad {
            assert!(SemVer::parse(text).is_err(), "{text:?} should not parse");
        }
    }

    #[test]
    fn parse_error_kinds() {
        assert_eq!(
            SemVer::parse(""),
            Err(SemVerError::EmptyComponent(Component::Major))
        );
        assert_eq!(
            SemVer::parse("1.2"),
            Err(SemVerError::MissingComponent(Component::Patch))
        );
        assert_eq!(
            SemVer::parse("1.2.3.4"),
            Err(SemVerError::TrailingCharacters(".4".to_string()))
        );
        assert!(matches!(
            SemVer::parse("1.02.3"),
            Err(SemVerError::LeadingZero {
                component: Component::Minor,
                ..
            })
        ));
        assert!(matches!(
            SemVer::parse("1.2.x"),
            Err(SemVerError::InvalidDigit {
                component: Component::Patch,
                ..
            })
        ));
    }

    #[test]
    fn parse_error_messages() {
        insta::assert_snapshot!(
            SemVer::parse("1.02.3").unwrap_err(),
            @"minor version component '02' has a leading zero"
        );
        insta::assert_snapshot!(
            SemVer::parse("70000.0.0").unwrap_err(),
            @"major version component '70000' exceeds 65535"
        );
    }

    #[test]
    fn display_round_trips_through_parse() {
        for version in [v(0, 0, 0), v(1, 2, 3), v(65535, 65535, u32::MAX), v(0, 10, 7)] {
            assert_eq!(SemVer::parse(&version.to_string()).unwrap(), version);
        }
    }

    #[test]
    fn format_version() {
        assert_eq!(v(1, 2, 3).to_string(), "1.2.3");
        assert_eq!("4.5.6".parse::<SemVer>().unwrap(), v(4, 5, 6));
    }

    #[test]
    fn write_to_reports_full_length() {
        let version = v(12, 34, 56);

        let mut big = [0u8; 16];
        let n = version.write_to(&mut big);
        assert_eq!(n, 8);
        assert_eq!(&big[..n], b"12.34.56");

        let mut small = [0u8; 4];
        let n = version.write_to(&mut small);
        assert_eq!(n, 8);
        assert!(n > small.len());
        assert_eq!(&small, b"12.3");
    }

    #[test]
    fn ordering_is_lexicographic() {
        assert_eq!(v(1, 2, 3), v(1, 2, 3));
        assert_ne!(v(1, 2, 3), v(0, 2, 3));
        assert!(v(1, 1, 3) < v(1, 2, 3));
        assert!(v(1, 2, 4) > v(1, 2, 3));
        assert!(v(2, 0, 0) > v(1, 99, 99));

        let mut versions = vec![v(1, 0, 1), v(0, 9, 9), v(1, 0, 0), v(0, 10, 0)];
        versions.sort();
        assert_eq!(versions, vec![v(0, 9, 9), v(0, 10, 0), v(1, 0, 0), v(1, 0, 1)]);
    }

    #[test]
    fn can_use_is_reflexive() {
        for version in [v(0, 0, 0), v(0, 1, 0), v(1, 0, 0), v(3, 7, 11)] {
            assert!(version.can_use(&version));
            assert!(version.can_support(&version));
        }
    }

    #[test]
    fn major_mismatch_is_incompatible() {
        assert!(!v(1, 0, 0).can_use(&v(2, 0, 0)));
        assert!(!v(2, 0, 0).can_use(&v(1, 9, 9)));
        assert!(!v(0, 1, 0).can_use(&v(1, 1, 0)));
    }

    #[test]
    fn version_zero_requires_equal_minor() {
        assert!(!v(0, 1, 0).can_use(&v(0, 2, 0)));
        assert!(!v(0, 2, 0).can_use(&v(0, 1, 0)));
        assert!(!v(0, 2, 0).can_support(&v(0, 1, 0)));
    }

    #[test]
    fn version_zero_patch_must_not_regress() {
        assert!(v(0, 1, 0).can_use(&v(0, 1, 1)));
        assert!(v(0, 1, 1).can_use(&v(0, 1, 1)));
        assert!(!v(0, 1, 2).can_use(&v(0, 1, 1)));
    }

    #[test]
    fn greater_api_minor_is_compatible() {
        assert!(v(1, 0, 123).can_use(&v(1, 1, 0)));
        assert!(v(1, 1, 0).can_support(&v(1, 0, 123)));
    }

    #[test]
    fn lesser_api_minor_is_incompatible() {
        assert!(!v(1, 2, 0).can_use(&v(1, 1, 123)));
        assert!(!v(1, 1, 123).can_support(&v(1, 2, 0)));
    }

    #[test]
    fn equal_minor_compares_patch() {
        assert!(v(1, 1, 0).can_use(&v(1, 1, 1)));
        assert!(v(1, 1, 1).can_use(&v(1, 1, 1)));
        assert!(!v(1, 1, 2).can_use(&v(1, 1, 1)));
    }

    #[test]
    fn can_support_mirrors_can_use() {
        let samples = [
            v(0, 0, 0),
            v(0, 1, 0),
            v(0, 1, 5),
            v(0, 2, 0),
            v(1, 0, 0),
            v(1, 0, 9),
            v(1, 3, 0),
            v(2, 0, 0),
        ];
        for consumer in samples {
            for api in samples {
                assert_eq!(
                    api.can_support(&consumer),
                    consumer.can_use(&api),
                    "consumer {consumer}, api {api}"
                );
            }
        }
    }

    #[test]
    fn missing_operand_is_incompatible() {
        let version = v(1, 0, 0);
        assert!(can_use(Some(&version), Some(&version)));
        assert!(!can_use(None, Some(&version)));
        assert!(!can_use(Some(&version), None));
        assert!(!can_use(None, None));
        assert!(!can_support(None, Some(&version)));
        assert!(can_support(Some(&v(1, 1, 0)), Some(&version)));
    }

    #[test]
    fn encoded_as_tuple() {
        let json = serde_json::to_string(&v(1, 2, 3)).unwrap();
        assert_eq!(json, "[1,2,3]");

        let decoded: SemVer = serde_json::from_str("[4,5,6]").unwrap();
        assert_eq!(decoded, v(4, 5, 6));

        let tuple: (u32, u32, u32) = v(7, 8, 9).into();
        assert_eq!(tuple, (7, 8, 9));
    }

    #[test]
    fn tuple_components_are_range_checked() {
        assert_eq!(
            SemVer::try_from((65535, 65535, u32::MAX)),
            Ok(v(65535, 65535, u32::MAX))
        );
        assert!(matches!(
            SemVer::try_from((70000, 0, 0)),
            Err(SemVerError::OutOfRange {
                component: Component::Major,
                ..
            })
        ));
        assert!(matches!(
            SemVer::try_from((1, 65536, 0)),
            Err(SemVerError::OutOfRange {
                component: Component::Minor,
                ..
            })
        ));

        let bytes = serde_cbor::to_vec(&(70000u32, 0u32, 0u32)).unwrap();
        assert!(serde_cbor::from_slice::<SemVer>(&bytes).is_err());
        assert!(serde_json::from_str::<SemVer>("[1,70000,0]").is_err());
    }

    #[test]
    fn structured_round_trip() {
        let version = v(3, 1, 4);
        let bytes = serde_cbor::to_vec(&version).unwrap();
        let decoded: SemVer = serde_cbor::from_slice(&bytes).unwrap();
        assert_eq!(decoded, version);
    }
}
