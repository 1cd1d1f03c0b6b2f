//! TTL Codec
//!
//! Parses time-to-live values (whole seconds or duration strings such as `"30m"`)
//! and converts them to absolute expiry timestamps in Unix milliseconds.

use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::Utc;
use regex::Regex;

use crate::error::{CacheError, Result};

static DURATION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)([smhdw])$").expect("duration pattern is valid"));

// == TTL ==
/// A time-to-live value, either whole seconds or a duration expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ttl {
    /// Whole seconds
    Seconds(u64),
    /// Duration expression: digits followed by one of `s`, `m`, `h`, `d`, `w`
    Expr(String),
}

impl From<u64> for Ttl {
    fn from(seconds: u64) -> Self {
        Ttl::Seconds(seconds)
    }
}

impl From<&str> for Ttl {
    fn from(expr: &str) -> Self {
        Ttl::Expr(expr.to_string())
    }
}

impl From<String> for Ttl {
    fn from(expr: String) -> Self {
        Ttl::Expr(expr)
    }
}

impl From<Duration> for Ttl {
    /// Sub-second precision is truncated.
    fn from(duration: Duration) -> Self {
        Ttl::Seconds(duration.as_secs())
    }
}

impl From<&Ttl> for Ttl {
    fn from(ttl: &Ttl) -> Self {
        ttl.clone()
    }
}

impl fmt::Display for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ttl::Seconds(secs) => write!(f, "{}s", secs),
            Ttl::Expr(expr) => f.write_str(expr),
        }
    }
}

// == Expiration ==
/// Resolved lifetime of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiration {
    /// No TTL given; the entry never expires
    Never,
    /// Expires at the given Unix timestamp in milliseconds
    At(i64),
    /// Zero TTL; the entry is already expired and must not be stored
    Immediate,
}

impl Expiration {
    /// Resolves an optional TTL against the current clock.
    pub fn from_ttl(ttl: Option<&Ttl>) -> Result<Self> {
        match ttl {
            None => Ok(Expiration::Never),
            Some(ttl) => match parse_ttl_ms(ttl)? {
                0 => Ok(Expiration::Immediate),
                ms => Ok(Expiration::At(now_ms().saturating_add(ms))),
            },
        }
    }

    /// Absolute expiry timestamp, `None` for entries that never expire.
    pub fn expires_at(&self) -> Option<i64> {
        match self {
            Expiration::Never => None,
            Expiration::At(at) => Some(*at),
            Expiration::Immediate => Some(now_ms()),
        }
    }
}

// == Parsing ==
/// Converts a TTL to whole seconds.
///
/// Fails with [`CacheError::InvalidTtl`] for strings outside `^\d+[smhdw]$` or
/// values that overflow.
pub fn parse_ttl(ttl: &Ttl) -> Result<u64> {
    match ttl {
        Ttl::Seconds(secs) => Ok(*secs),
        Ttl::Expr(expr) => {
            let caps = DURATION_PATTERN
                .captures(expr)
                .ok_or_else(|| CacheError::InvalidTtl(expr.clone()))?;

            let amount: u64 = caps[1]
                .parse()
                .map_err(|_| CacheError::InvalidTtl(expr.clone()))?;

            let multiplier = match &caps[2] {
                "s" => 1,
                "m" => 60,
                "h" => 3_600,
                "d" => 86_400,
                "w" => 604_800,
                _ => return Err(CacheError::InvalidTtl(expr.clone())),
            };

            amount
                .checked_mul(multiplier)
                .ok_or_else(|| CacheError::InvalidTtl(expr.clone()))
        }
    }
}

/// Converts a TTL to milliseconds.
pub fn parse_ttl_ms(ttl: &Ttl) -> Result<i64> {
    parse_ttl(ttl)?
        .checked_mul(1000)
        .and_then(|ms| i64::try_from(ms).ok())
        .ok_or_else(|| CacheError::InvalidTtl(ttl.to_string()))
}

/// Returns the absolute expiry timestamp (Unix ms) for a TTL starting now.
pub fn calculate_expiration(ttl: &Ttl) -> Result<i64> {
    Ok(now_ms().saturating_add(parse_ttl_ms(ttl)?))
}

// == Is Expired ==
/// Checks an absolute expiry timestamp against the current time.
///
/// An entry is expired once the current time reaches `expires_at`; `None`
/// never expires.
pub fn is_expired(expires_at: Option<i64>) -> bool {
    match expires_at {
        Some(at) => now_ms() >= at,
        None => false,
    }
}

/// Returns current Unix timestamp in milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ttl_units() {
        assert_eq!(parse_ttl(&"1h".into()).unwrap(), 3600);
        assert_eq!(parse_ttl(&"30m".into()).unwrap(), 1800);
        assert_eq!(parse_ttl(&"45s".into()).unwrap(), 45);
        assert_eq!(parse_ttl(&"2d".into()).unwrap(), 172_800);
        assert_eq!(parse_ttl(&"1w".into()).unwrap(), 604_800);
        assert_eq!(parse_ttl(&90u64.into()).unwrap(), 90);
    }

    #[test]
    fn test_parse_ttl_rejects_malformed() {
        for bad in ["bad", "", "10", "10x", "1.5h", "-5s", " 5s", "5s ", "h"] {
            let result = parse_ttl(&bad.into());
            assert!(
                matches!(result, Err(CacheError::InvalidTtl(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_ttl_overflow() {
        let huge = format!("{}w", u64::MAX);
        assert!(matches!(parse_ttl(&huge.into()), Err(CacheError::InvalidTtl(_))));
        assert!(matches!(
            parse_ttl_ms(&Ttl::Seconds(u64::MAX)),
            Err(CacheError::InvalidTtl(_))
        ));
    }

    #[test]
    fn test_parse_ttl_ms() {
        assert_eq!(parse_ttl_ms(&"2m".into()).unwrap(), 120_000);
        assert_eq!(parse_ttl_ms(&Ttl::Seconds(0)).unwrap(), 0);
    }

    #[test]
    fn test_ttl_from_duration() {
        assert_eq!(Ttl::from(Duration::from_millis(2500)), Ttl::Seconds(2));
    }

    #[test]
    fn test_calculate_expiration() {
        let before = now_ms();
        let at = calculate_expiration(&"10s".into()).unwrap();
        let after = now_ms();
        assert!(at >= before + 10_000);
        assert!(at <= after + 10_000);
    }

    #[test]
    fn test_is_expired() {
        assert!(!is_expired(None));
        assert!(!is_expired(Some(now_ms() + 60_000)));
        assert!(is_expired(Some(now_ms() - 1)));
    }

    #[test]
    fn test_expiration_boundary_condition() {
        // Expired as soon as now >= expires_at
        assert!(is_expired(Some(now_ms())));
    }

    #[test]
    fn test_expiration_from_ttl() {
        assert_eq!(Expiration::from_ttl(None).unwrap(), Expiration::Never);
        assert_eq!(
            Expiration::from_ttl(Some(&Ttl::Seconds(0))).unwrap(),
            Expiration::Immediate
        );
        assert_eq!(
            Expiration::from_ttl(Some(&"0m".into())).unwrap(),
            Expiration::Immediate
        );
        assert!(matches!(
            Expiration::from_ttl(Some(&"1m".into())).unwrap(),
            Expiration::At(_)
        ));
        assert!(Expiration::from_ttl(Some(&"soon".into())).is_err());
    }
}
