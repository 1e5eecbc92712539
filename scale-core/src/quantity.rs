//! Magnitude strings and tolerance bands.
//!
//! Declared sizes arrive as Kubernetes quantities (`64Gi`, `500M`, `1.5Ti`).
//! They are normalized to bytes before any numeric comparison.

use thiserror::Error;

/// Allowed shortfall when comparing guest-reported memory to the declared size.
pub const MEMORY_TOLERANCE_PCT: f64 = 15.0;

/// Allowed deviation when comparing guest-reported disk size to the declared size.
pub const DISK_TOLERANCE_PCT: f64 = 5.0;

/// Quantity parse errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuantityError {
    /// Empty input.
    #[error("empty quantity")]
    Empty,

    /// Numeric part is not a non-negative number.
    #[error("invalid number in quantity '{0}'")]
    InvalidNumber(String),

    /// Suffix is not a recognized unit.
    #[error("unknown unit suffix in quantity '{0}'")]
    UnknownSuffix(String),

    /// Result does not fit in 64 bits.
    #[error("quantity '{0}' overflows")]
    Overflow(String),
}

fn multiplier(suffix: &str) -> Option<u64> {
    const KI: u64 = 1024;
    Some(match suffix {
        "" => 1,
        "Ki" => KI,
        "Mi" => KI.pow(2),
        "Gi" => KI.pow(3),
        "Ti" => KI.pow(4),
        "Pi" => KI.pow(5),
        "Ei" => KI.pow(6),
        "k" | "K" => 1_000,
        "M" => 1_000_000,
        "G" => 1_000_000_000,
        "T" => 1_000_000_000_000,
        "P" => 1_000_000_000_000_000,
        "E" => 1_000_000_000_000_000_000,
        _ => return None,
    })
}

/// Parse a quantity string into bytes (or plain units for unsuffixed values).
pub fn parse_quantity(input: &str) -> Result<u64, QuantityError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(QuantityError::Empty);
    }

    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, suffix) = s.split_at(split);

    let mult = multiplier(suffix).ok_or_else(|| QuantityError::UnknownSuffix(s.to_string()))?;

    if number.is_empty() || number.matches('.').count() > 1 {
        return Err(QuantityError::InvalidNumber(s.to_string()));
    }

    if let Ok(whole) = number.parse::<u64>() {
        return whole
            .checked_mul(mult)
            .ok_or_else(|| QuantityError::Overflow(s.to_string()));
    }

    let value: f64 = number
        .parse()
        .map_err(|_| QuantityError::InvalidNumber(s.to_string()))?;
    let bytes = (value * mult as f64).round();
    if bytes >= u64::MAX as f64 {
        return Err(QuantityError::Overflow(s.to_string()));
    }
    Ok(bytes as u64)
}

/// True if `observed` is within `tolerance_pct` percent of `expected`.
pub fn within_tolerance(observed: u64, expected: u64, tolerance_pct: f64) -> bool {
    let expected = expected as f64;
    let band = expected * tolerance_pct / 100.0;
    let observed = observed as f64;
    observed >= expected - band && observed <= expected + band
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_suffixes() {
        assert_eq!(parse_quantity("64Gi").unwrap(), 64 * 1024 * 1024 * 1024);
        assert_eq!(parse_quantity("512Mi").unwrap(), 512 * 1024 * 1024);
        assert_eq!(parse_quantity("1Ti").unwrap(), 1024u64.pow(4));
    }

    #[test]
    fn decimal_suffixes_and_plain() {
        assert_eq!(parse_quantity("10G").unwrap(), 10_000_000_000);
        assert_eq!(parse_quantity("500M").unwrap(), 500_000_000);
        assert_eq!(parse_quantity("2k").unwrap(), 2_000);
        assert_eq!(parse_quantity("4096").unwrap(), 4096);
    }

    #[test]
    fn fractional_values() {
        assert_eq!(parse_quantity("1.5Gi").unwrap(), 1536 * 1024 * 1024);
        assert_eq!(parse_quantity(" 0.5Ki ").unwrap(), 512);
    }

    #[test]
    fn malformed_inputs() {
        assert_eq!(parse_quantity(""), Err(QuantityError::Empty));
        assert!(matches!(parse_quantity("Gi"), Err(QuantityError::InvalidNumber(_))));
        assert!(matches!(parse_quantity("64GB"), Err(QuantityError::UnknownSuffix(_))));
        assert!(matches!(parse_quantity("1.2.3Gi"), Err(QuantityError::InvalidNumber(_))));
        assert!(matches!(parse_quantity("-4Gi"), Err(QuantityError::UnknownSuffix(_))));
        assert!(matches!(parse_quantity("99999999Ei"), Err(QuantityError::Overflow(_))));
    }

    #[test]
    fn memory_band() {
        let declared = parse_quantity("8Gi").unwrap();
        // Guest sees ~7.7GiB after firmware/kernel reservations.
        let observed = declared * 96 / 100;
        assert!(within_tolerance(observed, declared, MEMORY_TOLERANCE_PCT));
        assert!(!within_tolerance(declared / 2, declared, MEMORY_TOLERANCE_PCT));
    }

    #[test]
    fn disk_band_is_tighter() {
        let declared = parse_quantity("100Gi").unwrap();
        let observed = declared * 90 / 100;
        assert!(within_tolerance(observed, declared, MEMORY_TOLERANCE_PCT));
        assert!(!within_tolerance(observed, declared, DISK_TOLERANCE_PCT));
        assert!(within_tolerance(declared, declared, DISK_TOLERANCE_PCT));
    }
}
