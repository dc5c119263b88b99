use primitive_types::U256;

use crate::error::MinerError;

const DECIMALS: usize = 18;

fn wei_per_ether() -> U256 {
    U256::exp10(DECIMALS)
}

/// Render wei as ether, e.g. `500000000000000` -> `"0.0005"`, `10^18` -> `"1.0"`.
pub fn format_ether(wei: U256) -> String {
    let (whole, frac) = wei.div_mod(wei_per_ether());
    let frac = format!("{:0>width$}", frac.to_string(), width = DECIMALS);
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        format!("{whole}.0")
    } else {
        format!("{whole}.{frac}")
    }
}

/// Parse a decimal ether amount into wei. At most 18 fractional digits.
pub fn parse_ether(text: &str) -> Result<U256, MinerError> {
    let text = text.trim();
    let invalid = || MinerError::InvalidInput(format!("invalid ether amount {text:?}"));

    let (whole, frac) = match text.split_once('.') {
        Some((w, f)) => (w, f),
        None => (text, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    if frac.len() > DECIMALS {
        return Err(MinerError::InvalidInput(format!(
            "too many decimals in {text:?} (max {DECIMALS})"
        )));
    }

    let whole = if whole.is_empty() {
        U256::zero()
    } else {
        U256::from_dec_str(whole).map_err(|_| invalid())?
    };
    let frac = if frac.is_empty() {
        U256::zero()
    } else {
        let padded = format!("{frac:0<width$}", width = DECIMALS);
        U256::from_dec_str(&padded).map_err(|_| invalid())?
    };

    whole
        .checked_mul(wei_per_ether())
        .and_then(|w| w.checked_add(frac))
        .ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_like_ethers() {
        assert_eq!(format_ether(U256::zero()), "0.0");
        assert_eq!(format_ether(U256::exp10(18)), "1.0");
        assert_eq!(format_ether(U256::from(500_000_000_000_000u64)), "0.0005");
        assert_eq!(format_ether(U256::from(1_500_000_000_000_000_000u128)), "1.5");
        assert_eq!(format_ether(U256::one()), "0.000000000000000001");
    }

    #[test]
    fn parses_decimal_ether() {
        assert_eq!(parse_ether("0.0005").unwrap(), U256::from(500_000_000_000_000u64));
        assert_eq!(parse_ether("2").unwrap(), U256::exp10(18) * U256::from(2u64));
        assert_eq!(parse_ether(".5").unwrap(), U256::exp10(17) * U256::from(5u64));
        assert_eq!(parse_ether("1.").unwrap(), U256::exp10(18));
    }

    #[test]
    fn rejects_bad_amounts() {
        for bad in ["", ".", "abc", "-1", "1.2.3", "0.0000000000000000001"] {
            assert!(parse_ether(bad).is_err(), "{bad:?} should fail");
        }
    }
}
