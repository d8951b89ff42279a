// ABOUTME: Decodes PostgreSQL binary NUMERIC values into exact decimal text
// ABOUTME: Keeps full precision so dumped numbers replay without rounding

use std::error::Error;
use std::fmt::Write;

const SIGN_POSITIVE: u16 = 0x0000;
const SIGN_NEGATIVE: u16 = 0x4000;
const SIGN_NAN: u16 = 0xC000;
const SIGN_POSITIVE_INFINITY: u16 = 0xD000;
const SIGN_NEGATIVE_INFINITY: u16 = 0xF000;

/// Render a binary-format NUMERIC as the text Postgres itself would print.
///
/// The wire layout is four big-endian `u16` header words (digit count, weight,
/// sign, display scale) followed by base-10000 digits, most significant first.
/// The first digit is worth `10000^weight`.
///
/// # Examples
///
/// ```
/// # use pg_user_dump::dump::numeric::numeric_to_string;
/// // 12345.678 = [1, 2345, 6780] with weight 1 and display scale 3
/// let raw = [0, 3, 0, 1, 0, 0, 0, 3, 0, 1, 0x09, 0x29, 0x1A, 0x7C];
/// assert_eq!(numeric_to_string(&raw).unwrap(), "12345.678");
/// ```
pub fn numeric_to_string(raw: &[u8]) -> Result<String, Box<dyn Error + Sync + Send>> {
    if raw.len() < 8 {
        return Err(format!("invalid numeric: expected 8 header bytes, got {}", raw.len()).into());
    }

    let word = |offset: usize| u16::from_be_bytes([raw[offset], raw[offset + 1]]);
    let ndigits = word(0) as usize;
    let weight = word(2) as i16 as i32;
    let sign = word(4);
    let dscale = word(6) as usize;

    match sign {
        SIGN_NAN => return Ok("NaN".to_string()),
        SIGN_POSITIVE_INFINITY => return Ok("Infinity".to_string()),
        SIGN_NEGATIVE_INFINITY => return Ok("-Infinity".to_string()),
        SIGN_POSITIVE | SIGN_NEGATIVE => {}
        other => return Err(format!("invalid numeric sign word 0x{:04X}", other).into()),
    }

    if raw.len() != 8 + ndigits * 2 {
        return Err(format!(
            "invalid numeric: {} digits declared but {} bytes follow the header",
            ndigits,
            raw.len() - 8
        )
        .into());
    }

    let digits: Vec<u16> = (0..ndigits).map(|i| word(8 + i * 2)).collect();
    if let Some(bad) = digits.iter().find(|d| **d > 9999) {
        return Err(format!("invalid numeric digit {}", bad).into());
    }
    let digit_at = |index: i32| -> u16 {
        usize::try_from(index)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == SIGN_NEGATIVE {
        out.push('-');
    }

    if weight < 0 {
        out.push('0');
    } else {
        for index in 0..=weight {
            let digit = digit_at(index);
            // Writing to a String cannot fail.
            let _ = if index == 0 {
                write!(out, "{}", digit)
            } else {
                write!(out, "{:04}", digit)
            };
        }
    }

    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut index = weight + 1;
        while fraction.len() < dscale {
            let _ = write!(fraction, "{:04}", digit_at(index));
            index += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(weight: i16, sign: u16, dscale: u16, digits: &[u16]) -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&(digits.len() as u16).to_be_bytes());
        raw.extend_from_slice(&weight.to_be_bytes());
        raw.extend_from_slice(&sign.to_be_bytes());
        raw.extend_from_slice(&dscale.to_be_bytes());
        for d in digits {
            raw.extend_from_slice(&d.to_be_bytes());
        }
        raw
    }

    #[test]
    fn test_integer_values() {
        assert_eq!(numeric_to_string(&encode(0, SIGN_POSITIVE, 0, &[])).unwrap(), "0");
        assert_eq!(numeric_to_string(&encode(0, SIGN_POSITIVE, 0, &[42])).unwrap(), "42");
        assert_eq!(
            numeric_to_string(&encode(2, SIGN_POSITIVE, 0, &[1])).unwrap(),
            "100000000"
        );
        assert_eq!(
            numeric_to_string(&encode(1, SIGN_NEGATIVE, 0, &[12, 34])).unwrap(),
            "-120034"
        );
    }

    #[test]
    fn test_fractional_values() {
        assert_eq!(
            numeric_to_string(&encode(1, SIGN_POSITIVE, 3, &[1, 2345, 6780])).unwrap(),
            "12345.678"
        );
        assert_eq!(
            numeric_to_string(&encode(-1, SIGN_NEGATIVE, 1, &[5000])).unwrap(),
            "-0.5"
        );
        assert_eq!(
            numeric_to_string(&encode(-2, SIGN_POSITIVE, 8, &[1])).unwrap(),
            "0.00000001"
        );
    }

    #[test]
    fn test_display_scale_pads_trailing_zeros() {
        assert_eq!(numeric_to_string(&encode(0, SIGN_POSITIVE, 2, &[])).unwrap(), "0.00");
        assert_eq!(
            numeric_to_string(&encode(0, SIGN_POSITIVE, 6, &[19, 9900])).unwrap(),
            "19.990000"
        );
    }

    #[test]
    fn test_special_values() {
        assert_eq!(numeric_to_string(&encode(0, SIGN_NAN, 0, &[])).unwrap(), "NaN");
        assert_eq!(
            numeric_to_string(&encode(0, SIGN_POSITIVE_INFINITY, 0, &[])).unwrap(),
            "Infinity"
        );
        assert_eq!(
            numeric_to_string(&encode(0, SIGN_NEGATIVE_INFINITY, 0, &[])).unwrap(),
            "-Infinity"
        );
    }

    #[test]
    fn test_malformed_input_is_rejected() {
        assert!(numeric_to_string(&[0, 1]).is_err());
        // Declares two digits but carries one
        let mut raw = encode(0, SIGN_POSITIVE, 0, &[1]);
        raw[1] = 2;
        assert!(numeric_to_string(&raw).is_err());
        assert!(numeric_to_string(&encode(0, 0x1234, 0, &[1])).is_err());
        assert!(numeric_to_string(&encode(0, SIGN_POSITIVE, 0, &[10000])).is_err());
    }
}
