//! Governance hook vote parameters and the XFL float codec.
//!
//! Votes are cast by attaching three `HookParameters` to an `Invoke`
//! transaction: layer (`4C`), topic (`54`) and vote data (`56`). Numeric
//! vote data is encoded as an XFL, the hook ABI's 64-bit decimal float:
//!
//! ```text
//!  bit 63   bit 62   bits 61..54          bits 53..0
//!  [ 0 ]  [ sign ]  [ exponent + 97 ]  [ mantissa in 10^15..10^16 ]
//! ```

use serde_json::{json, Value};

/// `L`: governance table layer.
pub const PARAM_LAYER: &str = "4C";
/// `T`: topic type.
pub const PARAM_TOPIC: &str = "54";
/// `V`: vote data.
pub const PARAM_VALUE: &str = "56";

/// `RD`: reward delay topic.
pub const TOPIC_REWARD_DELAY: &str = "5244";
/// `RR`: reward rate topic.
pub const TOPIC_REWARD_RATE: &str = "5252";

/// Erase value for a hook vote (32 zero bytes).
pub const ERASED_HOOK: &str = "0000000000000000000000000000000000000000000000000000000000000000";
/// Vacate value for a seat vote (20 zero bytes).
pub const VACATED_SEAT: &str = "0000000000000000000000000000000000000000";

const MIN_MANTISSA: u64 = 1_000_000_000_000_000;
const MAX_MANTISSA: u64 = 9_999_999_999_999_999;
const MIN_EXPONENT: i32 = -96;
const MAX_EXPONENT: i32 = 80;
const EXPONENT_BIAS: i32 = 97;
const SIGNIFICANT_DIGITS: usize = 16;

/// One `HookParameter` entry.
pub fn hook_parameter(name: &str, value: &str) -> Value {
    json!({
        "HookParameter": {
            "HookParameterName": name,
            "HookParameterValue": value,
        }
    })
}

/// Full parameter list for a vote.
pub fn vote_parameters(layer: u8, topic: &str, value: &str) -> Value {
    Value::Array(vec![
        hook_parameter(PARAM_LAYER, &format!("{:02X}", layer)),
        hook_parameter(PARAM_TOPIC, topic),
        hook_parameter(PARAM_VALUE, value),
    ])
}

/// Topic for a hook vote at `place` (0-9).
pub fn hook_topic(place: u8) -> String {
    format!("48{:02X}", place)
}

/// Topic for a seat vote; seats are numbered 0-19.
pub fn seat_topic(seat: u8) -> String {
    format!("53{:02X}", seat)
}

/// Encode a decimal string as an XFL.
///
/// Accepts an optional sign, a fractional part and an `e` exponent. Digits
/// beyond the 16th significant one are truncated. Values too small to
/// represent collapse to zero; values too large return `None`.
pub fn to_xfl(input: &str) -> Option<u64> {
    let input = input.trim();
    let (negative, rest) = match input.as_bytes().first()? {
        b'-' => (true, &input[1..]),
        b'+' => (false, &input[1..]),
        _ => (false, input),
    };

    let (number, exp_part) = match rest.find(['e', 'E']) {
        Some(idx) => (&rest[..idx], Some(&rest[idx + 1..])),
        None => (rest, None),
    };
    let mut exponent: i32 = match exp_part {
        Some(e) => e.parse().ok()?,
        None => 0,
    };

    let (int_part, frac_part) = match number.split_once('.') {
        Some((i, f)) => (i, f),
        None => (number, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }

    exponent = exponent.checked_sub(i32::try_from(frac_part.len()).ok()?)?;
    let digits = format!("{}{}", int_part, frac_part);
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Some(0);
    }

    let (kept, dropped) = if digits.len() > SIGNIFICANT_DIGITS {
        digits.split_at(SIGNIFICANT_DIGITS)
    } else {
        (digits, "")
    };
    exponent = exponent.checked_add(i32::try_from(dropped.len()).ok()?)?;
    let mut mantissa: u64 = kept.parse().ok()?;

    while mantissa < MIN_MANTISSA {
        mantissa *= 10;
        exponent = exponent.checked_sub(1)?;
    }
    debug_assert!(mantissa <= MAX_MANTISSA);

    if exponent < MIN_EXPONENT {
        return Some(0);
    }
    if exponent > MAX_EXPONENT {
        return None;
    }

    let biased = u64::try_from(exponent + EXPONENT_BIAS).ok()?;
    let sign = if negative { 0 } else { 1u64 << 62 };
    Some(sign | (biased << 54) | mantissa)
}

/// XFL as 16 uppercase hex characters, the form hooks expect.
pub fn to_xfl_hex(input: &str) -> Option<String> {
    to_xfl(input).map(|xfl| format!("{:016X}", xfl))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xfl_known_values() {
        assert_eq!(to_xfl_hex("1").as_deref(), Some("54838D7EA4C68000"));
        assert_eq!(to_xfl_hex("0.5").as_deref(), Some("5451C37937E08000"));
        assert_eq!(to_xfl_hex("2600000").as_deref(), Some("56093CAFAC6A8000"));
        assert_eq!(
            to_xfl_hex("0.00333333333333333").as_deref(),
            Some("53CBD7A625405552")
        );
    }

    #[test]
    fn test_xfl_equivalent_spellings() {
        assert_eq!(to_xfl("1"), to_xfl("1.000"));
        assert_eq!(to_xfl("1"), to_xfl("0.1e1"));
        assert_eq!(to_xfl("0.5"), to_xfl(".5"));
        assert_eq!(to_xfl("2600000"), to_xfl("2.6e6"));
    }

    #[test]
    fn test_xfl_zero_and_sign() {
        assert_eq!(to_xfl_hex("0").as_deref(), Some("0000000000000000"));
        assert_eq!(to_xfl_hex("0.000").as_deref(), Some("0000000000000000"));
        let negative = to_xfl("-1").unwrap();
        assert_eq!(negative & (1 << 62), 0);
        assert_eq!(negative | (1 << 62), to_xfl("1").unwrap());
    }

    #[test]
    fn test_xfl_rejects_garbage_and_overflow() {
        assert_eq!(to_xfl(""), None);
        assert_eq!(to_xfl("abc"), None);
        assert_eq!(to_xfl("1.2.3"), None);
        assert_eq!(to_xfl("."), None);
        assert_eq!(to_xfl("1e200"), None);
        assert_eq!(to_xfl("1e-200"), Some(0));
    }

    #[test]
    fn test_vote_parameters() {
        let params = vote_parameters(1, TOPIC_REWARD_RATE, "54838D7EA4C68000");
        assert_eq!(params[0]["HookParameter"]["HookParameterName"], "4C");
        assert_eq!(params[0]["HookParameter"]["HookParameterValue"], "01");
        assert_eq!(params[1]["HookParameter"]["HookParameterValue"], "5252");
        assert_eq!(params[2]["HookParameter"]["HookParameterName"], "56");
    }

    #[test]
    fn test_topics() {
        assert_eq!(hook_topic(2), "4802");
        assert_eq!(seat_topic(19), "5313");
        assert_eq!(seat_topic(10), "530A");
    }
}
