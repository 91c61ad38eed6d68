use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

pub fn format_usd(value: f64) -> String {
    const UNITS: [&str; 4] = ["", "K", "M", "B"];

    let sign = if value < 0.0 { "-" } else { "" };
    let mut magnitude = value.abs();
    let mut unit = 0usize;
    while magnitude >= 1000.0 && unit < UNITS.len() - 1 {
        magnitude /= 1000.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{sign}${magnitude:.2}")
    } else {
        format!("{sign}${magnitude:.2}{}", UNITS[unit])
    }
}

pub fn short_address(id: &str) -> String {
    let chars = id.chars().count();
    if chars <= 12 {
        return id.to_owned();
    }

    let head = id.chars().take(6).collect::<String>();
    let tail = id.chars().skip(chars - 4).collect::<String>();
    format!("{head}…{tail}")
}

pub fn same_address(a: &str, b: &str) -> bool {
    !a.is_empty() && a.eq_ignore_ascii_case(b)
}

/// Canonical lookup key for an address; hex checksums differ only in case.
pub fn address_key(id: &str) -> String {
    id.trim().to_ascii_lowercase()
}

pub fn stable_pair(id: &str) -> (f32, f32) {
    let mut hasher = DefaultHasher::new();
    id.hash(&mut hasher);
    let hash = hasher.finish();

    let x = ((hash & 0xffff_ffff) as f64 / u32::MAX as f64) as f32;
    let y = (((hash >> 32) & 0xffff_ffff) as f64 / u32::MAX as f64) as f32;
    ((x * 2.0) - 1.0, (y * 2.0) - 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usd_formatting_scales_units() {
        assert_eq!(format_usd(12.5), "$12.50");
        assert_eq!(format_usd(-1_500.0), "-$1.50K");
        assert_eq!(format_usd(2_000_000.0), "$2.00M");
    }

    #[test]
    fn short_address_keeps_short_ids() {
        assert_eq!(short_address("0xabc"), "0xabc");
        assert_eq!(
            short_address("0x1234567890abcdef1234"),
            "0x1234…1234"
        );
    }

    #[test]
    fn address_comparison_ignores_case() {
        assert!(same_address("0xAbC", "0xabc"));
        assert!(!same_address("", ""));
        assert!(!same_address("0xabc", "0xabd"));
        assert_eq!(address_key(" 0xAbC "), "0xabc");
    }

    #[test]
    fn stable_pair_is_deterministic_and_bounded() {
        let first = stable_pair("0xfeed");
        assert_eq!(first, stable_pair("0xfeed"));
        assert!((-1.0..=1.0).contains(&first.0));
        assert!((-1.0..=1.0).contains(&first.1));
    }
}
