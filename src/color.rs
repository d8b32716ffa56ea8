use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

/// Grey used for anything that does not parse.
pub const FALLBACK_GREY: Rgb = Rgb::new(107, 114, 128);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_color(self, alpha: u8) -> tiny_skia::Color {
        tiny_skia::Color::from_rgba8(self.r, self.g, self.b, alpha)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Accepts `rgb(r, g, b)` and `#rrggbb`; anything else is [`FALLBACK_GREY`].
pub fn parse_color(value: &str) -> Rgb {
    let value = value.trim();
    if let Some(hex) = value.strip_prefix('#') {
        if hex.len() == 6 && hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
            let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
            if let (Some(r), Some(g), Some(b)) = (channel(0..2), channel(2..4), channel(4..6)) {
                return Rgb::new(r, g, b);
            }
        }
        return FALLBACK_GREY;
    }
    static RGB_RE: OnceLock<Regex> = OnceLock::new();
    let re = RGB_RE.get_or_init(|| {
        Regex::new(r"^rgba?\(\s*(\d{1,3})\s*,\s*(\d{1,3})\s*,\s*(\d{1,3})\s*(?:,\s*[\d.]+\s*)?\)$")
            .expect("rgb regex should compile")
    });
    let Some(captures) = re.captures(value) else {
        return FALLBACK_GREY;
    };
    let channel = |index: usize| {
        captures
            .get(index)
            .and_then(|m| m.as_str().parse::<u16>().ok())
            .map(|v| v.min(255) as u8)
    };
    match (channel(1), channel(2), channel(3)) {
        (Some(r), Some(g), Some(b)) => Rgb::new(r, g, b),
        _ => FALLBACK_GREY,
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_color, Rgb, FALLBACK_GREY};

    #[test]
    fn parses_both_notations() {
        assert_eq!(parse_color("rgb(140, 140, 145)"), Rgb::new(140, 140, 145));
        assert_eq!(parse_color("rgb(1,2,3)"), Rgb::new(1, 2, 3));
        assert_eq!(parse_color("#4b5563"), Rgb::new(0x4b, 0x55, 0x63));
        assert_eq!(parse_color("#9CA3AF").to_string(), "#9ca3af");
    }

    #[test]
    fn unknown_values_fall_back_to_grey() {
        for value in ["", "red", "#fff", "#gggggg", "hsl(1, 2%, 3%)", "rgb(1,2)"] {
            assert_eq!(parse_color(value), FALLBACK_GREY, "{value}");
        }
    }
}
