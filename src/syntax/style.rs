//! Style types for token coloring
//!
//! Themes resolve scopes to these; the palette and the encoded token
//! metadata are built from them.

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;

use crate::error::ThemeError;

/// A 24-bit color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    /// Create a color from its channels
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Format as `#RRGGBB`
    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl FromStr for Rgb {
    type Err = ThemeError;

    /// Parse `#RGB`, `#RGBA`, `#RRGGBB` or `#RRGGBBAA` (alpha is dropped)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ThemeError::InvalidColor(s.to_string());
        let hex = s.strip_prefix('#').ok_or_else(invalid)?;
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let channel = |digits: &str| u8::from_str_radix(digits, 16).map_err(|_| invalid());
        match hex.len() {
            3 | 4 => {
                let short = |i: usize| channel(&hex[i..i + 1]).map(|v| v * 17);
                Ok(Self::new(short(0)?, short(1)?, short(2)?))
            }
            6 | 8 => Ok(Self::new(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
            )),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

bitflags! {
    /// Font style flags, laid out as in the encoded token metadata
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FontStyle: u8 {
        const ITALIC = 1;
        const BOLD = 2;
        const UNDERLINE = 4;
        const STRIKETHROUGH = 8;
    }
}

impl FontStyle {
    pub const NONE: FontStyle = FontStyle::empty();

    /// Parse a theme `fontStyle` value such as `"bold italic"`
    pub fn parse(s: &str) -> Self {
        s.split_whitespace().fold(FontStyle::NONE, |acc, word| match word {
            "italic" => acc | FontStyle::ITALIC,
            "bold" => acc | FontStyle::BOLD,
            "underline" => acc | FontStyle::UNDERLINE,
            "strikethrough" => acc | FontStyle::STRIKETHROUGH,
            _ => acc,
        })
    }
}

impl Default for FontStyle {
    fn default() -> Self {
        FontStyle::NONE
    }
}

/// Resolved style for one scope stack, expressed as palette indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Style {
    /// Foreground palette index (0 = no color)
    pub fg: u32,
    /// Background palette index (0 = no color)
    pub bg: u32,
    pub font_style: FontStyle,
}

impl Style {
    /// Create a style with just a foreground index
    pub fn fg(index: u32) -> Self {
        Self {
            fg: index,
            ..Default::default()
        }
    }

    /// Builder: set background index
    pub fn with_bg(mut self, index: u32) -> Self {
        self.bg = index;
        self
    }

    /// Builder: add font style flags
    pub fn with_font_style(mut self, font_style: FontStyle) -> Self {
        self.font_style = self.font_style | font_style;
        self
    }

    /// Check if this is the default (no styling)
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_colors() {
        assert_eq!("#CE9178".parse::<Rgb>().unwrap(), Rgb::new(0xCE, 0x91, 0x78));
        assert_eq!("#ce9178ff".parse::<Rgb>().unwrap(), Rgb::new(0xCE, 0x91, 0x78));
        assert_eq!("#fff".parse::<Rgb>().unwrap(), Rgb::new(255, 255, 255));
        assert!("CE9178".parse::<Rgb>().is_err());
        assert!("#12345".parse::<Rgb>().is_err());
        assert!("#GG0000".parse::<Rgb>().is_err());
    }

    #[test]
    fn test_hex_is_uppercase() {
        assert_eq!(Rgb::new(0xab, 0x01, 0xff).to_hex(), "#AB01FF");
    }

    #[test]
    fn test_font_style_parse() {
        let style = FontStyle::parse("bold  italic");
        assert!(style.contains(FontStyle::BOLD));
        assert!(style.contains(FontStyle::ITALIC));
        assert!(!style.contains(FontStyle::UNDERLINE));
        assert!(FontStyle::parse("").is_empty());
        assert!(FontStyle::parse("wavy").is_empty());
    }

    #[test]
    fn test_font_style_bits() {
        let style = FontStyle::BOLD | FontStyle::STRIKETHROUGH;
        assert_eq!(style.bits(), 0b1010);
        assert_eq!(FontStyle::from_bits_truncate(0xFF), FontStyle::all());
        assert_eq!(FontStyle::default(), FontStyle::NONE);
    }

    #[test]
    fn test_style_builders() {
        let style = Style::fg(3).with_bg(2).with_font_style(FontStyle::UNDERLINE);
        assert_eq!(style.fg, 3);
        assert_eq!(style.bg, 2);
        assert!(style.font_style.contains(FontStyle::UNDERLINE));
        assert!(!style.is_default());
        assert!(Style::default().is_default());
    }
}
