use std::str::FromStr;

use google_gmail1::api::LabelColor;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

const WHITE: &str = "#ffffff";
const BLACK: &str = "#000000";

/// Colour names accepted when creating a label. Each maps onto a
/// (background, text) pair from Gmail's allowed label palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum PaletteColor {
    Red,
    Orange,
    Yellow,
    Green,
    Blue,
    Purple,
    Gray,
    Pink,
    Teal,
    Brown,
}

impl PaletteColor {
    /// Unknown names fall back to gray
    pub fn from_name(name: &str) -> Self {
        PaletteColor::from_str(name.trim()).unwrap_or(PaletteColor::Gray)
    }

    pub fn background(&self) -> &'static str {
        match self {
            PaletteColor::Red => "#fb4c2f",
            PaletteColor::Orange => "#f691b2",
            PaletteColor::Yellow => "#fad165",
            PaletteColor::Green => "#16a765",
            PaletteColor::Blue => "#4a86e8",
            PaletteColor::Purple => "#a479e2",
            PaletteColor::Gray => "#cca6ac",
            PaletteColor::Pink => "#ff7537",
            PaletteColor::Teal => "#42d692",
            PaletteColor::Brown => "#8d6e63",
        }
    }

    pub fn text(&self) -> &'static str {
        match self {
            PaletteColor::Yellow => BLACK,
            _ => WHITE,
        }
    }

    pub fn label_color(&self) -> LabelColor {
        LabelColor {
            background_color: Some(self.background().to_string()),
            text_color: Some(self.text().to_string()),
        }
    }

    pub fn names() -> Vec<String> {
        PaletteColor::iter().map(|c| c.to_string()).collect()
    }
}
