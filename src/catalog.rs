//! Class catalog: the fixed label set a detector can emit.
//!
//! The catalog is built once at startup and shared (`Arc<ClassCatalog>`) with every
//! component that needs names, colors or icons. Nothing in the crate keeps a global
//! class table.

use anyhow::{anyhow, Result};
use image::Rgb;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Color used for classes the catalog does not know.
pub const FALLBACK_COLOR: Color = Color::new(0xFF, 0xFF, 0xFF);
/// Icon used for classes the catalog does not know.
pub const FALLBACK_ICON: &str = "❓";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#RRGGBB` (leading `#` optional).
    pub fn parse_hex(value: &str) -> Result<Self> {
        let hex = value.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(anyhow!("invalid color '{}': expected #RRGGBB", value));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_err(|e| anyhow!("invalid color: {}", e))
        };
        Ok(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }

    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl From<Color> for Rgb<u8> {
    fn from(color: Color) -> Self {
        Rgb([color.r, color.g, color.b])
    }
}

/// One catalog entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassEntry {
    pub id: u32,
    pub name: String,
    /// Display color as `#RRGGBB`.
    pub color: String,
    pub icon: String,
}

#[derive(Clone, Debug)]
struct ResolvedEntry {
    id: u32,
    name: String,
    color: Color,
    icon: String,
}

/// Immutable mapping of class id to display name, color and icon.
#[derive(Clone, Debug)]
pub struct ClassCatalog {
    entries: Vec<ResolvedEntry>,
}

impl ClassCatalog {
    /// Build a catalog, rejecting duplicate ids or names and malformed colors.
    pub fn from_entries(entries: Vec<ClassEntry>) -> Result<Self> {
        if entries.is_empty() {
            return Err(anyhow!("class catalog must contain at least one class"));
        }
        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        let mut resolved = Vec::with_capacity(entries.len());
        for entry in entries {
            let name = entry.name.trim().to_string();
            if name.is_empty() {
                return Err(anyhow!("class {} has an empty name", entry.id));
            }
            if !ids.insert(entry.id) {
                return Err(anyhow!("duplicate class id {}", entry.id));
            }
            if !names.insert(name.clone()) {
                return Err(anyhow!("duplicate class name '{}'", name));
            }
            resolved.push(ResolvedEntry {
                id: entry.id,
                color: Color::parse_hex(&entry.color)?,
                icon: entry.icon,
                name,
            });
        }
        resolved.sort_by_key(|entry| entry.id);
        Ok(Self { entries: resolved })
    }

    /// Default aerial label set: aircraft, bird, drone, helicopter.
    pub fn aerial() -> Self {
        let entry = |id: u32, name: &str, color: Color, icon: &str| ResolvedEntry {
            id,
            name: name.to_string(),
            color,
            icon: icon.to_string(),
        };
        Self {
            entries: vec![
                entry(0, "Aircraft", Color::new(0xFF, 0x6B, 0x6B), "✈️"),
                entry(1, "Bird", Color::new(0x4E, 0xCD, 0xC4), "🐦"),
                entry(2, "Drone", Color::new(0x45, 0xB7, 0xD1), "🛸"),
                entry(3, "Helicopter", Color::new(0x96, 0xCE, 0xB4), "🚁"),
            ],
        }
    }

    /// Display label for a class id. Unmapped ids render as `Class_<id>`.
    pub fn label_for(&self, class_id: u32) -> String {
        self.entries
            .iter()
            .find(|entry| entry.id == class_id)
            .map(|entry| entry.name.clone())
            .unwrap_or_else(|| format!("Class_{}", class_id))
    }

    pub fn contains(&self, class_name: &str) -> bool {
        self.entries.iter().any(|entry| entry.name == class_name)
    }

    pub fn color_for(&self, class_name: &str) -> Color {
        self.entries
            .iter()
            .find(|entry| entry.name == class_name)
            .map(|entry| entry.color)
            .unwrap_or(FALLBACK_COLOR)
    }

    pub fn icon_for(&self, class_name: &str) -> &str {
        self.entries
            .iter()
            .find(|entry| entry.name == class_name)
            .map(|entry| entry.icon.as_str())
            .unwrap_or(FALLBACK_ICON)
    }

    /// Class names in id order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> Vec<ClassEntry> {
        self.entries
            .iter()
            .map(|entry| ClassEntry {
                id: entry.id,
                name: entry.name.clone(),
                color: entry.color.to_hex(),
                icon: entry.icon.clone(),
            })
            .collect()
    }
}

impl Default for ClassCatalog {
    fn default() -> Self {
        Self::aerial()
    }
}
