//! Identifiers and colors for ring participants.
//!
//! Node and key ids are opaque strings chosen by the assignment service
//! (`node-0`, `key-17`, ...). They are wrapped in newtypes so the two can't
//! be mixed up.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Identifier of a node on the ring.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

/// Identifier of a key placed on the ring.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(pub String);

macro_rules! string_id {
    ($ty:ident) => {
        impl $ty {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(&self.0)
            }
        }

        impl From<&str> for $ty {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $ty {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl Borrow<str> for $ty {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(NodeId);
string_id!(KeyId);

/// An sRGB color.
///
/// Serialized as a `#rrggbb` string so renderers can hand it straight to
/// SVG or CSS.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Color used for anything that can't be attributed to a known node.
    pub const NEUTRAL: Color = Color::rgb(0x88, 0x88, 0x88);

    /// Node palette, indexed by node slot modulo its length.
    pub const PALETTE: [Color; 8] = [
        Color::rgb(0x42, 0x85, 0xf4), // blue
        Color::rgb(0xea, 0x43, 0x35), // red
        Color::rgb(0xfb, 0xbc, 0x04), // yellow
        Color::rgb(0x34, 0xa8, 0x53), // green
        Color::rgb(0xff, 0x6d, 0x01), // orange
        Color::rgb(0x93, 0x34, 0xe6), // purple
        Color::rgb(0xe9, 0x1e, 0x63), // pink
        Color::rgb(0x00, 0xac, 0xc1), // cyan
    ];

    /// Color for a node slot. `None` is an unassigned or dangling target.
    pub fn for_slot(slot: Option<usize>) -> Self {
        match slot {
            Some(idx) => Self::PALETTE[idx % Self::PALETTE.len()],
            None => Self::NEUTRAL,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl Serialize for Color {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
