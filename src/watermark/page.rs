//! Paginated documents in page units.
//!
//! A [`PageDocument`] is an ordered list of [`PageSurface`]s. Painting a page
//! appends a [`PageMark`] to its display list: the payload description, the
//! full affine matrix (`a b c d e f`, page units, top-left origin) and the
//! opacity. Writing that display list into a concrete page-description format
//! is left to whatever consumes the JSON.
//!
//! ```json
//! { "pages": [ { "width": 595.28, "height": 841.89, "marks": [] } ] }
//! ```

use super::descriptor::Payload;
use super::geometry::{Size, Transform};
use super::normalize::UnitSystem;
use super::surface::{PaintError, Surface};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Document has no pages")]
    Empty,
}

/// Standard page sizes in points.
pub mod sizes {
    use super::Size;

    pub const A4: Size = Size::new(595.28, 841.89);
    pub const LETTER: Size = Size::new(612.0, 792.0);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MarkContent {
    Image {
        width: u32,
        height: u32,
    },
    Text {
        text: String,
        font_size: f64,
        color: [u8; 4],
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageMark {
    pub content: MarkContent,
    pub matrix: [f64; 6],
    pub opacity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSurface {
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub marks: Vec<PageMark>,
}

impl PageSurface {
    pub fn new(size: Size) -> Self {
        Self {
            width: size.width,
            height: size.height,
            marks: Vec::new(),
        }
    }
}

impl Surface for PageSurface {
    fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    fn unit_system(&self) -> UnitSystem {
        UnitSystem::PageUnits
    }

    fn paint(
        &mut self,
        payload: &Payload,
        transform: &Transform,
        opacity: f64,
    ) -> Result<(), PaintError> {
        let affine = transform.to_affine(payload.intrinsic_size());
        if affine.invert().is_none() {
            return Err(PaintError::SingularTransform);
        }
        let content = match payload {
            Payload::Raster(img) => MarkContent::Image {
                width: img.width(),
                height: img.height(),
            },
            Payload::Text(mark) => MarkContent::Text {
                text: mark.display_text(),
                font_size: mark.font_size,
                color: mark.color,
            },
        };
        self.marks.push(PageMark {
            content,
            matrix: affine.to_array(),
            opacity,
        });
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageDocument {
    pub pages: Vec<PageSurface>,
}

impl PageDocument {
    /// `count` empty pages of the same size.
    pub fn blank(count: usize, size: Size) -> Self {
        Self {
            pages: (0..count).map(|_| PageSurface::new(size)).collect(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, DocumentError> {
        let doc: PageDocument = serde_json::from_str(json)?;
        if doc.pages.is_empty() {
            return Err(DocumentError::Empty);
        }
        Ok(doc)
    }

    pub fn to_json(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: &Path) -> Result<Self, DocumentError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), DocumentError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
