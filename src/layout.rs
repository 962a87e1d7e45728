// 📄 Positioned Element Model - what the layout extractor hands us
//
// Coordinates follow the source PDF: origin bottom-left, y grows upwards.
// A higher y0 means "closer to the top of the page".

use serde::{Deserialize, Serialize};

// ============================================================================
// BOUNDING BOX
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl BBox {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        BBox { x0, y0, x1, y1 }
    }

    /// True when `other` lies horizontally inside this box.
    pub fn spans(&self, other: &BBox) -> bool {
        other.x0 >= self.x0 && other.x1 <= self.x1
    }

    pub fn union(&self, other: &BBox) -> BBox {
        BBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }
}

// ============================================================================
// FRAGMENT
// ============================================================================

/// One piece of positioned text. Immutable once extracted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    pub text: String,
    pub bbox: BBox,
}

impl Fragment {
    pub fn new(text: impl Into<String>, bbox: BBox) -> Self {
        Fragment {
            text: text.into(),
            bbox,
        }
    }

    pub fn x0(&self) -> f64 {
        self.bbox.x0
    }

    pub fn x1(&self) -> f64 {
        self.bbox.x1
    }

    pub fn y0(&self) -> f64 {
        self.bbox.y0
    }
}

// ============================================================================
// GROUPINGS
// ============================================================================

/// One row of an extracted table.
///
/// `cells` are the text groups the extractor found on the row; `values` are
/// the cells it recognised as numeric value columns (kept apart because some
/// layouts address "the first value" of a row rather than a column).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableRow {
    pub bbox: BBox,
    #[serde(default)]
    pub cells: Vec<Fragment>,
    #[serde(default)]
    pub values: Vec<Fragment>,
}

impl TableRow {
    /// Label of the row (its first cell), if any.
    pub fn label(&self) -> Option<&str> {
        self.cells.first().map(|c| c.text.as_str())
    }

    /// Cells followed by values, in extraction order.
    pub fn fragments(&self) -> impl Iterator<Item = &Fragment> {
        self.cells.iter().chain(self.values.iter())
    }

    pub fn text(&self) -> String {
        self.fragments()
            .map(|f| f.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Table {
    pub bbox: BBox,
    pub rows: Vec<TableRow>,
}

impl Table {
    pub fn fragments(&self) -> impl Iterator<Item = &Fragment> {
        self.rows.iter().flat_map(|r| r.fragments())
    }
}

/// Consecutive text lines the extractor grouped as one paragraph.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Paragraph {
    pub bbox: BBox,
    pub lines: Vec<Fragment>,
}

impl Paragraph {
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Element {
    Text(Fragment),
    Table(Table),
    Paragraph(Paragraph),
}

impl Element {
    pub fn bbox(&self) -> BBox {
        match self {
            Element::Text(f) => f.bbox,
            Element::Table(t) => t.bbox,
            Element::Paragraph(p) => p.bbox,
        }
    }

    pub fn text(&self) -> String {
        match self {
            Element::Text(f) => f.text.clone(),
            Element::Table(t) => t
                .rows
                .iter()
                .map(|r| r.text())
                .collect::<Vec<_>>()
                .join("\n"),
            Element::Paragraph(p) => p.text(),
        }
    }

    /// The fragment when this element is a bare text element.
    pub fn as_text(&self) -> Option<&Fragment> {
        match self {
            Element::Text(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Element::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_paragraph(&self) -> Option<&Paragraph> {
        match self {
            Element::Paragraph(p) => Some(p),
            _ => None,
        }
    }
}

// ============================================================================
// PAGE / DOCUMENT
// ============================================================================

/// One page: the element stream in extraction order, plus the paragraph
/// view of the same page (paragraphs and tables, in reading order).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub elements: Vec<Element>,
    #[serde(default)]
    pub paragraphs: Vec<Element>,
}

impl Page {
    pub fn element_text(&self, index: usize) -> Option<String> {
        self.elements.get(index).map(Element::text)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Document {
    /// Identifier used in diagnostics and stored as the statement file name.
    #[serde(default)]
    pub name: String,
    pub pages: Vec<Page>,
}

impl Document {
    pub fn first_page(&self) -> Option<&Page> {
        self.pages.first()
    }

    pub fn last_page(&self) -> Option<&Page> {
        self.pages.last()
    }
}
