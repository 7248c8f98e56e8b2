//! Structured note document
//!
//! The converter builds this from ENML and the renderer walks it to emit
//! XWiki markup. Blocks hold inlines; lists, tables and quotes nest blocks.

use serde::Serialize;

/// Inline styles that wrap a run of inlines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    Bold,
    Italic,
    Underline,
    Strikethrough,
    Superscript,
    Subscript,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Inline {
    Text(String),
    Styled {
        style: Style,
        children: Vec<Inline>,
    },
    Link {
        url: String,
        children: Vec<Inline>,
    },
    /// Image; `source` is an attachment filename or an external URL
    Image {
        source: String,
    },
    /// Non-image attachment link
    Attachment {
        filename: String,
    },
    /// `en-media` whose hash matched nothing
    MissingAttachment {
        hash: String,
    },
    Todo {
        checked: bool,
    },
    LineBreak,
    Code(String),
}

impl Inline {
    /// True for inlines that render to nothing but whitespace
    pub fn is_blank(&self) -> bool {
        match self {
            Inline::Text(text) => text.trim().is_empty(),
            Inline::LineBreak => true,
            Inline::Styled { children, .. } => children.iter().all(Inline::is_blank),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListItem {
    pub content: Vec<Inline>,
    /// Nested lists (or other blocks) inside the item
    pub children: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableCell {
    pub header: bool,
    pub content: Vec<Inline>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Block {
    Heading {
        level: u8,
        content: Vec<Inline>,
    },
    Paragraph(Vec<Inline>),
    List {
        ordered: bool,
        items: Vec<ListItem>,
    },
    Table(Vec<Vec<TableCell>>),
    Quote(Vec<Block>),
    /// Preformatted text, kept verbatim
    Code(String),
    Rule,
    /// `en-crypt` section that can't be converted
    Encrypted,
}

/// A converted note body
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Document {
    pub blocks: Vec<Block>,
}

impl Document {
    pub fn new(blocks: Vec<Block>) -> Self {
        Self { blocks }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
