//! ENML to document conversion
//!
//! Walks the parsed ENML tree and builds a `Document`, resolving
//! `en-media` references against the note's attachments and turning
//! embedded or remote images into new attachments.

use std::collections::{HashMap, HashSet};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use tracing::{debug, warn};

use crate::document::{Block, Document, Inline, ListItem, Style, TableCell};
use crate::enml::{self, Element, Node};
use crate::error::ConversionError;
use crate::fetch::ImageFetcher;
use crate::models::{
    extension_for_mime, normalize_hash, sanitize_page_name, sanitize_space, Attachment,
    ConvertedPage, Note,
};
use crate::render;

/// Default root space for imported pages
pub const DEFAULT_TARGET_SPACE: &str = "ImportedNotes";

/// Options for turning a note into a page
#[derive(Clone, Copy)]
pub struct ConvertOptions<'a> {
    /// Root space; the note's notebook path is nested below it
    pub target_space: &'a str,
    /// Append the "Originally created" / "Source" footer
    pub include_metadata: bool,
    /// Downloads `http(s)` images; `None` keeps them as external references
    pub fetcher: Option<&'a dyn ImageFetcher>,
}

impl Default for ConvertOptions<'_> {
    fn default() -> Self {
        Self {
            target_space: DEFAULT_TARGET_SPACE,
            include_metadata: true,
            fetcher: None,
        }
    }
}

/// Builds a `Document` from ENML nodes.
///
/// Owns the page's attachment list while converting so that images found
/// in the body can be added with unique filenames.
pub struct Converter<'a> {
    attachments: Vec<Attachment>,
    by_hash: HashMap<String, usize>,
    used_names: HashSet<String>,
    fetcher: Option<&'a dyn ImageFetcher>,
    warnings: Vec<String>,
}

impl<'a> Converter<'a> {
    /// Take ownership of the note's attachments, renaming clashes
    pub fn new(attachments: Vec<Attachment>, fetcher: Option<&'a dyn ImageFetcher>) -> Self {
        let mut converter = Self {
            attachments: Vec::with_capacity(attachments.len()),
            by_hash: HashMap::new(),
            used_names: HashSet::new(),
            fetcher,
            warnings: Vec::new(),
        };
        for attachment in attachments {
            converter.add_attachment(attachment);
        }
        converter
    }

    /// Convert the children of `<en-note>` (or the whole fragment)
    pub fn convert(&mut self, nodes: &[Node]) -> Document {
        let body = enml::find_element(nodes, "en-note")
            .map(|el| el.children.as_slice())
            .unwrap_or(nodes);
        Document::new(self.blocks(body))
    }

    /// Final attachment list and warnings
    pub fn finish(self) -> (Vec<Attachment>, Vec<String>) {
        (self.attachments, self.warnings)
    }

    /// Add an attachment under a filename unique within the page.
    ///
    /// Returns the index of the stored attachment; an attachment whose hash
    /// is already present is not added twice.
    fn add_attachment(&mut self, mut attachment: Attachment) -> usize {
        let key = normalize_hash(&attachment.hash);
        if let Some(&index) = self.by_hash.get(&key) {
            if attachment.data == self.attachments[index].data {
                return index;
            }
        }

        attachment.filename = unique_filename(&attachment.filename, &self.used_names);
        self.used_names.insert(attachment.filename.to_lowercase());

        let index = self.attachments.len();
        self.by_hash.entry(key).or_insert(index);
        self.attachments.push(attachment);
        index
    }

    fn blocks(&mut self, nodes: &[Node]) -> Vec<Block> {
        let mut blocks = Vec::new();
        let mut pending = Vec::new();

        for node in nodes {
            match node {
                Node::Element(el) if is_block(el) => {
                    push_paragraph(&mut blocks, std::mem::take(&mut pending));
                    self.block_element(el, &mut blocks);
                }
                _ => self.inline_node(node, false, &mut pending),
            }
        }

        push_paragraph(&mut blocks, pending);
        blocks
    }

    fn block_element(&mut self, el: &Element, out: &mut Vec<Block>) {
        match el.name.as_str() {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = el.name[1..].parse().unwrap_or(1);
                let content = self.inlines(&el.children, false);
                let content = trim_inlines(replace_breaks(content));
                if !content.is_empty() {
                    out.push(Block::Heading { level, content });
                }
            }
            "ul" | "ol" => {
                let list = self.list(el);
                if let Block::List { items, .. } = &list {
                    if items.is_empty() {
                        return;
                    }
                }
                out.push(list);
            }
            "table" => {
                let rows = self.table(el);
                if !rows.is_empty() {
                    out.push(Block::Table(rows));
                }
            }
            "blockquote" => {
                let inner = self.blocks(&el.children);
                if !inner.is_empty() {
                    out.push(Block::Quote(inner));
                }
            }
            "pre" | "code" => out.push(Block::Code(code_text(el))),
            "hr" => out.push(Block::Rule),
            "en-crypt" => out.push(Block::Encrypted),
            // p, div, li/tr outside their parents, sectioning elements
            _ => out.extend(self.blocks(&el.children)),
        }
    }

    fn inlines(&mut self, nodes: &[Node], pre: bool) -> Vec<Inline> {
        let mut out = Vec::new();
        for node in nodes {
            self.inline_node(node, pre, &mut out);
        }
        out
    }

    fn inline_node(&mut self, node: &Node, pre: bool, out: &mut Vec<Inline>) {
        let el = match node {
            Node::Text(text) => {
                let text = if pre {
                    text.clone()
                } else {
                    collapse_whitespace(text)
                };
                push_text(out, &text);
                return;
            }
            Node::Element(el) => el,
        };

        match el.name.as_str() {
            "b" | "strong" => self.styled(el, &[Style::Bold], pre, out),
            "i" | "em" => self.styled(el, &[Style::Italic], pre, out),
            "u" => self.styled(el, &[Style::Underline], pre, out),
            "s" | "strike" | "del" => self.styled(el, &[Style::Strikethrough], pre, out),
            "sup" => self.styled(el, &[Style::Superscript], pre, out),
            "sub" => self.styled(el, &[Style::Subscript], pre, out),
            "span" => {
                let styles = span_styles(el.attr("style").unwrap_or(""));
                self.styled(el, &styles, pre, out);
            }
            "a" => {
                let children = self.inlines(&el.children, pre);
                match el.attr("href").map(str::trim).filter(|h| !h.is_empty()) {
                    Some(url) => out.push(Inline::Link {
                        url: url.to_string(),
                        children,
                    }),
                    None => out.extend(children),
                }
            }
            "br" => out.push(Inline::LineBreak),
            "en-todo" => out.push(Inline::Todo {
                checked: el
                    .attr("checked")
                    .map(|v| v.eq_ignore_ascii_case("true"))
                    .unwrap_or(false),
            }),
            "en-media" => {
                if let Some(inline) = self.media(el) {
                    out.push(inline);
                }
            }
            "img" => {
                if let Some(inline) = self.image(el) {
                    out.push(inline);
                }
            }
            "code" => {
                let text = el.text_content().replace('\n', " ");
                if !text.is_empty() {
                    out.push(Inline::Code(text));
                }
            }
            "en-crypt" => {
                self.warnings
                    .push("Encrypted content inside inline markup was dropped".to_string());
            }
            "table" => {
                // nested table: one line per row, cells separated by " | "
                let rows = self.table(el);
                if rows.is_empty() {
                    return;
                }
                push_break(out);
                for (r, row) in rows.into_iter().enumerate() {
                    if r > 0 {
                        out.push(Inline::LineBreak);
                    }
                    for (c, cell) in row.into_iter().enumerate() {
                        if c > 0 {
                            push_text(out, " | ");
                        }
                        for inline in cell.content {
                            match inline {
                                Inline::Text(text) => push_text(out, &text),
                                other => out.push(other),
                            }
                        }
                    }
                }
                push_break(out);
            }
            _ if is_block(el) => {
                // block markup in an inline context: give it lines of its own
                let inner = self.inlines(&el.children, pre || el.name == "pre");
                if !inner.is_empty() {
                    push_break(out);
                    out.extend(inner);
                    push_break(out);
                }
            }
            _ => {
                for child in &el.children {
                    self.inline_node(child, pre, out);
                }
            }
        }
    }

    /// Wrap the element's inlines in the given styles, outermost first.
    ///
    /// Line breaks at either edge stay outside the style markers.
    fn styled(&mut self, el: &Element, styles: &[Style], pre: bool, out: &mut Vec<Inline>) {
        let mut children = self.inlines(&el.children, pre);
        if children.is_empty() {
            return;
        }
        if styles.is_empty() || children.iter().all(Inline::is_blank) {
            out.extend(children);
            return;
        }

        let leading = children
            .iter()
            .take_while(|i| matches!(i, Inline::LineBreak))
            .count();
        let trailing = children
            .iter()
            .rev()
            .take_while(|i| matches!(i, Inline::LineBreak))
            .count();
        let after = children.split_off(children.len() - trailing);
        children.drain(..leading);

        if leading > 0 {
            push_break(out);
        }
        let wrapped = styles.iter().rev().fold(children, |inner, style| {
            vec![Inline::Styled {
                style: *style,
                children: inner,
            }]
        });
        out.extend(wrapped);
        if !after.is_empty() {
            push_break(out);
        }
    }

    fn media(&mut self, el: &Element) -> Option<Inline> {
        let hash = el.attr("hash").map(str::trim).filter(|h| !h.is_empty())?;

        match self.by_hash.get(&normalize_hash(hash)) {
            Some(&index) => {
                let attachment = &self.attachments[index];
                let filename = attachment.filename.clone();
                Some(if attachment.is_image() {
                    Inline::Image { source: filename }
                } else {
                    Inline::Attachment { filename }
                })
            }
            None => {
                warn!("No attachment for en-media hash {}", hash);
                self.warnings
                    .push(format!("Missing attachment for hash {}", hash));
                Some(Inline::MissingAttachment {
                    hash: hash.to_string(),
                })
            }
        }
    }

    fn image(&mut self, el: &Element) -> Option<Inline> {
        let src = el.attr("src").map(str::trim).unwrap_or("");

        if src.starts_with("data:") {
            return Some(match decode_data_uri(src) {
                Some(attachment) => {
                    let index = self.add_attachment(attachment);
                    Inline::Image {
                        source: self.attachments[index].filename.clone(),
                    }
                }
                None => {
                    let alt = el.attr("alt").filter(|a| !a.trim().is_empty());
                    self.warnings.push("Undecodable embedded image dropped".to_string());
                    Inline::Text(format!("[Image: {}]", alt.unwrap_or("embedded data")))
                }
            });
        }

        if src.starts_with("http://") || src.starts_with("https://") {
            if let Some(fetcher) = self.fetcher {
                match fetcher.fetch(src) {
                    Some(attachment) => {
                        debug!("Downloaded image {}", src);
                        let index = self.add_attachment(attachment);
                        return Some(Inline::Image {
                            source: self.attachments[index].filename.clone(),
                        });
                    }
                    None => {
                        self.warnings
                            .push(format!("Could not download image {}; kept as external link", src));
                    }
                }
            }
        }

        if src.is_empty() {
            None
        } else {
            Some(Inline::Image {
                source: src.to_string(),
            })
        }
    }

    fn list(&mut self, el: &Element) -> Block {
        let ordered = el.name == "ol";
        let mut items: Vec<ListItem> = Vec::new();

        for child in &el.children {
            let Node::Element(child) = child else {
                continue;
            };

            match child.name.as_str() {
                "li" => items.push(self.list_item(child)),
                "ul" | "ol" => {
                    // nested list written as a sibling of the items
                    let nested = self.list(child);
                    match items.last_mut() {
                        Some(last) => last.children.push(nested),
                        None => items.push(ListItem {
                            content: Vec::new(),
                            children: vec![nested],
                        }),
                    }
                }
                _ => {
                    let content = trim_inlines(self.inlines(&child.children, false));
                    if !content.is_empty() {
                        items.push(ListItem {
                            content,
                            children: Vec::new(),
                        });
                    }
                }
            }
        }

        Block::List { ordered, items }
    }

    fn list_item(&mut self, el: &Element) -> ListItem {
        let mut content = Vec::new();
        let mut children = Vec::new();

        for node in &el.children {
            match node {
                Node::Element(child) if child.name == "ul" || child.name == "ol" => {
                    children.push(self.list(child));
                }
                _ => self.inline_node(node, false, &mut content),
            }
        }

        ListItem {
            content: trim_inlines(content),
            children,
        }
    }

    fn table(&mut self, el: &Element) -> Vec<Vec<TableCell>> {
        let mut rows = Vec::new();

        for child in &el.children {
            let Node::Element(child) = child else {
                continue;
            };
            match child.name.as_str() {
                "thead" | "tbody" | "tfoot" => {
                    for row in &child.children {
                        if let Node::Element(row) = row {
                            self.table_row(row, &mut rows);
                        }
                    }
                }
                _ => self.table_row(child, &mut rows),
            }
        }

        rows
    }

    fn table_row(&mut self, row: &Element, rows: &mut Vec<Vec<TableCell>>) {
        if row.name != "tr" {
            return;
        }

        let mut cells = Vec::new();
        for cell in &row.children {
            let Node::Element(cell) = cell else {
                continue;
            };
            if cell.name != "td" && cell.name != "th" {
                continue;
            }
            cells.push(TableCell {
                header: cell.name == "th",
                content: trim_inlines(self.inlines(&cell.children, false)),
            });
        }

        if !cells.is_empty() {
            rows.push(cells);
        }
    }
}

/// Convert a note into a page ready for upload
pub fn convert_note(note: Note, options: &ConvertOptions<'_>) -> Result<ConvertedPage, ConversionError> {
    let nodes = enml::parse(&note.content)?;
    let footer = if options.include_metadata {
        metadata_footer(&note)
    } else {
        String::new()
    };
    let space = page_space(options.target_space, note.notebook.as_deref());
    let page_name = sanitize_page_name(&note.title);

    let mut converter = Converter::new(note.attachments, options.fetcher);
    let document = converter.convert(&nodes);
    let (attachments, warnings) = converter.finish();

    let mut content = render::to_xwiki(&document);
    if !footer.is_empty() {
        if !content.is_empty() {
            content.push_str("\n\n");
        }
        content.push_str(&footer);
    }
    debug!(
        "Converted '{}' → {}.{} ({} attachments, {} warnings)",
        note.title,
        space,
        page_name,
        attachments.len(),
        warnings.len()
    );

    Ok(ConvertedPage {
        source_id: note.source_id,
        title: note.title,
        space,
        page_name,
        content,
        tags: note.tags,
        attachments,
        created: note.created,
        updated: note.updated,
        warnings,
    })
}

/// Convert an ENML body to a document without building a page
pub fn convert_enml(
    content: &str,
    attachments: Vec<Attachment>,
) -> Result<(Document, Vec<Attachment>, Vec<String>), ConversionError> {
    let nodes = enml::parse(content)?;
    let mut converter = Converter::new(attachments, None);
    let document = converter.convert(&nodes);
    let (attachments, warnings) = converter.finish();
    Ok((document, attachments, warnings))
}

fn metadata_footer(note: &Note) -> String {
    let mut parts = Vec::new();
    if let Some(created) = note.created {
        parts.push(format!(
            "**Originally created:** {}",
            created.format("%Y-%m-%d %H:%M")
        ));
    }
    if let Some(url) = &note.source_url {
        parts.push(format!("**Source:** [[{}]]", render::escape_reference(url)));
    }

    if parts.is_empty() {
        String::new()
    } else {
        format!("----\n{}", parts.join("\n"))
    }
}

/// `target` plus the sanitised notebook path
pub fn page_space(target: &str, notebook: Option<&str>) -> String {
    let target = sanitize_space(target);
    let target = if target.is_empty() {
        DEFAULT_TARGET_SPACE.to_string()
    } else {
        target
    };

    match notebook.map(sanitize_space).filter(|n| !n.is_empty()) {
        Some(notebook) => format!("{}.{}", target, notebook),
        None => target,
    }
}

/// `name`, or `name_1.ext`, `name_2.ext`… if taken (case-insensitive)
pub fn unique_filename(filename: &str, used: &HashSet<String>) -> String {
    if !used.contains(&filename.to_lowercase()) {
        return filename.to_string();
    }

    let (base, ext) = match filename.rfind('.') {
        Some(dot) if dot > 0 => (&filename[..dot], &filename[dot..]),
        _ => (filename, ""),
    };

    let mut counter = 1;
    loop {
        let candidate = format!("{}_{}{}", base, counter, ext);
        if !used.contains(&candidate.to_lowercase()) {
            return candidate;
        }
        counter += 1;
    }
}

/// Decode a `data:image/...;base64,...` URI into an attachment
fn decode_data_uri(uri: &str) -> Option<Attachment> {
    let (header, payload) = uri.strip_prefix("data:")?.split_once(',')?;
    let mime_type = header.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    if !mime_type.starts_with("image/") {
        return None;
    }

    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let data = BASE64.decode(compact.as_bytes()).ok()?;
    if data.is_empty() {
        return None;
    }

    let hash = format!("{:x}", md5::compute(&data));
    let ext = match extension_for_mime(&mime_type) {
        "" => ".png",
        ext => ext,
    };
    let filename = format!("embedded_{}{}", &hash[..8], ext);
    Some(Attachment::from_data(data, mime_type, Some(filename)))
}

fn is_block(el: &Element) -> bool {
    matches!(
        el.name.as_str(),
        "h1" | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "p"
            | "div"
            | "ul"
            | "ol"
            | "li"
            | "table"
            | "tr"
            | "blockquote"
            | "pre"
            | "hr"
            | "en-crypt"
            | "en-note"
            | "body"
            | "section"
            | "article"
            | "header"
            | "footer"
            | "center"
    ) || (el.name == "code" && el.text_content().contains('\n'))
}

/// Styles implied by an inline `style` attribute
fn span_styles(style: &str) -> Vec<Style> {
    let style = style.to_ascii_lowercase();
    let mut styles = Vec::new();

    if style.contains("font-weight")
        && ["bold", "700", "800", "900"].iter().any(|w| style.contains(w))
    {
        styles.push(Style::Bold);
    }
    if style.contains("font-style") && style.contains("italic") {
        styles.push(Style::Italic);
    }
    if style.contains("text-decoration") {
        if style.contains("underline") {
            styles.push(Style::Underline);
        }
        if style.contains("line-through") {
            styles.push(Style::Strikethrough);
        }
    }
    styles
}

/// Text of a `pre`/`code` block, minus one leading newline
fn code_text(el: &Element) -> String {
    let text = el.text_content();
    let text = text.strip_prefix('\n').unwrap_or(&text);
    text.trim_end().to_string()
}

/// Collapse runs of ASCII whitespace into a single space
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_ascii_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

/// Start a new line unless one was just started
fn push_break(out: &mut Vec<Inline>) {
    if !matches!(out.last(), Some(Inline::LineBreak)) {
        out.push(Inline::LineBreak);
    }
}

/// Append text, merging with a preceding text run and avoiding double spaces
fn push_text(out: &mut Vec<Inline>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(Inline::Text(last)) = out.last_mut() {
        if last.ends_with(' ') && text.starts_with(' ') {
            last.push_str(&text[1..]);
        } else {
            last.push_str(text);
        }
        return;
    }
    out.push(Inline::Text(text.to_string()));
}

fn replace_breaks(inlines: Vec<Inline>) -> Vec<Inline> {
    inlines
        .into_iter()
        .map(|inline| match inline {
            Inline::LineBreak => Inline::Text(" ".to_string()),
            other => other,
        })
        .collect()
}

/// Strip leading/trailing whitespace text, leading line breaks and one
/// trailing line break
fn trim_inlines(mut inlines: Vec<Inline>) -> Vec<Inline> {
    trim_end(&mut inlines);
    if matches!(inlines.last(), Some(Inline::LineBreak)) {
        inlines.pop();
        trim_end(&mut inlines);
    }

    while let Some(first) = inlines.first_mut() {
        match first {
            Inline::LineBreak => {
                inlines.remove(0);
            }
            Inline::Text(text) => {
                let trimmed = text.trim_start().to_string();
                if trimmed.is_empty() {
                    inlines.remove(0);
                } else {
                    *text = trimmed;
                    break;
                }
            }
            _ => break,
        }
    }
    inlines
}

fn marks_empty_line(inline: &Inline) -> bool {
    match inline {
        Inline::LineBreak => true,
        Inline::Text(text) => text.contains('\u{a0}'),
        Inline::Styled { children, .. } => children.iter().any(marks_empty_line),
        _ => false,
    }
}

fn trim_end(inlines: &mut Vec<Inline>) {
    while let Some(last) = inlines.last_mut() {
        match last {
            Inline::Text(text) => {
                let trimmed = text.trim_end().to_string();
                if trimmed.is_empty() {
                    inlines.pop();
                } else {
                    *text = trimmed;
                    break;
                }
            }
            _ => break,
        }
    }
}

/// Close a run of inlines as a paragraph.
///
/// Whitespace-only runs vanish, except a bare line break or non-breaking
/// space, which Evernote uses for an empty line.
fn push_paragraph(blocks: &mut Vec<Block>, inlines: Vec<Inline>) {
    if inlines.is_empty() {
        return;
    }
    if inlines.iter().all(Inline::is_blank) {
        if inlines.iter().any(marks_empty_line) {
            blocks.push(Block::Paragraph(Vec::new()));
        }
        return;
    }
    blocks.push(Block::Paragraph(trim_inlines(inlines)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn convert(enml: &str) -> Document {
        convert_enml(enml, Vec::new()).unwrap().0
    }

    fn text(s: &str) -> Inline {
        Inline::Text(s.to_string())
    }

    struct StubFetcher;

    impl ImageFetcher for StubFetcher {
        fn fetch(&self, url: &str) -> Option<Attachment> {
            if url.contains("missing") {
                return None;
            }
            Some(Attachment::from_data(
                b"remote".to_vec(),
                "image/png",
                Some("pic.png".to_string()),
            ))
        }
    }

    #[test]
    fn test_div_with_bold() {
        let doc = convert("<en-note><div>Hello <b>world</b></div></en-note>");
        assert_eq!(
            doc.blocks,
            vec![Block::Paragraph(vec![
                text("Hello "),
                Inline::Styled {
                    style: Style::Bold,
                    children: vec![text("world")],
                },
            ])]
        );
    }

    #[test]
    fn test_whitespace_collapses_outside_pre() {
        let doc = convert("<en-note><div>a \n\n  b</div>\n  <pre>x\n  y</pre></en-note>");
        assert_eq!(doc.blocks[0], Block::Paragraph(vec![text("a b")]));
        assert_eq!(doc.blocks[1], Block::Code("x\n  y".to_string()));
        assert_eq!(doc.blocks.len(), 2);
    }

    #[test]
    fn test_empty_div_with_break_is_blank_line() {
        let doc = convert("<en-note><div>a</div><div><br/></div><div>b<br/></div></en-note>");
        assert_eq!(
            doc.blocks,
            vec![
                Block::Paragraph(vec![text("a")]),
                Block::Paragraph(vec![]),
                Block::Paragraph(vec![text("b")]),
            ]
        );
    }

    #[test]
    fn test_nested_lists() {
        let doc = convert("<ul><li>one<ol><li>inner</li></ol></li><li>two</li></ul>");
        let Block::List { ordered, items } = &doc.blocks[0] else {
            panic!("expected list");
        };
        assert!(!ordered);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].content, vec![text("one")]);
        assert!(matches!(items[0].children[0], Block::List { ordered: true, .. }));
    }

    #[test]
    fn test_sibling_nested_list_attaches_to_previous_item() {
        let doc = convert("<ul><li>a</li><ul><li>b</li></ul></ul>");
        let Block::List { items, .. } = &doc.blocks[0] else {
            panic!("expected list");
        };
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].children.len(), 1);
    }

    #[test]
    fn test_table_flattens_sections() {
        let doc = convert(
            "<table><thead><tr><th>H</th></tr></thead><tbody><tr><td><div>c</div></td></tr></tbody></table>",
        );
        let Block::Table(rows) = &doc.blocks[0] else {
            panic!("expected table");
        };
        assert_eq!(rows.len(), 2);
        assert!(rows[0][0].header);
        assert!(!rows[1][0].header);
        assert_eq!(rows[1][0].content, vec![text("c")]);
    }

    #[test]
    fn test_span_styles() {
        assert_eq!(
            span_styles("font-weight: 700; font-style: italic; text-decoration: underline line-through"),
            vec![Style::Bold, Style::Italic, Style::Underline, Style::Strikethrough]
        );
        assert!(span_styles("color: red").is_empty());

        let doc = convert(r#"<div><span style="font-weight:bold">x</span></div>"#);
        assert!(matches!(
            &doc.blocks[0],
            Block::Paragraph(inlines) if matches!(inlines[0], Inline::Styled { style: Style::Bold, .. })
        ));
    }

    #[test]
    fn test_media_resolution() {
        let image = Attachment::from_data(b"img".to_vec(), "image/png", Some("a.png".into()));
        let pdf = Attachment::from_data(b"pdf".to_vec(), "application/pdf", Some("doc.pdf".into()));
        let enml = format!(
            r#"<en-note><en-media hash="{}" type="image/png"/><en-media hash="{}"/><en-media hash="0123456789abcdef"/></en-note>"#,
            image.hash.to_uppercase(),
            pdf.hash
        );

        let (doc, attachments, warnings) = convert_enml(&enml, vec![image, pdf]).unwrap();
        assert_eq!(attachments.len(), 2);
        assert_eq!(warnings.len(), 1);

        let Block::Paragraph(inlines) = &doc.blocks[0] else {
            panic!("expected paragraph");
        };
        assert_eq!(inlines[0], Inline::Image { source: "a.png".into() });
        assert_eq!(inlines[1], Inline::Attachment { filename: "doc.pdf".into() });
        assert_eq!(
            inlines[2],
            Inline::MissingAttachment {
                hash: "0123456789abcdef".into()
            }
        );
    }

    #[test]
    fn test_duplicate_attachment_names_are_made_unique() {
        let a = Attachment::from_data(b"one".to_vec(), "image/png", Some("Scan.png".into()));
        let b = Attachment::from_data(b"two".to_vec(), "image/png", Some("scan.PNG".into()));
        let enml = format!(r#"<en-note><en-media hash="{}"/></en-note>"#, b.hash);

        let (doc, attachments, _) = convert_enml(&enml, vec![a, b]).unwrap();
        assert_eq!(attachments[0].filename, "Scan.png");
        assert_eq!(attachments[1].filename, "scan_1.PNG");
        assert_eq!(
            doc.blocks[0],
            Block::Paragraph(vec![Inline::Image { source: "scan_1.PNG".into() }])
        );
    }

    #[test]
    fn test_data_uri_image_becomes_attachment() {
        let (doc, attachments, _) =
            convert_enml(r#"<div><img src="data:image/png;base64,aGVsbG8="/></div>"#, Vec::new()).unwrap();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].filename, "embedded_5d41402a.png");
        assert_eq!(
            doc.blocks[0],
            Block::Paragraph(vec![Inline::Image {
                source: "embedded_5d41402a.png".into()
            }])
        );
    }

    #[test]
    fn test_external_images_with_fetcher() {
        let fetcher = StubFetcher;
        let nodes = enml::parse(
            r#"<div><img src="https://example.com/pic.png"/><img src="https://example.com/missing.png"/></div>"#,
        )
        .unwrap();
        let mut converter = Converter::new(Vec::new(), Some(&fetcher));
        let doc = converter.convert(&nodes);
        let (attachments, warnings) = converter.finish();

        assert_eq!(attachments.len(), 1);
        assert_eq!(warnings.len(), 1);
        assert_eq!(
            doc.blocks[0],
            Block::Paragraph(vec![
                Inline::Image { source: "pic.png".into() },
                Inline::Image {
                    source: "https://example.com/missing.png".into()
                },
            ])
        );
    }

    #[test]
    fn test_todo_and_encrypted() {
        let doc = convert(
            r#"<en-note><div><en-todo checked="true"/>done</div><en-crypt cipher="AES">xyz</en-crypt></en-note>"#,
        );
        assert_eq!(
            doc.blocks[0],
            Block::Paragraph(vec![Inline::Todo { checked: true }, text("done")])
        );
        assert_eq!(doc.blocks[1], Block::Encrypted);
    }

    #[test]
    fn test_unique_filename() {
        let used: HashSet<String> = ["a.png", "a_1.png", "noext"].iter().map(|s| s.to_string()).collect();
        assert_eq!(unique_filename("b.png", &used), "b.png");
        assert_eq!(unique_filename("A.png", &used), "A_2.png");
        assert_eq!(unique_filename("noext", &used), "noext_1");
    }

    #[test]
    fn test_page_space() {
        assert_eq!(page_space("ImportedNotes", None), "ImportedNotes");
        assert_eq!(page_space("ImportedNotes", Some("My Book/Sub")), "ImportedNotes.MyBook.Sub");
        assert_eq!(page_space("", None), DEFAULT_TARGET_SPACE);
    }

    #[test]
    fn test_convert_note_builds_page() {
        let created = Utc.with_ymd_and_hms(2023, 12, 15, 14, 30, 22).unwrap();
        let mut note = Note::new(
            "Trip: Plan",
            "<en-note><div>Hello <b>world</b></div></en-note>",
            Some(created),
        );
        note.source_url = Some("https://example.com".to_string());
        note.notebook = Some("Travel".to_string());
        note.tags = vec!["trip".to_string()];
        let source_id = note.source_id.clone();

        let page = convert_note(note, &ConvertOptions::default()).unwrap();
        assert_eq!(page.source_id, source_id);
        assert_eq!(page.space, "ImportedNotes.Travel");
        assert_eq!(page.page_name, "Trip-Plan");
        assert_eq!(page.title, "Trip: Plan");
        assert_eq!(
            page.content,
            "Hello **world**\n\n----\n**Originally created:** 2023-12-15 14:30\n**Source:** [[https://example.com]]"
        );
        assert_eq!(page.tags, vec!["trip"]);
    }

    #[test]
    fn test_convert_note_without_metadata() {
        let note = Note::new("t", "<en-note><div>Hello <b>world</b></div></en-note>", None);
        let options = ConvertOptions {
            include_metadata: false,
            ..Default::default()
        };
        let page = convert_note(note, &options).unwrap();
        assert_eq!(page.content, "Hello **world**");
    }

    #[test]
    fn test_convert_note_invalid_markup() {
        let note = Note::new("t", "<en-note><div>open</en-note>", None);
        assert!(convert_note(note, &ConvertOptions::default()).is_err());
    }

    fn markup(enml: &str) -> String {
        render::to_xwiki(&convert(enml))
    }

    #[test]
    fn test_block_inside_list_item_gets_own_line() {
        assert_eq!(
            markup("<ul><li>alpha<div>beta</div>gamma</li></ul>"),
            "* alpha\\\\beta\\\\gamma"
        );
        assert_eq!(
            markup("<ul><li>alpha<b><div>beta</div></b>gamma</li></ul>"),
            "* alpha\\\\**beta**\\\\gamma"
        );
        // no break doubling when the block already ends in one
        assert_eq!(
            markup("<ul><li><div>one<br/></div><div>two</div></li></ul>"),
            "* one\\\\two"
        );
    }

    #[test]
    fn test_nested_table_keeps_cells_apart() {
        let doc = convert(
            "<table><tr><td><table><tr><td>Name</td><td>Value</td></tr><tr><td>a</td><td>b</td></tr></table></td><td>x</td></tr></table>",
        );
        let Block::Table(rows) = &doc.blocks[0] else {
            panic!("expected table");
        };
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0][0].content,
            vec![text("Name | Value"), Inline::LineBreak, text("a | b")]
        );
        assert_eq!(render::to_xwiki(&doc), "|Name ~| Value\\\\a ~| b|x");
    }

    #[test]
    fn test_preformatted_text_in_cell_stays_in_row() {
        assert_eq!(
            markup("<table><tr><td><pre>x = 1\n* y</pre></td><td>z</td></tr></table>"),
            "|x = 1\\\\~* y|z"
        );
        assert_eq!(
            markup("<ul><li>run<pre>make\n= done</pre></li></ul>"),
            "* run\\\\make\\\\~= done"
        );
    }

    #[test]
    fn test_nbsp_div_is_blank_line() {
        let doc = convert("<en-note><div>first</div><div>&nbsp;</div><div>second</div></en-note>");
        assert_eq!(
            doc.blocks,
            vec![
                Block::Paragraph(vec![text("first")]),
                Block::Paragraph(vec![]),
                Block::Paragraph(vec![text("second")]),
            ]
        );
        assert_eq!(render::to_xwiki(&doc), "first\n\nsecond");

        // a non-breaking space inside text is just text
        let doc = convert("<en-note><div>a&nbsp;b</div></en-note>");
        assert_eq!(doc.blocks, vec![Block::Paragraph(vec![text("a\u{a0}b")])]);
    }

    #[test]
    fn test_attachment_name_with_at_sign_stays_linked() {
        let image = Attachment::from_data(b"img".to_vec(), "image/png", Some("photo@2x.png".into()));
        let enml = format!(r#"<en-note><en-media hash="{}"/></en-note>"#, image.hash);
        let note = Note {
            attachments: vec![image],
            ..Note::new("Photos", enml, None)
        };
        let options = ConvertOptions {
            include_metadata: false,
            ..Default::default()
        };

        let page = convert_note(note, &options).unwrap();
        assert_eq!(page.content, "[[image:photo\\@2x.png]]");
        assert!(page.attachment("photo@2x.png").is_some());
    }
}
