//! XWiki 2.1 rendering
//!
//! Turns a `Document` into XWiki markup. Text is escaped with `~` wherever it
//! would otherwise be read as markup.

use crate::document::{Block, Document, Inline, ListItem, Style, TableCell};

const ENCRYPTED_NOTICE: &str =
    "{{warning}}\nThis content was encrypted in Evernote and cannot be converted.\n{{/warning}}";

/// Character pairs XWiki treats as markup
const MARKUP_PAIRS: [&str; 11] = [
    "**", "//", "__", "--", "##", "^^", ",,", "[[", "]]", "{{", "}}",
];

/// Where inline content ends up; decides how line breaks render
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    Paragraph,
    /// List item: one source line, breaks become `\\`
    Item,
    Cell,
    /// Heading or link label: breaks become spaces
    Label,
}

/// Render a document as XWiki 2.1 markup
pub fn to_xwiki(document: &Document) -> String {
    let mut out = String::new();
    let mut previous: Option<&Block> = None;

    for block in &document.blocks {
        let rendered = render_block(block);
        if let Some(prev) = previous {
            let tight = matches!(prev, Block::Paragraph(_)) && matches!(block, Block::Paragraph(_));
            out.push_str(if tight { "\n" } else { "\n\n" });
        }
        out.push_str(&rendered);
        previous = Some(block);
    }

    collapse_blank_lines(&out).trim().to_string()
}

fn render_block(block: &Block) -> String {
    match block {
        Block::Heading { level, content } => {
            let level = (*level).clamp(1, 6) as usize;
            let marks = "=".repeat(level);
            format!("{} {} {}", marks, render_inlines(content, Context::Label), marks)
        }
        Block::Paragraph(inlines) => render_inlines(inlines, Context::Paragraph),
        Block::List { ordered, items } => {
            let mut lines = Vec::new();
            render_list(items, &mut vec![*ordered], &mut lines);
            lines.join("\n")
        }
        Block::Table(rows) => rows
            .iter()
            .map(|row| render_row(row))
            .collect::<Vec<_>>()
            .join("\n"),
        Block::Quote(blocks) => {
            let inner = to_xwiki(&Document::new(blocks.clone()));
            inner
                .lines()
                .map(|line| {
                    if line.is_empty() {
                        ">".to_string()
                    } else {
                        format!("> {}", line)
                    }
                })
                .collect::<Vec<_>>()
                .join("\n")
        }
        Block::Code(text) => code_block(text),
        Block::Rule => "----".to_string(),
        Block::Encrypted => ENCRYPTED_NOTICE.to_string(),
    }
}

/// List marker for a nesting path: `*`, `1.`, `**`, `11.`, `1*.`
fn list_marker(levels: &[bool]) -> String {
    let mut marker: String = levels.iter().map(|&o| if o { '1' } else { '*' }).collect();
    if levels.iter().any(|&o| o) {
        marker.push('.');
    }
    marker
}

fn render_list(items: &[ListItem], levels: &mut Vec<bool>, lines: &mut Vec<String>) {
    let marker = list_marker(levels);

    for item in items {
        let content = render_inlines(&item.content, Context::Item);
        if content.is_empty() {
            if item.children.is_empty() {
                continue;
            }
            lines.push(marker.clone());
        } else {
            lines.push(format!("{} {}", marker, content));
        }

        for child in &item.children {
            match child {
                Block::List { ordered, items } => {
                    levels.push(*ordered);
                    render_list(items, levels, lines);
                    levels.pop();
                }
                other => lines.push(render_block(other)),
            }
        }
    }
}

fn render_row(row: &[TableCell]) -> String {
    let mut line = String::new();
    for cell in row {
        line.push_str(if cell.header { "|=" } else { "|" });
        line.push_str(&render_inlines(&cell.content, Context::Cell));
    }
    line
}

fn render_inlines(inlines: &[Inline], context: Context) -> String {
    let mut writer = InlineWriter {
        out: String::new(),
        context,
        line_start: true,
    };
    writer.write_all(inlines);
    writer.out
}

struct InlineWriter {
    out: String,
    context: Context,
    line_start: bool,
}

impl InlineWriter {
    fn write_all(&mut self, inlines: &[Inline]) {
        for inline in inlines {
            self.write(inline);
        }
    }

    fn push(&mut self, markup: &str) {
        if !markup.is_empty() {
            self.out.push_str(markup);
            self.line_start = false;
        }
    }

    fn write(&mut self, inline: &Inline) {
        match inline {
            Inline::Text(text) => {
                for (i, line) in text.split('\n').enumerate() {
                    if i > 0 {
                        self.write(&Inline::LineBreak);
                    }
                    let escaped =
                        escape_text(line, self.context == Context::Cell, self.line_start);
                    self.push(&escaped);
                }
            }
            Inline::Styled { style, children } => {
                let marker = style_marker(*style);
                self.push(marker);
                self.write_all(children);
                self.push(marker);
            }
            Inline::Link { url, children } => {
                let label = render_inlines(children, Context::Label).replace(">>", "~>>");
                let target = escape_reference(url);
                if label.trim().is_empty() || label == *url {
                    self.push(&format!("[[{}]]", target));
                } else {
                    self.push(&format!("[[{}>>{}]]", label, target));
                }
            }
            Inline::Image { source } => {
                self.push(&format!("[[image:{}]]", resource_reference(source)))
            }
            Inline::Attachment { filename } => {
                let label = escape_text(filename, false, false).replace(">>", "~>>");
                self.push(&format!(
                    "[[{}>>attach:{}]]",
                    label,
                    resource_reference(filename)
                ))
            }
            Inline::MissingAttachment { hash } => {
                let short: String = hash.chars().take(8).collect();
                self.push(&format!("[Missing attachment: {}...]", short));
            }
            Inline::Todo { checked } => self.push(if *checked { "[x] " } else { "[ ] " }),
            Inline::LineBreak => match self.context {
                Context::Paragraph => {
                    self.out.push('\n');
                    self.line_start = true;
                }
                Context::Item | Context::Cell => {
                    self.push("\\\\");
                    self.line_start = true;
                }
                Context::Label => self.push(" "),
            },
            Inline::Code(text) => {
                let code = if text.contains("}}}") {
                    escape_text(text, self.context == Context::Cell, false)
                } else {
                    format!("{{{{{{{}}}}}}}", text)
                };
                self.push(&format!("##{}##", code));
            }
        }
    }
}

fn style_marker(style: Style) -> &'static str {
    match style {
        Style::Bold => "**",
        Style::Italic => "//",
        Style::Underline => "__",
        Style::Strikethrough => "--",
        Style::Superscript => "^^",
        Style::Subscript => ",,",
    }
}

/// Escape text so XWiki renders it literally.
///
/// `~` itself, markup pairs (except `//` after `:` as in URLs), `|` inside
/// table cells, and block markers at the start of a line get a `~` prefix.
pub fn escape_text(text: &str, in_cell: bool, line_start: bool) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 8);

    if line_start {
        let first = chars.iter().position(|c| *c != ' ');
        if let Some(i) = first {
            if starts_block_markup(&chars[i..]) {
                out.extend(&chars[..i]);
                out.push('~');
                return out + &escape_text(&chars[i..].iter().collect::<String>(), in_cell, false);
            }
        }
    }

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '~' {
            out.push_str("~~");
            i += 1;
            continue;
        }
        if in_cell && c == '|' {
            out.push_str("~|");
            i += 1;
            continue;
        }
        if let Some(&next) = chars.get(i + 1) {
            let pair: String = [c, next].iter().collect();
            if MARKUP_PAIRS.contains(&pair.as_str()) {
                let url_slashes = pair == "//" && i > 0 && chars[i - 1] == ':';
                if !url_slashes {
                    out.push('~');
                }
                out.push(c);
                out.push(next);
                i += 2;
                continue;
            }
        }
        out.push(c);
        i += 1;
    }
    out
}

/// `{{code}}` block, or verbatim when the text would close the macro early
fn code_block(text: &str) -> String {
    if !text.contains("{{/code}}") && !text.contains("{{code") {
        return format!("{{{{code}}}}\n{}\n{{{{/code}}}}", text);
    }
    if !text.contains("}}}") {
        return format!("{{{{{{\n{}\n}}}}}}", text);
    }
    // Neither form can hold it as is; break the closing tag
    format!(
        "{{{{code}}}}\n{}\n{{{{/code}}}}",
        text.replace("{{/code}}", "{ {/code}}").replace("{{code", "{ {code")
    )
}

/// Escape link syntax (`]]`, `>>`, `||`) inside a link or image target
pub(crate) fn escape_reference(target: &str) -> String {
    let mut out = String::with_capacity(target.len());
    let mut chars = target.chars().peekable();
    while let Some(c) = chars.next() {
        if matches!(c, ']' | '>' | '|' | '~') && chars.peek() == Some(&c) {
            out.push('~');
            out.push(c);
            out.push('~');
            if let Some(next) = chars.next() {
                out.push(next);
            }
            continue;
        }
        if c == '~' {
            out.push('~');
        }
        out.push(c);
    }
    out
}

/// Attachment names are references: `@` would split them into
/// document and attachment, so it (and `\`) get a reference escape.
/// URLs are left to [`escape_reference`].
fn resource_reference(source: &str) -> String {
    if source.contains("://") {
        return escape_reference(source);
    }
    let escaped: String = source
        .chars()
        .flat_map(|c| match c {
            '@' | '\\' => vec!['\\', c],
            _ => vec![c],
        })
        .collect();
    escape_reference(&escaped)
}

/// Would a line starting with these characters be read as a heading,
/// list item, quote or table row?
fn starts_block_markup(chars: &[char]) -> bool {
    match chars.first() {
        Some('=') | Some('>') | Some('|') => true,
        Some('*') => true,
        Some(c) if c.is_ascii_digit() => {
            let digits = chars.iter().take_while(|c| c.is_ascii_digit()).count();
            matches!(chars.get(digits), Some('.')) && matches!(chars.get(digits + 1), Some(' '))
        }
        _ => false,
    }
}

/// Collapse three or more consecutive newlines to two
fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut newlines = 0;
    for c in text.chars() {
        if c == '\n' {
            newlines += 1;
            if newlines > 2 {
                continue;
            }
        } else {
            newlines = 0;
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Inline {
        Inline::Text(s.to_string())
    }

    fn render(blocks: Vec<Block>) -> String {
        to_xwiki(&Document::new(blocks))
    }

    fn item(s: &str) -> ListItem {
        ListItem {
            content: vec![text(s)],
            children: Vec::new(),
        }
    }

    #[test]
    fn test_paragraph_with_bold() {
        let out = render(vec![Block::Paragraph(vec![
            text("Hello "),
            Inline::Styled {
                style: Style::Bold,
                children: vec![text("world")],
            },
        ])]);
        assert_eq!(out, "Hello **world**");
    }

    #[test]
    fn test_paragraphs_one_per_line() {
        let out = render(vec![
            Block::Paragraph(vec![text("a"), Inline::LineBreak, text("b")]),
            Block::Paragraph(vec![]),
            Block::Paragraph(vec![text("c")]),
            Block::Heading {
                level: 2,
                content: vec![text("Title")],
            },
            Block::Paragraph(vec![text("d")]),
        ]);
        assert_eq!(out, "a\nb\n\nc\n\n== Title ==\n\nd");
    }

    #[test]
    fn test_list_markers() {
        assert_eq!(list_marker(&[false]), "*");
        assert_eq!(list_marker(&[true]), "1.");
        assert_eq!(list_marker(&[false, false]), "**");
        assert_eq!(list_marker(&[true, true]), "11.");
        assert_eq!(list_marker(&[true, false]), "1*.");
    }

    #[test]
    fn test_nested_list() {
        let mut outer = item("one");
        outer.children.push(Block::List {
            ordered: true,
            items: vec![item("inner")],
        });
        let out = render(vec![Block::List {
            ordered: false,
            items: vec![outer, item("two")],
        }]);
        assert_eq!(out, "* one\n*1. inner\n* two");
    }

    #[test]
    fn test_table() {
        let out = render(vec![Block::Table(vec![
            vec![
                TableCell {
                    header: true,
                    content: vec![text("Name")],
                },
                TableCell {
                    header: true,
                    content: vec![text("Value")],
                },
            ],
            vec![
                TableCell {
                    header: false,
                    content: vec![text("a|b")],
                },
                TableCell {
                    header: false,
                    content: vec![text("x"), Inline::LineBreak, text("y")],
                },
            ],
        ])]);
        assert_eq!(out, "|=Name|=Value\n|a~|b|x\\\\y");
    }

    #[test]
    fn test_quote_code_rule_encrypted() {
        let out = render(vec![
            Block::Quote(vec![Block::Paragraph(vec![text("q1")]), Block::Paragraph(vec![text("q2")])]),
            Block::Code("let x = **1**;".to_string()),
            Block::Rule,
            Block::Encrypted,
        ]);
        assert_eq!(
            out,
            "> q1\n> q2\n\n{{code}}\nlet x = **1**;\n{{/code}}\n\n----\n\n{{warning}}\nThis content was encrypted in Evernote and cannot be converted.\n{{/warning}}"
        );
    }

    #[test]
    fn test_links_and_media() {
        let out = render(vec![Block::Paragraph(vec![
            Inline::Link {
                url: "https://a.example".into(),
                children: vec![text("site")],
            },
            text(" "),
            Inline::Link {
                url: "https://b.example".into(),
                children: vec![text("https://b.example")],
            },
            text(" "),
            Inline::Image { source: "p.png".into() },
            Inline::Attachment { filename: "d.pdf".into() },
            Inline::MissingAttachment {
                hash: "0123456789abcdef".into(),
            },
        ])]);
        assert_eq!(
            out,
            "[[site>>https://a.example]] [[https://b.example]] [[image:p.png]][[d.pdf>>attach:d.pdf]][Missing attachment: 01234567...]"
        );
    }

    #[test]
    fn test_styles_todo_and_code() {
        let styled = |style, s: &str| Inline::Styled {
            style,
            children: vec![text(s)],
        };
        let out = render(vec![Block::Paragraph(vec![
            Inline::Todo { checked: true },
            styled(Style::Italic, "i"),
            styled(Style::Underline, "u"),
            styled(Style::Strikethrough, "s"),
            styled(Style::Superscript, "2"),
            styled(Style::Subscript, "n"),
            Inline::Code("a**b".into()),
        ])]);
        assert_eq!(out, "[x] //i//__u__--s--^^2^^,,n,,##{{{a**b}}}##");
    }

    #[test]
    fn test_escape_text() {
        assert_eq!(escape_text("a ~ b", false, false), "a ~~ b");
        assert_eq!(escape_text("2**3", false, false), "2~**3");
        assert_eq!(escape_text("see https://x.org", false, false), "see https://x.org");
        assert_eq!(escape_text("a // b", false, false), "a ~// b");
        assert_eq!(escape_text("[[x]] {{y}}", false, false), "~[[x~]] ~{{y~}}");
        assert_eq!(escape_text("a|b", false, false), "a|b");
        assert_eq!(escape_text("a|b", true, false), "a~|b");
    }

    #[test]
    fn test_escape_line_start_markup() {
        assert_eq!(escape_text("= not a heading", false, true), "~= not a heading");
        assert_eq!(escape_text("* star", false, true), "~* star");
        assert_eq!(escape_text("1. first", false, true), "~1. first");
        assert_eq!(escape_text("1.5 litres", false, true), "1.5 litres");
        assert_eq!(escape_text("* star", false, false), "* star");

        let out = render(vec![Block::Paragraph(vec![
            text("x"),
            Inline::LineBreak,
            text("> quoted"),
        ])]);
        assert_eq!(out, "x\n~> quoted");
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("a\n\n\n\nb"), "a\n\nb");
        assert_eq!(collapse_blank_lines("a\nb"), "a\nb");
    }

    #[test]
    fn test_references_are_escaped() {
        let out = render(vec![Block::Paragraph(vec![
            Inline::Image {
                source: "photo@2x.png".into(),
            },
            Inline::Attachment {
                filename: "a>>b@c.pdf".into(),
            },
            Inline::Link {
                url: "https://x.example/a]]b".into(),
                children: vec![text("odd")],
            },
            Inline::Image {
                source: "https://x.example/u@host/p.png".into(),
            },
        ])]);
        assert_eq!(
            out,
            "[[image:photo\\@2x.png]][[a~>>b@c.pdf>>attach:a~>~>b\\@c.pdf]][[odd>>https://x.example/a~]~]b]][[image:https://x.example/u@host/p.png]]"
        );
    }

    #[test]
    fn test_code_cannot_close_early() {
        let out = render(vec![Block::Paragraph(vec![Inline::Code("a##b".into())])]);
        assert_eq!(out, "##{{{a##b}}}##");

        let out = render(vec![Block::Code("{{/code}}\nrest".into())]);
        assert_eq!(out, "{{{\n{{/code}}\nrest\n}}}");

        let out = render(vec![Block::Code("{{/code}} }}}".into())]);
        assert_eq!(out, "{{code}}\n{ {/code}} }}}\n{{/code}}");
    }

    #[test]
    fn test_item_breaks_and_multiline_text() {
        let out = render(vec![Block::List {
            ordered: false,
            items: vec![ListItem {
                content: vec![text("a"), Inline::LineBreak, text("* b")],
                children: Vec::new(),
            }],
        }]);
        assert_eq!(out, "* a\\\\~* b");

        let out = render(vec![Block::Paragraph(vec![text("one\n* two")])]);
        assert_eq!(out, "one\n~* two");

        let out = render(vec![Block::Heading {
            level: 1,
            content: vec![text("a\nb")],
        }]);
        assert_eq!(out, "= a b =");
    }
}
