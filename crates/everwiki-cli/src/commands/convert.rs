//! Convert command handler
//!
//! Writes converted pages to disk for review instead of uploading them.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use everwiki_core::{convert_enml, convert_note, ConvertOptions, ConvertedPage};

use super::open_notes;
use crate::output::Output;

/// Longest file stem written for a page
const MAX_STEM_LEN: usize = 50;

/// Convert every note of `source` into `output_dir/{PageName}.txt`
///
/// With `document` set, the intermediate document tree is written next to
/// each page as `{PageName}.json`.
pub fn run(
    source: &Path,
    output_dir: &Path,
    target_space: &str,
    document: bool,
    output: &Output,
) -> Result<()> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {:?}", output_dir))?;
    output.message(&format!("Output directory: {}", output_dir.display()));

    let options = ConvertOptions {
        target_space,
        ..Default::default()
    };

    let mut converted = Vec::new();
    let mut failed = 0;
    for (_, item) in open_notes(source)? {
        let note = match item {
            Ok(note) => note,
            Err(e) => {
                eprintln!("Error reading note: {}", e);
                failed += 1;
                continue;
            }
        };
        let title = note.title.clone();
        let tree = if document {
            Some(convert_enml(&note.content, note.attachments.clone()))
        } else {
            None
        };

        let page = match convert_note(note, &options) {
            Ok(page) => page,
            Err(e) => {
                eprintln!("Error converting {}: {}", title, e);
                failed += 1;
                continue;
            }
        };

        let path = write_page(output_dir, &page)?;
        if let Some(Ok((doc, _, _))) = tree {
            let json = serde_json::to_string_pretty(&doc)?;
            fs::write(path.with_extension("json"), json)
                .with_context(|| format!("Failed to write document for {}", title))?;
        }

        if !output.is_json() && !output.is_quiet() {
            println!("Converted: {} → {}", title, file_name(&path));
            for warning in &page.warnings {
                println!("    ⚠ {}", warning);
            }
        }
        converted.push(path);
    }

    if output.is_json() {
        output.print_json(&serde_json::json!({
            "output_dir": output_dir,
            "converted": converted,
            "failed": failed,
        }))?;
    } else {
        output.message(&format!(
            "\nConverted {} note(s) to {}",
            converted.len(),
            output_dir.display()
        ));
        if failed > 0 {
            output.message(&format!("{} note(s) could not be converted", failed));
        }
    }
    Ok(())
}

/// Write a page with its header to a file name no other page took
fn write_page(dir: &Path, page: &ConvertedPage) -> Result<PathBuf> {
    let stem: String = page.page_name.chars().take(MAX_STEM_LEN).collect();
    let mut path = dir.join(format!("{}.txt", stem));
    let mut counter = 1;
    while path.exists() {
        path = dir.join(format!("{}_{}.txt", stem, counter));
        counter += 1;
    }

    fs::write(&path, render_page_file(page))
        .with_context(|| format!("Failed to write {:?}", path))?;
    Ok(path)
}

fn render_page_file(page: &ConvertedPage) -> String {
    format!(
        "Title: {}\nSpace: {}\nTags: {}\nAttachments: {}\n{}\n\n{}",
        page.title,
        page.space,
        page.tags.join(", "),
        page.attachments.len(),
        "=".repeat(50),
        page.content
    )
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputFormat;

    const EXPORT: &str = r#"<en-export>
  <note><title>Same</title><tag>a</tag><content><![CDATA[<en-note><div>Hello <b>world</b></div></en-note>]]></content></note>
  <note><title>Same</title><content><![CDATA[<en-note><h1>Second</h1></en-note>]]></content></note>
</en-export>"#;

    #[test]
    fn test_convert_writes_unique_files() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("export.enex");
        let out = dir.path().join("out");
        fs::write(&source, EXPORT).unwrap();

        run(&source, &out, "Docs", true, &Output::new(OutputFormat::Quiet)).unwrap();

        let first = fs::read_to_string(out.join("Same.txt")).unwrap();
        assert!(first.starts_with("Title: Same\nSpace: Docs\nTags: a\nAttachments: 0\n"));
        assert!(first.contains(&"=".repeat(50)));
        assert!(first.contains("Hello **world**"));

        let second = fs::read_to_string(out.join("Same_1.txt")).unwrap();
        assert!(second.contains("= Second ="));
        assert!(out.join("Same.json").exists());
        assert!(out.join("Same_1.json").exists());
    }
}
