//! Scan command handler

use std::path::Path;

use anyhow::Result;

use everwiki_core::build_inventory;

use crate::output::{Output, OutputFormat};

/// List the notes an ENEX source holds without converting anything
pub fn run(source: &Path, show_notes: bool, output: &Output) -> Result<()> {
    let inventory = build_inventory(source)?;

    match output.format {
        OutputFormat::Json => {
            let files: Vec<_> = inventory
                .files
                .iter()
                .map(|(path, notes)| serde_json::json!({"file": path, "notes": notes}))
                .collect();
            output.print_json(&serde_json::json!({
                "total": inventory.total,
                "files": files,
                "unreadable": inventory
                    .unreadable
                    .iter()
                    .map(|(path, error)| serde_json::json!({"file": path, "error": error}))
                    .collect::<Vec<_>>(),
            }))?;
        }
        OutputFormat::Quiet => println!("{}", inventory.total),
        OutputFormat::Human => {
            for (path, notes) in &inventory.files {
                let display = path.strip_prefix(source).unwrap_or(path);
                let shown = if display.as_os_str().is_empty() { path.as_path() } else { display };
                println!("{}: {} note(s)", shown.display(), notes.len());

                if show_notes {
                    for note in notes {
                        let created = note
                            .created
                            .map(|c| c.format("%Y-%m-%d").to_string())
                            .unwrap_or_else(|| "----------".to_string());
                        let flag = if note.valid { "" } else { " (missing fields)" };
                        println!("  {} {}{}", created, note.title, flag);
                    }
                }
            }
            for (path, error) in &inventory.unreadable {
                println!("Unreadable: {}: {}", path.display(), error);
            }
            println!(
                "\nFound {} note(s) in {} file(s)",
                inventory.total,
                inventory.files.len()
            );
        }
    }
    Ok(())
}
