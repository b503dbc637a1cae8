//! Rendering entries to stdout.
//!
//! Values are only written for [`Mode::Show`]; `list` never prints them.

use std::io::{self, Write};

use enpass_vault::Entry;
use serde::Serialize;

use crate::cli::OutputStyle;

/// Which command is rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    List,
    Show,
}

/// Serialized shape of one entry.
#[derive(Serialize)]
struct EntryView<'a> {
    uuid: &'a str,
    created: i64,
    updated: i64,
    card_type: &'a str,
    title: &'a str,
    login: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    note: &'a str,
    category: &'a str,
    label: &'a str,
    last_used: i64,
    sensitive: bool,
    trashed: bool,
    icon: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<&'a str>,
}

impl<'a> EntryView<'a> {
    fn new(entry: &'a Entry, mode: Mode) -> Self {
        Self {
            uuid: &entry.uuid,
            created: entry.created_at,
            updated: entry.updated_at,
            card_type: &entry.kind,
            title: &entry.title,
            login: &entry.subtitle,
            note: &entry.note,
            category: &entry.category,
            label: &entry.label,
            last_used: entry.last_used,
            sensitive: entry.sensitive,
            trashed: entry.is_trashed(),
            icon: &entry.icon,
            value: (mode == Mode::Show).then(|| entry.value()),
        }
    }
}

/// Write `entries` to `out` in `style`.
pub fn render(out: &mut impl Write, entries: &[Entry], style: OutputStyle, mode: Mode) -> io::Result<()> {
    match style {
        OutputStyle::Default => render_default(out, entries, mode),
        OutputStyle::List => render_list(out, entries, mode),
        OutputStyle::Json => render_json(out, entries, mode),
        OutputStyle::Yaml => render_yaml(out, entries, mode),
        OutputStyle::Table => render_table(out, entries, mode),
    }
}

fn render_default(out: &mut impl Write, entries: &[Entry], mode: Mode) -> io::Result<()> {
    for (i, entry) in entries.iter().enumerate() {
        write!(
            out,
            "[{:05}] > title: {}, login: {}, category: {}",
            i + 1,
            entry.title,
            entry.subtitle,
            entry.category
        )?;
        if mode == Mode::Show {
            write!(out, ", {}: {}", entry.kind, entry.value())?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn render_list(out: &mut impl Write, entries: &[Entry], mode: Mode) -> io::Result<()> {
    for (i, entry) in entries.iter().enumerate() {
        if i > 0 {
            writeln!(out)?;
        }
        writeln!(out, "{:>10} = {}", "uuid", entry.uuid)?;
        writeln!(out, "{:>10} = {}", "created", entry.created_at)?;
        writeln!(out, "{:>10} = {}", "card_type", entry.kind)?;
        writeln!(out, "{:>10} = {}", "title", entry.title)?;
        writeln!(out, "{:>10} = {}", "login", entry.subtitle)?;
        if !entry.note.is_empty() {
            writeln!(out, "{:>10} = {}", "note", entry.note)?;
        }
        writeln!(out, "{:>10} = {}", "category", entry.category)?;
        writeln!(out, "{:>10} = {}", "label", entry.label)?;
        writeln!(out, "{:>10} = {}", "last_used", entry.last_used)?;
        writeln!(out, "{:>10} = {}", "sensitive", entry.sensitive)?;
        writeln!(out, "{:>10} = {}", "icon", entry.icon)?;
        if mode == Mode::Show {
            writeln!(out, "{:>10} = {}: {}", "value", entry.kind, entry.value())?;
        }
    }
    Ok(())
}

fn render_json(out: &mut impl Write, entries: &[Entry], mode: Mode) -> io::Result<()> {
    let views: Vec<EntryView<'_>> = entries.iter().map(|e| EntryView::new(e, mode)).collect();
    serde_json::to_writer_pretty(&mut *out, &views)?;
    writeln!(out)
}

fn render_yaml(out: &mut impl Write, entries: &[Entry], mode: Mode) -> io::Result<()> {
    let views: Vec<EntryView<'_>> = entries.iter().map(|e| EntryView::new(e, mode)).collect();
    serde_yaml::to_writer(&mut *out, &views).map_err(io::Error::other)
}

/// Left-aligned columns separated by two spaces, with a dashed rule under
/// the header.
fn render_table(out: &mut impl Write, entries: &[Entry], mode: Mode) -> io::Result<()> {
    let mut header = vec!["title", "login", "category"];
    if mode == Mode::Show {
        header.push("decrypted");
    }
    let rows: Vec<Vec<String>> = entries
        .iter()
        .map(|entry| {
            let mut row = vec![entry.title.clone(), entry.subtitle.clone(), entry.category.clone()];
            if mode == Mode::Show {
                row.push(format!("{}: {}", entry.kind, entry.value()));
            }
            row
        })
        .collect();

    let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let header: Vec<String> = header.iter().map(|h| h.to_string()).collect();
    for row in std::iter::once(&header).chain(std::iter::once(&rule)).chain(&rows) {
        let line = row
            .iter()
            .zip(&widths)
            .map(|(cell, width)| pad(cell, *width))
            .collect::<Vec<_>>()
            .join("  ");
        writeln!(out, "{}", line.trim_end())?;
    }
    Ok(())
}

fn pad(cell: &str, width: usize) -> String {
    let fill = width.saturating_sub(cell.chars().count());
    format!("{cell}{}", " ".repeat(fill))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
