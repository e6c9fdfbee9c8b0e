//! Byte-stream boundary for spreadsheets.
//!
//! The codec never sees xlsx; it works on this plain grid of text cells.

use anyhow::{anyhow, Context};
use std::io::Cursor;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sheet {
    pub name: String,
    /// Row-major text cells. Row 0 is the header.
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

pub fn read_xlsx(bytes: &[u8]) -> anyhow::Result<Workbook> {
    let cursor = Cursor::new(bytes.to_vec());
    let book = umya_spreadsheet::reader::xlsx::read_reader(cursor, true)
        .map_err(|e| anyhow!("failed to read xlsx: {e}"))?;

    let mut sheets = Vec::new();
    for ws in book.get_sheet_collection() {
        let (max_col, max_row) = ws.get_highest_column_and_row();
        let mut rows = Vec::with_capacity(max_row as usize);
        for row in 1..=max_row {
            let mut cells = Vec::with_capacity(max_col as usize);
            for col in 1..=max_col {
                let val = ws
                    .get_cell((col, row))
                    .map(|c| c.get_value().to_string())
                    .unwrap_or_default();
                cells.push(val);
            }
            rows.push(cells);
        }
        sheets.push(Sheet {
            name: ws.get_name().to_string(),
            rows,
        });
    }
    Ok(Workbook { sheets })
}

/// Serializes the grid. The first row of every sheet is bolded; every cell
/// is written as text.
pub fn write_xlsx(workbook: &Workbook) -> anyhow::Result<Vec<u8>> {
    let mut book = umya_spreadsheet::new_file();

    for (idx, sheet) in workbook.sheets.iter().enumerate() {
        let ws = if idx == 0 {
            let ws = book
                .get_sheet_mut(&0)
                .ok_or_else(|| anyhow!("default worksheet missing"))?;
            ws.set_name(sheet.name.as_str());
            ws
        } else {
            book.new_sheet(sheet.name.as_str())
                .map_err(|e| anyhow!("failed to create worksheet {}: {e}", sheet.name))?
        };

        for (r, cells) in sheet.rows.iter().enumerate() {
            for (c, text) in cells.iter().enumerate() {
                if text.is_empty() {
                    continue;
                }
                let cell = ws.get_cell_mut(((c as u32) + 1, (r as u32) + 1));
                cell.set_value_string(text.as_str());
                if r == 0 {
                    cell.get_style_mut().get_font_mut().set_bold(true);
                }
            }
        }
    }

    let mut buf = Cursor::new(Vec::new());
    umya_spreadsheet::writer::xlsx::write_writer(&book, &mut buf)
        .map_err(|e| anyhow!("failed to write xlsx: {e}"))?;
    Ok(buf.into_inner())
}

pub fn read_xlsx_file(path: &Path) -> anyhow::Result<Workbook> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read workbook {}", path.to_string_lossy()))?;
    read_xlsx(&bytes)
}

pub fn write_xlsx_file(path: &Path, workbook: &Workbook) -> anyhow::Result<usize> {
    let bytes = write_xlsx(workbook)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    std::fs::write(path, &bytes)
        .with_context(|| format!("failed to write workbook {}", path.to_string_lossy()))?;
    Ok(bytes.len())
}
