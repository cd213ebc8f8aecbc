//! Tabular data loaded from an uploaded CSV or XLSX file.
//!
//! The first row is the header. Cells are typed loosely: anything that parses
//! as a number becomes [`Cell::Number`], blanks become [`Cell::Empty`] and the
//! rest stays text. Only the first worksheet of a workbook is read.

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Read};
use thiserror::Error;
use zip::ZipArchive;
use zip::result::ZipError;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("No columns to parse from file")]
    Empty,

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Spreadsheet archive error: {0}")]
    Archive(#[from] ZipError),

    #[error("Spreadsheet XML error: {0}")]
    Xml(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Number(f64),
    Text(String),
    Empty,
}

impl Cell {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Cell::Empty;
        }
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() => Cell::Number(n),
            _ => Cell::Text(trimmed.to_string()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Text as it would be displayed in a label
    pub fn display(&self) -> String {
        match self {
            Cell::Number(n) => format_number(*n),
            Cell::Text(s) => s.clone(),
            Cell::Empty => String::new(),
        }
    }
}

/// Renders whole numbers without a trailing `.0`
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Dataset {
    /// Loads `bytes` as CSV when `filename` ends in `.csv`, as XLSX otherwise.
    pub fn load(filename: &str, bytes: &[u8]) -> Result<Self, DatasetError> {
        if filename.to_lowercase().ends_with(".csv") {
            Self::from_csv(bytes)
        } else {
            Self::from_xlsx(bytes)
        }
    }

    pub fn from_csv(bytes: &[u8]) -> Result<Self, DatasetError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(bytes);

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();

        if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
            return Err(DatasetError::Empty);
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(Cell::parse).collect());
        }

        Ok(Self::from_parts(
            headers.into_iter().map(Cell::Text).collect(),
            rows,
        ))
    }

    pub fn from_xlsx(bytes: &[u8]) -> Result<Self, DatasetError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;

        let shared_strings = match read_entry(&mut archive, "xl/sharedStrings.xml")? {
            Some(xml) => parse_shared_strings(&xml)?,
            None => Vec::new(),
        };

        let sheet_path = first_sheet_path(&mut archive)?
            .unwrap_or_else(|| "xl/worksheets/sheet1.xml".to_string());
        let sheet_xml = read_entry(&mut archive, &sheet_path)?
            .ok_or_else(|| DatasetError::Xml(format!("worksheet '{}' is missing", sheet_path)))?;

        let mut grid = parse_sheet(&sheet_xml, &shared_strings)?.into_values();
        let header = grid.next().ok_or(DatasetError::Empty)?;
        let rows = grid.collect();

        Ok(Self::from_parts(header, rows))
    }

    /// Builds a rectangular dataset: every row is padded to the widest row and
    /// blank headers are named `Unnamed: {index}`.
    fn from_parts(header: Vec<Cell>, mut rows: Vec<Vec<Cell>>) -> Self {
        let width = rows
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(header.len()))
            .max()
            .unwrap_or(0);

        let columns = (0..width)
            .map(|i| match header.get(i).map(Cell::display) {
                Some(name) if !name.is_empty() => name,
                _ => format!("Unnamed: {}", i),
            })
            .collect();

        for row in rows.iter_mut() {
            row.resize(width, Cell::Empty);
        }

        Self { columns, rows }
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All cells of the named column, top to bottom
    pub fn column(&self, name: &str) -> Option<Vec<&Cell>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| &row[idx]).collect())
    }
}

fn read_entry(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
    name: &str,
) -> Result<Option<String>, DatasetError> {
    match archive.by_name(name) {
        Ok(mut file) => {
            let mut content = String::new();
            file.read_to_string(&mut content)?;
            Ok(Some(content))
        }
        Err(ZipError::FileNotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn attribute(e: &quick_xml::events::BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .map(|a| String::from_utf8_lossy(&a.value).to_string())
}

fn resolve_entity(name: &[u8]) -> Option<char> {
    match name {
        b"amp" => Some('&'),
        b"lt" => Some('<'),
        b"gt" => Some('>'),
        b"quot" => Some('"'),
        b"apos" => Some('\''),
        _ => {
            let name = std::str::from_utf8(name).ok()?;
            let code = if let Some(hex) = name.strip_prefix("#x") {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                name.strip_prefix('#')?.parse().ok()?
            };
            char::from_u32(code)
        }
    }
}

/// Worksheet path of the first `<sheet>` in the workbook, via its relationship id
fn first_sheet_path(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
) -> Result<Option<String>, DatasetError> {
    let Some(workbook) = read_entry(archive, "xl/workbook.xml")? else {
        return Ok(None);
    };
    let Some(rels) = read_entry(archive, "xl/_rels/workbook.xml.rels")? else {
        return Ok(None);
    };

    let mut rel_id = None;
    let mut reader = Reader::from_str(&workbook);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"sheet" => {
                rel_id = attribute(&e, b"r:id");
                break;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(DatasetError::Xml(e.to_string())),
            _ => (),
        }
        buf.clear();
    }
    let Some(rel_id) = rel_id else {
        return Ok(None);
    };

    let mut reader = Reader::from_str(&rels);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e))
                if e.local_name().as_ref() == b"Relationship"
                    && attribute(&e, b"Id").as_deref() == Some(rel_id.as_str()) =>
            {
                return Ok(attribute(&e, b"Target").map(|target| {
                    match target.strip_prefix('/') {
                        Some(absolute) => absolute.to_string(),
                        None => format!("xl/{}", target),
                    }
                }));
            }
            Ok(Event::Eof) => return Ok(None),
            Err(e) => return Err(DatasetError::Xml(e.to_string())),
            _ => (),
        }
        buf.clear();
    }
}

fn parse_shared_strings(xml: &str) -> Result<Vec<String>, DatasetError> {
    let mut strings = Vec::new();
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    let mut in_phonetic = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current.clear(),
                b"t" => in_text = true,
                b"rPh" => in_phonetic = true,
                _ => (),
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Ok(Event::Text(e)) if in_text && !in_phonetic => {
                current.push_str(&String::from_utf8_lossy(e.as_ref()));
            }
            Ok(Event::GeneralRef(e)) if in_text && !in_phonetic => {
                if let Some(c) = resolve_entity(&e) {
                    current.push(c);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"si" => strings.push(std::mem::take(&mut current)),
                b"t" => in_text = false,
                b"rPh" => in_phonetic = false,
                _ => (),
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(DatasetError::Xml(e.to_string())),
            _ => (),
        }
        buf.clear();
    }

    Ok(strings)
}

/// Largest worksheet the OOXML format allows (`XFD1048576`)
const MAX_COLUMNS: usize = 16_384;
const MAX_ROWS: usize = 1_048_576;

/// Splits an `A1`-style reference into zero-based (row, column).
/// Malformed references yield `None`; references past the worksheet limits are an error.
fn cell_position(reference: &str) -> Result<Option<(usize, usize)>, DatasetError> {
    let split = reference
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(reference.len());
    let (letters, digits) = reference.split_at(split);
    if letters.is_empty() || digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(None);
    }

    let out_of_range =
        || DatasetError::Xml(format!("cell reference '{}' is outside the worksheet", reference));

    let col = letters
        .bytes()
        .try_fold(0usize, |acc, b| {
            acc.checked_mul(26)?
                .checked_add(usize::from(b.to_ascii_uppercase() - b'A') + 1)
        })
        .filter(|col| *col <= MAX_COLUMNS)
        .ok_or_else(out_of_range)?;
    let row = digits
        .parse::<usize>()
        .ok()
        .filter(|row| *row <= MAX_ROWS)
        .ok_or_else(out_of_range)?;

    Ok(row.checked_sub(1).map(|row| (row, col - 1)))
}

/// Position of a `<c>` element, falling back to the running cursor when it has no usable `r`
fn locate_cell(
    e: &quick_xml::events::BytesStart<'_>,
    current_row: usize,
    next_col: usize,
) -> Result<(usize, usize), DatasetError> {
    let position = match attribute(e, b"r") {
        Some(r) => cell_position(&r)?,
        None => None,
    };
    let (row, col) = position.unwrap_or((current_row, next_col));
    if col >= MAX_COLUMNS {
        return Err(DatasetError::Xml(format!(
            "row {} has more than {} columns",
            row + 1,
            MAX_COLUMNS
        )));
    }
    Ok((row, col))
}

struct PendingCell {
    row: usize,
    col: usize,
    kind: Option<String>,
    value: String,
}

impl PendingCell {
    fn finish(self, shared_strings: &[String]) -> Cell {
        match self.kind.as_deref() {
            Some("s") => self
                .value
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|i| shared_strings.get(i))
                .map(|s| Cell::Text(s.clone()))
                .unwrap_or(Cell::Empty),
            Some("b") => Cell::Text(if self.value.trim() == "1" { "TRUE" } else { "FALSE" }.into()),
            Some("str") | Some("inlineStr") | Some("e") => {
                if self.value.is_empty() {
                    Cell::Empty
                } else {
                    Cell::Text(self.value)
                }
            }
            _ => Cell::parse(&self.value),
        }
    }
}

/// Reads the sheet into rows keyed by zero-based row index; gaps inside a row are `Empty`
fn parse_sheet(
    xml: &str,
    shared_strings: &[String],
) -> Result<BTreeMap<usize, Vec<Cell>>, DatasetError> {
    let mut grid: BTreeMap<usize, HashMap<usize, Cell>> = BTreeMap::new();
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();

    let mut current_row = 0usize;
    let mut next_col = 0usize;
    let mut pending: Option<PendingCell> = None;
    let mut capturing = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => {
                    if let Some(r) = attribute(&e, b"r").and_then(|r| r.parse::<usize>().ok()) {
                        current_row = r.saturating_sub(1);
                    }
                    next_col = 0;
                }
                b"c" => {
                    let (row, col) = locate_cell(&e, current_row, next_col)?;
                    next_col = col + 1;
                    pending = Some(PendingCell {
                        row,
                        col,
                        kind: attribute(&e, b"t"),
                        value: String::new(),
                    });
                }
                b"v" | b"t" => capturing = pending.is_some(),
                _ => (),
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"row" => {
                    if let Some(r) = attribute(&e, b"r").and_then(|r| r.parse::<usize>().ok()) {
                        current_row = r;
                    } else {
                        current_row += 1;
                    }
                }
                b"c" => {
                    let (_, col) = locate_cell(&e, current_row, next_col)?;
                    next_col = col + 1;
                }
                _ => (),
            },
            Ok(Event::Text(e)) if capturing => {
                if let Some(cell) = pending.as_mut() {
                    cell.value.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::GeneralRef(e)) if capturing => {
                if let (Some(cell), Some(c)) = (pending.as_mut(), resolve_entity(&e)) {
                    cell.value.push(c);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => capturing = false,
                b"c" => {
                    if let Some(cell) = pending.take() {
                        let (row, col) = (cell.row, cell.col);
                        let value = cell.finish(shared_strings);
                        if value != Cell::Empty {
                            grid.entry(row).or_default().insert(col, value);
                        }
                    }
                }
                b"row" => current_row += 1,
                _ => (),
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(DatasetError::Xml(e.to_string())),
            _ => (),
        }
        buf.clear();
    }

    Ok(grid
        .into_iter()
        .map(|(row, cells)| {
            let width = cells.keys().max().map(|c| c + 1).unwrap_or(0);
            let mut values = vec![Cell::Empty; width];
            for (col, cell) in cells {
                values[col] = cell;
            }
            (row, values)
        })
        .collect())
}
