//! xlsx package writer
//!
//! A new file gets the smallest OPC package Excel and calamine accept: content
//! types, package and workbook relationships, a workbook part and one
//! worksheet part per sheet. An existing file is patched instead: only the
//! worksheet that changed is regenerated, every other part (styles, shared
//! strings, other sheets with their formulas) is copied through as stored.
//! Text is written as inline strings so the shared string table never needs
//! to change.

use crate::range::cell_ref;
use quick_xml::events::Event;
use quick_xml::Reader;
use sheetdb_common::{Result, SheetDbError};
use sheetdb_validation::CellValue;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const SPREADSHEET_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const PACKAGE_REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const WORKSHEET_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
const OFFICE_DOCUMENT_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
const WORKSHEET_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml";
const CALC_CHAIN_SUFFIX: &str = "/calcChain";

const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";

/// Sheets in tab order, each as rows of cells
pub(crate) type Sheets = Vec<(String, Vec<Vec<CellValue>>)>;

/// Persist a change to `touched`
///
/// Creates the file when it does not exist yet, otherwise patches the stored
/// package so only `touched`'s worksheet part is rewritten (or added).
pub(crate) fn save_workbook(path: &Path, sheets: &Sheets, touched: &str) -> Result<()> {
    if !path.exists() {
        return write_workbook(path, sheets);
    }
    let rows = sheets
        .iter()
        .find(|(name, _)| name == touched)
        .map(|(_, rows)| rows)
        .ok_or_else(|| SheetDbError::Internal(format!("sheet '{}' is not loaded", touched)))?;
    patch_workbook(path, touched, rows)
}

/// Write a fresh workbook to `path`, replacing it through a temp file
pub(crate) fn write_workbook(path: &Path, sheets: &Sheets) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension("xlsx.tmp");
    {
        let file = File::create(&tmp)?;
        let mut zip = ZipWriter::new(BufWriter::new(file));
        let options = deflated();

        zip.start_file(CONTENT_TYPES_PART, options)?;
        zip.write_all(content_types(sheets.len()).as_bytes())?;

        zip.start_file("_rels/.rels", options)?;
        zip.write_all(package_rels().as_bytes())?;

        zip.start_file(WORKBOOK_PART, options)?;
        zip.write_all(workbook(sheets).as_bytes())?;

        zip.start_file(WORKBOOK_RELS_PART, options)?;
        zip.write_all(workbook_rels(sheets.len()).as_bytes())?;

        for (i, (_, rows)) in sheets.iter().enumerate() {
            zip.start_file(format!("xl/worksheets/sheet{}.xml", i + 1), options)?;
            zip.write_all(worksheet(rows).as_bytes())?;
        }

        let mut out = zip.finish()?;
        out.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn deflated() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

/// `<sheet>` entry of the workbook part
#[derive(Debug, Clone, PartialEq)]
struct SheetEntry {
    name: String,
    sheet_id: u32,
    rel_id: String,
}

/// `<Relationship>` entry of a rels part
#[derive(Debug, Clone, PartialEq)]
struct Relationship {
    id: String,
    rel_type: String,
    target: String,
    target_mode: Option<String>,
}

/// `[Content_Types].xml` as `(Extension, type)` defaults and
/// `(PartName, type)` overrides
#[derive(Debug, Default, PartialEq)]
struct ContentTypes {
    defaults: Vec<(String, String)>,
    overrides: Vec<(String, String)>,
}

/// Rewrite one worksheet of an existing package, copying every other part
fn patch_workbook(path: &Path, sheet: &str, rows: &[Vec<CellValue>]) -> Result<()> {
    let mut archive = ZipArchive::new(File::open(path)?)?;
    let part_names: HashSet<String> = archive.file_names().map(str::to_string).collect();

    let mut workbook_xml = read_part(&mut archive, WORKBOOK_PART)?;
    let mut rels = parse_relationships(&read_part(&mut archive, WORKBOOK_RELS_PART)?)?;
    let mut types = parse_content_types(&read_part(&mut archive, CONTENT_TYPES_PART)?)?;
    let entries = parse_sheets(&workbook_xml)?;

    let mut dropped: HashSet<String> = HashSet::new();
    let part = match entries.iter().find(|e| e.name == sheet) {
        Some(entry) => {
            let rel = rels.iter().find(|r| r.id == entry.rel_id).ok_or_else(|| {
                SheetDbError::SheetAccess(format!(
                    "workbook has no relationship {} for sheet '{}'",
                    entry.rel_id, sheet
                ))
            })?;
            let part = part_path(&rel.target);
            // Cached formula order may name cells that are now plain values.
            if let Some(pos) = rels.iter().position(|r| r.rel_type.ends_with(CALC_CHAIN_SUFFIX)) {
                let chain = part_path(&rels.remove(pos).target);
                types.overrides.retain(|(name, _)| name.trim_start_matches('/') != chain);
                dropped.insert(chain);
            }
            part
        }
        None => {
            let mut n = entries.len() + 1;
            while part_names.contains(&format!("xl/worksheets/sheet{}.xml", n)) {
                n += 1;
            }
            let mut r = rels.len() + 1;
            while rels.iter().any(|rel| rel.id == format!("rId{}", r)) {
                r += 1;
            }
            let entry = SheetEntry {
                name: sheet.to_string(),
                sheet_id: entries.iter().map(|e| e.sheet_id).max().unwrap_or(0) + 1,
                rel_id: format!("rId{}", r),
            };
            workbook_xml = insert_sheet(&workbook_xml, &entry)?;
            rels.push(Relationship {
                id: entry.rel_id.clone(),
                rel_type: WORKSHEET_TYPE.to_string(),
                target: format!("worksheets/sheet{}.xml", n),
                target_mode: None,
            });
            let part = format!("xl/worksheets/sheet{}.xml", n);
            types
                .overrides
                .push((format!("/{}", part), WORKSHEET_CONTENT_TYPE.to_string()));
            part
        }
    };

    let tmp = path.with_extension("xlsx.tmp");
    {
        let mut zip = ZipWriter::new(BufWriter::new(File::create(&tmp)?));
        let options = deflated();
        for i in 0..archive.len() {
            let entry = archive.by_index_raw(i)?;
            let name = entry.name().to_string();
            if dropped.contains(&name) || name == part {
                continue;
            }
            match name.as_str() {
                WORKBOOK_PART => {
                    zip.start_file(name.as_str(), options)?;
                    zip.write_all(workbook_xml.as_bytes())?;
                }
                WORKBOOK_RELS_PART => {
                    zip.start_file(name.as_str(), options)?;
                    zip.write_all(render_relationships(&rels).as_bytes())?;
                }
                CONTENT_TYPES_PART => {
                    zip.start_file(name.as_str(), options)?;
                    zip.write_all(render_content_types(&types).as_bytes())?;
                }
                _ => zip.raw_copy_file(entry)?,
            }
        }
        zip.start_file(part.as_str(), options)?;
        zip.write_all(worksheet(rows).as_bytes())?;

        let mut out = zip.finish()?;
        out.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_part<R: Read + std::io::Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<String> {
    let mut xml = String::new();
    archive.by_name(name)?.read_to_string(&mut xml)?;
    Ok(xml)
}

/// Package path of a workbook relationship target
fn part_path(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target.trim_start_matches("./")),
    }
}

fn xml_error(e: impl std::fmt::Display) -> SheetDbError {
    SheetDbError::Serialization(format!("XLSX error: {}", e))
}

/// Attributes of every element whose local name is in `names`, in document
/// order
fn elements(xml: &str, names: &[&str]) -> Result<Vec<(String, Vec<(String, String)>)>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut found = Vec::new();
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let local = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if !names.contains(&local.as_str()) {
                    continue;
                }
                let mut attrs = Vec::new();
                for attr in e.attributes() {
                    let attr = attr.map_err(xml_error)?;
                    let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                    let value = attr.unescape_value().map_err(xml_error)?.into_owned();
                    attrs.push((key, value));
                }
                found.push((local, attrs));
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(found)
}

fn attr<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

fn parse_sheets(xml: &str) -> Result<Vec<SheetEntry>> {
    elements(xml, &["sheet"])?
        .into_iter()
        .map(|(_, attrs)| {
            // `r:id`, whatever the relationships prefix is
            let rel_id = attrs
                .iter()
                .find(|(k, _)| k.ends_with(":id"))
                .map(|(_, v)| v.clone());
            match (attr(&attrs, "name"), rel_id) {
                (Some(name), Some(rel_id)) => Ok(SheetEntry {
                    name: name.to_string(),
                    sheet_id: attr(&attrs, "sheetId").and_then(|v| v.parse().ok()).unwrap_or(0),
                    rel_id,
                }),
                _ => Err(xml_error("workbook sheet entry without name or r:id")),
            }
        })
        .collect()
}

fn parse_relationships(xml: &str) -> Result<Vec<Relationship>> {
    Ok(elements(xml, &["Relationship"])?
        .into_iter()
        .filter_map(|(_, attrs)| {
            Some(Relationship {
                id: attr(&attrs, "Id")?.to_string(),
                rel_type: attr(&attrs, "Type")?.to_string(),
                target: attr(&attrs, "Target")?.to_string(),
                target_mode: attr(&attrs, "TargetMode").map(str::to_string),
            })
        })
        .collect())
}

fn parse_content_types(xml: &str) -> Result<ContentTypes> {
    let mut types = ContentTypes::default();
    for (element, attrs) in elements(xml, &["Default", "Override"])? {
        let content_type = attr(&attrs, "ContentType").unwrap_or_default().to_string();
        match (element.as_str(), attr(&attrs, "Extension"), attr(&attrs, "PartName")) {
            ("Default", Some(ext), _) => types.defaults.push((ext.to_string(), content_type)),
            ("Override", _, Some(part)) => types.overrides.push((part.to_string(), content_type)),
            _ => {}
        }
    }
    Ok(types)
}

/// Add a `<sheet>` entry at the end of `<sheets>`
fn insert_sheet(workbook_xml: &str, entry: &SheetEntry) -> Result<String> {
    let end = workbook_xml
        .find("</sheets>")
        .ok_or_else(|| xml_error("workbook part has no <sheets> element"))?;
    let element = format!(
        r#"<sheet xmlns:r="{}" name="{}" sheetId="{}" r:id="{}"/>"#,
        REL_NS,
        escape(&entry.name),
        entry.sheet_id,
        escape(&entry.rel_id)
    );
    let mut xml = String::with_capacity(workbook_xml.len() + element.len());
    xml.push_str(&workbook_xml[..end]);
    xml.push_str(&element);
    xml.push_str(&workbook_xml[end..]);
    Ok(xml)
}

fn render_relationships(rels: &[Relationship]) -> String {
    let mut xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="{}">"#,
        PACKAGE_REL_NS
    );
    for rel in rels {
        let _ = write!(
            xml,
            r#"<Relationship Id="{}" Type="{}" Target="{}""#,
            escape(&rel.id),
            escape(&rel.rel_type),
            escape(&rel.target)
        );
        if let Some(mode) = &rel.target_mode {
            let _ = write!(xml, r#" TargetMode="{}""#, escape(mode));
        }
        xml.push_str("/>");
    }
    xml.push_str("</Relationships>");
    xml
}

fn render_content_types(types: &ContentTypes) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
    );
    for (ext, content_type) in &types.defaults {
        let _ = write!(
            xml,
            r#"<Default Extension="{}" ContentType="{}"/>"#,
            escape(ext),
            escape(content_type)
        );
    }
    for (part, content_type) in &types.overrides {
        let _ = write!(
            xml,
            r#"<Override PartName="{}" ContentType="{}"/>"#,
            escape(part),
            escape(content_type)
        );
    }
    xml.push_str("</Types>");
    xml
}

fn content_types(sheet_count: usize) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
    );
    for i in 1..=sheet_count {
        let _ = write!(
            xml,
            r#"<Override PartName="/xl/worksheets/sheet{}.xml" ContentType="{}"/>"#,
            i,
            WORKSHEET_CONTENT_TYPE
        );
    }
    xml.push_str("</Types>");
    xml
}

fn package_rels() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="{}"><Relationship Id="rId1" Type="{}" Target="xl/workbook.xml"/></Relationships>"#,
        PACKAGE_REL_NS, OFFICE_DOCUMENT_TYPE
    )
}

fn workbook(sheets: &Sheets) -> String {
    let mut xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="{}" xmlns:r="{}"><sheets>"#,
        SPREADSHEET_NS, REL_NS
    );
    for (i, (name, _)) in sheets.iter().enumerate() {
        let _ = write!(
            xml,
            r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
            escape(name),
            i + 1,
            i + 1
        );
    }
    xml.push_str("</sheets></workbook>");
    xml
}

fn workbook_rels(sheet_count: usize) -> String {
    let mut xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="{}">"#,
        PACKAGE_REL_NS
    );
    for i in 1..=sheet_count {
        let _ = write!(
            xml,
            r#"<Relationship Id="rId{}" Type="{}" Target="worksheets/sheet{}.xml"/>"#,
            i, WORKSHEET_TYPE, i
        );
    }
    xml.push_str("</Relationships>");
    xml
}

fn worksheet(rows: &[Vec<CellValue>]) -> String {
    let mut xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="{}"><sheetData>"#,
        SPREADSHEET_NS
    );
    for (r, row) in rows.iter().enumerate() {
        let row_number = r + 1;
        let _ = write!(xml, r#"<row r="{}">"#, row_number);
        for (c, cell) in row.iter().enumerate() {
            write_cell(&mut xml, &cell_ref(row_number, c + 1), cell);
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}

fn write_cell(xml: &mut String, reference: &str, cell: &CellValue) {
    let _ = match cell {
        CellValue::Empty => Ok(()),
        CellValue::Bool(b) => write!(xml, r#"<c r="{}" t="b"><v>{}</v></c>"#, reference, u8::from(*b)),
        CellValue::Int(i) => write!(xml, r#"<c r="{}"><v>{}</v></c>"#, reference, i),
        CellValue::Float(f) if f.is_finite() => {
            write!(xml, r#"<c r="{}"><v>{}</v></c>"#, reference, f)
        }
        CellValue::Float(f) => write_text(xml, reference, &f.to_string()),
        CellValue::Text(s) if s.is_empty() => Ok(()),
        CellValue::Text(s) => write_text(xml, reference, s),
    };
}

fn write_text(xml: &mut String, reference: &str, text: &str) -> std::fmt::Result {
    let space = if text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace) {
        r#" xml:space="preserve""#
    } else {
        ""
    };
    write!(
        xml,
        r#"<c r="{}" t="inlineStr"><is><t{}>{}</t></is></c>"#,
        reference,
        space,
        escape(text)
    )
}

/// Escape text for element content and attribute values
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            // Control characters other than tab/newline are not valid XML 1.0
            c if c.is_control() && c != '\t' && c != '\n' && c != '\r' => {}
            c => out.push(c),
        }
    }
    out
}
