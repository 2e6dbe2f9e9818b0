//! Minimal single-sheet SpreadsheetML writer used for the master workbook.
//! Text is written as inline strings; numbers are written as numbers only when
//! their text survives a round trip through `f64`, so reading the file back
//! yields the exact text that was written.

use crate::error::SheetMapperError;
use crate::helpers::xml::XmlWriter;
use crate::spreadsheet::reference::index_to_reference;
use std::io::Seek;
use std::io::Write;
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;
use zip::ZipWriter;

const CONTENT_TYPES: &str = "http://schemas.openxmlformats.org/package/2006/content-types";
const PACKAGE_RELATIONSHIPS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const OFFICE_DOCUMENT: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
const WORKSHEET: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
const SPREADSHEET_ML: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const DOCUMENT_RELATIONSHIPS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const WORKBOOK_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml";
const WORKSHEET_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml";
const RELATIONSHIPS_CONTENT_TYPE: &str = "application/vnd.openxmlformats-package.relationships+xml";

/// Writes `rows` as the only worksheet of a new workbook and returns the underlying writer.
pub(crate) fn write_xlsx<W: Write + Seek>(writer: W, sheet_name: &str, rows: &[Vec<String>]) -> Result<W, SheetMapperError> {
    let mut zip = ZipWriter::new(writer);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file("[Content_Types].xml", options)?;
    zip.write_all(&content_types()?)?;
    zip.start_file("_rels/.rels", options)?;
    zip.write_all(&package_relationships()?)?;
    zip.start_file("xl/workbook.xml", options)?;
    zip.write_all(&workbook(sheet_name)?)?;
    zip.start_file("xl/_rels/workbook.xml.rels", options)?;
    zip.write_all(&workbook_relationships()?)?;
    zip.start_file("xl/worksheets/sheet1.xml", options)?;
    zip.write_all(&worksheet(rows)?)?;

    Ok(zip.finish()?)
}

fn content_types() -> Result<Vec<u8>, SheetMapperError> {
    let mut xml = XmlWriter::new(Vec::new())?;
    xml.start("Types", &[("xmlns", CONTENT_TYPES)])?;
    xml.empty("Default", &[("Extension", "rels"), ("ContentType", RELATIONSHIPS_CONTENT_TYPE)])?;
    xml.empty("Default", &[("Extension", "xml"), ("ContentType", "application/xml")])?;
    xml.empty("Override", &[("PartName", "/xl/workbook.xml"), ("ContentType", WORKBOOK_CONTENT_TYPE)])?;
    xml.empty("Override", &[("PartName", "/xl/worksheets/sheet1.xml"), ("ContentType", WORKSHEET_CONTENT_TYPE)])?;
    xml.end("Types")?;
    Ok(xml.into_inner())
}

fn package_relationships() -> Result<Vec<u8>, SheetMapperError> {
    let mut xml = XmlWriter::new(Vec::new())?;
    xml.start("Relationships", &[("xmlns", PACKAGE_RELATIONSHIPS)])?;
    xml.empty("Relationship", &[("Id", "rId1"), ("Type", OFFICE_DOCUMENT), ("Target", "xl/workbook.xml")])?;
    xml.end("Relationships")?;
    Ok(xml.into_inner())
}

fn workbook(sheet_name: &str) -> Result<Vec<u8>, SheetMapperError> {
    let mut xml = XmlWriter::new(Vec::new())?;
    xml.start("workbook", &[("xmlns", SPREADSHEET_ML), ("xmlns:r", DOCUMENT_RELATIONSHIPS)])?;
    xml.start("sheets", &[])?;
    xml.empty("sheet", &[("name", sheet_name), ("sheetId", "1"), ("r:id", "rId1")])?;
    xml.end("sheets")?;
    xml.end("workbook")?;
    Ok(xml.into_inner())
}

fn workbook_relationships() -> Result<Vec<u8>, SheetMapperError> {
    let mut xml = XmlWriter::new(Vec::new())?;
    xml.start("Relationships", &[("xmlns", PACKAGE_RELATIONSHIPS)])?;
    xml.empty("Relationship", &[("Id", "rId1"), ("Type", WORKSHEET), ("Target", "worksheets/sheet1.xml")])?;
    xml.end("Relationships")?;
    Ok(xml.into_inner())
}

fn worksheet(rows: &[Vec<String>]) -> Result<Vec<u8>, SheetMapperError> {
    let mut xml = XmlWriter::new(Vec::new())?;
    xml.start("worksheet", &[("xmlns", SPREADSHEET_ML)])?;
    xml.start("sheetData", &[])?;
    for (row, values) in rows.iter().enumerate() {
        let index = (row + 1).to_string();
        xml.start("row", &[("r", &index)])?;
        for (col, value) in values.iter().enumerate().filter(|(_, value)| !value.is_empty()) {
            let reference = index_to_reference(row, col);
            if is_canonical_number(value) {
                xml.start("c", &[("r", &reference)])?;
                xml.start("v", &[])?;
                xml.text(value)?;
                xml.end("v")?;
            } else {
                xml.start("c", &[("r", &reference), ("t", "inlineStr")])?;
                xml.start("is", &[])?;
                xml.start("t", &[("xml:space", "preserve")])?;
                xml.text(value)?;
                xml.end("t")?;
                xml.end("is")?;
            }
            xml.end("c")?;
        }
        xml.end("row")?;
    }
    xml.end("sheetData")?;
    xml.end("worksheet")?;
    Ok(xml.into_inner())
}

/// True when the text is exactly what Rust prints for the parsed number (`12`, `-0.5`, not `012` or `1.50`).
fn is_canonical_number(value: &str) -> bool {
    value
        .parse::<f64>()
        .map(|number| number.is_finite() && number.to_string() == value)
        .unwrap_or(false)
}
