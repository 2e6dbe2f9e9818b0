//! Microsoft Office Excel Helpers
use crate::error::SheetMapperError;
use crate::helpers::cfb::Cfb;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::SpreadsheetError;
use quick_xml::events::Event;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::io::Seek;
use std::io::SeekFrom;
use zip::ZipArchive;

/// XML tag name for relationship elements in Excel files
const TAG_RELATIONSHIP: &[u8] = b"Relationship";

pub(crate) type ExcelArchive = ZipArchive<BufReader<File>>;

/// Opens an Excel workbook archive and loads its sheet list and number formats.
///
/// Returns the archive, the cell type for each style index, and `(sheet name, zip path)` pairs.
pub(super) fn open<W, F>(file_name: &str, load_workbook: W, load_number_formats: F) -> Result<(
    ExcelArchive,
    Vec<CellType>,
    Vec<(String, String)>
), SheetMapperError>
where
    W: Fn(&mut ExcelArchive) -> Result<(Vec<(String, String)>, bool), SheetMapperError>,
    F: Fn(&mut ExcelArchive, bool) -> Result<Vec<CellType>, SheetMapperError>,
{
    let mut reader = BufReader::new(File::open(file_name)?);

    if is_password_protected(&mut reader)? {
        Err(SpreadsheetError::PasswordProtectedError(file_name.to_owned()))?;
    }

    let mut zip = ZipArchive::new(reader)?;
    let (sheets, is_1904) = load_workbook(&mut zip)?;
    if sheets.is_empty() {
        Err(SpreadsheetError::EmptyError(file_name.to_owned()))?
    }

    let number_formats = load_number_formats(&mut zip, is_1904)?;
    Ok((zip, number_formats, sheets))
}

/// Loads worksheet relationships (id to zip path) from a `.rels` part.
pub(super) fn load_relationships(zip: &mut ExcelArchive, path: &str) -> Result<HashMap<String, String>, SheetMapperError> {
    let mut reader = zip.xml_reader(path)?
        .ok_or_else(|| SpreadsheetError::FileError(path.to_string()))?;
    let mut relationships: HashMap<String, String> = HashMap::new();
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_RELATIONSHIP => {
            let id = event.get_attribute_value("Id")?;
            let kind = event.get_attribute_value("Type")?;
            let target = event.get_attribute_value("Target")?;
            if kind.map(|it| it.ends_with("/worksheet")).unwrap_or(true) {
                if let Some((id, target)) = id.zip(target) {
                    relationships.insert(id.to_string(), to_zip_path(target));
                }
            }
        }
    });
    Ok(relationships)
}

/// Maps style format ids to cell types using custom formats first, then built-in ones.
pub(super) fn load_number_formats(format_indexes: Vec<String>, custom_formats: HashMap<String, CellType>, is_1904: bool) -> Vec<CellType> {
    format_indexes
        .iter()
        .map(|id| {
            custom_formats
                .get(id)
                .copied()
                .or_else(|| CellType::parse_builtin_number_format_id(id, is_1904))
                .unwrap_or(CellType::Number)
        })
        .collect()
}

/// Normalizes a relationship target to a path inside the archive.
pub(crate) fn to_zip_path(path: Cow<'_, str>) -> String {
    if let Some(stripped) = path.strip_prefix('/') {
        stripped.to_string()
    } else if path.starts_with("xl/") {
        path.to_string()
    } else {
        format!("xl/{path}")
    }
}

/// Encrypted OOXML workbooks are CFB containers holding an `EncryptedPackage` stream.
fn is_password_protected(reader: &mut BufReader<File>) -> Result<bool, SheetMapperError> {
    let protected = Cfb::new(reader)
        .map(|cfb| cfb.exists("EncryptedPackage"))
        .unwrap_or(false);
    reader.seek(SeekFrom::Start(0))?;
    Ok(protected)
}
