use crate::spreadsheet::reference::index_to_reference;
use chrono::Duration;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use std::fmt::Display;

/// Types of cell data in spreadsheet files.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub(crate) enum CellType {
    #[default]
    Empty,
    /// Boolean values stored as `1`/`0`
    Boolean,
    /// Numeric values
    Number,
    /// Date/time values stored as numbers from 1900 epoch
    NumberDateTime1900,
    /// Date values stored as numbers from 1900 epoch
    NumberDate1900,
    /// Time values stored as numbers from 1900 epoch
    NumberTime1900,
    /// Date/time values stored as numbers from 1904 epoch
    NumberDateTime1904,
    /// Date values stored as numbers from 1904 epoch
    NumberDate1904,
    /// Time values stored as numbers from 1904 epoch
    NumberTime1904,
    /// ISO 8601 date/time strings (`t="d"` cells)
    IsoDateTime,
    /// Plain text, already resolved from the shared string table when needed
    Text,
    /// Shared string table index, resolved by the reader before the cell is stored
    SharedString,
    /// Error values such as `#N/A`
    Error,
}

impl CellType {
    /// Parses built-in Excel number format IDs to determine cell type.
    pub(crate) fn parse_builtin_number_format_id(id: &str, is_1904: bool) -> Option<Self> {
        match id {
            "22" => Some(Self::date_time(is_1904)),
            "14" | "15" | "16" | "17" => Some(Self::date(is_1904)),
            "18" | "19" | "20" | "21" | "45" | "46" | "47" => Some(Self::time(is_1904)),
            _ => None,
        }
    }

    /// Parses custom number format strings to determine cell type.
    /// Date and time letters inside quoted literals, escapes and `[...]` sections are ignored.
    pub(crate) fn parse_custom_number_format(format: &str, is_1904: bool) -> Self {
        let mut is_escaped = false;
        let mut is_literal = false;
        let mut is_bracket = false;
        let mut is_date = false;
        let mut is_time = false;
        for character in format.chars() {
            match character {
                _ if is_escaped => is_escaped = false,
                '_' | '\\' => is_escaped = true,

                '"' if is_literal => is_literal = false,
                '"' if !is_bracket => is_literal = true,

                ']' if is_bracket => is_bracket = false,
                '[' if !is_literal => is_bracket = true,
                _ if is_literal || is_bracket => (),

                'Y' | 'y' | 'D' | 'd' => is_date = true,
                'H' | 'h' | 'S' | 's' => is_time = true,
                _ => (),
            }
        }

        match (is_date, is_time) {
            (true, true) => Self::date_time(is_1904),
            (true, false) => Self::date(is_1904),
            (false, true) => Self::time(is_1904),
            (false, false) => Self::Number,
        }
    }

    fn date_time(is_1904: bool) -> Self {
        if is_1904 { Self::NumberDateTime1904 } else { Self::NumberDateTime1900 }
    }

    fn date(is_1904: bool) -> Self {
        if is_1904 { Self::NumberDate1904 } else { Self::NumberDate1900 }
    }

    fn time(is_1904: bool) -> Self {
        if is_1904 { Self::NumberTime1904 } else { Self::NumberTime1900 }
    }
}

/// Converts Excel error codes to their display strings.
pub(crate) fn to_error_value(value: u8) -> &'static str {
    match value {
        0x00 => "#NULL!",
        0x07 => "#DIV/0!",
        0x0F => "#VALUE!",
        0x17 => "#REF!",
        0x1D => "#NAME?",
        0x24 => "#NUM!",
        0x2A => "#N/A",
        0x2B => "#GETTING_DATA",
        _ => "#ERROR!",
    }
}

/// A single non-empty cell with its position, type and raw value.
#[derive(Clone, Debug)]
pub(crate) struct Cell {
    /// Row index (0-based)
    pub(crate) row: usize,
    /// Column index (0-based)
    pub(crate) col: usize,
    pub(crate) kind: CellType,
    /// Raw value as stored in the file
    pub(crate) value: String,
}

impl Cell {
    /// Returns the Excel-style cell reference (e.g., "A1", "B2").
    pub(crate) fn reference(&self) -> String {
        index_to_reference(self.row, self.col)
    }
}

impl Display for Cell {
    /// Renders the cell as text. Serial dates that cannot be converted keep their raw value.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rendered = match self.kind {
            CellType::Boolean => Some(if self.value == "1" { "true" } else { "false" }.to_owned()),
            CellType::NumberDateTime1900 => serial_to_datetime(&self.value, false).map(|it| it.format("%Y-%m-%d %H:%M:%S").to_string()),
            CellType::NumberDateTime1904 => serial_to_datetime(&self.value, true).map(|it| it.format("%Y-%m-%d %H:%M:%S").to_string()),
            CellType::NumberDate1900 => serial_to_datetime(&self.value, false).map(|it| it.format("%Y-%m-%d").to_string()),
            CellType::NumberDate1904 => serial_to_datetime(&self.value, true).map(|it| it.format("%Y-%m-%d").to_string()),
            CellType::NumberTime1900 | CellType::NumberTime1904 => serial_to_datetime(&self.value, false).map(|it| it.format("%H:%M:%S").to_string()),
            CellType::IsoDateTime => Some(self.value.replace('T', " ")),
            _ => None,
        };
        write!(f, "{}", rendered.as_deref().unwrap_or(&self.value))
    }
}

/// Converts an Excel serial number to a date/time, rounded to the millisecond.
/// Serials below 60 in the 1900 system are shifted by a day to undo the Lotus 1-2-3 leap year bug.
fn serial_to_datetime(value: &str, is_1904: bool) -> Option<NaiveDateTime> {
    let serial = value.trim().parse::<f64>().ok()?;
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let epoch = if is_1904 {
        NaiveDate::from_ymd_opt(1904, 1, 1)?
    } else if serial < 60.0 {
        NaiveDate::from_ymd_opt(1899, 12, 31)?
    } else {
        NaiveDate::from_ymd_opt(1899, 12, 30)?
    };
    let milliseconds = (serial * 86_400_000f64).round() as i64;
    epoch.and_hms_opt(0, 0, 0)?.checked_add_signed(Duration::milliseconds(milliseconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(kind: CellType, value: &str) -> Cell {
        Cell { row: 1, col: 2, kind, value: value.to_owned() }
    }

    #[test]
    fn detects_custom_date_formats() {
        assert_eq!(CellType::parse_custom_number_format("yyyy-mm-dd", false), CellType::NumberDate1900);
        assert_eq!(CellType::parse_custom_number_format("dd/mm/yyyy hh:mm", true), CellType::NumberDateTime1904);
        assert_eq!(CellType::parse_custom_number_format("hh:mm:ss", false), CellType::NumberTime1900);
        assert_eq!(CellType::parse_custom_number_format("\"Days\" 0.00", false), CellType::Number);
        assert_eq!(CellType::parse_custom_number_format("[Red]0.00", false), CellType::Number);
        assert_eq!(CellType::parse_builtin_number_format_id("14", false), Some(CellType::NumberDate1900));
        assert_eq!(CellType::parse_builtin_number_format_id("2", false), None);
    }

    #[test]
    fn renders_dates() {
        assert_eq!(cell(CellType::NumberDate1900, "45292").to_string(), "2024-01-01");
        assert_eq!(cell(CellType::NumberDateTime1900, "45292.5").to_string(), "2024-01-01 12:00:00");
        assert_eq!(cell(CellType::NumberDate1904, "0").to_string(), "1904-01-01");
        assert_eq!(cell(CellType::NumberDate1900, "1").to_string(), "1900-01-01");
        assert_eq!(cell(CellType::NumberTime1900, "0.75").to_string(), "18:00:00");
        assert_eq!(cell(CellType::IsoDateTime, "2024-03-01T08:30:00").to_string(), "2024-03-01 08:30:00");
    }

    #[test]
    fn renders_other_kinds() {
        assert_eq!(cell(CellType::Boolean, "1").to_string(), "true");
        assert_eq!(cell(CellType::Boolean, "0").to_string(), "false");
        assert_eq!(cell(CellType::Error, "#N/A").to_string(), "#N/A");
        assert_eq!(cell(CellType::Number, "12.50").to_string(), "12.50");
        assert_eq!(cell(CellType::NumberDate1900, "not a date").to_string(), "not a date");
        assert_eq!(cell(CellType::Text, "x").reference(), "C2");
    }
}
