//! CSV reader with encoding and delimiter auto-detection.
//!
//! Produces a [`RawTable`] of untyped string cells. No hospital-specific
//! logic lives here; typing happens in the validator and cleaner.

use std::path::Path;

use crate::error::{CsvError, CsvResult};

/// One data row as read from the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    /// 1-based line number in the source file.
    pub line: usize,
    /// Cell values, one per header. Short rows are padded with "";
    /// long rows keep their extra cells.
    pub cells: Vec<String>,
}

/// Untyped table with parsing metadata.
#[derive(Debug, Clone)]
pub struct RawTable {
    /// Column headers as written in the file (trimmed).
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
    /// Detected or used encoding.
    pub encoding: String,
    /// Detected or used delimiter.
    pub delimiter: char,
}

impl RawTable {
    /// Cell at `column` for `row`, empty when absent.
    pub fn cell<'a>(&self, row: &'a RawRow, column: usize) -> &'a str {
        row.cells.get(column).map(String::as_str).unwrap_or("")
    }

    /// Index of a header, exact match.
    pub fn column_index(&self, header: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == header)
    }
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        other => other.to_string(),
    }
}

/// Decode bytes to string using the specified encoding
pub fn decode_content(bytes: &[u8], encoding: &str) -> CsvResult<String> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF".as_slice()).unwrap_or(bytes);

    let decoded = match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            Err(_) => String::from_utf8_lossy(bytes).into_owned(),
        },
        "iso-8859-1" | "latin-1" | "latin1" => {
            encoding_rs::ISO_8859_15.decode(bytes).0.into_owned()
        }
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        other => match encoding_rs::Encoding::for_label(other.as_bytes()) {
            Some(enc) => {
                let (text, _, had_errors) = enc.decode(bytes);
                if had_errors {
                    return Err(CsvError::EncodingError {
                        encoding: other.to_string(),
                        message: "malformed byte sequence".to_string(),
                    });
                }
                text.into_owned()
            }
            None => String::from_utf8_lossy(bytes).into_owned(),
        },
    };

    Ok(decoded)
}

/// Delimiters the parser accepts.
pub const SUPPORTED_DELIMITERS: [char; 4] = [',', ';', '\t', '|'];

/// Whether `delimiter` is one of [`SUPPORTED_DELIMITERS`].
pub fn is_supported_delimiter(delimiter: char) -> bool {
    SUPPORTED_DELIMITERS.contains(&delimiter)
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let mut best_sep = ',';
    let mut best_count = 0;

    for sep in SUPPORTED_DELIMITERS {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Parse CSV text with an explicit delimiter.
///
/// # Example
/// ```ignore
/// use influx::parser::parse_str;
///
/// let table = parse_str("Department,Year\nER,2022", ',', "utf-8".into()).unwrap();
/// assert_eq!(table.headers, vec!["Department", "Year"]);
/// assert_eq!(table.rows[0].cells, vec!["ER", "2022"]);
/// ```
pub fn parse_str(content: &str, delimiter: char, encoding: String) -> CsvResult<RawTable> {
    if !is_supported_delimiter(delimiter) {
        return Err(CsvError::UnsupportedDelimiter(delimiter));
    }

    if content.trim().is_empty() {
        return Err(CsvError::EmptyFile);
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    if headers.iter().all(|h| h.is_empty()) {
        return Err(CsvError::NoHeaders);
    }

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;

        if record.iter().all(str::is_empty) {
            continue;
        }

        let line = record.position().map(|p| p.line() as usize).unwrap_or(0);
        let mut cells: Vec<String> = record.iter().map(str::to_string).collect();
        cells.resize(headers.len().max(cells.len()), String::new());

        rows.push(RawRow { line, cells });
    }

    Ok(RawTable {
        headers,
        rows,
        encoding,
        delimiter,
    })
}

/// Parse CSV bytes with auto-detection of encoding and delimiter.
pub fn parse_bytes_auto(bytes: &[u8]) -> CsvResult<RawTable> {
    if bytes.is_empty() {
        return Err(CsvError::EmptyFile);
    }

    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding)?;
    let delimiter = detect_delimiter(&content);

    parse_str(&content, delimiter, encoding)
}

/// Parse CSV file with auto-detection of encoding and delimiter.
///
/// # Example
/// ```ignore
/// let table = parse_file_auto("/path/to/patients.csv")?;
/// println!("Encoding: {}, Delimiter: '{}'", table.encoding, table.delimiter);
/// ```
pub fn parse_file_auto<P: AsRef<Path>>(path: P) -> CsvResult<RawTable> {
    let bytes = std::fs::read(path.as_ref())?;
    parse_bytes_auto(&bytes)
}

/// Parse CSV bytes with an explicit delimiter, auto-detecting only encoding.
pub fn parse_bytes_with_delimiter(bytes: &[u8], delimiter: char) -> CsvResult<RawTable> {
    if bytes.is_empty() {
        return Err(CsvError::EmptyFile);
    }

    if !is_supported_delimiter(delimiter) {
        return Err(CsvError::UnsupportedDelimiter(delimiter));
    }

    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding)?;
    parse_str(&content, delimiter, encoding)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(csv: &str, delimiter: char) -> RawTable {
        parse_str(csv, delimiter, "utf-8".to_string()).unwrap()
    }

    #[test]
    fn test_simple_csv() {
        let table = parse("Department,Year\nER,2022\nICU,2023", ',');

        assert_eq!(table.headers, vec!["Department", "Year"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].cells, vec!["ER", "2022"]);
        assert_eq!(table.rows[1].cells, vec!["ICU", "2023"]);
    }

    #[test]
    fn test_line_numbers_follow_source() {
        let table = parse("a,b\n1,2\n\n3,4\n", ',');

        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].line, 2);
        assert_eq!(table.rows[1].line, 4);
    }

    #[test]
    fn test_quoted_values() {
        let table = parse("name;count\n\"Emergency; Adults\";\"1,200\"", ';');

        assert_eq!(table.rows[0].cells[0], "Emergency; Adults");
        assert_eq!(table.rows[0].cells[1], "1,200");
    }

    #[test]
    fn test_short_rows_padded() {
        let table = parse("a,b,c\n1,,3\n4", ',');

        assert_eq!(table.rows[0].cells, vec!["1", "", "3"]);
        assert_eq!(table.rows[1].cells, vec!["4", "", ""]);
    }

    #[test]
    fn test_cell_accessor_tolerates_missing_column() {
        let table = parse("a,b\n1,2", ',');
        let row = &table.rows[0];
        assert_eq!(table.cell(row, 1), "2");
        assert_eq!(table.cell(row, 7), "");
        assert_eq!(table.column_index("b"), Some(1));
    }

    #[test]
    fn test_empty_csv_error() {
        let result = parse_str("", ',', "utf-8".to_string());
        assert!(matches!(result, Err(CsvError::EmptyFile)));

        let result = parse_bytes_auto(b"");
        assert!(matches!(result, Err(CsvError::EmptyFile)));
    }

    #[test]
    fn test_long_rows_keep_extra_cells() {
        let table = parse("Department,Quarter,Year,Patient_Count\nER,Q1,2022,1,200", ',');
        assert_eq!(table.rows[0].cells, vec!["ER", "Q1", "2022", "1", "200"]);
    }

    #[test]
    fn test_unsupported_delimiter_rejected() {
        let result = parse_str("a\u{100}b\n1\u{100}2", '\u{100}', "utf-8".to_string());
        assert!(matches!(result, Err(CsvError::UnsupportedDelimiter('\u{100}'))));

        let result = parse_bytes_with_delimiter(b"a:b\n1:2", ':');
        assert!(matches!(result, Err(CsvError::UnsupportedDelimiter(':'))));
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), ';');
        assert_eq!(detect_delimiter("a,b,c\n1,2,3"), ',');
        assert_eq!(detect_delimiter("a\tb\tc\n1\t2\t3"), '\t');
        assert_eq!(detect_delimiter("a|b|c\n1|2|3"), '|');
        assert_eq!(detect_delimiter("single"), ',');
    }

    #[test]
    fn test_auto_parse() {
        let csv = "Department;Quarter;Year;Patient_Count\nER;Q1;2022;100";
        let table = parse_bytes_auto(csv.as_bytes()).unwrap();

        assert_eq!(table.delimiter, ';');
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.headers.len(), 4);
    }

    #[test]
    fn test_bom_is_stripped() {
        let mut bytes = b"\xEF\xBB\xBF".to_vec();
        bytes.extend_from_slice(b"Department,Year\nER,2022");
        let table = parse_bytes_auto(&bytes).unwrap();
        assert_eq!(table.headers[0], "Department");
    }

    #[test]
    fn test_latin1_decoding() {
        // "Société" in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        let decoded = decode_content(bytes, "iso-8859-1").unwrap();
        assert_eq!(decoded, "Société");
    }
}
