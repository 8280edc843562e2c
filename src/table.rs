//! Delimited text parsing
//!
//! A small, tolerant parser for the loosely structured tables GPS loggers
//! export. The first record is the header; every later record becomes a
//! row addressable by header name. The delimiter can be given explicitly or
//! guessed from the first line.

use std::ops::ControlFlow;
use thiserror::Error;
use tracing::{debug, trace};

/// Delimiters recognized when guessing
pub const RECOGNIZED_DELIMITERS: [char; 3] = [',', ';', '\t'];

/// Delimiter used when the first line contains none of the recognized ones
pub const DEFAULT_DELIMITER: char = ',';

const QUOTE: char = '"';

/// Character-level parse failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A quote appeared where only a quote, delimiter or newline may follow
    #[error("unexpected quotation mark on line {line}")]
    Quotation { line: usize },

    /// Input ended inside an unterminated quoted field
    #[error("unterminated field on line {line}")]
    Generic { line: usize },
}

/// Options controlling how a table is read
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Field delimiter; guessed from the first line when `None`
    pub delimiter: Option<char>,
    /// Number of data rows to skip after the header
    pub skip_rows: usize,
    /// Maximum number of data rows to read
    pub row_limit: Option<usize>,
}

/// Parsed table: one header plus data rows of the same width
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    delimiter: char,
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

/// Borrowed view of one data row
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    header: &'a [String],
    cells: &'a [String],
}

impl<'a> Row<'a> {
    /// Cell under the given header name
    pub fn get(&self, name: &str) -> Option<&'a str> {
        self.header
            .iter()
            .position(|h| h == name)
            .map(|idx| self.cells[idx].as_str())
    }

    /// Cell at a column index
    pub fn cell(&self, index: usize) -> Option<&'a str> {
        self.cells.get(index).map(String::as_str)
    }

    /// Iterate `(header, cell)` pairs in column order
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.header
            .iter()
            .map(String::as_str)
            .zip(self.cells.iter().map(String::as_str))
    }
}

impl Table {
    /// Parse delimited text
    pub fn parse(text: &str, options: &ParseOptions) -> Result<Self, ParseError> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let delimiter = options.delimiter.unwrap_or_else(|| guess_delimiter(text));
        debug!(delimiter = ?delimiter, "Parsing delimited text");

        let mut header: Option<Vec<String>> = None;
        let mut rows = Vec::new();
        let mut seen = 0usize;

        parse_records(text, delimiter, |record| {
            let Some(header) = header.as_ref() else {
                header = Some(record);
                return ControlFlow::Continue(());
            };

            seen += 1;
            if seen <= options.skip_rows {
                return ControlFlow::Continue(());
            }

            if options.row_limit.is_some_and(|limit| rows.len() >= limit) {
                return ControlFlow::Break(());
            }

            let mut cells = record;
            cells.resize(header.len(), String::new());
            rows.push(cells);
            ControlFlow::Continue(())
        })?;

        let header = header.unwrap_or_default();
        trace!(columns = header.len(), rows = rows.len(), "Parsed table");

        Ok(Self {
            delimiter,
            header,
            rows,
        })
    }

    /// Delimiter the table was parsed with
    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    /// Header names in column order
    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Number of data rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterate data rows
    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(|cells| Row {
            header: &self.header,
            cells,
        })
    }

    /// Serialize back to delimited text, quoting cells only where needed
    pub fn to_delimited(&self) -> String {
        let mut out = String::new();
        for record in std::iter::once(&self.header).chain(self.rows.iter()) {
            let line: Vec<String> = record
                .iter()
                .map(|cell| quote_cell(cell, self.delimiter))
                .collect();
            out.push_str(&line.join(&self.delimiter.to_string()));
            out.push('\n');
        }
        out
    }
}

/// Guess the delimiter from the first line of `text`
///
/// Quoted spans are skipped; the first recognized delimiter outside quotes
/// wins, falling back to a comma.
pub fn guess_delimiter(text: &str) -> char {
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\n' | '\r' => break,
            QUOTE => {
                // Skip to the closing quote, treating "" as an escaped quote
                while let Some(q) = chars.next() {
                    match q {
                        QUOTE if chars.peek() == Some(&QUOTE) => {
                            chars.next();
                        }
                        QUOTE | '\n' | '\r' => break,
                        _ => {}
                    }
                }
            }
            c if RECOGNIZED_DELIMITERS.contains(&c) => return c,
            _ => {}
        }
    }
    DEFAULT_DELIMITER
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    FieldStart,
    Unquoted,
    Quoted,
    QuotedQuote,
}

/// Drive the parser state machine, handing each complete record to `on_record`
fn parse_records<F>(text: &str, delimiter: char, mut on_record: F) -> Result<(), ParseError>
where
    F: FnMut(Vec<String>) -> ControlFlow<()>,
{
    let mut state = State::FieldStart;
    let mut fields: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut line = 1usize;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        let is_newline = c == '\n' || c == '\r';
        // CRLF is one line break, except inside quotes where it is kept verbatim
        if c == '\r' && state != State::Quoted && chars.peek() == Some(&'\n') {
            chars.next();
        }

        match state {
            State::FieldStart => {
                if c == QUOTE {
                    state = State::Quoted;
                } else if c == delimiter {
                    fields.push(std::mem::take(&mut field));
                } else if is_newline {
                    // Blank lines carry no record
                    if !fields.is_empty() {
                        fields.push(std::mem::take(&mut field));
                        if on_record(std::mem::take(&mut fields)).is_break() {
                            return Ok(());
                        }
                    }
                } else if c.is_whitespace() {
                    // Leading whitespace before a field is ignored
                } else {
                    field.push(c);
                    state = State::Unquoted;
                }
            }
            State::Unquoted => {
                if c == delimiter {
                    fields.push(std::mem::take(&mut field));
                    state = State::FieldStart;
                } else if is_newline {
                    fields.push(std::mem::take(&mut field));
                    state = State::FieldStart;
                    if on_record(std::mem::take(&mut fields)).is_break() {
                        return Ok(());
                    }
                } else {
                    field.push(c);
                }
            }
            State::Quoted => {
                if c == QUOTE {
                    state = State::QuotedQuote;
                } else {
                    field.push(c);
                }
            }
            State::QuotedQuote => {
                if c == QUOTE {
                    field.push(QUOTE);
                    state = State::Quoted;
                } else if c == delimiter {
                    fields.push(std::mem::take(&mut field));
                    state = State::FieldStart;
                } else if is_newline {
                    fields.push(std::mem::take(&mut field));
                    state = State::FieldStart;
                    if on_record(std::mem::take(&mut fields)).is_break() {
                        return Ok(());
                    }
                } else {
                    return Err(ParseError::Quotation { line });
                }
            }
        }

        if is_newline {
            line += 1;
        }
    }

    match state {
        State::Quoted => Err(ParseError::Generic { line }),
        State::FieldStart if fields.is_empty() => Ok(()),
        _ => {
            fields.push(field);
            let _ = on_record(fields);
            Ok(())
        }
    }
}

fn quote_cell(cell: &str, delimiter: char) -> String {
    let needs_quotes = cell.contains(delimiter)
        || cell.contains(QUOTE)
        || cell.contains('\n')
        || cell.contains('\r')
        || cell.starts_with(char::is_whitespace);

    if needs_quotes {
        format!("\"{}\"", cell.replace(QUOTE, "\"\""))
    } else {
        cell.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Table {
        Table::parse(text, &ParseOptions::default()).unwrap()
    }

    #[test]
    fn test_guess_delimiter() {
        assert_eq!(guess_delimiter("a,b,c\n1,2,3"), ',');
        assert_eq!(guess_delimiter("a;b;c"), ';');
        assert_eq!(guess_delimiter("a\tb\tc"), '\t');
        assert_eq!(guess_delimiter("single"), ',');
        // Delimiters inside quotes are ignored
        assert_eq!(guess_delimiter("\"x,y\";z"), ';');
        assert_eq!(guess_delimiter("\"a \"\"q\"\", b\"\tc"), '\t');
        // Only the first line is scanned
        assert_eq!(guess_delimiter("abc\n1;2"), ',');
    }

    #[test]
    fn test_parse_basic() {
        let table = parse("time,lat,lon\n1,2,3\n4,5,6\n");
        assert_eq!(table.header(), &["time", "lat", "lon"]);
        assert_eq!(table.len(), 2);

        let rows: Vec<_> = table.rows().collect();
        assert_eq!(rows[0].get("lat"), Some("2"));
        assert_eq!(rows[1].get("lon"), Some("6"));
        assert_eq!(rows[1].get("missing"), None);
    }

    #[test]
    fn test_parse_semicolon_and_crlf() {
        let table = parse("a;b\r\n1;2\r\n3;4");
        assert_eq!(table.delimiter(), ';');
        assert_eq!(table.len(), 2);
        let last = table.rows().last().unwrap();
        assert_eq!(last.get("b"), Some("4"));
    }

    #[test]
    fn test_parse_quoted_fields() {
        let table = parse("name,note\n\"Smith, J\",\"said \"\"hi\"\"\"\n\"multi\nline\",x\n");
        let rows: Vec<_> = table.rows().collect();
        assert_eq!(rows[0].get("name"), Some("Smith, J"));
        assert_eq!(rows[0].get("note"), Some("said \"hi\""));
        assert_eq!(rows[1].get("name"), Some("multi\nline"));
    }

    #[test]
    fn test_leading_whitespace_ignored() {
        let table = parse("a, b\n  1,   2\n");
        assert_eq!(table.header(), &["a", "b"]);
        let row = table.rows().next().unwrap();
        assert_eq!(row.get("a"), Some("1"));
        assert_eq!(row.get("b"), Some("2"));
    }

    #[test]
    fn test_short_rows_padded() {
        let table = parse("a,b,c\n1\n1,2,3,4\n");
        let rows: Vec<_> = table.rows().collect();
        assert_eq!(rows[0].get("b"), Some(""));
        assert_eq!(rows[0].get("c"), Some(""));
        assert_eq!(rows[1].get("c"), Some("3"));
        assert_eq!(rows[1].iter().count(), 3);
    }

    #[test]
    fn test_trailing_delimiter_and_blank_lines() {
        let table = parse("a,b\n\n1,\n\n");
        assert_eq!(table.len(), 1);
        let row = table.rows().next().unwrap();
        assert_eq!(row.get("a"), Some("1"));
        assert_eq!(row.get("b"), Some(""));
    }

    #[test]
    fn test_quotation_error() {
        let err = Table::parse("a,b\n\"x\"y,2\n", &ParseOptions::default()).unwrap_err();
        assert_eq!(err, ParseError::Quotation { line: 2 });
    }

    #[test]
    fn test_unterminated_quote_is_generic_error() {
        let err = Table::parse("a,b\n\"open,2\n", &ParseOptions::default()).unwrap_err();
        assert!(matches!(err, ParseError::Generic { .. }));
    }

    #[test]
    fn test_row_window() {
        let text = "n\n0\n1\n2\n3\n4\n";
        let options = ParseOptions {
            delimiter: None,
            skip_rows: 1,
            row_limit: Some(2),
        };
        let table = Table::parse(text, &options).unwrap();
        let values: Vec<_> = table.rows().filter_map(|r| r.get("n")).collect();
        assert_eq!(values, vec!["1", "2"]);
    }

    #[test]
    fn test_zero_row_limit_reads_header_only() {
        let options = ParseOptions {
            row_limit: Some(0),
            ..Default::default()
        };
        let table = Table::parse("n\n0\n1\n2\n", &options).unwrap();
        assert_eq!(table.header(), &["n"]);
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_explicit_delimiter_overrides_guess() {
        let options = ParseOptions {
            delimiter: Some(';'),
            ..Default::default()
        };
        let table = Table::parse("a,b;c\n1,2;3\n", &options).unwrap();
        assert_eq!(table.header(), &["a,b", "c"]);
    }

    #[test]
    fn test_byte_order_mark_stripped() {
        let table = parse("\u{feff}time,lat\n1,2\n");
        assert_eq!(table.header()[0], "time");
    }

    #[test]
    fn test_reserialize_roundtrip() {
        let text = "time\tlat\tnote\n1\t2.5\t\"tab\there\"\n3\t-4\tplain\n";
        let table = parse(text);
        assert_eq!(table.delimiter(), '\t');

        let reparsed = Table::parse(&table.to_delimited(), &ParseOptions::default()).unwrap();
        assert_eq!(reparsed, table);
        assert_eq!(reparsed.to_delimited(), "time\tlat\tnote\n1\t2.5\t\"tab\there\"\n3\t-4\tplain\n");
    }
}
