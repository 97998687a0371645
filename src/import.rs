//! Bulk ingestion pipeline.
//!
//! Loads semi-structured tabular exports into the catalog in one pass:
//!
//! ```text
//! bytes → decode → tokenize → validate rows → stage → one bulk insert
//! ```
//!
//! Rows are positional: code, name, description, price; extra columns are
//! ignored. Malformed rows are rejected individually and never abort the
//! batch. The staged rows go to the Catalog Store in a single
//! insert-or-ignore-on-duplicate-code call, so already-present codes are
//! counted as duplicates, and a store connectivity failure aborts the
//! whole batch with nothing committed.
//!
//! Rows stay untyped `Vec<String>` tuples only up to validation; the
//! staging buffer holds [`ProductDraft`]s exclusively.

use tracing::warn;

use crate::catalog::CatalogStore;
use crate::error::CatalogResult;
use crate::models::{ImportSummary, ProductDraft, RejectReason, RejectedRow};

const CODE_IDX: usize = 0;
const NAME_IDX: usize = 1;
const DESCRIPTION_IDX: usize = 2;
const PRICE_IDX: usize = 3;
const MIN_COLUMNS: usize = 4;

/// Run the full pipeline over one raw export.
///
/// The first row is a header and is discarded. Row numbers in the
/// returned summary are 1-based data-row numbers.
pub async fn ingest(catalog: &CatalogStore, raw: &[u8]) -> CatalogResult<ImportSummary> {
    let text = decode(raw);
    let records = tokenize(text.trim_start_matches('\u{feff}'));

    let mut summary = ImportSummary::default();
    let mut staged: Vec<ProductDraft> = Vec::new();

    // Skip the header row; everything after it is data.
    for (row_number, cells) in records.iter().skip(1).enumerate() {
        let row_number = row_number + 1;

        if cells.len() < MIN_COLUMNS {
            summary.rejected.push(RejectedRow {
                row: row_number,
                reason: RejectReason::InsufficientColumns,
            });
            continue;
        }

        let Some(price) = parse_price(&cells[PRICE_IDX]) else {
            summary.rejected.push(RejectedRow {
                row: row_number,
                reason: RejectReason::InvalidPrice,
            });
            continue;
        };

        match ProductDraft::new(
            &cells[CODE_IDX],
            &cells[NAME_IDX],
            Some(&cells[DESCRIPTION_IDX]),
            price,
        ) {
            Ok(draft) => staged.push(draft),
            Err(_) => summary.rejected.push(RejectedRow {
                row: row_number,
                reason: RejectReason::MissingField,
            }),
        }
    }

    summary.committed = catalog.bulk_insert_ignore_duplicates(&staged).await?;
    summary.duplicates = staged.len() as u64 - summary.committed;
    Ok(summary)
}

/// Decode raw bytes to text. Primary decoding is UTF-8 (lossy); when that
/// produces replacement characters the bytes are re-decoded as
/// Windows-1252, the encoding of legacy Excel exports.
///
/// The heuristic is imprecise — a genuine UTF-8 file containing U+FFFD
/// would also trigger it — but it is what the exports in the wild need.
fn decode(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    if text.contains('\u{fffd}') {
        warn!("input is not valid UTF-8; falling back to Windows-1252");
        decode_windows_1252(raw)
    } else {
        text.into_owned()
    }
}

/// Windows-1252 to Unicode. Identical to Latin-1 except for 0x80..=0x9F.
const CP1252_HIGH: [char; 32] = [
    '\u{20ac}', '\u{0081}', '\u{201a}', '\u{0192}', '\u{201e}', '\u{2026}', '\u{2020}',
    '\u{2021}', '\u{02c6}', '\u{2030}', '\u{0160}', '\u{2039}', '\u{0152}', '\u{008d}',
    '\u{017d}', '\u{008f}', '\u{0090}', '\u{2018}', '\u{2019}', '\u{201c}', '\u{201d}',
    '\u{2022}', '\u{2013}', '\u{2014}', '\u{02dc}', '\u{2122}', '\u{0161}', '\u{203a}',
    '\u{0153}', '\u{009d}', '\u{017e}', '\u{0178}',
];

fn decode_windows_1252(raw: &[u8]) -> String {
    raw.iter()
        .map(|&b| match b {
            0x80..=0x9f => CP1252_HIGH[(b - 0x80) as usize],
            _ => b as char,
        })
        .collect()
}

/// Delimiter-aware, quote-respecting tokenizer.
///
/// Comma delimiter, `"` quoting with `""` escapes, LF / CRLF / CR row
/// breaks. A quoted field may contain delimiters and line breaks without
/// being split. Blank lines produce no row.
fn tokenize(text: &str) -> Vec<Vec<String>> {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
            continue;
        }

        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => row.push(std::mem::take(&mut field)),
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                end_row(&mut rows, &mut row, &mut field);
            }
            '\n' => end_row(&mut rows, &mut row, &mut field),
            _ => field.push(c),
        }
    }
    end_row(&mut rows, &mut row, &mut field);

    rows
}

fn end_row(rows: &mut Vec<Vec<String>>, row: &mut Vec<String>, field: &mut String) {
    if row.is_empty() && field.is_empty() {
        return;
    }
    row.push(std::mem::take(field));
    rows.push(std::mem::take(row));
}

/// Parse a price cell: strip currency symbols and spacing, normalize the
/// decimal separator, reject anything non-finite or negative.
///
/// When a comma is present, dots are thousands separators and the comma
/// is the decimal separator (`1.234,56` → 1234.56); otherwise the dot is
/// the decimal separator (`10.50` → 10.5).
fn parse_price(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | '€' | '£' | ' ' | '\u{a0}'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let normalized = if cleaned.contains(',') {
        cleaned.replace('.', "").replace(',', ".")
    } else {
        cleaned
    };

    let value: f64 = normalized.parse().ok()?;
    (value.is_finite() && value >= 0.0).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_plain_rows() {
        let rows = tokenize("a,b,c\nd,e,f\n");
        assert_eq!(rows, vec![vec!["a", "b", "c"], vec!["d", "e", "f"]]);
    }

    #[test]
    fn tokenize_keeps_quoted_delimiters_together() {
        let rows = tokenize("A1,\"Bolt, hex\",\"3/8\"\" head\",10\n");
        assert_eq!(
            rows,
            vec![vec!["A1", "Bolt, hex", "3/8\" head", "10"]]
        );
    }

    #[test]
    fn tokenize_handles_crlf_and_blank_lines() {
        let rows = tokenize("a,b\r\n\r\nc,d\r\n");
        assert_eq!(rows, vec![vec!["a", "b"], vec!["c", "d"]]);
    }

    #[test]
    fn tokenize_quoted_line_break_stays_in_field() {
        let rows = tokenize("a,\"line1\nline2\",c\n");
        assert_eq!(rows, vec![vec!["a", "line1\nline2", "c"]]);
    }

    #[test]
    fn tokenize_preserves_trailing_empty_field() {
        let rows = tokenize("a,b,\n");
        assert_eq!(rows, vec![vec!["a", "b", ""]]);
    }

    #[test]
    fn decode_falls_back_to_windows_1252() {
        // "Niño" with 0xF1 is invalid UTF-8 but valid Windows-1252.
        let raw = b"Ni\xf1o";
        assert_eq!(decode(raw), "Niño");
    }

    #[test]
    fn decode_keeps_valid_utf8() {
        assert_eq!(decode("Niño €5".as_bytes()), "Niño €5");
    }

    #[test]
    fn decode_maps_cp1252_punctuation() {
        // 0x93/0x94 are curly quotes, 0x85 an ellipsis in Windows-1252.
        assert_eq!(decode(b"\x93ok\x94\x85"), "\u{201c}ok\u{201d}\u{2026}");
    }

    #[test]
    fn parse_price_dot_decimal() {
        assert_eq!(parse_price("10.5"), Some(10.5));
        assert_eq!(parse_price(" $10.50 "), Some(10.5));
    }

    #[test]
    fn parse_price_comma_decimal_with_thousands() {
        assert_eq!(parse_price("1.234,56"), Some(1234.56));
        assert_eq!(parse_price("$ 1.234,56"), Some(1234.56));
        assert_eq!(parse_price("7,5"), Some(7.5));
    }

    #[test]
    fn parse_price_rejects_garbage_and_negatives() {
        assert_eq!(parse_price("abc"), None);
        assert_eq!(parse_price(""), None);
        assert_eq!(parse_price("-5"), None);
        assert_eq!(parse_price("$"), None);
    }
}
