use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{BudgetError, ParseError, Result};
use crate::models::Transaction;
use crate::repository::ClassificationRepo;

const BOM: char = '\u{feff}';

// ---------------------------------------------------------------------------
// Statement format
// ---------------------------------------------------------------------------

/// Column names of the bank export. Defaults match the Danish bank layout:
/// `Bogføringsdato;Beløb;Afsender;Modtager;Navn;Beskrivelse;Saldo;Valuta;Afstemt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Columns {
    pub date: String,
    pub amount: String,
    pub description: String,
    pub balance: Option<String>,
}

impl Default for Columns {
    fn default() -> Self {
        Self {
            date: "Bogføringsdato".to_string(),
            amount: "Beløb".to_string(),
            description: "Beskrivelse".to_string(),
            balance: Some("Saldo".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatementFormat {
    pub delimiter: char,
    pub columns: Columns,
}

impl Default for StatementFormat {
    fn default() -> Self {
        Self {
            delimiter: ';',
            columns: Columns::default(),
        }
    }
}

impl StatementFormat {
    fn delimiter_byte(&self) -> Result<u8> {
        u8::try_from(self.delimiter)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| {
                BudgetError::Settings(format!("delimiter must be ASCII, got {:?}", self.delimiter))
            })
    }
}

// ---------------------------------------------------------------------------
// Raw records
// ---------------------------------------------------------------------------

/// One statement line: header name to the untouched field text.
pub type RawRecord = HashMap<String, String>;

/// Lazily yields one [`RawRecord`] per data line, in file order.
/// Exhausted readers cannot be rewound; open the file again to re-read.
pub struct StatementReader<R: Read> {
    headers: Vec<String>,
    records: csv::StringRecordsIntoIter<R>,
}

impl<R: Read> StatementReader<R> {
    pub fn from_reader(reader: R, format: &StatementFormat) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(format.delimiter_byte()?)
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);
        let headers = rdr
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches(BOM).trim().to_string())
            .collect();
        Ok(Self {
            headers,
            records: rdr.into_records(),
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }
}

impl<R: Read> Iterator for StatementReader<R> {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = match self.records.next()? {
            Ok(record) => record,
            Err(e) => return Some(Err(e.into())),
        };
        let raw = self
            .headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.clone(), v.to_string()))
            .collect();
        Some(Ok(raw))
    }
}

pub fn load_csv(path: &Path, format: &StatementFormat) -> Result<StatementReader<BufReader<File>>> {
    let file = File::open(path)?;
    StatementReader::from_reader(BufReader::new(file), format)
}

// ---------------------------------------------------------------------------
// Row parsing
// ---------------------------------------------------------------------------

fn date_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:(\d{4})-(\d{1,2})-(\d{1,2})|(\d{1,2})-(\d{1,2})-(\d{4}))$")
            .expect("date pattern compiles")
    })
}

fn amount_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[+-]?\d+(?:\.\d+)?$").expect("amount pattern compiles"))
}

/// Dot-grouped thousands without decimals: `1.234`, `-12.345.678`.
fn grouped_thousands_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[+-]?\d{1,3}(?:\.\d{3})+$").expect("grouping pattern compiles"))
}

fn clean(raw: &str) -> String {
    raw.trim_matches(|c: char| c == BOM || c.is_whitespace()).to_string()
}

/// `2022/08/29` (year first) or `29/08/2022` (day first) to a date.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let normalized = clean(raw).replace('/', "-");
    let caps = date_pattern().captures(&normalized)?;
    let num = |i: usize| caps.get(i).map(|m| m.as_str());
    let (y, m, d) = match (num(1), num(2), num(3)) {
        (Some(y), Some(m), Some(d)) => (y, m, d),
        _ => (num(6)?, num(5)?, num(4)?),
    };
    NaiveDate::from_ymd_opt(y.parse().ok()?, m.parse().ok()?, d.parse().ok()?)
}

/// Decimal-comma amount (`-25,00`, `1.234,56`, `1.234`) to an exact decimal.
/// `.` is always a thousands separator when it groups three digits.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let mut s: String = clean(raw)
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if s.contains(',') || grouped_thousands_pattern().is_match(&s) {
        s = s.replace('.', "").replace(',', ".");
    }
    if !amount_pattern().is_match(&s) {
        return None;
    }
    Decimal::from_str(&s).ok()
}

/// Never appears in statement text; keeps field boundaries in the hash.
const FIELD_SEPARATOR: &[u8] = b"\x1f";

/// SHA-256 over the raw field text, before any normalization.
pub fn content_hash(fields: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            hasher.update(FIELD_SEPARATOR);
        }
        hasher.update(field.as_bytes());
    }
    hex::encode(hasher.finalize())
}

fn field<'r>(record: &'r RawRecord, column: &str) -> std::result::Result<&'r str, ParseError> {
    record
        .get(column)
        .map(String::as_str)
        .ok_or_else(|| ParseError::MissingColumn(column.to_string()))
}

pub fn parse_row(
    record: &RawRecord,
    columns: &Columns,
) -> std::result::Result<Transaction, ParseError> {
    let raw_date = field(record, &columns.date)?;
    let raw_amount = field(record, &columns.amount)?;
    let raw_description = field(record, &columns.description)?;
    let raw_balance = columns
        .balance
        .as_deref()
        .and_then(|col| record.get(col).map(|v| (col, v.as_str())));

    let hash = content_hash(&[
        raw_date,
        raw_amount,
        raw_description,
        raw_balance.map_or("", |(_, v)| v),
    ]);

    let date = parse_date(raw_date).ok_or_else(|| ParseError::InvalidDate {
        field: columns.date.clone(),
        value: raw_date.to_string(),
    })?;
    let amount = parse_amount(raw_amount).ok_or_else(|| ParseError::InvalidAmount {
        field: columns.amount.clone(),
        value: raw_amount.to_string(),
    })?;
    let balance = match raw_balance {
        Some((_, v)) if clean(v).is_empty() => None,
        Some((col, v)) => Some(parse_amount(v).ok_or_else(|| ParseError::InvalidAmount {
            field: col.to_string(),
            value: v.to_string(),
        })?),
        None => None,
    };

    Ok(Transaction {
        hash,
        date,
        amount,
        description: clean(raw_description),
        balance,
    })
}

/// Parsed transactions of a statement file, one per data line.
pub fn read_transactions(
    path: &Path,
    format: &StatementFormat,
) -> Result<impl Iterator<Item = Result<Transaction>>> {
    let columns = format.columns.clone();
    let reader = load_csv(path, format)?;
    for required in [&columns.date, &columns.amount, &columns.description] {
        if !reader.headers().contains(required) {
            return Err(ParseError::MissingColumn(required.clone()).into());
        }
    }
    Ok(reader.map(move |record: Result<RawRecord>| -> Result<Transaction> {
        Ok(parse_row(&record?, &columns)?)
    }))
}

// ---------------------------------------------------------------------------
// import_file
// ---------------------------------------------------------------------------

/// What to do with a row that does not parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowPolicy {
    Abort,
    Skip,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportResult {
    pub imported: usize,
    pub duplicates: usize,
    pub invalid: usize,
}

pub fn import_file(
    conn: &Connection,
    file_path: &Path,
    format: &StatementFormat,
    policy: RowPolicy,
) -> Result<ImportResult> {
    let mut transactions = Vec::new();
    let mut invalid = 0usize;

    // Header is line 1.
    for (idx, row) in read_transactions(file_path, format)?.enumerate() {
        let line = idx + 2;
        match row {
            Ok(txn) => {
                tracing::debug!(line, balance = ?txn.balance, "parsed {txn}");
                transactions.push(txn);
            }
            Err(BudgetError::Parse(e)) if policy == RowPolicy::Skip => {
                tracing::warn!(line, field = e.field(), "skipping row: {e}");
                invalid += 1;
            }
            Err(BudgetError::Parse(e)) => {
                return Err(BudgetError::InvalidRow { line, source: e });
            }
            Err(e) => return Err(e),
        }
    }

    let parsed = transactions.len();
    let inserted = ClassificationRepo::new(conn).add_expenses(&transactions)?;
    let result = ImportResult {
        imported: inserted.len(),
        duplicates: parsed - inserted.len(),
        invalid,
    };
    tracing::info!(
        file = %file_path.display(),
        imported = result.imported,
        duplicates = result.duplicates,
        invalid = result.invalid,
        "import finished"
    );
    Ok(result)
}
