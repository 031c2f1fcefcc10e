//! Synchronous CSV reader with iterator interface
//!
//! Provides a streaming iterator over replay commands from a CSV file.
//! Delegates CSV format concerns to the csv_format module.
//!
//! # Design
//!
//! The SyncReader uses csv::Reader to read and deserialize CSV records one at
//! a time, so memory use does not grow with the file.
//!
//! ```no_run
//! use rust_wallet_ledger::io::sync_reader::SyncReader;
//! use std::path::Path;
//!
//! let reader = SyncReader::new(Path::new("commands.csv")).unwrap();
//! for result in reader {
//!     match result {
//!         Ok(command) => println!("Replaying {:?}", command),
//!         Err(e) => eprintln!("Error: {}", e),
//!     }
//! }
//! ```
//!
//! # Error Handling
//!
//! - Fatal errors (file not found, I/O errors) are returned from `new()`
//! - Individual record errors are yielded as `ParseError`s carrying the line
//!   number, and iteration continues with the next record

use crate::io::csv_format::{convert_csv_record, CsvRecord};
use crate::types::{CommandRecord, LedgerError};
use csv::{ReaderBuilder, Trim};
use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;

/// Synchronous CSV reader
#[derive(Debug)]
pub struct SyncReader {
    reader: csv::Reader<File>,
    line_num: u64,
}

impl SyncReader {
    /// Open the CSV file at `path` for streaming iteration
    ///
    /// The CSV reader is configured to:
    /// - Trim whitespace from all fields
    /// - Allow flexible field counts (for the optional trailing columns)
    /// - Use an 8KB buffer
    ///
    /// # Errors
    ///
    /// `FileNotFound` if nothing exists at `path`, `IoError` if it cannot be
    /// opened for another reason.
    pub fn new(path: &Path) -> Result<Self, LedgerError> {
        let file = File::open(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => LedgerError::FileNotFound {
                path: path.display().to_string(),
            },
            _ => LedgerError::IoError {
                message: format!("Failed to open file '{}': {}", path.display(), e),
            },
        })?;

        let reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .buffer_capacity(8 * 1024)
            .from_reader(file);

        Ok(Self {
            reader,
            line_num: 1,
        })
    }
}

impl Iterator for SyncReader {
    type Item = Result<CommandRecord, LedgerError>;

    /// Get the next command from the CSV file
    ///
    /// Line numbers count the header as line 1.
    fn next(&mut self) -> Option<Self::Item> {
        let mut deserializer = self.reader.deserialize::<CsvRecord>();
        let next = deserializer.next()?;
        self.line_num += 1;
        let line = self.line_num;

        Some(match next {
            Ok(csv_record) => {
                convert_csv_record(csv_record).map_err(|e| LedgerError::ParseError {
                    line: Some(line),
                    message: e.to_string(),
                })
            }
            Err(e) => Err(LedgerError::ParseError {
                line: Some(line),
                message: e.to_string(),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CommandType;
    use rust_decimal::Decimal;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Helper function to create a temporary CSV file for testing
    fn create_temp_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(content.as_bytes())
            .expect("Failed to write to temp file");
        file.flush().expect("Failed to flush temp file");
        file
    }

    fn error_line(result: &Result<CommandRecord, LedgerError>) -> Option<u64> {
        match result {
            Err(LedgerError::ParseError { line, .. }) => *line,
            _ => None,
        }
    }

    #[test]
    fn test_sync_reader_fails_on_missing_file() {
        let result = SyncReader::new(Path::new("nonexistent.csv"));

        assert!(matches!(result, Err(LedgerError::FileNotFound { .. })));
    }

    #[test]
    fn test_sync_reader_iterates_commands() {
        let csv_content = "op,user,to_user,amount\n\
            create,1,,\n\
            deposit,1,,100.0\n\
            transfer,1,2,25\n";
        let file = create_temp_csv(csv_content);

        let records: Vec<_> = SyncReader::new(file.path())
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].op, CommandType::Create);
        assert_eq!(records[1].amount, Some(Decimal::new(1000, 1)));
        assert_eq!(records[2].op, CommandType::Transfer);
        assert_eq!(records[2].to_user, Some(2));
    }

    #[test]
    fn test_sync_reader_accepts_short_rows() {
        let csv_content = "op,user,to_user,amount\ncreate,7\n";
        let file = create_temp_csv(csv_content);

        let records: Vec<_> = SyncReader::new(file.path()).unwrap().collect();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].as_ref().unwrap().user, 7);
    }

    #[test]
    fn test_sync_reader_includes_line_numbers_in_errors() {
        let csv_content = "op,user,to_user,amount\n\
            deposit,1,,100.0\n\
            deposit,2,,invalid\n\
            deposit,x,,50.0\n\
            deposit,3,,50.0\n";
        let file = create_temp_csv(csv_content);

        let records: Vec<_> = SyncReader::new(file.path()).unwrap().collect();

        assert_eq!(records.len(), 4);
        assert!(records[0].is_ok());
        assert_eq!(error_line(&records[1]), Some(3));
        assert_eq!(error_line(&records[2]), Some(4));
        assert!(records[3].is_ok());
        assert!(records[1]
            .as_ref()
            .unwrap_err()
            .to_string()
            .contains("Invalid amount 'invalid'"));
    }

    #[test]
    fn test_sync_reader_handles_whitespace() {
        let csv_content = "op,user,to_user,amount\n  deposit  ,  1  ,  ,  100.0  \n";
        let file = create_temp_csv(csv_content);

        let records: Vec<_> = SyncReader::new(file.path()).unwrap().collect();

        let record = records[0].as_ref().unwrap();
        assert_eq!(record.user, 1);
        assert_eq!(record.amount, Some(Decimal::new(1000, 1)));
    }

    #[test]
    fn test_sync_reader_handles_empty_file_after_header() {
        let file = create_temp_csv("op,user,to_user,amount\n");

        assert_eq!(SyncReader::new(file.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_sync_reader_filter_map_pattern() {
        let csv_content = "op,user,to_user,amount\n\
            deposit,1,,100.0\n\
            refund,2,,50.0\n\
            withdraw,3,,50.0\n";
        let file = create_temp_csv(csv_content);

        let valid: Vec<_> = SyncReader::new(file.path())
            .unwrap()
            .filter_map(Result::ok)
            .collect();

        assert_eq!(valid.len(), 2);
        assert_eq!(valid[0].user, 1);
        assert_eq!(valid[1].user, 3);
    }
}
