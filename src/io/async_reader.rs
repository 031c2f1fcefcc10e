//! Asynchronous CSV reader with batch interface
//!
//! Reads replay commands from a CSV source in batches, for the async replay
//! strategy.
//!
//! # Design
//!
//! The AsyncReader uses:
//! - csv-async for streaming CSV parsing
//! - the same `csv_format` conversion as the synchronous reader
//!
//! ```text
//! CSV source → AsyncReader → Batches of CommandRecords
//!                  ↓
//!           csv_format module
//!           (CsvRecord, convert_csv_record)
//! ```

use crate::io::csv_format::{convert_csv_record, CsvRecord};
use crate::types::{CommandRecord, LedgerError};
use csv_async::AsyncReaderBuilder;
use futures::io::AsyncRead;
use futures::stream::StreamExt;

/// Asynchronous CSV reader
///
/// Memory use is bounded by the batch size, not the file size.
pub struct AsyncReader<R: AsyncRead + Unpin> {
    csv_reader: csv_async::AsyncDeserializer<R>,
    line_num: u64,
}

impl<R: AsyncRead + Unpin + Send + 'static> AsyncReader<R> {
    /// Create a new AsyncReader over an async byte source
    pub fn new(reader: R) -> Self {
        let csv_reader = AsyncReaderBuilder::new()
            .flexible(true)
            .trim(csv_async::Trim::All)
            .create_deserializer(reader);

        Self {
            csv_reader,
            line_num: 1,
        }
    }

    /// Read up to `batch_size` commands
    ///
    /// Rows that cannot be parsed or converted are logged with their line
    /// number and skipped.
    ///
    /// # Returns
    ///
    /// The successfully converted commands, in file order. An empty vector
    /// means the end of the input was reached.
    pub async fn read_batch(&mut self, batch_size: usize) -> Vec<CommandRecord> {
        let mut batch = Vec::with_capacity(batch_size);
        let mut records = self.csv_reader.deserialize::<CsvRecord>();

        while batch.len() < batch_size {
            let Some(next) = records.next().await else {
                break;
            };
            self.line_num += 1;

            let converted = next
                .map_err(LedgerError::from)
                .and_then(convert_csv_record);
            match converted {
                Ok(command) => batch.push(command),
                Err(error) => {
                    tracing::warn!(line = self.line_num, %error, "Skipping malformed record")
                }
            }
        }

        batch
    }
}
