//! Generic CSV historical source.
//!
//! One row is one RawEvent. Column positions, the datetime format and the
//! null marker are configurable; columns set to `None` are absent from the
//! file. Missing volume or open interest reads as zero, a row with a
//! missing or unparsable price or timestamp is skipped with a warning.

use crate::error::{SourceError, SourceResult};
use crate::event::{forward, BoxFuture, EventSource, SourceEvent};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use tickbar_core::{Price, RawEvent, Size};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Rows parsed per blocking read.
const READ_BATCH: usize = 256;

/// Events parsed by one blocking read.
#[derive(Debug)]
struct Batch {
    events: Vec<RawEvent>,
    /// Set once the file is exhausted (`Ok`) or unreadable (`Err`).
    end: Option<Result<(), csv::Error>>,
}

/// Column layout and parsing options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvColumns {
    #[serde(default = "default_datetime")]
    pub datetime: Option<usize>,
    /// Separate time-of-day column, when the datetime column holds dates only.
    #[serde(default)]
    pub time: Option<usize>,
    #[serde(default = "default_open")]
    pub open: Option<usize>,
    #[serde(default = "default_high")]
    pub high: Option<usize>,
    #[serde(default = "default_low")]
    pub low: Option<usize>,
    #[serde(default = "default_close")]
    pub close: Option<usize>,
    #[serde(default = "default_volume")]
    pub volume: Option<usize>,
    #[serde(default = "default_open_interest")]
    pub open_interest: Option<usize>,
    #[serde(default = "default_dtformat")]
    pub dtformat: String,
    #[serde(default = "default_tmformat")]
    pub tmformat: String,
    /// Field value meaning "no data" (an empty field always does).
    #[serde(default = "default_null_value")]
    pub null_value: String,
    #[serde(default = "default_has_headers")]
    pub has_headers: bool,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    /// Zone the file's naive timestamps are written in; UTC when unset.
    #[serde(default)]
    pub timezone: Option<String>,
}

fn default_datetime() -> Option<usize> {
    Some(0)
}

fn default_open() -> Option<usize> {
    Some(1)
}

fn default_high() -> Option<usize> {
    Some(2)
}

fn default_low() -> Option<usize> {
    Some(3)
}

fn default_close() -> Option<usize> {
    Some(4)
}

fn default_volume() -> Option<usize> {
    Some(5)
}

fn default_open_interest() -> Option<usize> {
    Some(6)
}

fn default_dtformat() -> String {
    "%Y-%m-%d %H:%M:%S".to_string()
}

fn default_tmformat() -> String {
    "%H:%M:%S".to_string()
}

fn default_null_value() -> String {
    "NaN".to_string()
}

fn default_has_headers() -> bool {
    true
}

fn default_delimiter() -> char {
    ','
}

impl Default for CsvColumns {
    fn default() -> Self {
        Self {
            datetime: default_datetime(),
            time: None,
            open: default_open(),
            high: default_high(),
            low: default_low(),
            close: default_close(),
            volume: default_volume(),
            open_interest: default_open_interest(),
            dtformat: default_dtformat(),
            tmformat: default_tmformat(),
            null_value: default_null_value(),
            has_headers: default_has_headers(),
            delimiter: default_delimiter(),
            timezone: None,
        }
    }
}

/// Historical source reading a CSV file.
#[derive(Debug)]
pub struct CsvSource {
    name: String,
    path: PathBuf,
    columns: CsvColumns,
    tz: Option<Tz>,
    reader: csv::Reader<File>,
    rows: u64,
    skipped: u64,
}

impl CsvSource {
    /// Open `path`. Fails immediately on an unreadable file, a bad
    /// delimiter or an unknown timezone.
    pub fn open(path: impl AsRef<Path>, columns: CsvColumns) -> SourceResult<Self> {
        let path = path.as_ref().to_path_buf();
        if columns.datetime.is_none() {
            return Err(SourceError::InvalidConfig(
                "datetime column is required".to_string(),
            ));
        }
        let delimiter = u8::try_from(columns.delimiter).map_err(|_| {
            SourceError::InvalidConfig(format!("delimiter {:?} is not ASCII", columns.delimiter))
        })?;
        let tz = columns
            .timezone
            .as_deref()
            .map(|name| {
                name.parse::<Tz>()
                    .map_err(|e| SourceError::InvalidConfig(format!("timezone {name}: {e}")))
            })
            .transpose()?;

        let reader = csv::ReaderBuilder::new()
            .has_headers(columns.has_headers)
            .delimiter(delimiter)
            .trim(csv::Trim::All)
            .flexible(true)
            .from_path(&path)?;

        info!(path = %path.display(), "CSV source opened");
        Ok(Self {
            name: path.display().to_string(),
            path,
            columns,
            tz,
            reader,
            rows: 0,
            skipped: 0,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn field<'r>(&self, record: &'r csv::StringRecord, col: Option<usize>) -> Option<&'r str> {
        let value = record.get(col?)?;
        if value.is_empty() || value == self.columns.null_value {
            None
        } else {
            Some(value)
        }
    }

    fn price(
        &self,
        record: &csv::StringRecord,
        col: Option<usize>,
        what: &str,
    ) -> SourceResult<Price> {
        let raw = self
            .field(record, col)
            .ok_or_else(|| SourceError::Parse(format!("missing {what}")))?;
        raw.parse()
            .map_err(|e| SourceError::Parse(format!("{what} {raw:?}: {e}")))
    }

    fn size(
        &self,
        record: &csv::StringRecord,
        col: Option<usize>,
        what: &str,
    ) -> SourceResult<Size> {
        match self.field(record, col) {
            None => Ok(Size::ZERO),
            Some(raw) => raw
                .parse()
                .map_err(|e| SourceError::Parse(format!("{what} {raw:?}: {e}"))),
        }
    }

    fn timestamp(&self, record: &csv::StringRecord) -> SourceResult<DateTime<Utc>> {
        let date = self
            .field(record, self.columns.datetime)
            .ok_or_else(|| SourceError::Parse("missing datetime".to_string()))?;

        let naive = match self.field(record, self.columns.time) {
            Some(time) => {
                let format = format!("{} {}", self.columns.dtformat, self.columns.tmformat);
                NaiveDateTime::parse_from_str(&format!("{date} {time}"), &format)
            }
            None => NaiveDateTime::parse_from_str(date, &self.columns.dtformat).or_else(|e| {
                // Date-only formats carry no time of day.
                NaiveDate::parse_from_str(date, &self.columns.dtformat)
                    .map(|d| d.and_time(chrono::NaiveTime::MIN))
                    .map_err(|_| e)
            }),
        }
        .map_err(|e| SourceError::Parse(format!("datetime {date:?}: {e}")))?;

        match self.tz {
            Some(tz) => tz
                .from_local_datetime(&naive)
                .earliest()
                .map(|local| local.with_timezone(&Utc))
                .ok_or_else(|| SourceError::Parse(format!("{naive} does not exist in {tz}"))),
            None => Ok(Utc.from_utc_datetime(&naive)),
        }
    }

    /// Parse one row into an event.
    pub fn parse_record(&self, record: &csv::StringRecord) -> SourceResult<RawEvent> {
        Ok(RawEvent {
            timestamp: self.timestamp(record)?,
            open: self.price(record, self.columns.open, "open")?,
            high: self.price(record, self.columns.high, "high")?,
            low: self.price(record, self.columns.low, "low")?,
            close: self.price(record, self.columns.close, "close")?,
            volume: self.size(record, self.columns.volume, "volume")?,
            open_interest: self.size(record, self.columns.open_interest, "open interest")?,
        })
    }

    /// Read up to `limit` rows. Blocks on file I/O.
    fn read_batch(&mut self, limit: usize) -> Batch {
        let mut record = csv::StringRecord::new();
        let mut events = Vec::with_capacity(limit);
        while events.len() < limit {
            match self.reader.read_record(&mut record) {
                Ok(true) => {}
                Ok(false) => {
                    return Batch {
                        events,
                        end: Some(Ok(())),
                    }
                }
                Err(e) => {
                    return Batch {
                        events,
                        end: Some(Err(e)),
                    }
                }
            }
            self.rows += 1;
            match self.parse_record(&record) {
                Ok(event) => events.push(event),
                Err(e) => {
                    self.skipped += 1;
                    warn!(path = %self.path.display(), row = self.rows, %e, "Skipping CSV row");
                }
            }
        }
        Batch { events, end: None }
    }
}

impl EventSource for CsvSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(
        self: Box<Self>,
        tx: mpsc::Sender<SourceEvent>,
        shutdown: CancellationToken,
    ) -> BoxFuture<'static, SourceResult<()>> {
        Box::pin(async move {
            let mut source = self;
            loop {
                // File reads stay off the async workers
                let (returned, batch) = tokio::task::spawn_blocking(move || {
                    let batch = source.read_batch(READ_BATCH);
                    (source, batch)
                })
                .await
                .map_err(std::io::Error::from)?;
                source = returned;

                for event in batch.events {
                    if !forward(&tx, &shutdown, SourceEvent::Event(event)).await {
                        return Ok(());
                    }
                }

                match batch.end {
                    None => {}
                    Some(Ok(())) => break,
                    Some(Err(e)) => {
                        // Broken encoding or I/O: report like a dropped transport.
                        let reason = format!("{}: {e}", source.path.display());
                        forward(&tx, &shutdown, SourceEvent::Disconnected(reason)).await;
                        return Err(e.into());
                    }
                }
            }

            debug!(
                path = %source.path.display(),
                rows = source.rows,
                skipped = source.skipped,
                "CSV exhausted"
            );
            forward(&tx, &shutdown, SourceEvent::EndOfStream).await;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::spawn_source;
    use rust_decimal_macros::dec;
    use std::io::Write;
    use tickbar_core::FeedId;

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn record(fields: &[&str]) -> csv::StringRecord {
        csv::StringRecord::from(fields.to_vec())
    }

    #[test]
    fn test_default_layout() {
        let file = write_csv("Date,Open,High,Low,Close,Volume,OpenInterest\n");
        let source = CsvSource::open(file.path(), CsvColumns::default()).unwrap();

        let ev = source
            .parse_record(&record(&[
                "2024-01-02 09:30:00",
                "100",
                "101.5",
                "99.25",
                "101",
                "1200",
                "7",
            ]))
            .unwrap();
        assert_eq!(ev.timestamp.to_rfc3339(), "2024-01-02T09:30:00+00:00");
        assert_eq!(ev.high.inner(), dec!(101.5));
        assert_eq!(ev.low.inner(), dec!(99.25));
        assert_eq!(ev.volume.inner(), dec!(1200));
        assert_eq!(ev.open_interest.inner(), dec!(7));
    }

    #[test]
    fn test_null_volume_reads_zero() {
        let file = write_csv("");
        let columns = CsvColumns {
            open_interest: None,
            ..CsvColumns::default()
        };
        let source = CsvSource::open(file.path(), columns).unwrap();

        let ev = source
            .parse_record(&record(&["2024-01-02 09:30:00", "1", "1", "1", "1", "NaN"]))
            .unwrap();
        assert_eq!(ev.volume, Size::ZERO);
        assert_eq!(ev.open_interest, Size::ZERO);
    }

    #[test]
    fn test_missing_price_is_parse_error() {
        let file = write_csv("");
        let source = CsvSource::open(file.path(), CsvColumns::default()).unwrap();

        let res = source.parse_record(&record(&["2024-01-02 09:30:00", "1", "", "1", "1"]));
        assert!(matches!(res, Err(SourceError::Parse(_))));
    }

    #[test]
    fn test_separate_time_column_and_timezone() {
        let file = write_csv("");
        let columns = CsvColumns {
            datetime: Some(0),
            time: Some(1),
            open: Some(2),
            high: Some(3),
            low: Some(4),
            close: Some(5),
            volume: None,
            open_interest: None,
            dtformat: "%Y%m%d".to_string(),
            tmformat: "%H%M%S".to_string(),
            timezone: Some("America/New_York".to_string()),
            ..CsvColumns::default()
        };
        let source = CsvSource::open(file.path(), columns).unwrap();

        let ev = source
            .parse_record(&record(&["20240102", "093000", "1", "1", "1", "1"]))
            .unwrap();
        assert_eq!(ev.timestamp.to_rfc3339(), "2024-01-02T14:30:00+00:00");
    }

    #[test]
    fn test_date_only_format() {
        let file = write_csv("");
        let columns = CsvColumns {
            dtformat: "%Y-%m-%d".to_string(),
            ..CsvColumns::default()
        };
        let source = CsvSource::open(file.path(), columns).unwrap();
        let ev = source
            .parse_record(&record(&["2024-01-02", "1", "1", "1", "1"]))
            .unwrap();
        assert_eq!(ev.timestamp.to_rfc3339(), "2024-01-02T00:00:00+00:00");
    }

    #[test]
    fn test_open_rejects_bad_timezone() {
        let file = write_csv("");
        let columns = CsvColumns {
            timezone: Some("Mars/Olympus".to_string()),
            ..CsvColumns::default()
        };
        assert!(matches!(
            CsvSource::open(file.path(), columns),
            Err(SourceError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_open_missing_file() {
        let res = CsvSource::open("/nonexistent/bars.csv", CsvColumns::default());
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn test_run_streams_rows_and_skips_bad_ones() {
        let file = write_csv(
            "Date,Open,High,Low,Close,Volume,OpenInterest\n\
             2024-01-02 09:30:00,100,101,99,100.5,10,0\n\
             not-a-date,1,1,1,1,1,0\n\
             2024-01-02 09:31:00,100.5,102,100,101,12,0\n",
        );
        let source = CsvSource::open(file.path(), CsvColumns::default()).unwrap();
        let mut handle = spawn_source(
            FeedId::PRIMARY,
            Box::new(source),
            8,
            CancellationToken::new(),
        );

        let mut events = Vec::new();
        while let Some(item) = handle.rx.recv().await {
            events.push(item);
        }
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], SourceEvent::Event(_)));
        assert!(matches!(events[1], SourceEvent::Event(_)));
        assert_eq!(events[2], SourceEvent::EndOfStream);
    }

    #[tokio::test]
    async fn test_run_spans_several_reads_in_order() {
        let rows = READ_BATCH * 2 + 17;
        let mut contents = String::from("Date,Open,High,Low,Close,Volume,OpenInterest\n");
        for i in 0..rows {
            let ts = Utc.timestamp_opt(1_704_187_800 + i as i64, 0).unwrap();
            contents.push_str(&format!("{},{i},{i},{i},{i},1,0\n", ts.format("%Y-%m-%d %H:%M:%S")));
        }
        let file = write_csv(&contents);
        let source = CsvSource::open(file.path(), CsvColumns::default()).unwrap();
        let mut handle = spawn_source(
            FeedId::PRIMARY,
            Box::new(source),
            1,
            CancellationToken::new(),
        );

        let mut closes = Vec::new();
        while let Some(item) = handle.rx.recv().await {
            match item {
                SourceEvent::Event(ev) => closes.push(ev.close.inner()),
                SourceEvent::EndOfStream => break,
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(closes.len(), rows);
        assert!(closes.windows(2).all(|w| w[0] < w[1]));
        handle.task.await.unwrap();
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let mut contents = String::from("Date,Open,High,Low,Close,Volume,OpenInterest\n");
        for i in 0..READ_BATCH * 2 {
            contents.push_str(&format!("2024-01-02 09:30:{:02},1,1,1,1,1,0\n", i % 60));
        }
        let file = write_csv(&contents);
        let source = CsvSource::open(file.path(), CsvColumns::default()).unwrap();
        let shutdown = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(1);
        let task = tokio::spawn(Box::new(source).run(tx, shutdown.clone()));

        assert!(matches!(rx.recv().await, Some(SourceEvent::Event(_))));
        shutdown.cancel();
        assert!(task.await.unwrap().is_ok());
        // Only what was already buffered, never the end marker
        while let Some(item) = rx.recv().await {
            assert!(matches!(item, SourceEvent::Event(_)));
        }
    }
}
