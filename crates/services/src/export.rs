//! Streams report rows as a CSV download, one encoded row per chunk.

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use tracing::{error, info};

use crate::error::ReportError;
use crate::report::{ReportKind, ReportRows};

pub const CSV_CONTENT_TYPE: &str = "text/csv";

/// A report ready to be sent to a client.
pub struct CsvExport {
    kind: ReportKind,
    label: String,
    rows: ReportRows,
}

impl CsvExport {
    /// The filename label defaults to the kind's name.
    #[must_use]
    pub fn new(kind: ReportKind, rows: ReportRows) -> Self {
        Self {
            kind,
            label: kind.as_str().to_owned(),
            rows,
        }
    }

    /// Name the download after the selector the client asked for.
    #[must_use]
    pub fn labelled(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    #[must_use]
    pub fn kind(&self) -> ReportKind {
        self.kind
    }

    #[must_use]
    pub fn content_type(&self) -> &'static str {
        CSV_CONTENT_TYPE
    }

    #[must_use]
    pub fn filename(&self) -> String {
        format!("videoanalytics_{}.csv", self.label)
    }

    #[must_use]
    pub fn content_disposition(&self) -> String {
        format!("attachment; filename=\"{}\"", self.filename())
    }

    /// Consume the rows in order, encoding each one as it arrives. The stream
    /// ends after the first error.
    #[must_use]
    pub fn into_byte_stream(self) -> BoxStream<'static, Result<Bytes, ReportError>> {
        let kind = self.kind;
        stream::unfold(Some((self.rows, 0_usize)), move |state| async move {
            let (mut rows, written) = state?;
            match rows.next().await {
                Some(Ok(row)) => match encode_row(&row) {
                    Ok(chunk) => Some((Ok(chunk), Some((rows, written + 1)))),
                    Err(err) => Some((Err(err), None)),
                },
                Some(Err(err)) => {
                    error!(report = %kind, rows = written, %err, "report stream failed");
                    Some((Err(err), None))
                }
                None => {
                    info!(report = %kind, rows = written, "report stream finished");
                    None
                }
            }
        })
        .boxed()
    }
}

/// Encode one record with standard CSV quoting and a CRLF terminator.
///
/// # Errors
///
/// Returns `ReportError::Csv` if the record cannot be written.
pub fn encode_row<I, T>(row: I) -> Result<Bytes, ReportError>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(Vec::with_capacity(128));
    writer.write_record(row)?;
    let buf = writer
        .into_inner()
        .map_err(|e| ReportError::Flush(e.error().to_string()))?;
    Ok(Bytes::from(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::repository::StorageError;

    fn rows(items: Vec<Result<Vec<&'static str>, ReportError>>) -> ReportRows {
        stream::iter(
            items
                .into_iter()
                .map(|r| r.map(|row| row.into_iter().map(str::to_owned).collect())),
        )
        .boxed()
    }

    async fn collect(export: CsvExport) -> Vec<Result<Bytes, ReportError>> {
        export.into_byte_stream().collect().await
    }

    #[test]
    fn filename_follows_report_kind() {
        let export = CsvExport::new(ReportKind::Values, rows(vec![]));
        assert_eq!(export.filename(), "videoanalytics_values.csv");
        assert_eq!(
            export.content_disposition(),
            "attachment; filename=\"videoanalytics_values.csv\""
        );
        assert_eq!(export.content_type(), "text/csv");
    }

    #[test]
    fn label_overrides_the_filename_only() {
        let export = CsvExport::new(ReportKind::Metadata, rows(vec![])).labelled("key");
        assert_eq!(export.filename(), "videoanalytics_key.csv");
        assert_eq!(export.kind(), ReportKind::Metadata);
    }

    #[test]
    fn fields_with_commas_and_quotes_are_quoted() {
        let chunk = encode_row(["plain", "a,b", "say \"hi\""]).unwrap();
        assert_eq!(&chunk[..], b"plain,\"a,b\",\"say \"\"hi\"\"\"\r\n");
    }

    #[tokio::test]
    async fn each_row_becomes_one_chunk() {
        let export = CsvExport::new(
            ReportKind::Metadata,
            rows(vec![Ok(vec!["h1", "h2"]), Ok(vec!["1", "2"]), Ok(vec!["3", "4"])]),
        );
        let chunks: Vec<Bytes> = collect(export)
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(&chunks[1][..], b"1,2\r\n");
    }

    #[tokio::test]
    async fn stream_stops_after_first_error() {
        let export = CsvExport::new(
            ReportKind::Values,
            rows(vec![
                Ok(vec!["h"]),
                Err(ReportError::Storage(StorageError::Connection("gone".into()))),
                Ok(vec!["never"]),
            ]),
        );
        let out = collect(export).await;
        assert_eq!(out.len(), 2);
        assert!(out[0].is_ok());
        assert!(matches!(out[1], Err(ReportError::Storage(_))));
    }
}
