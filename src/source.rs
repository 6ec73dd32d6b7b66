use std::io::Read;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::SourceConfig;
use crate::error::{EngineError, Result};
use crate::types::{RawRecord, RawTable, RawValue};

/// Reads a CSV from an `http(s)://` URL or a local path.
pub async fn load(location: &str, config: &SourceConfig) -> Result<RawTable> {
    if location.starts_with("http://") || location.starts_with("https://") {
        let body = fetch_csv(location, config).await?;
        parse_csv(body.as_bytes())
    } else {
        read_csv_file(location)
    }
}

pub fn read_csv_file<P: AsRef<Path>>(path: P) -> Result<RawTable> {
    let file = std::fs::File::open(path.as_ref())?;
    let table = parse_csv(file)?;
    info!(path = %path.as_ref().display(), rows = table.len(), "loaded CSV");
    Ok(table)
}

/// Header row becomes the schema. Malformed records are skipped; only I/O
/// failures abort.
pub fn parse_csv<R: Read>(reader: R) -> Result<RawTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let columns: Vec<String> = rdr
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for record in rdr.records() {
        let record = match record {
            Ok(r) => r,
            Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => return Err(e.into()),
            Err(e) => {
                debug!(error = %e, "skipping malformed CSV record");
                skipped += 1;
                continue;
            }
        };
        let row: RawRecord = columns
            .iter()
            .zip(record.iter())
            .map(|(col, cell)| (col.clone(), RawValue::Text(cell.to_string())))
            .collect();
        rows.push(row);
    }
    if skipped > 0 {
        warn!(skipped, "skipped malformed CSV records");
    }

    Ok(RawTable { columns, rows })
}

/// GET with a per-request timeout and `config.retries` extra attempts for
/// transport errors and 5xx responses.
pub async fn fetch_csv(url: &str, config: &SourceConfig) -> Result<String> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|source| EngineError::Fetch { url: url.to_string(), source })?;

    let mut attempt = 0u32;
    loop {
        match fetch_once(&client, url).await {
            Ok(body) => {
                info!(url, bytes = body.len(), "fetched CSV");
                return Ok(body);
            }
            Err(err) if attempt < config.retries && is_retryable(&err) => {
                attempt += 1;
                warn!(url, attempt, error = %err, "fetch failed, retrying");
                tokio::time::sleep(Duration::from_millis(config.retry_delay_ms)).await;
            }
            Err(err) => return Err(err),
        }
    }
}

async fn fetch_once(client: &reqwest::Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|source| EngineError::Fetch { url: url.to_string(), source })?;

    let status = response.status();
    if !status.is_success() {
        return Err(EngineError::HttpStatus { url: url.to_string(), status: status.as_u16() });
    }

    response
        .text()
        .await
        .map_err(|source| EngineError::Fetch { url: url.to_string(), source })
}

fn is_retryable(err: &EngineError) -> bool {
    match err {
        EngineError::Fetch { .. } => true,
        EngineError::HttpStatus { status, .. } => *status >= 500,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_csv_keeps_header_as_schema() {
        let csv = "\u{feff}Stock Code,Last Trading Date,Close\nAAA,2024-01-02, 100 \nBBB,2024-01-02\n";
        let table = parse_csv(csv.as_bytes()).unwrap();
        assert_eq!(table.columns, vec!["Stock Code", "Last Trading Date", "Close"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0]["Close"], RawValue::Text("100".into()));
        // Short row: missing trailing cells are simply absent.
        assert!(!table.rows[1].contains_key("Close"));
    }

    #[test]
    fn test_retry_policy() {
        let server_error = EngineError::HttpStatus { url: "u".into(), status: 503 };
        let not_found = EngineError::HttpStatus { url: "u".into(), status: 404 };
        assert!(is_retryable(&server_error));
        assert!(!is_retryable(&not_found));
        assert!(!is_retryable(&EngineError::MissingColumn("x".into())));
    }

    #[tokio::test]
    async fn test_load_missing_file_is_io_error() {
        let err = load("/definitely/not/here.csv", &SourceConfig::default()).await.unwrap_err();
        assert!(matches!(err, EngineError::Io(_)));
    }
}
