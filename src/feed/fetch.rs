use crate::feed::entry::FeedEntry;
use crate::feed::parse::{parse_entries, ParseError};
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

/// Content types we accept from feed servers.
const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml,text/xml";
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while retrieving and parsing one feed document.
///
/// There is no retry here: a failed cycle is reported once and the feed's
/// next timer tick is the retry.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with a non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the 30-second timeout
    #[error("request timed out")]
    Timeout,
    /// Response body exceeded the 10MB size limit
    #[error("response too large")]
    ResponseTooLarge,
    /// Feed XML could not be parsed as RSS or Atom
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Fetches one feed document and parses it into entries.
///
/// Sends a GET with the given `User-Agent` and a fixed `Accept` list,
/// streams the body with a hard size cap, and hands the bytes to the
/// parse layer. Every returned entry has `source_url` set to `url`.
///
/// # Errors
///
/// - [`FetchError::Network`] - connection or TLS errors
/// - [`FetchError::Timeout`] - request exceeded 30 seconds
/// - [`FetchError::HttpStatus`] - non-2xx HTTP response
/// - [`FetchError::ResponseTooLarge`] - response exceeded 10MB
/// - [`FetchError::Parse`] - invalid RSS/Atom XML
pub async fn fetch_entries(
    client: &reqwest::Client,
    url: &str,
    user_agent: &str,
) -> Result<Vec<FeedEntry>, FetchError> {
    let request = client
        .get(url)
        .header(reqwest::header::USER_AGENT, user_agent)
        .header(reqwest::header::ACCEPT, ACCEPT);

    let response = tokio::time::timeout(FETCH_TIMEOUT, request.send())
        .await
        .map_err(|_| FetchError::Timeout)?
        .map_err(FetchError::Network)?;

    if !response.status().is_success() {
        return Err(FetchError::HttpStatus(response.status().as_u16()));
    }

    let bytes = read_limited_bytes(response, MAX_FEED_SIZE).await?;
    let entries = parse_entries(&bytes, url)?;
    Ok(entries)
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
