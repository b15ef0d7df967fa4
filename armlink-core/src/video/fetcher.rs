// File: src/video/fetcher.rs

use std::time::Duration;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::trace;

use crate::Error;

/// Retrieves one encoded camera image per call.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FrameFetcher: Send + Sync {
    async fn fetch_frame(&self) -> Result<Vec<u8>, Error>;
}

/// Caps how much of an MJPEG stream is buffered while looking for the
/// first complete part.
const MAX_MULTIPART_BYTES: usize = 4 * 1024 * 1024;

/// Fetches frames over HTTP(S) with `reqwest`.
///
/// A plain image response is returned as-is. When the endpoint streams
/// `multipart/x-mixed-replace` (MJPEG), the first complete part is
/// returned and the rest of the stream is dropped.
#[derive(Clone)]
pub struct HttpFrameFetcher {
    client: reqwest::Client,
    url: String,
}

impl HttpFrameFetcher {
    pub fn new(url: impl Into<String>, timeout: Option<Duration>) -> Result<Self, Error> {
        let mut builder = reqwest::Client::builder();
        if let Some(limit) = timeout {
            builder = builder.timeout(limit);
        }
        Ok(Self {
            client: builder.build()?,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl FrameFetcher for HttpFrameFetcher {
    async fn fetch_frame(&self) -> Result<Vec<u8>, Error> {
        let mut response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Fetch(format!("{} returned {}", self.url, status)));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        if !content_type.starts_with("multipart/") {
            return Ok(response.bytes().await?.to_vec());
        }

        let mut buf = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            buf.extend_from_slice(&chunk);
            if let Some(part) = first_multipart_part(&buf) {
                trace!("[Camera] took first MJPEG part ({} bytes)", part.len());
                return Ok(part);
            }
            if buf.len() > MAX_MULTIPART_BYTES {
                return Err(Error::Fetch(format!(
                    "no complete frame within the first {} bytes of {}",
                    MAX_MULTIPART_BYTES, self.url
                )));
            }
        }
        Err(Error::Fetch(format!("{} ended before a complete frame", self.url)))
    }
}

/// Extracts the body of the first part of a multipart stream, using the
/// part's `Content-Length` header. Returns `None` until the part is fully
/// buffered.
pub fn first_multipart_part(buf: &[u8]) -> Option<Vec<u8>> {
    let header_end = find(buf, b"\r\n\r\n")?;
    let headers = std::str::from_utf8(&buf[..header_end]).ok()?;

    let length = headers.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name.trim().eq_ignore_ascii_case("content-length") {
            value.trim().parse::<usize>().ok()
        } else {
            None
        }
    })?;

    let body_start = header_end + 4;
    let body_end = body_start.checked_add(length)?;
    if buf.len() < body_end {
        return None;
    }
    Some(buf[body_start..body_end].to_vec())
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(body: &[u8]) -> Vec<u8> {
        let mut out = format!(
            "--frame\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
            body.len()
        )
        .into_bytes();
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn test_first_part_is_extracted() {
        let mut stream = part(b"\xff\xd8jpegdata\xff\xd9");
        stream.extend_from_slice(b"\r\n");
        stream.extend(part(b"second"));
        assert_eq!(first_multipart_part(&stream).unwrap(), b"\xff\xd8jpegdata\xff\xd9".to_vec());
    }

    #[test]
    fn test_incomplete_part_waits_for_more_data() {
        let stream = part(b"0123456789");
        assert!(first_multipart_part(&stream[..stream.len() - 3]).is_none());
        assert!(first_multipart_part(b"--frame\r\nContent-Type: image/jpeg").is_none());
    }

    #[test]
    fn test_part_without_length_is_not_accepted() {
        let stream = b"--frame\r\nContent-Type: image/jpeg\r\n\r\nabc";
        assert!(first_multipart_part(stream).is_none());
    }
}
