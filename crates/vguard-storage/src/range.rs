//! Single byte-range parsing (`Range: bytes=...`).
//!
//! Only one range per request is honoured. Multi-range and malformed
//! headers are rejected as unsatisfiable rather than partially served.

use thiserror::Error;

/// Inclusive byte span within an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// The whole of an object of `total` bytes. `None` when empty.
    pub fn full(total: u64) -> Option<Self> {
        (total > 0).then(|| Self {
            start: 0,
            end: total - 1,
        })
    }

    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    /// `Content-Range` header value for a partial response.
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }

    /// `Range` request header value, as sent to S3-compatible stores.
    pub fn to_header(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

/// The requested range cannot be served from an object of `total` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Requested range not satisfiable (object is {total} bytes)")]
pub struct RangeNotSatisfiable {
    pub total: u64,
}

/// Parse a `Range` header against an object of `total` bytes.
///
/// Supports `bytes=start-end`, `bytes=start-` and `bytes=-suffix`. An end
/// past the object is clamped to the last byte; a start at or past the end
/// of the object is unsatisfiable.
pub fn parse_range(header: &str, total: u64) -> Result<ByteRange, RangeNotSatisfiable> {
    let unsatisfiable = RangeNotSatisfiable { total };

    let spec = header
        .trim()
        .strip_prefix("bytes=")
        .ok_or(unsatisfiable)?
        .trim();

    if spec.contains(',') {
        return Err(unsatisfiable);
    }

    let (start, end) = spec.split_once('-').ok_or(unsatisfiable)?;
    let (start, end) = (start.trim(), end.trim());

    if total == 0 {
        return Err(unsatisfiable);
    }
    let last = total - 1;

    if start.is_empty() {
        // Suffix range: the last N bytes
        let suffix: u64 = end.parse().map_err(|_| unsatisfiable)?;
        if suffix == 0 {
            return Err(unsatisfiable);
        }
        return Ok(ByteRange {
            start: total.saturating_sub(suffix),
            end: last,
        });
    }

    let start: u64 = start.parse().map_err(|_| unsatisfiable)?;
    if start > last {
        return Err(unsatisfiable);
    }

    let end = if end.is_empty() {
        last
    } else {
        let end: u64 = end.parse().map_err(|_| unsatisfiable)?;
        if end < start {
            return Err(unsatisfiable);
        }
        end.min(last)
    };

    Ok(ByteRange { start, end })
}
