pub mod archives;
pub mod files;
pub mod health;
pub mod uploads;

use axum::body::Body;
use cofile_storage::ByteStream;
use futures::StreamExt;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// RFC 5987 attr-chars that need no escaping in `filename*`
const FILENAME_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'.')
    .remove(b'-')
    .remove(b'_')
    .remove(b'~');

/// `Content-Disposition` value with an ASCII fallback and a UTF-8 `filename*`.
pub(crate) fn attachment_disposition(file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        utf8_percent_encode(file_name, FILENAME_ENCODE_SET)
    )
}

/// Wrap a storage stream for an axum body
pub(crate) fn stream_body(stream: ByteStream) -> Body {
    Body::from_stream(stream.map(|result| {
        result.map_err(|e| std::io::Error::other(format!("Storage stream error: {}", e)))
    }))
}
