//! API constants

/// Prefix of every versioned route
pub const API_PREFIX: &str = "/api/v1";

/// Header carrying the MD5 checksum of a chunk body
pub const CHUNK_CHECKSUM_HEADER: &str = "x-chunk-checksum";

/// Headroom over the largest chunk for the body limit layer
pub const BODY_LIMIT_HEADROOM_BYTES: usize = 64 * 1024;

/// Upper bound on requests served at once
pub const HTTP_CONCURRENCY_LIMIT: usize = 10_000;
