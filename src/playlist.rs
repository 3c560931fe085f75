//! HLS playlist text helpers: completeness checks and the in-memory URL rewrite.
//!
//! The transcoder writes segment references as bare filenames on their own
//! line (`segment_000.ts`); everything here treats the playlist as plain text
//! rather than a full M3U8 parser, matching the scope of §4.5.

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

pub const HEADER_MAGIC: &str = "#EXTM3U";
pub const END_MARKER: &str = "#EXT-X-ENDLIST";
pub const SEGMENT_PREFIX: &str = "segment_";

/// RFC 3986 `pchar` is permissive; we encode everything outside unreserved
/// characters so the cache key round-trips through a query parameter intact
/// even when it contains `#`, `?`, `+` or spaces (§8 boundary behavior).
const QUERY_VALUE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

pub fn has_header_magic(text: &str) -> bool {
    text.lines().any(|l| l.trim() == HEADER_MAGIC)
}

pub fn has_end_marker(text: &str) -> bool {
    text.lines().any(|l| l.trim() == END_MARKER)
}

/// Segment filenames referenced by the playlist, in file order.
pub fn referenced_segments(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Rewrites every `segment_` occurrence into an absolute-path, query-keyed
/// segment URL. Never touches the on-disk file (§4.5 "not rewritten").
pub fn rewrite_segment_urls(playlist_text: &str, base_path: &str, cache_key: &str) -> String {
    let encoded_key = utf8_percent_encode(&format!("{cache_key}/"), QUERY_VALUE);
    let prefix = format!("{base_path}?key={encoded_key}{SEGMENT_PREFIX}");
    playlist_text.replace(SEGMENT_PREFIX, &prefix)
}
