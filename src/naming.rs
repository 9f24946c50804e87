use std::sync::LazyLock;

use regex::Regex;

use crate::status::Status;

static FLV_SUFFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\.flv$").unwrap());
static MP4_SUFFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\.(?:f4v|mp4)$").unwrap());
static RAW_SUFFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\.raw$").unwrap());

/// Seek offset of a live broadcast: play from the live edge, no suffix.
pub const OFFSET_LIVE: i64 = -2;
/// Seek offset of an archived broadcast.
pub const OFFSET_ARCHIVE: i64 = 0;

pub const OUTPUT_EXTENSION: &str = "flv";

pub fn offset(status: &Status) -> i64 {
    if status.is_archived() {
        OFFSET_ARCHIVE
    } else {
        OFFSET_LIVE
    }
}

/// Text after the last `/` or `\`.
pub fn basename(name: &str) -> &str {
    match name.rfind(['/', '\\']) {
        Some(idx) => &name[idx + 1..],
        None => name,
    }
}

/// Strips a trailing `.flv` and adds the container prefix the origin
/// expects: `mp4:` for `.f4v`/`.mp4`, `raw:` for `.raw`.
pub fn container_name(name: &str) -> String {
    let name = FLV_SUFFIX.replace(name, "");
    if MP4_SUFFIX.is_match(&name) {
        format!("mp4:{}", name)
    } else if RAW_SUFFIX.is_match(&name) {
        format!("raw:{}", name)
    } else {
        name.into_owned()
    }
}

pub fn relay_name(stream_name: &str, offset: i64) -> String {
    let mut s = basename(stream_name).to_string();
    if offset >= 0 {
        s.push_str(&format!("_{}", offset));
    }
    s
}

pub fn with_ticket(name: String, ticket: Option<&str>) -> String {
    match ticket {
        Some(t) if !t.is_empty() => format!("{}?{}", name, t),
        _ => name,
    }
}

/// Name sent as the second argument of `nlPlayNotice`.
pub fn notice_name(stream_name: &str, ticket: Option<&str>) -> String {
    with_ticket(container_name(stream_name), ticket)
}

/// Output file name before collision avoidance. `count` is the number of
/// resolved substreams and must be at least one.
pub fn output_base_name(status: &Status, index: usize, count: usize) -> String {
    if count > 1 {
        format!(
            "{}-{}-{}-{}.{}",
            status.id,
            status.community_id,
            status.title,
            index + 1,
            OUTPUT_EXTENSION
        )
    } else {
        format!(
            "{}-{}-{}.{}",
            status.id, status.community_id, status.title, OUTPUT_EXTENSION
        )
    }
}
