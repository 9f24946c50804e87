use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::status::Status;

static CASE_PIECE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\A(\S+?):(?:limelight:|akamai:)?(\S+),(\S+)\z").unwrap()
});
static RELAY_CONTENTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\A(?:rtmp:)?(rtmp\w*://\S+?)(?:,(\S+?)(?:\?(\S+))?)?\z").unwrap()
});
static QUE_PUBLISH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\A/publish\s+(\S+)\s+(?:(\S+?),)?(\S+?)(?:\?(\S+))?\z").unwrap()
});
static QUE_PLAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\A/play\s+(\S+)\s+(\S+)\z").unwrap());
static PLAY_CASE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\A(\S+?):rtmp:(\S+?)\z").unwrap());
static PLAY_DEFAULT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\Artmp:(\S+?)\z").unwrap());

const CASE_PREFIX: &str = "case:";
const PLAY_TYPE_DEFAULT: &str = "default";
const PLAY_TYPE_PREMIUM: &str = "premium";

/// One independently recordable substream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubstreamDescriptor {
    pub origin_url: Option<String>,
    pub stream_name: String,
    pub origin_ticket: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub streams: Vec<SubstreamDescriptor>,
    /// Transport URL announced by an official-live `default` case.
    pub tc_url: Option<String>,
}

impl Resolution {
    fn extend(&mut self, other: Resolution) {
        self.streams.extend(other.streams);
        if other.tc_url.is_some() {
            self.tc_url = other.tc_url;
        }
    }
}

/// Runs every extraction pass in order. Passes only ever append; none of
/// them is gated on the broadcast kind.
pub fn resolve(status: &Status) -> Resolution {
    let mut res = contents_official_live(status);
    res.extend(contents_relay(status));
    res.extend(quesheet(status));

    debug!(
        "Resolved {} substream(s) for {}",
        res.streams.len(),
        status.id
    );
    res
}

/// Official live: `case:` selectors inside the contents list.
pub fn contents_official_live(status: &Status) -> Resolution {
    let mut res = Resolution::default();

    for c in &status.contents {
        let Some(cases) = c.text.strip_prefix(CASE_PREFIX) else {
            continue;
        };

        for piece in cases.split(',') {
            let Some(piece) = unescape(piece) else {
                warn!("Could not decode contents case {:?}", piece);
                continue;
            };

            let Some(ma) = CASE_PIECE.captures(&piece) else {
                continue;
            };

            match &ma[1] {
                "mobile" | "middle" => (),
                "default" => {
                    let ticket_name = &ma[3];
                    res.tc_url = Some(ma[2].to_string());

                    let ticket = status.tickets.get(ticket_name).cloned();
                    if ticket.is_none() {
                        warn!("Ticket not found: {}", ticket_name);
                    }

                    res.streams.push(SubstreamDescriptor {
                        origin_url: None,
                        stream_name: ticket_name.to_string(),
                        origin_ticket: ticket,
                    });
                }
                other => warn!("Unknown contents case {:?}", other),
            }
        }
    }

    res
}

/// Percent-decodes `s`, rejecting `%` not followed by two hex digits.
fn unescape(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let valid = bytes.iter().enumerate().all(|(i, &b)| {
        b != b'%'
            || bytes
                .get(i + 1..i + 3)
                .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit))
    });
    if !valid {
        return None;
    }
    urlencoding::decode(s).ok().map(|p| p.into_owned())
}

/// User and channel live: plain RTMP URLs inside the contents list.
pub fn contents_relay(status: &Status) -> Resolution {
    let streams = status
        .contents
        .iter()
        .filter_map(|c| RELAY_CONTENTS.captures(&c.text))
        .map(|ma| SubstreamDescriptor {
            origin_url: Some(ma[1].to_string()),
            stream_name: ma.get(2).map(|m| m.as_str().to_string()).unwrap_or_default(),
            origin_ticket: ma.get(3).map(|m| m.as_str().to_string()),
        })
        .collect();

    Resolution {
        streams,
        tc_url: None,
    }
}

/// Timeshift: `/publish` and `/play` directives of the cue sheet.
pub fn quesheet(status: &Status) -> Resolution {
    let mut candidates: HashMap<&str, Vec<SubstreamDescriptor>> = HashMap::new();
    let mut play_type: HashMap<String, String> = HashMap::new();

    for q in &status.ques {
        if let Some(ma) = QUE_PUBLISH.captures(q) {
            let key = ma.get(1).map(|m| m.as_str()).unwrap_or_default();
            candidates.entry(key).or_default().push(SubstreamDescriptor {
                origin_url: ma.get(2).map(|m| m.as_str().to_string()),
                stream_name: ma[3].to_string(),
                origin_ticket: ma.get(4).map(|m| m.as_str().to_string()),
            });
        } else if let Some(ma) = QUE_PLAY.captures(q) {
            let selector = &ma[1];
            if let Some(cases) = selector.strip_prefix(CASE_PREFIX) {
                for c in cases.split(',') {
                    if let Some(ma) = PLAY_CASE.captures(c) {
                        play_type.insert(ma[1].to_string(), ma[2].to_string());
                    }
                }
            } else if let Some(ma) = PLAY_DEFAULT.captures(selector) {
                play_type.insert(PLAY_TYPE_DEFAULT.to_string(), ma[1].to_string());
            }
        }
    }

    let selected = status
        .is_premium
        .then(|| candidates_for(&play_type, &candidates, PLAY_TYPE_PREMIUM))
        .flatten()
        .or_else(|| candidates_for(&play_type, &candidates, PLAY_TYPE_DEFAULT));

    Resolution {
        streams: selected.cloned().unwrap_or_default(),
        tc_url: None,
    }
}

fn candidates_for<'a>(
    play_type: &HashMap<String, String>,
    candidates: &'a HashMap<&str, Vec<SubstreamDescriptor>>,
    context: &str,
) -> Option<&'a Vec<SubstreamDescriptor>> {
    play_type
        .get(context)
        .and_then(|key| candidates.get(key.as_str()))
}
