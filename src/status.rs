use std::collections::HashMap;

use quick_xml::{
    events::{BytesStart, Event},
    Reader,
};

use crate::util;

pub const PROVIDER_OFFICIAL: &str = "official";
pub const PROVIDER_CHANNEL: &str = "channel";

const ERROR_NOT_LOGIN: &str = "notlogin";

const STATUS_URL: &str = "http://watch.live.nicovideo.jp/api/getplayerstatus?v=";
const STATUS_URL_HTTPS: &str = "https://ow.live.nicovideo.jp/api/getplayerstatus?v=";
const IPHONE_USER_AGENT: &str =
    "Niconico/1.0 (Unix; U; iPhone OS 10.3.3; ja-jp; nicoiphone; iPhone5,2) Version/6.65";

/// A `<contents>` entry of the contents list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Content {
    pub id: String,
    pub text: String,
}

/// Typed view over the `getplayerstatus` document.
///
/// Built once per run and only read afterwards. The one exception is the
/// transport URL discovered during resolution, which is merged by the caller
/// through [`Status::with_tc_url`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Status {
    pub id: String,
    pub community_id: String,
    pub title: String,
    pub provider: String,
    pub is_archive: bool,
    pub is_archive_player_server: bool,
    pub is_premium: bool,

    pub ques: Vec<String>,
    pub contents: Vec<Content>,
    pub tickets: HashMap<String, String>,

    pub url: String,
    pub ticket: String,

    pub error_code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Ok,
    NotLoggedIn,
}

#[derive(thiserror::Error, Debug)]
pub enum StatusError {
    #[error("Could not download player status")]
    DownloadError(#[from] util::DownloadError),
    #[error("Could not parse player status")]
    ParseError(#[from] quick_xml::Error),
    #[error("Error code: {0}")]
    SiteError(String),
}

impl Status {
    pub fn is_archived(&self) -> bool {
        self.is_archive
    }

    pub fn is_live(&self) -> bool {
        !self.is_archive
    }

    pub fn is_official_live(&self) -> bool {
        self.provider == PROVIDER_OFFICIAL && !self.is_archive
    }

    pub fn is_official_archive(&self) -> bool {
        (self.is_archive && self.provider == PROVIDER_OFFICIAL)
            || (self.is_archive_player_server && self.provider == PROVIDER_CHANNEL)
    }

    /// Neither official live nor official archive.
    pub fn is_relay(&self) -> bool {
        !self.is_official_live() && !self.is_official_archive()
    }

    pub fn availability(&self) -> Result<Availability, StatusError> {
        match self.error_code.as_str() {
            "" => Ok(Availability::Ok),
            ERROR_NOT_LOGIN => Ok(Availability::NotLoggedIn),
            code => Err(StatusError::SiteError(code.to_string())),
        }
    }

    /// Returns a copy carrying the transport URL found by the resolver.
    pub fn with_tc_url(mut self, url: Option<String>) -> Self {
        if let Some(url) = url {
            self.url = url;
        }
        self
    }

    fn apply(&mut self, parents: &[Frame], frame: Frame) {
        // Paths are relative to the document root, whatever it is called.
        if parents.is_empty() {
            return;
        }
        let path = parents
            .iter()
            .skip(1)
            .map(|f| f.name.as_str())
            .chain(std::iter::once(frame.name.as_str()))
            .collect::<Vec<_>>();

        match path.as_slice() {
            ["stream", "title"] => self.title = frame.text,
            ["stream", "default_community"] => self.community_id = frame.text,
            ["stream", "id"] => self.id = frame.text,
            ["stream", "provider_type"] => self.provider = frame.text,
            ["stream", "archive"] => self.is_archive = parse_bool(&frame.text),
            ["stream", "is_archiveplayserver"] => {
                self.is_archive_player_server = parse_bool(&frame.text)
            }
            ["stream", "quesheet", "que"] => self.ques.push(frame.text),
            ["stream", "contents_list", "contents"] => self.contents.push(Content {
                id: frame.id.unwrap_or_default(),
                text: frame.text,
            }),
            ["user", "is_premium"] => self.is_premium = parse_bool(&frame.text),
            ["rtmp", "url"] => self.url = frame.text,
            ["rtmp", "ticket"] => self.ticket = frame.text,
            ["tickets", "stream"] => {
                self.tickets
                    .insert(frame.name_attr.unwrap_or_default(), frame.text);
            }
            ["error", "code"] => self.error_code = frame.text,
            _ => (),
        }
    }
}

struct Frame {
    name: String,
    id: Option<String>,
    name_attr: Option<String>,
    text: String,
}

impl Frame {
    fn from_start(e: &BytesStart) -> Self {
        Self {
            name: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
            id: get_attr(e, "id"),
            name_attr: get_attr(e, "name"),
            text: String::new(),
        }
    }
}

fn get_attr(e: &BytesStart, attr: &str) -> Option<String> {
    e.try_get_attribute(attr)
        .ok()?
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn parse_bool(s: &str) -> bool {
    matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "t" | "true")
}

pub fn parse_status(xml: &str) -> Result<Status, StatusError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut status = Status::default();
    let mut stack: Vec<Frame> = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Eof => break,
            Event::Start(e) => stack.push(Frame::from_start(&e)),
            Event::Empty(e) => {
                let frame = Frame::from_start(&e);
                status.apply(&stack, frame);
            }
            Event::Text(e) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&e.unescape()?);
                }
            }
            Event::CData(e) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Event::End(_) => {
                if let Some(frame) = stack.pop() {
                    status.apply(&stack, frame);
                }
            }
            _ => (),
        }
    }

    Ok(status)
}

/// Fetches and decodes the player status of `live_id`.
///
/// `secure` switches to the experimental HTTPS endpoint used by the mobile
/// app.
pub async fn fetch_status(
    client: &util::HttpClient,
    live_id: &str,
    secure: bool,
) -> Result<Status, StatusError> {
    let (url, user_agent) = if secure {
        (format!("{}{}", STATUS_URL_HTTPS, live_id), Some(IPHONE_USER_AGENT))
    } else {
        (format!("{}{}", STATUS_URL, live_id), None)
    };

    debug!("Fetching player status from {}", url);
    let xml = client.fetch_text(&url, user_agent).await?;

    parse_status(&xml).map_err(|e| {
        error!("Could not parse player status: {}", xml);
        e
    })
}
