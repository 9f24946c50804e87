use std::{path::PathBuf, sync::Arc};

use crate::{
    naming,
    output::{OutputError, OutputNamer},
    resolve::{self, SubstreamDescriptor},
    status::Status,
    transport::{AmfValue, ConnectParams, Connector, Transport, TransportError},
};

pub const SWF_URL: &str = "http://live.nicovideo.jp/nicoliveplayer.swf?180116154229";
pub const PAGE_URL: &str = "http://live.nicovideo.jp/watch/";

const PEER_BANDWIDTH: u32 = 100 * 1000 * 1000;
const WINDOW_ACK_SIZE: u32 = 2_500_000;
const PREPLAY_BUFFER_MS: u32 = 2000;
const PLAY_BUFFER_MS: u32 = 3600 * 1000;
const SEEK_HEAD_MS: i64 = -5000;
const SEEK_REWIND_MS: i64 = 1000;

const CMD_FILE_REQUEST: &str = "sendFileRequest";
const CMD_PLAY_NOTICE: &str = "nlPlayNotice";

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("tcUrl not found")]
    TcUrlNotFound,
    #[error("Out of index: {0}")]
    OutOfIndex(usize),
    #[error("Transport error: {0}")]
    TransportError(#[from] TransportError),
    #[error("Could not name output file")]
    OutputError(#[from] OutputError),
    #[error("Concurrency slot closed")]
    SlotError(#[from] tokio::sync::AcquireError),
}

/// Fixed references sent on connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub swf_url: String,
    /// The broadcast id is appended to build the page URL.
    pub page_url: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            swf_url: SWF_URL.to_string(),
            page_url: PAGE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub output: PathBuf,
    /// Setup sequences issued, including retries.
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Setup,
    AwaitCompletion,
    Retry,
    Done,
}

pub struct Session {
    status: Arc<Status>,
    streams: Arc<Vec<SubstreamDescriptor>>,
    index: usize,
    config: Arc<SessionConfig>,
}

impl Session {
    pub fn new(
        status: Arc<Status>,
        streams: Arc<Vec<SubstreamDescriptor>>,
        index: usize,
        config: Arc<SessionConfig>,
    ) -> Self {
        Self {
            status,
            streams,
            index,
            config,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub async fn run<C, N>(&self, connector: &C, namer: &N) -> Result<SessionSummary, SessionError>
    where
        C: Connector,
        N: OutputNamer + ?Sized,
    {
        let result = self.record(connector, namer).await;
        match &result {
            Ok(summary) => info!(
                "Substream {} done: {} ({} attempt(s))",
                self.index,
                summary.output.display(),
                summary.attempts
            ),
            Err(e) => error!("Substream {} failed: {}", self.index, e),
        }
        result
    }

    async fn record<C, N>(&self, connector: &C, namer: &N) -> Result<SessionSummary, SessionError>
    where
        C: Connector,
        N: OutputNamer + ?Sized,
    {
        let stream = self
            .streams
            .get(self.index)
            .ok_or(SessionError::OutOfIndex(self.index))?;

        let params = ConnectParams {
            tc_url: self.tc_url()?,
            swf_url: self.config.swf_url.clone(),
            page_url: format!("{}{}", self.config.page_url, self.status.id),
            ticket: self.status.ticket.clone(),
        };
        let mut conn = connector.connect(&params).await?;

        let base = naming::output_base_name(&self.status, self.index, self.streams.len());
        let output = namer.next_available_name(&base).await?;
        conn.set_output(&output);

        let mut attempts = 0;
        let mut state = State::Setup;
        loop {
            state = match state {
                State::Setup => {
                    attempts += 1;
                    self.setup(&mut conn, stream).await?;
                    State::AwaitCompletion
                }
                State::AwaitCompletion => {
                    let outcome = conn.wait().await?;
                    if outcome.incomplete && self.status.is_official_archive() {
                        State::Retry
                    } else {
                        State::Done
                    }
                }
                State::Retry => {
                    warn!(
                        "Substream {} ended incomplete, reconnecting to {}",
                        self.index, params.tc_url
                    );
                    conn.reconnect().await?;
                    State::Setup
                }
                State::Done => return Ok(SessionSummary { output, attempts }),
            };
        }
    }

    /// Connect address: the status URL, or the one announced by the
    /// official-live contents.
    fn tc_url(&self) -> Result<String, SessionError> {
        if !self.status.url.is_empty() {
            return Ok(self.status.url.clone());
        }

        resolve::contents_official_live(&self.status)
            .tc_url
            .filter(|url| !url.is_empty())
            .ok_or(SessionError::TcUrlNotFound)
    }

    async fn setup<T: Transport>(
        &self,
        conn: &mut T,
        stream: &SubstreamDescriptor,
    ) -> Result<(), SessionError> {
        conn.set_peer_bandwidth(PEER_BANDWIDTH, 0).await?;
        conn.set_window_ack_size(WINDOW_ACK_SIZE).await?;
        conn.create_stream().await?;
        conn.set_buffer_length(0, PREPLAY_BUFFER_MS).await?;

        let offset = naming::offset(&self.status);

        if self.status.is_official_archive() {
            conn.command(
                CMD_FILE_REQUEST,
                vec![
                    AmfValue::Null,
                    AmfValue::SwitchToAmf3,
                    AmfValue::StrictArray(vec![AmfValue::String(stream.stream_name.clone())]),
                ],
            )
            .await?;
        } else if !self.status.is_official_live() {
            conn.command(
                CMD_PLAY_NOTICE,
                vec![
                    AmfValue::Null,
                    AmfValue::String(stream.origin_url.clone().unwrap_or_default()),
                    AmfValue::String(naming::notice_name(
                        &stream.stream_name,
                        stream.origin_ticket.as_deref(),
                    )),
                    AmfValue::String(naming::relay_name(&stream.stream_name, offset)),
                    AmfValue::Number(offset as f64),
                ],
            )
            .await?;
        }

        conn.set_buffer_length(1, PLAY_BUFFER_MS).await?;
        conn.set_timestamp_normalization(true);

        let target = self.play_target(stream, offset);
        debug!("Substream {} playing {}", self.index, target);

        if self.status.is_official_archive() {
            let ts = conn.timestamp();
            if ts > SEEK_REWIND_MS {
                conn.play_from(&target, ts - SEEK_REWIND_MS).await?;
            } else {
                conn.play_from(&target, SEEK_HEAD_MS).await?;
            }
        } else if self.status.is_archived() {
            conn.play_from(&target, SEEK_HEAD_MS).await?;
        } else {
            conn.play(&target).await?;
        }

        Ok(())
    }

    fn play_target(&self, stream: &SubstreamDescriptor, offset: i64) -> String {
        if self.status.is_official_live() {
            naming::with_ticket(
                stream.stream_name.clone(),
                stream.origin_ticket.as_deref(),
            )
        } else if self.status.is_official_archive() {
            naming::container_name(&stream.stream_name)
        } else {
            naming::relay_name(&stream.stream_name, offset)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::{
        status::{parse_status, tests::get_test_xml},
        transport::fake::{Call, FakeConnector, PlainNamer},
    };

    fn session_for(fixture: &str) -> Session {
        let status = parse_status(&get_test_xml(fixture)).expect("Could not parse status");
        let res = resolve::resolve(&status);
        Session::new(
            Arc::new(status),
            Arc::new(res.streams),
            0,
            Arc::new(SessionConfig::default()),
        )
    }

    #[tokio::test]
    async fn relay_live_sequence() {
        let connector = FakeConnector::default();
        let summary = session_for("status_user_live.xml")
            .run(&connector, &PlainNamer)
            .await
            .expect("Session failed");

        let output = PathBuf::from("lv300000001-co1234567-Test & broadcast.flv");
        assert_eq!(summary.output, output);
        assert_eq!(summary.attempts, 1);

        let origin = "rtmp://nlpoca1.live.nicovideo.jp:1935/publicorigin/1";
        let ticket = "12345:lv300000001:0:1500000000:abcdef";
        assert_eq!(
            connector.calls(),
            vec![
                Call::Connect(ConnectParams {
                    tc_url: origin.into(),
                    swf_url: SWF_URL.into(),
                    page_url: "http://live.nicovideo.jp/watch/lv300000001".into(),
                    ticket: ticket.into(),
                }),
                Call::Output(output),
                Call::PeerBandwidth(100_000_000, 0),
                Call::WindowAckSize(2_500_000),
                Call::CreateStream,
                Call::BufferLength(0, 2000),
                Call::Command(
                    "nlPlayNotice".into(),
                    vec![
                        AmfValue::Null,
                        AmfValue::String(origin.into()),
                        AmfValue::String(format!("lv300000001?{}", ticket)),
                        AmfValue::String("lv300000001".into()),
                        AmfValue::Number(-2.0),
                    ]
                ),
                Call::BufferLength(1, 3_600_000),
                Call::Normalize(true),
                Call::Play("lv300000001".into()),
                Call::Wait,
            ]
        );
    }

    #[tokio::test]
    async fn official_archive_sequence() {
        let connector = FakeConnector::default();
        connector.state.timestamp.store(5000, Ordering::SeqCst);

        session_for("status_timeshift.xml")
            .run(&connector, &PlainNamer)
            .await
            .expect("Session failed");

        let name = "/content/20170101/lv300000002_123456789012_1_abcdef.f4v";
        let calls = connector.calls();
        assert!(calls.contains(&Call::Command(
            "sendFileRequest".into(),
            vec![
                AmfValue::Null,
                AmfValue::SwitchToAmf3,
                AmfValue::StrictArray(vec![AmfValue::String(name.into())]),
            ]
        )));
        assert!(calls.contains(&Call::PlayFrom(format!("mp4:{}", name), 4000)));
        assert_eq!(connector.count(|c| matches!(c, Call::Play(_))), 0);
    }

    #[tokio::test]
    async fn official_archive_from_head() {
        let connector = FakeConnector::default();
        session_for("status_timeshift.xml")
            .run(&connector, &PlainNamer)
            .await
            .expect("Session failed");

        assert_eq!(
            connector.count(|c| matches!(c, Call::PlayFrom(_, -5000))),
            1
        );
    }

    #[tokio::test]
    async fn official_archive_retries_until_complete() {
        let connector = FakeConnector::default();
        connector.state.incomplete_waits.store(2, Ordering::SeqCst);

        let summary = session_for("status_timeshift.xml")
            .run(&connector, &PlainNamer)
            .await
            .expect("Session failed");

        assert_eq!(summary.attempts, 3);
        let connects = connector.count(|c| matches!(c, Call::Connect(_) | Call::Reconnect));
        assert_eq!(connects, 3);
        assert_eq!(connector.count(|c| matches!(c, Call::Reconnect)), 2);
        assert_eq!(connector.count(|c| matches!(c, Call::PeerBandwidth(..))), 3);
        assert_eq!(connector.count(|c| matches!(c, Call::Command(..))), 3);
        assert_eq!(connector.count(|c| matches!(c, Call::Wait)), 3);
    }

    #[tokio::test]
    async fn relay_archive_does_not_retry() {
        let status = Status {
            id: "lv5".into(),
            community_id: "co6".into(),
            title: "kako".into(),
            provider: "community".into(),
            is_archive: true,
            url: "rtmp://relay/app".into(),
            ..Default::default()
        };
        let streams = vec![SubstreamDescriptor {
            origin_url: Some("rtmp://origin/app".into()),
            stream_name: "/content/lv5_1_1_2.f4v".into(),
            origin_ticket: None,
        }];
        let session = Session::new(
            Arc::new(status),
            Arc::new(streams),
            0,
            Arc::new(SessionConfig::default()),
        );

        let connector = FakeConnector::default();
        connector.state.incomplete_waits.store(1, Ordering::SeqCst);
        let summary = session
            .run(&connector, &PlainNamer)
            .await
            .expect("Session failed");

        assert_eq!(summary.attempts, 1);
        let calls = connector.calls();
        assert!(calls.contains(&Call::Command(
            "nlPlayNotice".into(),
            vec![
                AmfValue::Null,
                AmfValue::String("rtmp://origin/app".into()),
                AmfValue::String("mp4:/content/lv5_1_1_2.f4v".into()),
                AmfValue::String("lv5_1_1_2.f4v_0".into()),
                AmfValue::Number(0.0),
            ]
        )));
        assert!(calls.contains(&Call::PlayFrom("lv5_1_1_2.f4v_0".into(), -5000)));
        assert_eq!(connector.count(|c| matches!(c, Call::Reconnect)), 0);
    }

    #[tokio::test]
    async fn official_live_derives_tc_url() {
        let connector = FakeConnector::default();
        session_for("status_official_live.xml")
            .run(&connector, &PlainNamer)
            .await
            .expect("Session failed");

        let calls = connector.calls();
        match &calls[0] {
            Call::Connect(params) => {
                assert_eq!(params.tc_url, "rtmp://smile-pc.live.nicovideo.jp/live")
            }
            other => panic!("unexpected first call: {:?}", other),
        }
        assert_eq!(connector.count(|c| matches!(c, Call::Command(..))), 0);
        assert!(calls.contains(&Call::Play("nlarr_pc_300000003?pc-ticket".into())));
    }

    #[tokio::test]
    async fn missing_tc_url() {
        let session = Session::new(
            Arc::new(Status::default()),
            Arc::new(vec![SubstreamDescriptor::default()]),
            0,
            Arc::new(SessionConfig::default()),
        );
        let connector = FakeConnector::default();

        let err = session.run(&connector, &PlainNamer).await.unwrap_err();
        assert!(matches!(err, SessionError::TcUrlNotFound));
        assert!(connector.calls().is_empty());
    }

    #[tokio::test]
    async fn command_failure_ends_session() {
        let connector = FakeConnector::default();
        connector.fail_on("createStream");

        let err = session_for("status_user_live.xml")
            .run(&connector, &PlainNamer)
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::TransportError(_)));
        assert_eq!(connector.calls().last(), Some(&Call::CreateStream));
    }
}
