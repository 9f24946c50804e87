use std::path::{Path, PathBuf};

use async_trait::async_trait;

/// Command argument, encoded by the engine as AMF.
#[derive(Debug, Clone, PartialEq)]
pub enum AmfValue {
    Null,
    Number(f64),
    String(String),
    StrictArray(Vec<AmfValue>),
    /// Switches the rest of the command body to AMF3.
    SwitchToAmf3,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pub tc_url: String,
    pub swf_url: String,
    pub page_url: String,
    pub ticket: String,
}

/// How a playback wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOutcome {
    /// The server closed the stream before the whole file was received.
    pub incomplete: bool,
}

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("I/O error")]
    IoError(#[from] std::io::Error),
    #[error("{command} failed: {reason}")]
    CommandError { command: String, reason: String },
    #[error("Connection closed")]
    Closed,
}

#[async_trait]
pub trait Connector: Send + Sync {
    type Transport: Transport + 'static;

    async fn connect(&self, params: &ConnectParams) -> Result<Self::Transport, TransportError>;
}

/// One live RTMP connection, owned by a single session.
#[async_trait]
pub trait Transport: Send {
    async fn set_peer_bandwidth(&mut self, size: u32, limit_type: u8)
        -> Result<(), TransportError>;
    async fn set_window_ack_size(&mut self, size: u32) -> Result<(), TransportError>;
    async fn create_stream(&mut self) -> Result<(), TransportError>;
    async fn set_buffer_length(&mut self, stream_id: u32, ms: u32) -> Result<(), TransportError>;
    async fn command(&mut self, name: &str, args: Vec<AmfValue>) -> Result<(), TransportError>;
    async fn play(&mut self, name: &str) -> Result<(), TransportError>;
    async fn play_from(&mut self, name: &str, offset_ms: i64) -> Result<(), TransportError>;
    /// Blocks until the server ends playback.
    async fn wait(&mut self) -> Result<WaitOutcome, TransportError>;
    /// Re-runs the connect sequence on the same connection.
    async fn reconnect(&mut self) -> Result<(), TransportError>;

    fn set_output(&mut self, path: &Path);
    fn set_timestamp_normalization(&mut self, enabled: bool);
    /// Timestamp of the last media message written, in milliseconds.
    fn timestamp(&self) -> i64;
}

/// Connector that logs every operation instead of talking to a server.
///
/// Each playback reports as complete, so a run walks each session through
/// exactly one setup sequence.
#[derive(Debug, Default)]
pub struct LogConnector;

#[derive(Debug)]
pub struct LogTransport {
    tc_url: String,
    output: Option<PathBuf>,
}

#[async_trait]
impl Connector for LogConnector {
    type Transport = LogTransport;

    async fn connect(&self, params: &ConnectParams) -> Result<LogTransport, TransportError> {
        info!(
            "connect {} (swf {}, page {})",
            params.tc_url, params.swf_url, params.page_url
        );
        Ok(LogTransport {
            tc_url: params.tc_url.clone(),
            output: None,
        })
    }
}

#[async_trait]
impl Transport for LogTransport {
    async fn set_peer_bandwidth(
        &mut self,
        size: u32,
        limit_type: u8,
    ) -> Result<(), TransportError> {
        info!("[{}] SetPeerBandwidth {} {}", self.tc_url, size, limit_type);
        Ok(())
    }

    async fn set_window_ack_size(&mut self, size: u32) -> Result<(), TransportError> {
        info!("[{}] WindowAckSize {}", self.tc_url, size);
        Ok(())
    }

    async fn create_stream(&mut self) -> Result<(), TransportError> {
        info!("[{}] createStream", self.tc_url);
        Ok(())
    }

    async fn set_buffer_length(&mut self, stream_id: u32, ms: u32) -> Result<(), TransportError> {
        info!("[{}] SetBufferLength {} {}ms", self.tc_url, stream_id, ms);
        Ok(())
    }

    async fn command(&mut self, name: &str, args: Vec<AmfValue>) -> Result<(), TransportError> {
        info!("[{}] {} {:?}", self.tc_url, name, args);
        Ok(())
    }

    async fn play(&mut self, name: &str) -> Result<(), TransportError> {
        info!("[{}] play {} -> {:?}", self.tc_url, name, self.output);
        Ok(())
    }

    async fn play_from(&mut self, name: &str, offset_ms: i64) -> Result<(), TransportError> {
        info!(
            "[{}] play {} from {}ms -> {:?}",
            self.tc_url, name, offset_ms, self.output
        );
        Ok(())
    }

    async fn wait(&mut self) -> Result<WaitOutcome, TransportError> {
        Ok(WaitOutcome { incomplete: false })
    }

    async fn reconnect(&mut self) -> Result<(), TransportError> {
        info!("reconnect {}", self.tc_url);
        Ok(())
    }

    fn set_output(&mut self, path: &Path) {
        self.output = Some(path.to_path_buf());
    }

    fn set_timestamp_normalization(&mut self, enabled: bool) {
        debug!("[{}] timestamp normalization {}", self.tc_url, enabled);
    }

    fn timestamp(&self) -> i64 {
        0
    }
}
