use std::{collections::BTreeSet, sync::Arc};

use futures::future::join_all;
use tokio::sync::Semaphore;

use crate::{
    output::OutputNamer,
    resolve::{self, SubstreamDescriptor},
    session::{Session, SessionConfig},
    stats::{RecordingReport, SessionOutcome},
    status::{Availability, Status, StatusError},
    transport::Connector,
};

const DEFAULT_SESSIONS: usize = 4;

#[derive(thiserror::Error, Debug)]
pub enum WorkerError {
    #[error("Could not get player status")]
    StatusError(#[from] StatusError),
    #[error("No stream")]
    NoStream,
    #[error("None of the selected indices exist ({0} substream(s) resolved)")]
    NothingSelected(usize),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerConfig {
    /// 0 picks a default for the broadcast kind, negative forces one session
    /// at a time.
    pub max_sessions: i32,
    /// Descriptor indices to record; `None` records all of them.
    pub indices: Option<BTreeSet<usize>>,
}

impl WorkerConfig {
    pub fn parallelism(&self, status: &Status) -> usize {
        match self.max_sessions {
            // Official archives are served one file at a time.
            0 if status.is_official_archive() => 1,
            0 => DEFAULT_SESSIONS,
            n if n < 0 => 1,
            n => n as usize,
        }
    }

    pub fn selects(&self, index: usize) -> bool {
        self.indices
            .as_ref()
            .map(|set| set.contains(&index))
            .unwrap_or(true)
    }

    /// Selected indices that fall outside `count` resolved substreams.
    pub fn unmatched(&self, count: usize) -> Vec<usize> {
        self.indices
            .iter()
            .flatten()
            .copied()
            .filter(|&index| index >= count)
            .collect()
    }
}

#[derive(Debug)]
pub enum RunOutcome {
    NotLoggedIn,
    Recorded(RecordingReport),
}

/// Resolves the substreams of `status` and records the selected ones.
pub async fn record<C, N>(
    status: Status,
    connector: Arc<C>,
    namer: Arc<N>,
    session_config: SessionConfig,
    config: &WorkerConfig,
) -> Result<RunOutcome, WorkerError>
where
    C: Connector + 'static,
    N: OutputNamer + 'static,
{
    if status.availability()? == Availability::NotLoggedIn {
        warn!("Not logged in, nothing to record");
        return Ok(RunOutcome::NotLoggedIn);
    }

    let res = resolve::resolve(&status);
    let status = status.with_tc_url(res.tc_url);

    let report = start(
        Arc::new(status),
        Arc::new(res.streams),
        connector,
        namer,
        Arc::new(session_config),
        config,
    )
    .await?;

    Ok(RunOutcome::Recorded(report))
}

/// Runs one session per selected substream, at most `parallelism` at once,
/// and returns when all of them have ended.
pub async fn start<C, N>(
    status: Arc<Status>,
    streams: Arc<Vec<SubstreamDescriptor>>,
    connector: Arc<C>,
    namer: Arc<N>,
    session_config: Arc<SessionConfig>,
    config: &WorkerConfig,
) -> Result<RecordingReport, WorkerError>
where
    C: Connector + 'static,
    N: OutputNamer + 'static,
{
    if streams.is_empty() {
        return Err(WorkerError::NoStream);
    }

    for index in config.unmatched(streams.len()) {
        warn!(
            "Substream index {} out of range, {} resolved",
            index,
            streams.len()
        );
    }
    if !(0..streams.len()).any(|index| config.selects(index)) {
        return Err(WorkerError::NothingSelected(streams.len()));
    }

    let parallelism = config.parallelism(&status);
    info!(
        "Recording {} substream(s) of {}, {} at a time",
        streams.len(),
        status.id,
        parallelism
    );

    let slots = Arc::new(Semaphore::new(parallelism));
    let mut report = RecordingReport::new();

    let (indices, tasks): (Vec<_>, Vec<_>) = (0..streams.len())
        .filter(|&index| config.selects(index))
        .map(|index| {
            let session = Session::new(
                status.clone(),
                streams.clone(),
                index,
                session_config.clone(),
            );
            let (slots, connector, namer) = (slots.clone(), connector.clone(), namer.clone());

            let task = tokio::spawn(async move {
                // Held until the task ends, whichever way it ends.
                let _slot = slots.acquire_owned().await?;
                session.run(connector.as_ref(), namer.as_ref()).await
            });
            (index, task)
        })
        .unzip();

    for (index, result) in indices.into_iter().zip(join_all(tasks).await) {
        let outcome = match result {
            Ok(Ok(summary)) => SessionOutcome::Done {
                output: summary.output,
                attempts: summary.attempts,
            },
            Ok(Err(e)) => SessionOutcome::Failed {
                reason: e.to_string(),
            },
            Err(e) => {
                error!("Substream {} task aborted: {}", index, e);
                SessionOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };
        report.record(index, outcome);
    }

    report.finish();
    Ok(report)
}
