//! # nico-rtmp
//!
//! This crate records niconico live broadcasts and timeshifts over RTMP. The
//! player status document describes every recordable substream through a
//! cue sheet and a contents list; this crate decodes both, then drives one
//! RTMP session per substream with the command sequence the origin expects.
//!
//! ## Usage
//!
//! The RTMP engine itself is not part of this crate. Plug one in by
//! implementing [`transport::Connector`] and [`transport::Transport`]; the
//! bundled [`transport::LogConnector`] only logs what would be sent.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use nico_rtmp::{output, session, status, transport, util, worker};
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = util::HttpClient::new(Some("user_session_...".into())).unwrap();
//!     let status = status::fetch_status(&client, "lv123456789", false)
//!         .await
//!         .unwrap();
//!
//!     let outcome = worker::record(
//!         status,
//!         Arc::new(transport::LogConnector),
//!         Arc::new(output::FsNamer::new(".")),
//!         session::SessionConfig::default(),
//!         &worker::WorkerConfig::default(),
//!     )
//!     .await
//!     .unwrap();
//!
//!     match outcome {
//!         worker::RunOutcome::NotLoggedIn => println!("Not logged in"),
//!         worker::RunOutcome::Recorded(report) => report.print(),
//!     }
//! }
//! ```

#![forbid(unsafe_code)]
#[macro_use]
extern crate log;

pub mod naming;
pub mod output;
pub mod resolve;
pub mod session;
pub mod stats;
pub mod status;
pub mod transport;
pub mod util;
pub mod worker;
