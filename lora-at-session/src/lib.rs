//! AT command session layer for the LoRaWAN driver
//!
//! This crate provides the protocol engine's lower half: the response
//! matcher, URC dispatch, the downlink ring buffer and the half-duplex
//! command channel that ties them to a byte transport.
//!
//! ## Components
//! - [x] Response matcher (up to 7 terminal patterns, timeout, noise skip)
//! - [x] URC dispatcher (wake, not joined, downlink, signal, link check)
//! - [x] Downlink ring buffer with announced-available count
//! - [x] Command channel with wake preamble and trailers
//! - [x] Join state machine types
//! - [x] Session statistics

pub mod buffer;
pub mod error;
pub mod exchange;
pub mod matcher;
pub mod port;
pub mod session;
pub mod state;
pub mod statistics;
pub mod urc;

pub use buffer::{DEFAULT_CAPACITY, DownlinkBuffer};
pub use error::{LoraError, LoraResult};
pub use exchange::{Exchange, MAX_PATTERNS, Reply, Trailer};
pub use matcher::{DEFAULT_POLL_INTERVAL, ResponseMatcher};
pub use port::AtPort;
pub use session::Session;
pub use state::{JoinAttempt, JoinOutcome, JoinState};
pub use statistics::SessionStatistics;
pub use urc::{Dialect, PayloadEncoding, Urc, UrcDispatcher};
