//! Bounded streaming decompression.
//!
//! - [`request`]: the [`Request`] handle and its lifecycle
//! - [`read_buffers`]: read slots and the buffers that move through them
//! - [`stage`]: the [`DecompressionStage`] controller
//! - [`driver`]: a run-to-completion pump over a stage

pub mod config;
pub mod driver;
mod estimates;
pub(crate) mod events;
mod job_slots;
pub mod pending;
pub mod read_buffers;
pub mod request;
pub mod stage;

pub use config::StageConfig;
pub use driver::{DriverOptions, DriverSummary, StreamDriver};
pub use pending::PendingQueue;
pub use read_buffers::{ReadBuffer, ReadBufferPool, ReadBufferStatus};
pub use request::{
    CompressionInfo, DecompressionMode, ReadRange, Request, RequestId, RequestStatus,
};
pub use stage::{DecompressionStage, STAGE_NAME, StageStatus};
