//! Records of diagnostics emitted by policies and rollouts.
//!
//! A [`Record`] is a set of named values. Policies build one record per control step
//! (planned cost, chosen trajectory, action) and hand it to a [`Recorder`], the
//! observability sink. [`AsyncRecorder`] puts any recorder behind a bounded channel so
//! that a slow sink never delays action selection beyond a configured timeout.
//!
//! ```rust
//! use neuralmpc_core::record::{Record, RecordValue};
//!
//! let mut record = Record::empty();
//! record.insert("t", RecordValue::Scalar(3.0));
//! record.insert("action", RecordValue::Array1(vec![0.5, -1.0]));
//! assert_eq!(record.get_scalar("t").unwrap(), 3.0);
//! ```
mod async_recorder;
mod base;
mod buffered_recorder;
mod null_recorder;
mod recorder;
mod storage;

pub use async_recorder::{AsyncRecorder, AsyncRecorderConfig};
pub use base::{Record, RecordValue};
pub use buffered_recorder::BufferedRecorder;
pub use null_recorder::NullRecorder;
pub use recorder::{AggregateRecorder, Recorder};
pub use storage::RecordStorage;
