//! Signal generator invocation for fcast.
//!
//! The generator is an opaque binary run as
//! `<binary> <buffer> <raw-output> <model> <incremental-flag>`. It always
//! reprocesses the whole working buffer; only the last line it writes is kept.
//!
//! - `SignalRunner`: seam over "run the generator once" (`ProcessRunner` for the
//!   real binary, `MockSignalRunner` for tests)
//! - `SlotPool`: bounded process slots shared by every file task
//! - `SignalInvoker`: timeout, retry, last-line capture

pub mod error;
pub mod invoker;
pub mod mock;
pub mod output;
pub mod runner;
pub mod slots;

pub use error::{SignalError, SignalResult};
pub use invoker::{InvokerSettings, SignalInvoker};
pub use mock::{MockEvent, MockSignalRunner};
pub use output::read_last_line;
pub use runner::{BoxFuture, ProcessRunner, SignalJob, SignalRunner};
pub use slots::{SlotPermit, SlotPool};
