//! Working buffers, result files and directory management for fcast.
//!
//! Everything here is plain append-only files:
//! - Working buffers hold the source lines already handed to the generator
//!   and are the only state needed to resume a file
//! - Result files get one row per (file, model, line)
//! - Reset only touches files of the requested timeframes

pub mod error;
pub mod feeder;
pub mod results;
pub mod workspace;

pub use error::{StoreError, StoreResult};
pub use feeder::{FedLine, LineFeeder};
pub use results::ResultWriter;
pub use workspace::{prepare_dir, prepare_dir_with_suffixes, DirPrepared, WorkspaceLayout};
