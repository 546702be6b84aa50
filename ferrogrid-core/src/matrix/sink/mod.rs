//! Destinations of the heatmap matrix rows.
//!
//! Every worker writes through its own sink. Rows inserted into a sink only
//! become visible once committed; a rollback discards everything inserted
//! since the last commit.

mod ipc;
mod memory;

pub use ipc::{ArrowSink, ArrowSinkFactory};
pub use memory::{MemorySink, MemorySinkFactory};

use crate::Error;
use crate::matrix::HeatmapRow;

/// Transactional writer of matrix rows owned by one worker
pub trait MatrixSink: Send {
    fn insert(&mut self, rows: &[HeatmapRow]) -> Result<(), Error>;

    /// Makes every row inserted since the last commit durable
    fn commit(&mut self) -> Result<(), Error>;

    /// Discards every row inserted since the last commit
    fn rollback(&mut self) -> Result<(), Error>;

    /// Closes the sink. Uncommitted rows are discarded.
    fn finish(self: Box<Self>) -> Result<(), Error>;
}

/// Creates the result table and opens one sink per worker
pub trait SinkFactory: Sync {
    /// Recreates the result table, dropping rows of a previous run
    fn prepare(&self) -> Result<(), Error>;

    fn open(&self, worker: usize) -> Result<Box<dyn MatrixSink>, Error>;
}
