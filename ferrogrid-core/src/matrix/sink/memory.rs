use std::sync::{Arc, Mutex, MutexGuard};

use super::{MatrixSink, SinkFactory};
use crate::Error;
use crate::matrix::HeatmapRow;

type SharedRows = Arc<Mutex<Vec<HeatmapRow>>>;

fn lock(rows: &SharedRows) -> Result<MutexGuard<'_, Vec<HeatmapRow>>, Error> {
    rows.lock()
        .map_err(|_| Error::Sink("Result table lock poisoned".to_string()))
}

/// In-process result table shared by all workers
#[derive(Debug, Clone, Default)]
pub struct MemorySinkFactory {
    rows: SharedRows,
}

impl MemorySinkFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed rows in commit order
    pub fn rows(&self) -> Result<Vec<HeatmapRow>, Error> {
        lock(&self.rows).map(|rows| rows.clone())
    }
}

impl SinkFactory for MemorySinkFactory {
    fn prepare(&self) -> Result<(), Error> {
        lock(&self.rows)?.clear();
        Ok(())
    }

    fn open(&self, _worker: usize) -> Result<Box<dyn MatrixSink>, Error> {
        Ok(Box::new(MemorySink {
            committed: Arc::clone(&self.rows),
            pending: Vec::new(),
        }))
    }
}

#[derive(Debug)]
pub struct MemorySink {
    committed: SharedRows,
    pending: Vec<HeatmapRow>,
}

impl MatrixSink for MemorySink {
    fn insert(&mut self, rows: &[HeatmapRow]) -> Result<(), Error> {
        self.pending.extend_from_slice(rows);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), Error> {
        lock(&self.committed)?.append(&mut self.pending);
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), Error> {
        self.pending.clear();
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<(), Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use h3o::{LatLng, Resolution};

    use super::*;

    fn row(cost: u16) -> HeatmapRow {
        HeatmapRow {
            origin: LatLng::new(48.137, 11.575).unwrap().to_cell(Resolution::Ten),
            destinations: vec![1, 2, 3],
            cost,
            origin_coarse: 7,
        }
    }

    #[test]
    fn only_committed_rows_are_visible() {
        let factory = MemorySinkFactory::new();
        let mut sink = factory.open(0).unwrap();

        sink.insert(&[row(1), row(2)]).unwrap();
        assert!(factory.rows().unwrap().is_empty());
        sink.commit().unwrap();

        sink.insert(&[row(3)]).unwrap();
        sink.rollback().unwrap();
        sink.commit().unwrap();
        sink.finish().unwrap();

        assert_eq!(factory.rows().unwrap(), vec![row(1), row(2)]);
    }

    #[test]
    fn prepare_drops_previous_rows() {
        let factory = MemorySinkFactory::new();
        let mut sink = factory.open(3).unwrap();
        sink.insert(&[row(1)]).unwrap();
        sink.commit().unwrap();

        factory.prepare().unwrap();
        assert!(factory.rows().unwrap().is_empty());
    }
}
