use std::thread;

use h3o::{CellIndex, LatLng};
use log::{debug, error, info, warn};
use rayon::prelude::*;

use super::sink::{MatrixSink, SinkFactory};
use super::{Chunk, HeatmapRow, RegionSource, bucket_costs, split_into_chunks};
use crate::algo::projection::{ProjectionIndex, TargetGrid};
use crate::extract::{Extractor, SnapPolicy};
use crate::grid::{GridIndex, ShortCell};
use crate::routing::{RoutingGraph, WeightModel, shortest_paths};
use crate::{Context, Error};

/// Work done by one worker on its chunk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkReport {
    pub worker: usize,
    pub cells: usize,
    pub rows: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionReport {
    pub name: String,
    /// Medium cells of the region
    pub cells: usize,
    /// Medium cells fully processed and committed
    pub processed: usize,
    pub rows: usize,
    /// Errors of the failed chunks
    pub failures: Vec<String>,
}

impl RegionReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Outcome of a matrix run. A failed region is the last one reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatrixReport {
    pub regions: Vec<RegionReport>,
}

impl MatrixReport {
    pub fn is_success(&self) -> bool {
        self.regions.iter().all(RegionReport::is_success)
    }

    pub fn rows(&self) -> usize {
        self.regions.iter().map(|region| region.rows).sum()
    }
}

/// Prepares the travel-time matrix of whole regions
pub struct HeatmapMatrix<'a> {
    ctx: &'a Context,
    factory: &'a dyn SinkFactory,
}

impl<'a> HeatmapMatrix<'a> {
    pub fn new(ctx: &'a Context, factory: &'a dyn SinkFactory) -> Self {
        Self { ctx, factory }
    }

    /// Processes every region in order, one scoped thread per chunk.
    ///
    /// The result table is recreated first. A region with a failed chunk
    /// ends the run; regions processed before it stay committed.
    pub fn run(&self, regions: &dyn RegionSource) -> Result<MatrixReport, Error> {
        self.factory.prepare()?;
        let workers = self.ctx.config.matrix.workers.max(1);
        let names = regions.names();
        let mut report = MatrixReport::default();

        for (index, name) in names.iter().enumerate() {
            info!("Processing region {} of {}: {name}", index + 1, names.len());

            let cells = regions.medium_cells(index, &self.ctx.grid)?;
            let chunks = split_into_chunks(&cells, workers);
            let results = self.process_chunks(&chunks);

            let mut region = RegionReport {
                name: name.clone(),
                cells: cells.len(),
                ..RegionReport::default()
            };
            for result in results {
                match result {
                    Ok(chunk) => {
                        region.processed += chunk.cells;
                        region.rows += chunk.rows;
                    }
                    Err(e) => region.failures.push(e.to_string()),
                }
            }
            trim_memory();

            let failed = !region.is_success();
            info!(
                "Region {} of {} {}: {} of {} cells, {} rows",
                index + 1,
                names.len(),
                if failed { "failed" } else { "processed" },
                region.processed,
                region.cells,
                region.rows
            );
            report.regions.push(region);
            if failed {
                break;
            }
        }

        Ok(report)
    }

    fn process_chunks(&self, chunks: &[Chunk]) -> Vec<Result<ChunkReport, Error>> {
        thread::scope(|scope| {
            let handles = chunks
                .iter()
                .filter(|chunk| !chunk.is_empty())
                .map(|chunk| (chunk.worker, scope.spawn(move || self.process_chunk(chunk))))
                .collect::<Vec<_>>();

            handles
                .into_iter()
                .map(|(worker, handle)| {
                    handle
                        .join()
                        .unwrap_or_else(|_| Err(Error::WorkerPanicked(worker)))
                })
                .collect()
        })
    }

    /// Processes the cells of a chunk through a sink of its own, committing
    /// after every cell.
    ///
    /// The first failing cell is rolled back and stops the chunk; cells
    /// committed before it are kept.
    pub fn process_chunk(&self, chunk: &Chunk) -> Result<ChunkReport, Error> {
        let mut sink = self.factory.open(chunk.worker)?;
        let mut report = ChunkReport {
            worker: chunk.worker,
            ..ChunkReport::default()
        };

        for (index, cell) in chunk.cells.iter().enumerate() {
            match self.process_cell(*cell, sink.as_mut()) {
                Ok(rows) => {
                    report.cells += 1;
                    report.rows += rows;
                    debug!(
                        "Worker {}: cell {cell} ({}/{}) wrote {rows} rows",
                        chunk.worker,
                        index + 1,
                        chunk.len()
                    );
                }
                Err(e) => {
                    error!("Worker {} failed on cell {cell}: {e}", chunk.worker);
                    if let Err(rollback) = sink.rollback() {
                        error!("Worker {} rollback failed: {rollback}", chunk.worker);
                    }
                    return Err(e);
                }
            }
        }

        sink.finish()?;
        info!(
            "Worker {} finished {} cells, {} rows",
            chunk.worker, report.cells, report.rows
        );
        Ok(report)
    }

    /// Routes from every fine child of a medium cell and writes the bucketed
    /// rows, flushing whenever `insert_batch_size` rows are buffered.
    fn process_cell(&self, medium: CellIndex, sink: &mut dyn MatrixSink) -> Result<usize, Error> {
        let ctx = self.ctx;
        let travel_cost = ctx.travel_cost();
        let max_cost = travel_cost.max_cost();
        let speed = travel_cost.speed_mps();
        let matrix = &ctx.config.matrix;

        let origins = ctx
            .grid
            .fine_children(medium)
            .into_iter()
            .map(GridIndex::centroid)
            .collect::<Vec<LatLng>>();
        let sub = Extractor::new(ctx).extract(&origins, &travel_cost, SnapPolicy::Skip)?;
        if sub.connectors.is_empty() {
            debug!("Cell {medium}: no origin near the street network");
            sink.commit()?;
            return Ok(0);
        }

        let weights = WeightModel::new(ctx.config.routing.cost_unit, &travel_cost)?;
        let graph = RoutingGraph::build(&sub.network.edges, weights)?;
        // Origins are snapped up to max_snap_distance away from the cell
        let reach = sub.buffer_distance + ctx.config.routing.max_snap_distance;
        let target = TargetGrid::around_cell(&ctx.grid, medium, reach)?;
        let index = ProjectionIndex::new(&sub.network.edges, &graph, &target, ctx.sample_spacing())?;

        let rows_per_origin = sub
            .connectors
            .par_iter()
            .map(|connector| {
                let source = graph.vertex(connector.node).ok_or_else(|| {
                    Error::NoReachableNetwork(format!(
                        "Origin {} snapped to node {} outside the routing graph",
                        connector.fine_cell, connector.node
                    ))
                })?;
                let distances = shortest_paths(&graph, source, max_cost);
                let costs = index.project(&distances, speed, max_cost);
                let coarse = ShortCell::from_cell(connector.coarse_cell).as_i32()?;
                Ok(bucket_costs(
                    connector.fine_cell,
                    coarse,
                    &costs,
                    matrix.bucket_seconds,
                ))
            })
            .collect::<Result<Vec<_>, Error>>()?;

        let batch_size = matrix.insert_batch_size.max(1);
        let mut buffer: Vec<HeatmapRow> = Vec::with_capacity(batch_size);
        let mut written = 0;
        for rows in rows_per_origin {
            buffer.extend(rows);
            if buffer.len() >= batch_size {
                sink.insert(&buffer)?;
                written += buffer.len();
                buffer.clear();
            }
        }
        if !buffer.is_empty() {
            sink.insert(&buffer)?;
            written += buffer.len();
        }
        sink.commit()?;

        if sub.connectors.len() < origins.len() {
            debug!(
                "Cell {medium}: {} of {} origins off the street network",
                origins.len() - sub.connectors.len(),
                origins.len()
            );
        }
        Ok(written)
    }
}

/// Returns freed heap memory to the OS between regions
fn trim_memory() {
    // This call is safe to use on linux with glibc implementation
    // which is checked by the cfg attribute in compile time.
    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    unsafe {
        if libc::malloc_trim(0) == 0 {
            warn!("Memory trimming failed - continuing anyway");
        } else {
            debug!("Successfully trimmed unused heap memory");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use geo::{Rect, coord};
    use h3o::LatLng;
    use tempfile::tempdir;

    use super::*;
    use crate::TravelCost;
    use crate::matrix::{MemorySinkFactory, PolygonRegions};
    use crate::testing::{MUNICH, lattice_context};

    fn short_trips(ctx: &mut Context) {
        ctx.config.routing.travel_cost = Some(TravelCost {
            max_traveltime: 5,
            speed: 5.0,
        });
    }

    fn munich_cell(ctx: &Context) -> CellIndex {
        LatLng::new(MUNICH.0, MUNICH.1).unwrap().to_cell(ctx.grid.medium)
    }

    fn munich_regions() -> PolygonRegions {
        let mut regions = PolygonRegions::new();
        regions.push(
            "munich",
            Rect::new(
                coord! { x: MUNICH.1 - 0.01, y: MUNICH.0 - 0.01 },
                coord! { x: MUNICH.1 + 0.01, y: MUNICH.0 + 0.01 },
            )
            .to_polygon(),
        );
        regions
    }

    #[test]
    fn rows_stay_within_cell_and_cutoff() {
        let dir = tempdir().unwrap();
        let mut ctx = lattice_context(dir.path(), 21, 21, 100.0);
        short_trips(&mut ctx);
        let factory = MemorySinkFactory::new();
        let matrix = HeatmapMatrix::new(&ctx, &factory);
        let medium = munich_cell(&ctx);

        let report = matrix
            .process_chunk(&Chunk {
                worker: 0,
                cells: vec![medium],
            })
            .unwrap();

        let rows = factory.rows().unwrap();
        assert_eq!(report.cells, 1);
        assert_eq!(report.rows, rows.len());
        assert!(!rows.is_empty());
        for row in &rows {
            assert_eq!(row.origin.parent(ctx.grid.medium), Some(medium));
            let coarse = ctx.grid.coarse_parent(row.origin).unwrap();
            assert_eq!(row.origin_coarse, ShortCell::from_cell(coarse).as_i32().unwrap());
            assert!(row.cost <= 5);
            assert!(!row.destinations.is_empty());
        }
    }

    #[test]
    fn every_cell_of_a_region_is_processed() {
        let dir = tempdir().unwrap();
        let mut ctx = lattice_context(dir.path(), 11, 11, 100.0);
        short_trips(&mut ctx);
        ctx.config.matrix.workers = 3;
        let factory = MemorySinkFactory::new();
        let regions = munich_regions();

        let report = HeatmapMatrix::new(&ctx, &factory).run(&regions).unwrap();

        assert!(report.is_success());
        let region = &report.regions[0];
        assert!(region.cells > 0);
        assert_eq!(region.processed, region.cells);
        assert_eq!(region.rows, factory.rows().unwrap().len());
    }

    #[test]
    fn repeated_runs_produce_the_same_rows() {
        let dir = tempdir().unwrap();
        let mut ctx = lattice_context(dir.path(), 11, 11, 100.0);
        short_trips(&mut ctx);
        ctx.config.matrix.workers = 2;
        let factory = MemorySinkFactory::new();
        let regions = munich_regions();

        HeatmapMatrix::new(&ctx, &factory).run(&regions).unwrap();
        let mut first = factory.rows().unwrap();
        HeatmapMatrix::new(&ctx, &factory).run(&regions).unwrap();
        let mut second = factory.rows().unwrap();

        first.sort();
        second.sort();
        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    /// Records the size of every insert and the number of commits
    #[derive(Clone, Default)]
    struct Recording {
        inserts: Arc<Mutex<Vec<usize>>>,
        commits: Arc<AtomicUsize>,
    }

    impl MatrixSink for Recording {
        fn insert(&mut self, rows: &[HeatmapRow]) -> Result<(), Error> {
            self.inserts.lock().unwrap().push(rows.len());
            Ok(())
        }

        fn commit(&mut self) -> Result<(), Error> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn rollback(&mut self) -> Result<(), Error> {
            Ok(())
        }

        fn finish(self: Box<Self>) -> Result<(), Error> {
            Ok(())
        }
    }

    impl SinkFactory for Recording {
        fn prepare(&self) -> Result<(), Error> {
            Ok(())
        }

        fn open(&self, _worker: usize) -> Result<Box<dyn MatrixSink>, Error> {
            Ok(Box::new(self.clone()))
        }
    }

    #[test]
    fn rows_are_flushed_in_batches_and_committed_per_cell() {
        let dir = tempdir().unwrap();
        let mut ctx = lattice_context(dir.path(), 21, 21, 100.0);
        short_trips(&mut ctx);
        ctx.config.matrix.insert_batch_size = 25;
        let recording = Recording::default();
        let medium = munich_cell(&ctx);
        let cells = vec![medium, GridIndex::disk(medium, 1)[1]];

        let report = HeatmapMatrix::new(&ctx, &recording)
            .process_chunk(&Chunk { worker: 0, cells })
            .unwrap();

        let inserts = recording.inserts.lock().unwrap().clone();
        assert_eq!(recording.commits.load(Ordering::SeqCst), 2);
        assert_eq!(inserts.iter().sum::<usize>(), report.rows);
        // Only the final flush of a cell may be smaller than the batch size
        let small = inserts.iter().filter(|size| **size < 25).count();
        assert!(small <= 2);
    }

    /// Fails every commit of worker 0
    struct FailingFactory {
        inner: MemorySinkFactory,
        rollbacks: Arc<AtomicUsize>,
    }

    struct FailingSink {
        inner: Box<dyn MatrixSink>,
        worker: usize,
        rollbacks: Arc<AtomicUsize>,
    }

    impl MatrixSink for FailingSink {
        fn insert(&mut self, rows: &[HeatmapRow]) -> Result<(), Error> {
            self.inner.insert(rows)
        }

        fn commit(&mut self) -> Result<(), Error> {
            if self.worker == 0 {
                return Err(Error::Sink("connection lost".to_string()));
            }
            self.inner.commit()
        }

        fn rollback(&mut self) -> Result<(), Error> {
            self.rollbacks.fetch_add(1, Ordering::SeqCst);
            self.inner.rollback()
        }

        fn finish(self: Box<Self>) -> Result<(), Error> {
            self.inner.finish()
        }
    }

    impl SinkFactory for FailingFactory {
        fn prepare(&self) -> Result<(), Error> {
            self.inner.prepare()
        }

        fn open(&self, worker: usize) -> Result<Box<dyn MatrixSink>, Error> {
            Ok(Box::new(FailingSink {
                inner: self.inner.open(worker)?,
                worker,
                rollbacks: Arc::clone(&self.rollbacks),
            }))
        }
    }

    #[test]
    fn failed_chunk_rolls_back_and_stops_the_run() {
        let dir = tempdir().unwrap();
        let mut ctx = lattice_context(dir.path(), 11, 11, 100.0);
        short_trips(&mut ctx);
        ctx.config.matrix.workers = 1;
        let factory = FailingFactory {
            inner: MemorySinkFactory::new(),
            rollbacks: Arc::default(),
        };
        let mut regions = munich_regions();
        regions.push(
            "second",
            Rect::new(coord! { x: 11.0, y: 48.0 }, coord! { x: 11.01, y: 48.01 }).to_polygon(),
        );

        let report = HeatmapMatrix::new(&ctx, &factory).run(&regions).unwrap();

        assert!(!report.is_success());
        assert_eq!(report.regions.len(), 1);
        assert_eq!(report.regions[0].processed, 0);
        assert_eq!(factory.rollbacks.load(Ordering::SeqCst), 1);
        assert!(factory.inner.rows().unwrap().is_empty());
    }
}
