use h3o::CellIndex;

/// Contiguous slice of the cells of a region assigned to one worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub worker: usize,
    pub cells: Vec<CellIndex>,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Splits `cells` into exactly `workers` ordered chunks.
///
/// Every chunk gets `len / workers` cells and the first `len % workers`
/// chunks one more, so sizes differ by at most one. With fewer cells than
/// workers the trailing chunks are empty. Zero workers is treated as one.
pub fn split_into_chunks(cells: &[CellIndex], workers: usize) -> Vec<Chunk> {
    let workers = workers.max(1);
    let size = cells.len() / workers;
    let remainder = cells.len() % workers;

    let mut start = 0;
    (0..workers)
        .map(|worker| {
            let end = start + size + usize::from(worker < remainder);
            let chunk = Chunk {
                worker,
                cells: cells[start..end].to_vec(),
            };
            start = end;
            chunk
        })
        .collect()
}
