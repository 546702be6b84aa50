//! Street network cache.
//!
//! Every coarse grid cell of a network is stored as two Arrow IPC files,
//! one for edges and one for nodes. A missing file means "not cached",
//! never "empty": partitions without edges are not written at all.

mod columnar;

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use arrow::ipc::reader::FileReader;
use arrow::ipc::writer::FileWriter;
use arrow::record_batch::RecordBatch;
use h3o::CellIndex;
use log::{debug, warn};
use tempfile::NamedTempFile;

use crate::grid::ShortCell;
use crate::model::NetworkPartition;
use crate::{CacheConfig, CacheReadError, CacheWriteError, Error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableKind {
    Edge,
    Node,
}

impl TableKind {
    fn as_str(self) -> &'static str {
        match self {
            TableKind::Edge => "edge",
            TableKind::Node => "node",
        }
    }
}

/// On-disk cache of network partitions keyed by network id and coarse cell
#[derive(Debug, Clone)]
pub struct StreetNetworkCache {
    dir: PathBuf,
}

impl StreetNetworkCache {
    /// Opens the cache, creating its directory if it does not exist
    pub fn new(config: &CacheConfig) -> Result<Self, Error> {
        fs::create_dir_all(&config.dir)?;
        Ok(Self {
            dir: config.dir.clone(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_path(&self, network_id: &str, cell: CellIndex, kind: TableKind) -> PathBuf {
        let short = ShortCell::from_cell(cell).value();
        self.dir
            .join(format!("{network_id}_{short}_{}.arrow", kind.as_str()))
    }

    /// Checks if both tables of a partition are cached
    pub fn exists(&self, network_id: &str, cell: CellIndex) -> bool {
        self.file_path(network_id, cell, TableKind::Edge).exists()
            && self.file_path(network_id, cell, TableKind::Node).exists()
    }

    /// Reads a cached partition
    ///
    /// # Errors
    ///
    /// `CacheReadError::Missing` if the partition was never cached,
    /// `CacheReadError::Corrupt` if a file cannot be decoded.
    pub fn read(&self, network_id: &str, cell: CellIndex) -> Result<NetworkPartition, CacheReadError> {
        self.try_read(network_id, cell)?
            .ok_or_else(|| CacheReadError::Missing {
                network_id: network_id.to_string(),
                cell,
            })
    }

    /// Reads a cached partition, `None` if it is not cached
    pub fn try_read(
        &self,
        network_id: &str,
        cell: CellIndex,
    ) -> Result<Option<NetworkPartition>, CacheReadError> {
        if !self.exists(network_id, cell) {
            return Ok(None);
        }

        let edge_path = self.file_path(network_id, cell, TableKind::Edge);
        let edges = read_batches(&edge_path).and_then(|batches| {
            let mut edges = Vec::new();
            for batch in &batches {
                edges.extend(columnar::batch_to_edges(batch).map_err(|reason| {
                    CacheReadError::Corrupt {
                        path: edge_path.clone(),
                        reason,
                    }
                })?);
            }
            Ok(edges)
        })?;

        let node_path = self.file_path(network_id, cell, TableKind::Node);
        let nodes = read_batches(&node_path).and_then(|batches| {
            let mut nodes = Vec::new();
            for batch in &batches {
                nodes.extend(columnar::batch_to_nodes(batch).map_err(|reason| {
                    CacheReadError::Corrupt {
                        path: node_path.clone(),
                        reason,
                    }
                })?);
            }
            Ok(nodes)
        })?;

        debug!(
            "Read {} edges and {} nodes of cell {cell} from cache",
            edges.len(),
            nodes.len()
        );
        Ok(Some(NetworkPartition::new(edges, nodes)))
    }

    /// Writes a partition into the cache
    ///
    /// A partition without edges is not cached so a gap in coverage is
    /// recomputed on the next request instead of being served as empty.
    pub fn write(
        &self,
        network_id: &str,
        cell: CellIndex,
        partition: &NetworkPartition,
    ) -> Result<(), CacheWriteError> {
        if partition.edges.is_empty() {
            warn!("Skipping cell {cell}, street network is empty or unavailable");
            return Ok(());
        }

        let edge_path = self.file_path(network_id, cell, TableKind::Edge);
        let batch = columnar::edges_to_batch(&partition.edges).map_err(|e| CacheWriteError {
            path: edge_path.clone(),
            reason: e.to_string(),
        })?;
        write_atomic(&edge_path, |file| write_batch(file, &batch))?;

        let node_path = self.file_path(network_id, cell, TableKind::Node);
        let batch = columnar::nodes_to_batch(&partition.nodes).map_err(|e| CacheWriteError {
            path: node_path.clone(),
            reason: e.to_string(),
        })?;
        if let Err(e) = write_atomic(&node_path, |file| write_batch(file, &batch)) {
            // An edge table without its nodes would be read back as a valid partition
            remove_if_exists(&edge_path);
            return Err(e);
        }

        debug!(
            "Cached {} edges and {} nodes of cell {cell}",
            partition.edge_count(),
            partition.node_count()
        );
        Ok(())
    }

    /// Removes a cached partition, e.g. after the source network changed
    pub fn invalidate(&self, network_id: &str, cell: CellIndex) -> Result<(), Error> {
        for kind in [TableKind::Edge, TableKind::Node] {
            let path = self.file_path(network_id, cell, kind);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

fn read_batches(path: &Path) -> Result<Vec<RecordBatch>, CacheReadError> {
    let corrupt = |reason: String| CacheReadError::Corrupt {
        path: path.to_path_buf(),
        reason,
    };

    let file = File::open(path).map_err(|e| corrupt(e.to_string()))?;
    let reader = FileReader::try_new(BufReader::new(file), None).map_err(|e| corrupt(e.to_string()))?;
    reader
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| corrupt(e.to_string()))
}

fn write_batch(file: File, batch: &RecordBatch) -> Result<(), Error> {
    let mut writer = FileWriter::try_new(BufWriter::new(file), &batch.schema())?;
    writer.write(batch)?;
    writer.finish()?;
    let mut buffered = writer.into_inner()?;
    buffered.flush()?;
    let file = buffered.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(())
}

/// Writes through a temporary file of its own in the target directory,
/// renamed into place on success. Concurrent writers of the same path never
/// share a temporary file; the last rename wins. On failure the temporary
/// file is removed and an existing target is left as it was.
fn write_atomic<F>(path: &Path, write: F) -> Result<(), CacheWriteError>
where
    F: FnOnce(File) -> Result<(), Error>,
{
    let failed = |e: Error| CacheWriteError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };
    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    let temporary = NamedTempFile::new_in(dir).map_err(|e| failed(e.into()))?;
    let file = temporary.reopen().map_err(|e| failed(e.into()))?;
    write(file).map_err(failed)?;
    temporary
        .persist(path)
        .map_err(|e| failed(e.error.into()))?;
    Ok(())
}

fn remove_if_exists(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove cache file {}: {e}", path.display());
        }
    }
}
