use std::fs::{self, File};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, Int32Array, Int64Builder, ListBuilder, UInt16Array, UInt64Array,
};
use arrow::datatypes::{DataType, Field, Int32Type, Int64Type, Schema, UInt16Type, UInt64Type};
use arrow::ipc::reader::StreamReader;
use arrow::ipc::writer::StreamWriter;
use arrow::record_batch::RecordBatch;
use h3o::CellIndex;
use log::{debug, warn};

use super::{MatrixSink, SinkFactory};
use crate::Error;
use crate::matrix::HeatmapRow;

fn matrix_schema() -> Schema {
    Schema::new(vec![
        Field::new("orig_id", DataType::UInt64, false),
        Field::new(
            "dest_id",
            DataType::List(Arc::new(Field::new("item", DataType::Int64, true))),
            false,
        ),
        Field::new("traveltime", DataType::UInt16, false),
        Field::new("h3_3", DataType::Int32, false),
    ])
}

fn rows_to_batch(rows: &[HeatmapRow]) -> Result<RecordBatch, Error> {
    let mut destinations = ListBuilder::new(Int64Builder::new());
    for row in rows {
        destinations.values().append_slice(&row.destinations);
        destinations.append(true);
    }

    let columns: Vec<ArrayRef> = vec![
        Arc::new(UInt64Array::from_iter_values(
            rows.iter().map(|row| u64::from(row.origin)),
        )),
        Arc::new(destinations.finish()),
        Arc::new(UInt16Array::from_iter_values(rows.iter().map(|row| row.cost))),
        Arc::new(Int32Array::from_iter_values(
            rows.iter().map(|row| row.origin_coarse),
        )),
    ];

    Ok(RecordBatch::try_new(Arc::new(matrix_schema()), columns)?)
}

fn batch_to_rows(batch: &RecordBatch) -> Result<Vec<HeatmapRow>, Error> {
    let invalid = |column: &str| Error::Sink(format!("Missing or mistyped column '{column}'"));
    let origin = batch
        .column_by_name("orig_id")
        .and_then(|c| c.as_primitive_opt::<UInt64Type>())
        .ok_or_else(|| invalid("orig_id"))?;
    let destinations = batch
        .column_by_name("dest_id")
        .and_then(|c| c.as_list_opt::<i32>())
        .ok_or_else(|| invalid("dest_id"))?;
    let cost = batch
        .column_by_name("traveltime")
        .and_then(|c| c.as_primitive_opt::<UInt16Type>())
        .ok_or_else(|| invalid("traveltime"))?;
    let coarse = batch
        .column_by_name("h3_3")
        .and_then(|c| c.as_primitive_opt::<Int32Type>())
        .ok_or_else(|| invalid("h3_3"))?;

    (0..batch.num_rows())
        .map(|row| {
            let cell = CellIndex::try_from(origin.value(row))
                .map_err(|e| Error::Sink(format!("Invalid origin cell in row {row}: {e}")))?;
            let values = destinations.value(row);
            let values = values
                .as_primitive_opt::<Int64Type>()
                .ok_or_else(|| invalid("dest_id"))?;

            Ok(HeatmapRow {
                origin: cell,
                destinations: values.values().to_vec(),
                cost: cost.value(row),
                origin_coarse: coarse.value(row),
            })
        })
        .collect()
}

/// Result table stored as Arrow IPC stream files inside `dir`.
///
/// Every opened sink writes its own file `{table}_{worker}_{part}.arrow`,
/// `part` being the first number not yet taken by the worker, so sinks
/// opened again for later regions never replace earlier rows.
#[derive(Debug, Clone)]
pub struct ArrowSinkFactory {
    dir: PathBuf,
    table: String,
}

impl ArrowSinkFactory {
    pub fn new(dir: impl Into<PathBuf>, table: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            table: table.into(),
        }
    }

    fn part_path(&self, worker: usize, part: usize) -> PathBuf {
        self.dir
            .join(format!("{}_{worker}_{part}.arrow", self.table))
    }

    fn next_part_path(&self, worker: usize) -> PathBuf {
        let mut part = 0;
        while self.part_path(worker, part).exists() {
            part += 1;
        }
        self.part_path(worker, part)
    }

    /// Files of the result table, ordered by path
    pub fn files(&self) -> Result<Vec<PathBuf>, Error> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let prefix = format!("{}_", self.table);
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_table_file = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| name.strip_prefix(&prefix))
                .and_then(|rest| rest.strip_suffix(".arrow"))
                .and_then(|rest| rest.split_once('_'))
                .is_some_and(|(worker, part)| {
                    worker.parse::<usize>().is_ok() && part.parse::<usize>().is_ok()
                });
            if is_table_file {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Reads back every committed row of the result table
    pub fn read_rows(&self) -> Result<Vec<HeatmapRow>, Error> {
        let mut rows = Vec::new();
        for path in self.files()? {
            rows.extend(read_stream(&path)?);
        }
        Ok(rows)
    }
}

fn read_stream(path: &Path) -> Result<Vec<HeatmapRow>, Error> {
    decode_stream(BufReader::new(File::open(path)?))
}

fn decode_stream<R: Read>(input: R) -> Result<Vec<HeatmapRow>, Error> {
    let reader = StreamReader::try_new(input, None)?;
    let mut rows = Vec::new();
    for batch in reader {
        rows.extend(batch_to_rows(&batch?)?);
    }
    Ok(rows)
}

impl SinkFactory for ArrowSinkFactory {
    fn prepare(&self) -> Result<(), Error> {
        fs::create_dir_all(&self.dir)?;
        for path in self.files()? {
            fs::remove_file(&path)?;
        }
        debug!("Initialized result table {} in {}", self.table, self.dir.display());
        Ok(())
    }

    fn open(&self, worker: usize) -> Result<Box<dyn MatrixSink>, Error> {
        // Workers started from outside a run find no prepared directory
        fs::create_dir_all(&self.dir)?;
        let file = File::create(self.next_part_path(worker))?;
        Ok(Box::new(ArrowSink::new(Box::new(file))?))
    }
}

/// Destination of a stream file that can be cut back to a committed length
trait StreamOutput: Write + Send {
    fn truncate_to(&mut self, len: u64) -> std::io::Result<()>;
}

impl StreamOutput for File {
    fn truncate_to(&mut self, len: u64) -> std::io::Result<()> {
        self.set_len(len)?;
        self.seek(SeekFrom::Start(len))?;
        Ok(())
    }
}

/// Appends committed rows as record batches to a stream file.
///
/// Messages are encoded in memory and appended whole. An append that fails
/// half way is cut off again, so the file always ends on a committed batch.
pub struct ArrowSink {
    encoder: StreamWriter<Vec<u8>>,
    output: Box<dyn StreamOutput>,
    /// Bytes of the output holding complete messages
    committed: u64,
    pending: Vec<HeatmapRow>,
}

impl ArrowSink {
    fn new(output: Box<dyn StreamOutput>) -> Result<Self, Error> {
        let mut sink = Self {
            encoder: StreamWriter::try_new(Vec::new(), &matrix_schema())?,
            output,
            committed: 0,
            pending: Vec::new(),
        };
        // The schema message goes out first
        sink.append()?;
        Ok(sink)
    }

    /// Moves the encoded messages to the output
    fn append(&mut self) -> Result<(), Error> {
        let encoded = std::mem::take(self.encoder.get_mut());
        let written = self
            .output
            .write_all(&encoded)
            .and_then(|()| self.output.flush());

        match written {
            Ok(()) => {
                self.committed += encoded.len() as u64;
                Ok(())
            }
            Err(e) => {
                if let Err(cut) = self.output.truncate_to(self.committed) {
                    warn!("Failed to cut result stream back to {} bytes: {cut}", self.committed);
                }
                Err(e.into())
            }
        }
    }
}

impl MatrixSink for ArrowSink {
    fn insert(&mut self, rows: &[HeatmapRow]) -> Result<(), Error> {
        self.pending.extend_from_slice(rows);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), Error> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let batch = rows_to_batch(&self.pending)?;
        if let Err(e) = self.encoder.write(&batch) {
            self.encoder.get_mut().clear();
            return Err(e.into());
        }
        self.append()?;
        self.pending.clear();
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), Error> {
        self.pending.clear();
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<(), Error> {
        self.encoder.finish()?;
        self.append()
    }
}
