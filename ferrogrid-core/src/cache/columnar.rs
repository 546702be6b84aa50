//! Conversion of edge and node tables to Arrow record batches.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, Float64Array, Float64Builder, Int64Array, ListBuilder,
};
use arrow::datatypes::{DataType, Field, Float64Type, Int64Type, Schema};
use arrow::record_batch::RecordBatch;
use geo::{Coord, LineString, Point};

use crate::model::{StreetEdge, StreetNode};

pub(super) fn edge_schema() -> Schema {
    Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("source", DataType::Int64, false),
        Field::new("target", DataType::Int64, false),
        Field::new("cost", DataType::Float64, false),
        Field::new("reverse_cost", DataType::Float64, false),
        Field::new("length", DataType::Float64, false),
        // Interleaved x, y coordinates
        Field::new(
            "geometry",
            DataType::List(Arc::new(Field::new("item", DataType::Float64, true))),
            false,
        ),
    ])
}

pub(super) fn node_schema() -> Schema {
    Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("x", DataType::Float64, false),
        Field::new("y", DataType::Float64, false),
    ])
}

pub(super) fn edges_to_batch(edges: &[StreetEdge]) -> Result<RecordBatch, arrow::error::ArrowError> {
    let mut geometry = ListBuilder::new(Float64Builder::new());
    for edge in edges {
        for coord in edge.geometry.coords() {
            geometry.values().append_value(coord.x);
            geometry.values().append_value(coord.y);
        }
        geometry.append(true);
    }

    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from_iter_values(edges.iter().map(|e| e.id))),
        Arc::new(Int64Array::from_iter_values(edges.iter().map(|e| e.source))),
        Arc::new(Int64Array::from_iter_values(edges.iter().map(|e| e.target))),
        Arc::new(Float64Array::from_iter_values(edges.iter().map(|e| e.cost))),
        Arc::new(Float64Array::from_iter_values(
            edges.iter().map(|e| e.reverse_cost),
        )),
        Arc::new(Float64Array::from_iter_values(edges.iter().map(|e| e.length))),
        Arc::new(geometry.finish()),
    ];

    RecordBatch::try_new(Arc::new(edge_schema()), columns)
}

pub(super) fn nodes_to_batch(nodes: &[StreetNode]) -> Result<RecordBatch, arrow::error::ArrowError> {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from_iter_values(nodes.iter().map(|n| n.id))),
        Arc::new(Float64Array::from_iter_values(
            nodes.iter().map(|n| n.geometry.x()),
        )),
        Arc::new(Float64Array::from_iter_values(
            nodes.iter().map(|n| n.geometry.y()),
        )),
    ];

    RecordBatch::try_new(Arc::new(node_schema()), columns)
}

pub(super) fn batch_to_edges(batch: &RecordBatch) -> Result<Vec<StreetEdge>, String> {
    let id = int_column(batch, "id")?;
    let source = int_column(batch, "source")?;
    let target = int_column(batch, "target")?;
    let cost = float_column(batch, "cost")?;
    let reverse_cost = float_column(batch, "reverse_cost")?;
    let length = float_column(batch, "length")?;
    let geometry = batch
        .column_by_name("geometry")
        .and_then(|column| column.as_list_opt::<i32>())
        .ok_or_else(|| "missing or mistyped column 'geometry'".to_string())?;

    let mut edges = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let values = geometry.value(row);
        let values = values
            .as_primitive_opt::<Float64Type>()
            .ok_or_else(|| format!("geometry of row {row} is not a float list"))?;
        if values.null_count() > 0 || values.len() % 2 != 0 {
            return Err(format!("geometry of row {row} is malformed"));
        }
        let coords = values
            .values()
            .chunks_exact(2)
            .map(|xy| Coord { x: xy[0], y: xy[1] })
            .collect::<Vec<_>>();

        edges.push(StreetEdge {
            id: id.value(row),
            source: source.value(row),
            target: target.value(row),
            cost: cost.value(row),
            reverse_cost: reverse_cost.value(row),
            length: length.value(row),
            geometry: LineString::new(coords),
        });
    }

    Ok(edges)
}

pub(super) fn batch_to_nodes(batch: &RecordBatch) -> Result<Vec<StreetNode>, String> {
    let id = int_column(batch, "id")?;
    let x = float_column(batch, "x")?;
    let y = float_column(batch, "y")?;

    Ok((0..batch.num_rows())
        .map(|row| StreetNode {
            id: id.value(row),
            geometry: Point::new(x.value(row), y.value(row)),
        })
        .collect())
}

fn int_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int64Array, String> {
    batch
        .column_by_name(name)
        .and_then(|column| column.as_primitive_opt::<Int64Type>())
        .ok_or_else(|| format!("missing or mistyped column '{name}'"))
}

fn float_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Float64Array, String> {
    batch
        .column_by_name(name)
        .and_then(|column| column.as_primitive_opt::<Float64Type>())
        .ok_or_else(|| format!("missing or mistyped column '{name}'"))
}
