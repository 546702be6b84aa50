use h3o::CellIndex;
use itertools::Itertools;

use crate::algo::projection::CellCosts;

/// Destinations reached from one origin within the same cost bucket
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeatmapRow {
    /// Fine origin cell
    pub origin: CellIndex,
    /// Short ids of the fine destination cells, ascending
    pub destinations: Vec<i64>,
    /// Travel time in buckets of the configured width
    pub cost: u16,
    /// Short id of the coarse cell of the origin, the partition key of the
    /// result table
    pub origin_coarse: i32,
}

/// Groups the reached cells of one origin by `floor(cost / bucket_seconds)`.
///
/// Rows are ordered by bucket. Non-finite costs are skipped and buckets
/// beyond `u16::MAX` are clamped.
pub fn bucket_costs(
    origin: CellIndex,
    origin_coarse: i32,
    costs: &CellCosts,
    bucket_seconds: u32,
) -> Vec<HeatmapRow> {
    let width = f64::from(bucket_seconds.max(1));

    costs
        .iter()
        .filter(|(_, cost)| cost.is_finite() && **cost >= 0.0)
        .map(|(cell, cost)| {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let bucket = (cost / width).floor().min(f64::from(u16::MAX)) as u16;
            (bucket, *cell)
        })
        .sorted_unstable()
        .chunk_by(|(bucket, _)| *bucket)
        .into_iter()
        .map(|(cost, group)| HeatmapRow {
            origin,
            destinations: group.map(|(_, cell)| cell).collect(),
            cost,
            origin_coarse,
        })
        .collect()
}
