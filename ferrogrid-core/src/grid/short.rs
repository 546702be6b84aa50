//! Compact integer encoding of H3 cells.
//!
//! A cell index of a known resolution carries constant bits: the mode, the
//! resolution itself and the unused trailing digits (all set to 7). The short
//! form keeps only the base cell and the used digits, so a resolution 3 cell
//! fits 16 bits and a resolution 10 cell 37 bits.

use h3o::{CellIndex, Resolution};

use crate::Error;

const CELL_MODE: u64 = 1 << 59;
const RESOLUTION_OFFSET: u32 = 52;
const DIGIT_BITS: u32 = 3;
const BASE_CELL_BITS: u32 = 7;
const MAX_RESOLUTION: u32 = 15;

/// Short id of a cell, reversible given the cell resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShortCell {
    value: i64,
    resolution: Resolution,
}

impl ShortCell {
    pub fn from_cell(cell: CellIndex) -> Self {
        let resolution = cell.resolution();
        let res = u32::from(u8::from(resolution));
        let padding = (MAX_RESOLUTION - res) * DIGIT_BITS;
        let width = BASE_CELL_BITS + res * DIGIT_BITS;
        let value = (u64::from(cell) >> padding) & ((1_u64 << width) - 1);
        #[allow(clippy::cast_possible_wrap)]
        Self {
            value: value as i64,
            resolution,
        }
    }

    pub fn new(value: i64, resolution: Resolution) -> Self {
        Self { value, resolution }
    }

    pub fn value(self) -> i64 {
        self.value
    }

    pub fn resolution(self) -> Resolution {
        self.resolution
    }

    /// Rebuilds the full cell index
    pub fn to_cell(self) -> Result<CellIndex, Error> {
        let res = u32::from(u8::from(self.resolution));
        let padding = (MAX_RESOLUTION - res) * DIGIT_BITS;
        let width = BASE_CELL_BITS + res * DIGIT_BITS;
        #[allow(clippy::cast_sign_loss)]
        let value = self.value as u64;
        if self.value < 0 || value >> width != 0 {
            return Err(Error::InvalidData(format!(
                "Short id {} does not fit resolution {res}",
                self.value
            )));
        }
        let index = CELL_MODE
            | (u64::from(res) << RESOLUTION_OFFSET)
            | (value << padding)
            | ((1_u64 << padding) - 1);
        CellIndex::try_from(index)
            .map_err(|e| Error::InvalidData(format!("Invalid short id {}: {e}", self.value)))
    }

    /// Short id as partition key, only valid for coarse resolutions
    pub fn as_i32(self) -> Result<i32, Error> {
        i32::try_from(self.value).map_err(|_| {
            Error::InvalidData(format!(
                "Short id {} of resolution {} does not fit 32 bits",
                self.value, self.resolution
            ))
        })
    }
}
