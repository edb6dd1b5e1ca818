//! Multi-resolution schedules.
//!
//! A [`Schedule`] holds one shrink factor per resolution level and image
//! axis, coarsest level first. Pyramids derive the Gaussian smoothing width
//! of each cell with [`smoothing_sigma`].

use crate::util::{MultiRegError, MultiRegResult};

/// Smoothing width, in units of voxel spacing, applied for a factor of zero.
pub const ZERO_FACTOR_SIGMA: f64 = 0.01;

/// Level x dimension matrix of shrink factors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schedule {
    levels: usize,
    dimension: usize,
    factors: Vec<u32>,
}

impl Schedule {
    /// Builds the default halving schedule.
    ///
    /// Row 0 is `starting` if given, `2^(levels - 1)` in every axis otherwise;
    /// each further row is `max(1, previous / 2)`.
    pub fn build_default(
        levels: usize,
        dimension: usize,
        starting: Option<&[u32]>,
    ) -> MultiRegResult<Self> {
        if levels == 0 || dimension == 0 {
            return Err(MultiRegError::InvalidSchedule {
                levels,
                dimension,
                expected_levels: levels.max(1),
                expected_dimension: dimension.max(1),
            });
        }
        let first = match starting {
            Some(row) if row.len() != dimension => {
                return Err(MultiRegError::DimensionMismatch {
                    expected: dimension,
                    got: row.len(),
                })
            }
            Some(row) => row.to_vec(),
            None => {
                let top = u32::try_from(levels - 1)
                    .ok()
                    .and_then(|shift| 1u32.checked_shl(shift))
                    .ok_or(MultiRegError::InvalidInput("too many resolution levels"))?;
                vec![top; dimension]
            }
        };

        let mut factors = Vec::with_capacity(levels * dimension);
        let mut row = first;
        for _ in 0..levels {
            factors.extend_from_slice(&row);
            row = row.iter().map(|&f| (f / 2).max(1)).collect();
        }
        Ok(Self {
            levels,
            dimension,
            factors,
        })
    }

    /// Schedule from explicit rows.
    pub fn from_rows(rows: &[Vec<u32>]) -> MultiRegResult<Self> {
        let dimension = rows.first().map_or(0, Vec::len);
        if rows.is_empty() || dimension == 0 || rows.iter().any(|r| r.len() != dimension) {
            return Err(MultiRegError::InvalidSchedule {
                levels: rows.len(),
                dimension: rows.iter().map(Vec::len).max().unwrap_or(0),
                expected_levels: rows.len().max(1),
                expected_dimension: dimension.max(1),
            });
        }
        Ok(Self {
            levels: rows.len(),
            dimension,
            factors: rows.concat(),
        })
    }

    /// Schedule from a flat row-major list as written in parameter files.
    pub fn from_flat(values: &[u32], levels: usize, dimension: usize) -> MultiRegResult<Self> {
        if dimension == 0 || values.len() != levels * dimension {
            return Err(MultiRegError::InvalidSchedule {
                levels: values.len().checked_div(dimension).unwrap_or(0),
                dimension,
                expected_levels: levels,
                expected_dimension: dimension,
            });
        }
        Ok(Self {
            levels,
            dimension,
            factors: values.to_vec(),
        })
    }

    /// Fails unless the schedule has `levels` rows of `dimension` factors.
    pub fn validate(&self, levels: usize, dimension: usize) -> MultiRegResult<()> {
        if self.levels != levels || self.dimension != dimension {
            return Err(MultiRegError::InvalidSchedule {
                levels: self.levels,
                dimension: self.dimension,
                expected_levels: levels,
                expected_dimension: dimension,
            });
        }
        Ok(())
    }

    pub fn levels(&self) -> usize {
        self.levels
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn row(&self, level: usize) -> Option<&[u32]> {
        (level < self.levels)
            .then(|| &self.factors[level * self.dimension..(level + 1) * self.dimension])
    }

    pub fn factor(&self, level: usize, axis: usize) -> Option<u32> {
        self.row(level).and_then(|r| r.get(axis).copied())
    }

    pub fn rows(&self) -> impl Iterator<Item = &[u32]> {
        self.factors.chunks_exact(self.dimension)
    }

    /// Physical smoothing widths of one level.
    pub fn smoothing_sigmas(&self, level: usize, spacing: &[f64]) -> Option<Vec<f64>> {
        let row = self.row(level)?;
        Some(
            row.iter()
                .zip(spacing)
                .map(|(&f, &sp)| smoothing_sigma(f, sp))
                .collect(),
        )
    }
}

/// Gaussian standard deviation for one schedule cell: `factor / 2` voxels.
///
/// A factor of zero yields [`ZERO_FACTOR_SIGMA`] voxels rather than no
/// smoothing at all.
pub fn smoothing_sigma(factor: u32, spacing: f64) -> f64 {
    if factor == 0 {
        ZERO_FACTOR_SIGMA * spacing
    } else {
        f64::from(factor) / 2.0 * spacing
    }
}
