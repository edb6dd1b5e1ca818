//! N-dimensional images, masks and regions.
//!
//! Voxels are stored in a contiguous buffer with the first axis varying
//! fastest. Physical coordinates are `origin + index * spacing` (axis-aligned,
//! no direction cosines). Images are shared between stages through `Arc`, so
//! none of these types are mutated once a stage has started.

use crate::util::{MultiRegError, MultiRegResult};
use std::sync::Arc;

pub mod filter;
#[cfg(feature = "image-io")]
pub mod io;

/// Size, spacing and origin of a voxel grid.
#[derive(Clone, Debug, PartialEq)]
pub struct Geometry {
    size: Vec<usize>,
    spacing: Vec<f64>,
    origin: Vec<f64>,
}

impl Geometry {
    /// Creates a geometry with unit spacing and zero origin.
    pub fn new(size: Vec<usize>) -> MultiRegResult<Self> {
        let dim = size.len();
        Self::with_spacing(size, vec![1.0; dim], vec![0.0; dim])
    }

    /// Creates a geometry with explicit spacing and origin.
    pub fn with_spacing(
        size: Vec<usize>,
        spacing: Vec<f64>,
        origin: Vec<f64>,
    ) -> MultiRegResult<Self> {
        if size.is_empty() || size.iter().any(|&s| s == 0) {
            return Err(MultiRegError::InvalidDimensions { size });
        }
        if size
            .iter()
            .try_fold(1usize, |acc, &s| acc.checked_mul(s))
            .is_none()
        {
            return Err(MultiRegError::InvalidDimensions { size });
        }
        if spacing.len() != size.len() {
            return Err(MultiRegError::DimensionMismatch {
                expected: size.len(),
                got: spacing.len(),
            });
        }
        if origin.len() != size.len() {
            return Err(MultiRegError::DimensionMismatch {
                expected: size.len(),
                got: origin.len(),
            });
        }
        if spacing.iter().any(|&s| !(s > 0.0) || !s.is_finite()) {
            return Err(MultiRegError::InvalidInput("spacing must be positive"));
        }
        Ok(Self {
            size,
            spacing,
            origin,
        })
    }

    pub fn dimension(&self) -> usize {
        self.size.len()
    }

    pub fn size(&self) -> &[usize] {
        &self.size
    }

    pub fn spacing(&self) -> &[f64] {
        &self.spacing
    }

    pub fn origin(&self) -> &[f64] {
        &self.origin
    }

    /// Total number of voxels.
    pub fn len(&self) -> usize {
        self.size.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Buffer offset of an integer index, or `None` outside the grid.
    pub fn linear_index(&self, index: &[usize]) -> Option<usize> {
        if index.len() != self.size.len() {
            return None;
        }
        let mut offset = 0usize;
        let mut stride = 1usize;
        for (&i, &s) in index.iter().zip(&self.size) {
            if i >= s {
                return None;
            }
            offset += i * stride;
            stride *= s;
        }
        Some(offset)
    }

    /// Integer index of a buffer offset.
    pub fn index_of(&self, mut linear: usize) -> Vec<usize> {
        let mut index = Vec::with_capacity(self.size.len());
        for &s in &self.size {
            index.push(linear % s);
            linear /= s;
        }
        index
    }

    /// Physical point of a (possibly continuous) index.
    pub fn index_to_point(&self, index: &[f64]) -> Vec<f64> {
        index
            .iter()
            .zip(self.spacing.iter().zip(&self.origin))
            .map(|(&i, (&sp, &o))| o + i * sp)
            .collect()
    }

    /// Continuous index of a physical point.
    pub fn point_to_index(&self, point: &[f64]) -> Vec<f64> {
        point
            .iter()
            .zip(self.spacing.iter().zip(&self.origin))
            .map(|(&p, (&sp, &o))| (p - o) / sp)
            .collect()
    }

    /// Returns true if a continuous index lies within the sampled extent.
    pub fn contains_index(&self, cindex: &[f64]) -> bool {
        cindex.len() == self.size.len()
            && cindex
                .iter()
                .zip(&self.size)
                .all(|(&c, &s)| c >= 0.0 && c <= (s - 1) as f64)
    }

    /// Nearest integer index of a physical point, if inside the grid.
    pub fn nearest_index(&self, point: &[f64]) -> Option<Vec<usize>> {
        let cindex = self.point_to_index(point);
        let mut index = Vec::with_capacity(cindex.len());
        for (&c, &s) in cindex.iter().zip(&self.size) {
            let r = c.round();
            if r < 0.0 || r > (s - 1) as f64 {
                return None;
            }
            index.push(r as usize);
        }
        Some(index)
    }

    /// Physical center of the voxel grid.
    pub fn center(&self) -> Vec<f64> {
        let mid: Vec<f64> = self.size.iter().map(|&s| (s - 1) as f64 / 2.0).collect();
        self.index_to_point(&mid)
    }

    /// The region covering the whole grid.
    pub fn full_region(&self) -> Region {
        Region {
            index: vec![0; self.size.len()],
            size: self.size.clone(),
        }
    }
}

/// Rectangular index region of a grid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Region {
    index: Vec<usize>,
    size: Vec<usize>,
}

impl Region {
    pub fn new(index: Vec<usize>, size: Vec<usize>) -> MultiRegResult<Self> {
        if index.len() != size.len() {
            return Err(MultiRegError::DimensionMismatch {
                expected: size.len(),
                got: index.len(),
            });
        }
        if size.iter().any(|&s| s == 0) {
            return Err(MultiRegError::InvalidDimensions { size });
        }
        Ok(Self { index, size })
    }

    pub fn index(&self) -> &[usize] {
        &self.index
    }

    pub fn size(&self) -> &[usize] {
        &self.size
    }

    pub fn len(&self) -> usize {
        self.size.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the `n`-th index of the region in fastest-axis-first order.
    pub fn nth(&self, mut n: usize) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.size.len());
        for (&start, &s) in self.index.iter().zip(&self.size) {
            out.push(start + n % s);
            n /= s;
        }
        out
    }

    /// Returns true if the region fits inside the geometry.
    pub fn fits(&self, geometry: &Geometry) -> bool {
        self.index.len() == geometry.dimension()
            && self
                .index
                .iter()
                .zip(&self.size)
                .zip(geometry.size())
                .all(|((&i, &s), &g)| i + s <= g)
    }
}

/// Scalar image with `f32` voxels.
#[derive(Clone, Debug, PartialEq)]
pub struct Image {
    geometry: Geometry,
    data: Vec<f32>,
}

impl Image {
    /// Creates an image with unit spacing and zero origin.
    pub fn new(data: Vec<f32>, size: Vec<usize>) -> MultiRegResult<Self> {
        Self::from_geometry(Geometry::new(size)?, data)
    }

    /// Creates an image on an explicit geometry.
    pub fn from_geometry(geometry: Geometry, data: Vec<f32>) -> MultiRegResult<Self> {
        let needed = geometry.len();
        if data.len() < needed {
            return Err(MultiRegError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        if data.len() > needed {
            return Err(MultiRegError::InvalidDimensions {
                size: geometry.size().to_vec(),
            });
        }
        Ok(Self { geometry, data })
    }

    /// Creates an image by evaluating `f` at every integer index.
    pub fn from_fn<F>(geometry: Geometry, mut f: F) -> Self
    where
        F: FnMut(&[usize]) -> f32,
    {
        let data = (0..geometry.len())
            .map(|i| f(&geometry.index_of(i)))
            .collect();
        Self { geometry, data }
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn dimension(&self) -> usize {
        self.geometry.dimension()
    }

    pub fn size(&self) -> &[usize] {
        self.geometry.size()
    }

    pub fn spacing(&self) -> &[f64] {
        self.geometry.spacing()
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Voxel value at an integer index.
    pub fn get(&self, index: &[usize]) -> Option<f32> {
        self.geometry
            .linear_index(index)
            .and_then(|i| self.data.get(i).copied())
    }
}

/// Binary mask; non-zero voxels are inside.
#[derive(Clone, Debug, PartialEq)]
pub struct Mask {
    geometry: Geometry,
    data: Vec<u8>,
}

impl Mask {
    pub fn new(data: Vec<u8>, size: Vec<usize>) -> MultiRegResult<Self> {
        Self::from_geometry(Geometry::new(size)?, data)
    }

    pub fn from_geometry(geometry: Geometry, data: Vec<u8>) -> MultiRegResult<Self> {
        if data.len() != geometry.len() {
            return Err(MultiRegError::BufferTooSmall {
                needed: geometry.len(),
                got: data.len(),
            });
        }
        Ok(Self { geometry, data })
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns true if the voxel nearest to `point` is inside the mask.
    pub fn is_inside(&self, point: &[f64]) -> bool {
        self.geometry
            .nearest_index(point)
            .and_then(|idx| self.geometry.linear_index(&idx))
            .map(|i| self.data[i] != 0)
            .unwrap_or(false)
    }
}

/// Fixed and moving images plus their masks, carried from stage to stage.
#[derive(Clone, Debug, Default)]
pub struct ImageContainers {
    pub fixed_images: Vec<Arc<Image>>,
    pub moving_images: Vec<Arc<Image>>,
    pub fixed_masks: Vec<Arc<Mask>>,
    pub moving_masks: Vec<Arc<Mask>>,
}

impl ImageContainers {
    /// Containers holding exactly one fixed and one moving image.
    pub fn pair(fixed: Image, moving: Image) -> Self {
        Self {
            fixed_images: vec![Arc::new(fixed)],
            moving_images: vec![Arc::new(moving)],
            ..Self::default()
        }
    }

    pub fn with_fixed_mask(mut self, mask: Mask) -> Self {
        self.fixed_masks = vec![Arc::new(mask)];
        self
    }

    pub fn with_moving_mask(mut self, mask: Mask) -> Self {
        self.moving_masks = vec![Arc::new(mask)];
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fixed_images.is_empty() && self.moving_images.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_rejects_zero_size() {
        let err = Geometry::new(vec![4, 0]).unwrap_err();
        assert_eq!(err, MultiRegError::InvalidDimensions { size: vec![4, 0] });
    }

    #[test]
    fn linear_index_round_trips_through_index_of() {
        let g = Geometry::new(vec![3, 4, 5]).unwrap();
        assert_eq!(g.linear_index(&[2, 1, 3]), Some(2 + 3 + 3 * 12));
        assert_eq!(g.index_of(2 + 3 + 3 * 12), vec![2, 1, 3]);
        assert_eq!(g.linear_index(&[3, 0, 0]), None);
    }

    #[test]
    fn physical_mapping_uses_spacing_and_origin() {
        let g = Geometry::with_spacing(vec![5, 5], vec![2.0, 0.5], vec![10.0, -1.0]).unwrap();
        assert_eq!(g.index_to_point(&[1.0, 2.0]), vec![12.0, 0.0]);
        assert_eq!(g.point_to_index(&[12.0, 0.0]), vec![1.0, 2.0]);
        assert_eq!(g.center(), vec![14.0, 0.0]);
        assert!(g.contains_index(&[4.0, 0.0]));
        assert!(!g.contains_index(&[4.1, 0.0]));
    }

    #[test]
    fn image_rejects_short_buffer() {
        let err = Image::new(vec![0.0; 3], vec![2, 2]).unwrap_err();
        assert_eq!(err, MultiRegError::BufferTooSmall { needed: 4, got: 3 });
    }

    #[test]
    fn region_nth_walks_fastest_axis_first() {
        let r = Region::new(vec![1, 2], vec![2, 2]).unwrap();
        assert_eq!(r.nth(0), vec![1, 2]);
        assert_eq!(r.nth(1), vec![2, 2]);
        assert_eq!(r.nth(2), vec![1, 3]);
        assert!(r.fits(&Geometry::new(vec![3, 4]).unwrap()));
        assert!(!r.fits(&Geometry::new(vec![3, 3]).unwrap()));
    }

    #[test]
    fn mask_uses_nearest_voxel() {
        let mask = Mask::new(vec![0, 1, 0, 0], vec![2, 2]).unwrap();
        assert!(mask.is_inside(&[0.9, 0.2]));
        assert!(!mask.is_inside(&[0.2, 0.2]));
        assert!(!mask.is_inside(&[5.0, 0.0]));
    }
}
