//! Convenience helpers for loading and saving images via the `image` crate.
//!
//! Available when the `image-io` feature is enabled. Files are read as 2-D
//! grayscale with unit spacing; masks treat any non-zero pixel as inside.

use crate::driver::{ImageLoader, ImageWriter};
use crate::image::{Image, Mask};
use crate::util::{MultiRegError, MultiRegResult};
use std::path::Path;

/// Creates an image from a grayscale image buffer.
pub fn image_from_gray(img: &image::GrayImage) -> MultiRegResult<Image> {
    let width = img.width() as usize;
    let height = img.height() as usize;
    let data = img.as_raw().iter().map(|&v| f32::from(v)).collect();
    Image::new(data, vec![width, height])
}

/// Loads an image from disk and converts it to grayscale.
pub fn load_gray_image<P: AsRef<Path>>(path: P) -> MultiRegResult<Image> {
    let img = image::open(path).map_err(|err| MultiRegError::ImageIo {
        reason: err.to_string(),
    })?;
    image_from_gray(&img.to_luma8())
}

/// Loads a mask from disk.
pub fn load_mask<P: AsRef<Path>>(path: P) -> MultiRegResult<Mask> {
    let img = image::open(path)
        .map_err(|err| MultiRegError::ImageIo {
            reason: err.to_string(),
        })?
        .to_luma8();
    let size = vec![img.width() as usize, img.height() as usize];
    let data = img.as_raw().iter().map(|&v| u8::from(v != 0)).collect();
    Mask::new(data, size)
}

/// Saves a 2-D image as 8-bit grayscale, clamping values to [0, 255].
pub fn save_gray_image<P: AsRef<Path>>(img: &Image, path: P) -> MultiRegResult<()> {
    if img.dimension() != 2 {
        return Err(MultiRegError::DimensionMismatch {
            expected: 2,
            got: img.dimension(),
        });
    }
    let width = u32::try_from(img.size()[0])
        .map_err(|_| MultiRegError::InvalidInput("image too wide"))?;
    let height = u32::try_from(img.size()[1])
        .map_err(|_| MultiRegError::InvalidInput("image too tall"))?;
    let raw: Vec<u8> = img
        .data()
        .iter()
        .map(|&v| v.round().clamp(0.0, 255.0) as u8)
        .collect();
    let buffer = image::GrayImage::from_raw(width, height, raw)
        .ok_or(MultiRegError::InvalidInput("image buffer size"))?;
    buffer.save(path).map_err(|err| MultiRegError::ImageIo {
        reason: err.to_string(),
    })
}

/// File-backed loader and writer for PNG/JPEG images.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageFileIo;

impl ImageLoader for ImageFileIo {
    fn load_image(&self, path: &Path) -> MultiRegResult<Image> {
        load_gray_image(path)
    }

    fn load_mask(&self, path: &Path) -> MultiRegResult<Mask> {
        load_mask(path)
    }
}

impl ImageWriter for ImageFileIo {
    fn extension(&self) -> &str {
        "png"
    }

    fn write_image(&self, image: &Image, path: &Path) -> MultiRegResult<()> {
        save_gray_image(image, path)
    }
}
