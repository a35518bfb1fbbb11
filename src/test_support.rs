//! In-memory stand-ins used by the unit tests.

use crate::error::{DatasetError, DatasetResult};
use crate::fetch::{decode_image, Fetch};
use image::{DynamicImage, GrayImage, ImageOutputFormat, Luma, Rgb, RgbImage};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn encode_png(image: &DynamicImage) -> anyhow::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image.write_to(&mut bytes, ImageOutputFormat::Png)?;
    Ok(bytes)
}

/// Serves encoded images from a map and counts every call.
#[derive(Clone, Default)]
pub struct MemoryFetcher {
    images: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    calls: Arc<AtomicUsize>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_png(&self, url: &str, image: &DynamicImage) -> anyhow::Result<()> {
        let bytes = encode_png(image)?;
        self.insert_bytes(url, bytes);
        Ok(())
    }

    pub fn insert_bytes(&self, url: &str, bytes: Vec<u8>) {
        if let Ok(mut images) = self.images.lock() {
            images.insert(url.to_string(), bytes);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Fetch for MemoryFetcher {
    fn fetch(&self, url: &str) -> DatasetResult<DynamicImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let bytes = self
            .images
            .lock()
            .ok()
            .and_then(|images| images.get(url).cloned())
            .ok_or_else(|| DatasetError::Status {
                url: url.to_string(),
                status: 404,
            })?;
        decode_image(url, &bytes)
    }
}

/// A gradient image, so crops and flips are observable.
pub fn gradient_image(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    })
}

/// A mask with a filled `[x0, x1) x [y0, y1)` rectangle.
pub fn rect_mask(width: u32, height: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        if x >= x0 && x < x1 && y >= y0 && y < y1 {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Masks are exported as three identical channels.
pub fn as_rgb_mask(mask: &GrayImage) -> DynamicImage {
    DynamicImage::ImageRgb8(DynamicImage::ImageLuma8(mask.clone()).to_rgb8())
}
