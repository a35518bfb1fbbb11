//! Turns labeled cell microscopy images, stored behind URLs listed in a JSON
//! manifest, into `(image, target)` tensor pairs for training an instance
//! segmentation model.

#[macro_use]
extern crate lazy_static;

#[macro_use]
pub mod macros;

pub mod augment;
pub mod collate;
pub mod dataset;
pub mod error;
pub mod fetch;
pub mod image_ops;
pub mod manifest;
pub mod options;
pub mod target;
pub mod utils;

#[cfg(test)]
mod test_support;

use tch::Device;

pub use augment::{AugmentConfig, AugmentParams, Augmentor};
pub use collate::{collate, Batch};
pub use dataset::{BatchIter, CellDataset, RawSample};
pub use error::{DatasetError, DatasetResult};
pub use fetch::{CachingFetcher, Fetch, FetchConfig, HttpFetcher};
pub use manifest::{Manifest, ManifestEntry};
pub use target::{build_target, Target};

lazy_static! {
    pub static ref DEVICE: Device = Device::cuda_if_available();
}
