use crate::augment::{AugmentParams, Augmentor};
use crate::collate::Batch;
use crate::error::DatasetResult;
use crate::fetch::Fetch;
use crate::image_ops::reduce_mask_channels;
use crate::manifest::Manifest;
use crate::target::{build_target, Target};
use image::{GrayImage, RgbImage};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tch::{Device, Tensor};

/// Image and masks exactly as fetched, before any augmentation.
#[derive(Debug, Clone)]
pub struct RawSample {
  pub image: RgbImage,
  pub masks: Vec<GrayImage>,
}

/// Labeled cell images whose pixels live behind remote URLs.
///
/// Every access fetches again and draws new augmentation parameters, so the
/// same index yields different tensors on each call. Wrap the fetcher in a
/// [`CachingFetcher`](crate::fetch::CachingFetcher) to avoid the repeated
/// downloads.
pub struct CellDataset {
  manifest: Manifest,
  fetcher: Box<dyn Fetch>,
  augmentor: Augmentor,
  strict_masks: bool,
}

impl CellDataset {
  pub fn new<F: Fetch + 'static>(manifest: Manifest, fetcher: F, augmentor: Augmentor) -> Self {
    CellDataset {
      manifest,
      fetcher: Box::new(fetcher),
      augmentor,
      strict_masks: false,
    }
  }

  /// Rejects masks whose color channels differ instead of keeping the first one.
  pub fn strict_masks(mut self, strict: bool) -> Self {
    self.strict_masks = strict;
    self
  }

  pub fn len(&self) -> usize {
    self.manifest.len()
  }

  pub fn is_empty(&self) -> bool {
    self.manifest.is_empty()
  }

  pub fn manifest(&self) -> &Manifest {
    &self.manifest
  }

  pub fn augmentor(&self) -> &Augmentor {
    &self.augmentor
  }

  /// Fetches the image and every mask of the entry at `index`.
  ///
  /// The index is checked before any request is made.
  pub fn load(&self, index: usize) -> DatasetResult<RawSample> {
    let entry = self.manifest.get(index)?;
    let image = measure_time!(format!("fetch image {}", index), || {
      self.fetcher.fetch(&entry.image_url)
    })?
    .to_rgb8();
    let masks = entry
      .mask_urls()
      .map(|url| {
        let mask = self.fetcher.fetch(url)?;
        reduce_mask_channels(&mask, url, self.strict_masks)
      })
      .collect::<DatasetResult<Vec<GrayImage>>>()?;
    debug!(
      "loaded sample {} ({}) with {} masks",
      index,
      entry.display_name(),
      masks.len()
    );
    Ok(RawSample { image, masks })
  }

  /// Loads, augments and builds the target for `index` with the given RNG.
  pub fn item_with_rng<R: Rng + ?Sized>(
    &self,
    index: usize,
    rng: &mut R,
  ) -> DatasetResult<(Tensor, Target)> {
    let raw = self.load(index)?;
    let augmented = self.augmentor.augment(&raw.image, &raw.masks, rng)?;
    build_target(augmented.image, augmented.masks, index)
  }

  pub fn item(&self, index: usize) -> DatasetResult<(Tensor, Target)> {
    self.item_with_rng(index, &mut rand::thread_rng())
  }

  /// Same as [`item`](Self::item) with a fixed crop window and flips.
  pub fn item_with_params(
    &self,
    index: usize,
    params: AugmentParams,
  ) -> DatasetResult<(Tensor, Target)> {
    let raw = self.load(index)?;
    let augmented = self.augmentor.apply(&raw.image, &raw.masks, params)?;
    build_target(augmented.image, augmented.masks, index)
  }

  /// Iterates over the whole dataset in mini-batches.
  pub fn batches(&self, batch_size: usize) -> BatchIter<'_> {
    BatchIter::new(self, (0..self.len()).collect(), batch_size)
  }

  /// Iterates over the given indices only. They are validated lazily, when
  /// their batch is loaded.
  pub fn batches_over(&self, indices: Vec<usize>, batch_size: usize) -> BatchIter<'_> {
    BatchIter::new(self, indices, batch_size)
  }
}

/// An iterator over collated mini-batches of a [`CellDataset`].
///
/// The samples of one batch are loaded in parallel. Each sample gets its own
/// RNG seeded from the iterator's RNG, so a seeded iterator produces the same
/// batches regardless of thread scheduling.
pub struct BatchIter<'a> {
  dataset: &'a CellDataset,
  indices: Vec<usize>,
  batch_index: usize,
  batch_size: usize,
  rng: StdRng,
  device: Device,
  return_smaller_last_batch: bool,
}

impl<'a> BatchIter<'a> {
  fn new(dataset: &'a CellDataset, indices: Vec<usize>, batch_size: usize) -> BatchIter<'a> {
    BatchIter {
      dataset,
      indices,
      batch_index: 0,
      batch_size: batch_size.max(1),
      rng: StdRng::from_entropy(),
      device: Device::Cpu,
      return_smaller_last_batch: false,
    }
  }

  /// Reseeds the RNG used for shuffling and augmentation.
  pub fn seed(&mut self, seed: u64) -> &mut BatchIter<'a> {
    self.rng = StdRng::seed_from_u64(seed);
    self
  }

  /// Shuffles the order in which samples are grouped into batches.
  pub fn shuffle(&mut self) -> &mut BatchIter<'a> {
    self.indices.shuffle(&mut self.rng);
    self
  }

  /// Transfers the batches to a specified device.
  #[allow(clippy::wrong_self_convention)]
  pub fn to_device(&mut self, device: Device) -> &mut BatchIter<'a> {
    self.device = device;
    self
  }

  /// When set, returns the last batch even if smaller than the batch size.
  pub fn return_smaller_last_batch(&mut self) -> &mut BatchIter<'a> {
    self.return_smaller_last_batch = true;
    self
  }

  pub fn indices(&self) -> &[usize] {
    &self.indices
  }

  fn load_batch(&mut self, indices: Vec<usize>) -> DatasetResult<Batch> {
    let seeds = indices.iter().map(|_| self.rng.gen()).collect::<Vec<u64>>();
    let dataset = self.dataset;
    let samples = measure_time!(format!("load batch {}", self.batch_index), || indices
      .par_iter()
      .zip(seeds.par_iter())
      .map(|(&index, &seed)| dataset.item_with_rng(index, &mut StdRng::seed_from_u64(seed)))
      .collect::<DatasetResult<Vec<(Tensor, Target)>>>())?;
    let batch = Batch::new(indices, samples);
    info!(
      "batch {}: {} samples, {} instances",
      self.batch_index,
      batch.len(),
      batch.total_instances()
    );
    Ok(batch.to_device(self.device))
  }
}

impl<'a> Iterator for BatchIter<'a> {
  type Item = DatasetResult<Batch>;

  fn next(&mut self) -> Option<Self::Item> {
    let total_size = self.indices.len();
    let start = self.batch_index * self.batch_size;
    let size = std::cmp::min(self.batch_size, total_size.saturating_sub(start));
    if size == 0 || (!self.return_smaller_last_batch && size < self.batch_size) {
      return None;
    }
    let indices = self.indices[start..start + size].to_vec();
    let res = self.load_batch(indices);
    self.batch_index += 1;
    Some(res)
  }
}

impl std::fmt::Debug for CellDataset {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CellDataset")
      .field("entries", &self.manifest.len())
      .field("augmentor", &self.augmentor)
      .field("strict_masks", &self.strict_masks)
      .finish()
  }
}
