use crate::augment::{AugmentConfig, Augmentor};
use crate::dataset::CellDataset;
use crate::fetch::{CachingFetcher, FetchConfig, HttpFetcher, DEFAULT_TIMEOUT};
use crate::manifest::Manifest;
use crate::utils::{parse_dimensions, parse_number};
use anyhow::Result;
use std::time::Duration;

pub const DEFAULT_MANIFEST: &str = "labels.json";
pub const DEFAULT_BATCH_SIZE: usize = 2;

#[derive(Debug)]
pub struct DatasetOptions<'a> {
    pub manifest_path: &'a str,
    pub start: usize,
    pub count: Option<usize>,
    pub batch_size: usize,
    pub shuffle: bool,
    pub seed: Option<u64>,
    pub timeout: Option<Duration>,
    pub cache: bool,
    pub strict_masks: bool,
    pub augment: AugmentConfig,
    pub output_dir: Option<&'a str>,
}

impl Default for DatasetOptions<'_> {
    fn default() -> Self {
        Self {
            manifest_path: DEFAULT_MANIFEST,
            start: 0,
            count: None,
            batch_size: DEFAULT_BATCH_SIZE,
            shuffle: false,
            seed: None,
            timeout: Some(DEFAULT_TIMEOUT),
            cache: false,
            strict_masks: false,
            augment: AugmentConfig::default(),
            output_dir: None,
        }
    }
}

impl<'a> DatasetOptions<'a> {
    pub fn new(args: &'a clap::ArgMatches) -> Result<Self> {
        let mut opts = Self::default();
        if let Some(path) = args.value_of("manifest") {
            opts.manifest_path = path;
        }
        if let Some(start) = args.value_of("start") {
            opts.start = parse_number(start, "start")?;
        }
        if let Some(count) = args.value_of("count") {
            opts.count = Some(parse_number(count, "count")?);
        }
        if let Some(batch_size) = args.value_of("batch-size") {
            opts.batch_size = parse_number(batch_size, "batch size")?;
        }
        if args.is_present("shuffle") {
            opts.shuffle = true;
        }
        if let Some(seed) = args.value_of("seed") {
            opts.seed = Some(parse_number(seed, "seed")?);
        }
        if let Some(secs) = args.value_of("timeout") {
            let secs: u64 = parse_number(secs, "timeout")?;
            // 0 waits forever
            opts.timeout = if secs == 0 {
                None
            } else {
                Some(Duration::from_secs(secs))
            };
        }
        if args.is_present("cache") {
            opts.cache = true;
        }
        if args.is_present("strict-masks") {
            opts.strict_masks = true;
        }
        if let Some(dims) = args.value_of("resize") {
            opts.augment.resize = parse_dimensions(dims)?;
        }
        if let Some(dims) = args.value_of("crop") {
            opts.augment.crop = parse_dimensions(dims)?;
        }
        if let Some(p) = args.value_of("hflip-prob") {
            opts.augment.hflip_prob = parse_number(p, "horizontal flip probability")?;
        }
        if let Some(p) = args.value_of("vflip-prob") {
            opts.augment.vflip_prob = parse_number(p, "vertical flip probability")?;
        }
        if let Some(dir) = args.value_of("output-dir") {
            opts.output_dir = Some(dir);
        }

        Ok(opts)
    }

    /// Indices selected by `start` and `count`, clipped to the manifest length.
    pub fn indices(&self, len: usize) -> Vec<usize> {
        let end = match self.count {
            Some(count) => self.start.saturating_add(count).min(len),
            None => len,
        };
        (self.start.min(end)..end).collect()
    }

    pub fn build_dataset(&self) -> Result<CellDataset> {
        let manifest = Manifest::from_path(self.manifest_path)?;
        let augmentor = Augmentor::new(self.augment.clone())?;
        let fetcher = HttpFetcher::new(&FetchConfig {
            timeout: self.timeout,
        });
        let dataset = if self.cache {
            CellDataset::new(manifest, CachingFetcher::new(fetcher), augmentor)
        } else {
            CellDataset::new(manifest, fetcher, augmentor)
        };
        Ok(dataset.strict_masks(self.strict_masks))
    }
}
