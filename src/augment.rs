//! Geometric augmentation applied identically to an image and all of its
//! instance masks.

use crate::error::{DatasetError, DatasetResult};
use crate::image_ops::{self, mask_to_tensor, rgb_image_to_tensor};
use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};
use log::trace;
use rand::Rng;
use rayon::prelude::*;
use tch::Tensor;

pub const DEFAULT_RESIZE: (u32, u32) = (1048, 1048);
pub const DEFAULT_CROP: (u32, u32) = (1024, 1024);

#[derive(Debug, Clone, PartialEq)]
pub struct AugmentConfig {
    /// (width, height) every image and mask is resized to before cropping.
    pub resize: (u32, u32),
    /// (width, height) of the random crop window.
    pub crop: (u32, u32),
    pub hflip_prob: f64,
    pub vflip_prob: f64,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            resize: DEFAULT_RESIZE,
            crop: DEFAULT_CROP,
            hflip_prob: 0.5,
            vflip_prob: 0.5,
        }
    }
}

/// One draw of the random parameters, shared by the image and every mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AugmentParams {
    pub top: u32,
    pub left: u32,
    pub hflip: bool,
    pub vflip: bool,
}

#[derive(Debug)]
pub struct AugmentedSample {
    /// `3xHxW` float in `[0, 1]`.
    pub image: Tensor,
    /// One `1xHxW` binary float tensor per input mask, in input order.
    pub masks: Vec<Tensor>,
    pub params: AugmentParams,
}

#[derive(Debug, Clone)]
pub struct Augmentor {
    config: AugmentConfig,
}

impl Augmentor {
    pub fn new(config: AugmentConfig) -> DatasetResult<Self> {
        let (rw, rh) = config.resize;
        let (cw, ch) = config.crop;
        if rw == 0 || rh == 0 || cw == 0 || ch == 0 {
            return Err(DatasetError::InvalidConfig(format!(
                "resize {:?} and crop {:?} must be non-zero",
                config.resize, config.crop
            )));
        }
        if cw > rw || ch > rh {
            return Err(DatasetError::InvalidConfig(format!(
                "crop {:?} does not fit into resized frame {:?}",
                config.crop, config.resize
            )));
        }
        for (name, p) in &[("hflip", config.hflip_prob), ("vflip", config.vflip_prob)] {
            if !(0.0..=1.0).contains(p) {
                return Err(DatasetError::InvalidConfig(format!(
                    "{} probability {} outside [0, 1]",
                    name, p
                )));
            }
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &AugmentConfig {
        &self.config
    }

    /// Draws the crop offset first, then the horizontal and vertical flips.
    pub fn sample_params<R: Rng + ?Sized>(&self, rng: &mut R) -> AugmentParams {
        let (rw, rh) = self.config.resize;
        let (cw, ch) = self.config.crop;
        let top = rng.gen_range(0..=rh - ch);
        let left = rng.gen_range(0..=rw - cw);
        let hflip = rng.gen_bool(self.config.hflip_prob);
        let vflip = rng.gen_bool(self.config.vflip_prob);
        AugmentParams {
            top,
            left,
            hflip,
            vflip,
        }
    }

    pub fn augment<R: Rng + ?Sized>(
        &self,
        image: &RgbImage,
        masks: &[GrayImage],
        rng: &mut R,
    ) -> DatasetResult<AugmentedSample> {
        let params = self.sample_params(rng);
        self.apply(image, masks, params)
    }

    /// Runs resize, crop, flips and tensor conversion with fixed parameters.
    pub fn apply(
        &self,
        image: &RgbImage,
        masks: &[GrayImage],
        params: AugmentParams,
    ) -> DatasetResult<AugmentedSample> {
        let (rw, rh) = self.config.resize;
        let (cw, ch) = self.config.crop;
        if params.left + cw > rw || params.top + ch > rh {
            return Err(DatasetError::InvalidConfig(format!(
                "crop window at ({}, {}) of {:?} leaves the {:?} frame",
                params.left, params.top, self.config.crop, self.config.resize
            )));
        }
        trace!("augmenting with {:?}", params);

        let image = self.transform(image, FilterType::Triangle, params);
        let image = rgb_image_to_tensor(&image);
        // nearest neighbour so masks stay binary
        let masks = masks
            .par_iter()
            .map(|mask| mask_to_tensor(&self.transform(mask, FilterType::Nearest, params)))
            .collect::<Vec<Tensor>>();

        Ok(AugmentedSample {
            image,
            masks,
            params,
        })
    }

    fn transform<P>(
        &self,
        image: &image_ops::Buffer<P>,
        filter: FilterType,
        params: AugmentParams,
    ) -> image_ops::Buffer<P>
    where
        P: image::Pixel + 'static,
        P::Subpixel: 'static,
    {
        let (cw, ch) = self.config.crop;
        let resized = image_ops::resize_exact(image, self.config.resize, filter);
        let mut out = image_ops::crop(&resized, params.left, params.top, cw, ch);
        if params.hflip {
            out = imageops::flip_horizontal(&out);
        }
        if params.vflip {
            out = imageops::flip_vertical(&out);
        }
        out
    }
}

impl Default for Augmentor {
    fn default() -> Self {
        Self {
            config: AugmentConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::mask_to_box;
    use crate::test_support::{gradient_image, rect_mask};
    use anyhow::Result;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn small() -> Result<Augmentor> {
        Ok(Augmentor::new(AugmentConfig {
            resize: (20, 16),
            crop: (12, 10),
            ..Default::default()
        })?)
    }

    #[test]
    fn rejects_crop_larger_than_frame() {
        let res = Augmentor::new(AugmentConfig {
            resize: (100, 100),
            crop: (101, 50),
            ..Default::default()
        });
        assert!(matches!(res, Err(DatasetError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_bad_probability() {
        let res = Augmentor::new(AugmentConfig {
            vflip_prob: 1.5,
            ..Default::default()
        });
        assert!(matches!(res, Err(DatasetError::InvalidConfig(_))));
    }

    #[test]
    fn sampled_offsets_stay_in_range() -> Result<()> {
        let aug = small()?;
        let mut rng = StdRng::seed_from_u64(7);
        let mut seen_max_left = false;
        for _ in 0..500 {
            let p = aug.sample_params(&mut rng);
            assert!(p.left <= 8 && p.top <= 6);
            seen_max_left |= p.left == 8;
        }
        // the last valid offset is reachable
        assert!(seen_max_left);
        Ok(())
    }

    #[test]
    fn same_seed_same_params() -> Result<()> {
        let aug = Augmentor::default();
        let a = aug.sample_params(&mut StdRng::seed_from_u64(42));
        let b = aug.sample_params(&mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
        Ok(())
    }

    #[test]
    fn forced_flip_probabilities() -> Result<()> {
        let always = Augmentor::new(AugmentConfig {
            hflip_prob: 1.,
            vflip_prob: 0.,
            ..Default::default()
        })?;
        let p = always.sample_params(&mut StdRng::seed_from_u64(3));
        assert!(p.hflip);
        assert!(!p.vflip);
        Ok(())
    }

    #[test]
    fn output_shapes() -> Result<()> {
        let aug = small()?;
        let image = gradient_image(40, 30);
        let masks = vec![rect_mask(40, 30, 0, 0, 40, 30), rect_mask(40, 30, 1, 1, 3, 3)];
        let out = aug.augment(&image, &masks, &mut StdRng::seed_from_u64(1))?;
        assert_eq!(out.image.size(), vec![3, 10, 12]);
        assert_eq!(out.masks.len(), 2);
        for mask in &out.masks {
            assert_eq!(mask.size(), vec![1, 10, 12]);
        }
        Ok(())
    }

    #[test]
    fn crop_and_flips_move_image_and_masks_together() -> Result<()> {
        let aug = small()?;
        // already at the resize frame, so only crop and flips act
        let image = gradient_image(20, 16);
        let mask = rect_mask(20, 16, 5, 4, 6, 5);
        let params = AugmentParams {
            top: 2,
            left: 3,
            hflip: true,
            vflip: true,
        };
        let out = aug.apply(&image, &[mask], params)?;

        // source pixel (5, 4) -> crop (2, 2) -> hflip (9, 2) -> vflip (9, 7)
        let mask_box = mask_to_box(&out.masks[0])?;
        assert_eq!(mask_box, [9., 7., 9., 7.]);
        assert!((out.image.double_value(&[0, 7, 9]) - 5. / 255.).abs() < 1e-6);
        assert!((out.image.double_value(&[1, 7, 9]) - 4. / 255.).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn boxes_stay_inside_default_crop_frame() -> Result<()> {
        let aug = Augmentor::default();
        let image = gradient_image(1048, 1048);
        let masks = vec![
            rect_mask(1048, 1048, 0, 0, 1048, 1048),
            rect_mask(1048, 1048, 400, 500, 700, 650),
        ];
        let corners = [
            AugmentParams { top: 0, left: 0, hflip: false, vflip: false },
            AugmentParams { top: 24, left: 24, hflip: true, vflip: false },
            AugmentParams { top: 24, left: 0, hflip: false, vflip: true },
            AugmentParams { top: 11, left: 17, hflip: true, vflip: true },
        ];
        for params in corners.iter() {
            let out = aug.apply(&image, &masks, *params)?;
            for mask in &out.masks {
                let [xmin, ymin, xmax, ymax] = mask_to_box(mask)?;
                assert!(xmin >= 0. && ymin >= 0.);
                assert!(xmax < 1024. && ymax < 1024.);
                assert!(xmin <= xmax && ymin <= ymax);
            }
            let [xmin, ymin, xmax, ymax] = mask_to_box(&out.masks[0])?;
            assert_eq!([xmin, ymin, xmax, ymax], [0., 0., 1023., 1023.]);
        }
        Ok(())
    }

    #[test]
    fn apply_rejects_window_outside_frame() -> Result<()> {
        let aug = small()?;
        let params = AugmentParams {
            top: 7,
            left: 0,
            hflip: false,
            vflip: false,
        };
        let res = aug.apply(&gradient_image(20, 16), &[], params);
        assert!(matches!(res, Err(DatasetError::InvalidConfig(_))));
        Ok(())
    }
}
