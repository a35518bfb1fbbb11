use crate::error::{DatasetError, DatasetResult};
use log::debug;
use tch::{kind, Device, IndexOp, Tensor};

/// Training target of one sample. All per-instance fields share the same
/// leading dimension `N`, which may be zero.
#[derive(Debug)]
pub struct Target {
    /// `Nx4` float, `[xmin, ymin, xmax, ymax]` in crop pixel coordinates.
    pub boxes: Tensor,
    /// `N` int64, always 1.
    pub labels: Tensor,
    /// `NxHxW` float holding zeros and ones.
    pub masks: Tensor,
    /// `[1]` int64, the dataset index.
    pub image_id: Tensor,
    /// `N` float, box width times height.
    pub area: Tensor,
    /// `N` int64, always 0.
    pub iscrowd: Tensor,
}

impl Target {
    pub fn num_instances(&self) -> i64 {
        self.boxes.size()[0]
    }

    #[allow(clippy::wrong_self_convention)]
    pub fn to_device(&self, device: Device) -> Target {
        Target {
            boxes: self.boxes.to_device(device),
            labels: self.labels.to_device(device),
            masks: self.masks.to_device(device),
            image_id: self.image_id.to_device(device),
            area: self.area.to_device(device),
            iscrowd: self.iscrowd.to_device(device),
        }
    }
}

/// Tight bounding box of the nonzero pixels of a `1xHxW` or `HxW` mask.
///
/// A mask without foreground has no box; callers are expected to filter those
/// out beforehand.
pub fn mask_to_box(mask: &Tensor) -> DatasetResult<[f32; 4]> {
    let plane = match mask.dim() {
        3 => mask.i(0),
        _ => mask.shallow_clone(),
    };
    plane.size2()?;
    let positions = plane.nonzero();
    if positions.size()[0] == 0 {
        return Err(DatasetError::EmptyMask {
            index: 0,
            position: 0,
        });
    }
    let rows = positions.i((.., 0));
    let cols = positions.i((.., 1));
    Ok([
        cols.min().int64_value(&[]) as f32,
        rows.min().int64_value(&[]) as f32,
        cols.max().int64_value(&[]) as f32,
        rows.max().int64_value(&[]) as f32,
    ])
}

fn has_foreground(mask: &Tensor) -> bool {
    mask.nonzero().size()[0] > 0
}

/// Builds the target for the sample at `index`, dropping masks that were
/// cropped away entirely.
pub fn build_target(
    image: Tensor,
    masks: Vec<Tensor>,
    index: usize,
) -> DatasetResult<(Tensor, Target)> {
    let (_, height, width) = image.size3()?;
    let total = masks.len();
    let masks = masks
        .into_iter()
        .filter(has_foreground)
        .collect::<Vec<Tensor>>();
    let n = masks.len();
    if n < total {
        debug!(
            "sample {}: {} of {} instances left the crop window",
            index,
            total - n,
            total
        );
    }

    let mut boxes = Vec::with_capacity(n * 4);
    let mut area = Vec::with_capacity(n);
    for (position, mask) in masks.iter().enumerate() {
        let [xmin, ymin, xmax, ymax] = mask_to_box(mask).map_err(|err| match err {
            DatasetError::EmptyMask { .. } => DatasetError::EmptyMask { index, position },
            other => other,
        })?;
        boxes.extend_from_slice(&[xmin, ymin, xmax, ymax]);
        area.push((xmax - xmin) * (ymax - ymin));
    }

    let n = n as i64;
    let target = if n == 0 {
        Target {
            boxes: Tensor::zeros(&[0, 4], kind::FLOAT_CPU),
            labels: Tensor::zeros(&[0], kind::INT64_CPU),
            masks: Tensor::zeros(&[0, height, width], kind::FLOAT_CPU),
            image_id: Tensor::of_slice(&[index as i64]),
            area: Tensor::zeros(&[0], kind::FLOAT_CPU),
            iscrowd: Tensor::zeros(&[0], kind::INT64_CPU),
        }
    } else {
        Target {
            boxes: Tensor::of_slice(&boxes).view((n, 4)),
            labels: Tensor::ones(&[n], kind::INT64_CPU),
            masks: Tensor::cat(masks.as_slice(), 0).view((n, height, width)),
            image_id: Tensor::of_slice(&[index as i64]),
            area: Tensor::of_slice(&area),
            iscrowd: Tensor::zeros(&[n], kind::INT64_CPU),
        }
    };
    Ok((image, target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_ops::mask_to_tensor;
    use crate::test_support::rect_mask;
    use anyhow::Result;
    use tch::Kind;

    fn assert_consistent(target: &Target, n: i64) {
        assert_eq!(target.boxes.size(), vec![n, 4]);
        assert_eq!(target.labels.size(), vec![n]);
        assert_eq!(target.masks.size()[0], n);
        assert_eq!(target.area.size(), vec![n]);
        assert_eq!(target.iscrowd.size(), vec![n]);
        assert_eq!(target.num_instances(), n);
    }

    #[test]
    fn mask_to_box_test() -> Result<()> {
        let values = vec![
            0, 0, 0, 0, 0, //
            0, 0, 1, 1, 0, //
            0, 1, 1, 0, 0, //
            0, 0, 1, 0, 0, //
        ];
        let mask = Tensor::of_slice(&values).view((1, 4, 5)).to_kind(Kind::Float);
        assert_eq!(mask_to_box(&mask)?, [1., 1., 3., 3.]);
        assert_eq!(mask_to_box(&mask.view((4, 5)))?, [1., 1., 3., 3.]);
        Ok(())
    }

    #[test]
    fn mask_to_box_empty_is_precondition_error() {
        let mask = Tensor::zeros(&[1, 4, 4], kind::FLOAT_CPU);
        assert!(matches!(
            mask_to_box(&mask),
            Err(DatasetError::EmptyMask { .. })
        ));
    }

    #[test]
    fn two_instances() -> Result<()> {
        let image = Tensor::zeros(&[3, 8, 10], kind::FLOAT_CPU);
        let masks = vec![
            mask_to_tensor(&rect_mask(10, 8, 0, 0, 3, 2)),
            mask_to_tensor(&rect_mask(10, 8, 5, 4, 10, 8)),
        ];
        let (image, target) = build_target(image, masks, 7)?;
        assert_eq!(image.size(), vec![3, 8, 10]);
        assert_consistent(&target, 2);
        assert_eq!(
            target.boxes,
            Tensor::of_slice(&[0f32, 0., 2., 1., 5., 4., 9., 7.]).view((2, 4))
        );
        assert_eq!(target.labels, Tensor::of_slice(&[1i64, 1]));
        assert_eq!(target.iscrowd, Tensor::of_slice(&[0i64, 0]));
        assert_eq!(target.area, Tensor::of_slice(&[2f32, 12.]));
        assert_eq!(target.image_id, Tensor::of_slice(&[7i64]));
        assert_eq!(target.masks.size(), vec![2, 8, 10]);
        assert_eq!(target.masks.double_value(&[1, 7, 9]), 1.);
        assert_eq!(target.masks.double_value(&[0, 7, 9]), 0.);
        Ok(())
    }

    #[test]
    fn empty_masks_are_dropped() -> Result<()> {
        let image = Tensor::zeros(&[3, 6, 6], kind::FLOAT_CPU);
        let masks = vec![
            mask_to_tensor(&rect_mask(6, 6, 0, 0, 0, 0)),
            mask_to_tensor(&rect_mask(6, 6, 2, 2, 4, 4)),
            mask_to_tensor(&rect_mask(6, 6, 0, 0, 0, 0)),
        ];
        let (_, target) = build_target(image, masks, 0)?;
        assert_consistent(&target, 1);
        assert_eq!(target.boxes, Tensor::of_slice(&[2f32, 2., 3., 3.]).view((1, 4)));
        Ok(())
    }

    #[test]
    fn zero_instances_give_empty_target() -> Result<()> {
        let image = Tensor::zeros(&[3, 6, 5], kind::FLOAT_CPU);
        let masks = vec![mask_to_tensor(&rect_mask(5, 6, 0, 0, 0, 0))];
        let (_, target) = build_target(image, masks, 3)?;
        assert_consistent(&target, 0);
        assert_eq!(target.masks.size(), vec![0, 6, 5]);
        assert_eq!(target.image_id, Tensor::of_slice(&[3i64]));

        let (_, target) = build_target(Tensor::zeros(&[3, 6, 5], kind::FLOAT_CPU), vec![], 4)?;
        assert_consistent(&target, 0);
        Ok(())
    }

    #[test]
    fn single_pixel_instance_has_zero_area() -> Result<()> {
        let image = Tensor::zeros(&[3, 4, 4], kind::FLOAT_CPU);
        let masks = vec![mask_to_tensor(&rect_mask(4, 4, 1, 2, 2, 3))];
        let (_, target) = build_target(image, masks, 0)?;
        assert_eq!(target.boxes, Tensor::of_slice(&[1f32, 2., 1., 2.]).view((1, 4)));
        assert_eq!(target.area, Tensor::of_slice(&[0f32]));
        Ok(())
    }
}
