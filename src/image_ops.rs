use crate::error::{DatasetError, DatasetResult};
use image::{
    imageops::{self, FilterType},
    DynamicImage, GrayImage, ImageBuffer, Pixel, Rgb, RgbImage,
};
use imageproc::drawing;
use imageproc::rect::Rect;
use itertools::Itertools;
use log::warn;
use tch::{Kind, Tensor};

const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

pub type Buffer<P> = ImageBuffer<P, Vec<<P as Pixel>::Subpixel>>;

/// Reduces a mask stored as a color image to its first channel.
///
/// Masks are exported with identical channels. When they diverge the first
/// channel is kept and a warning logged, unless `strict` is set in which
/// case the mask is rejected.
pub fn reduce_mask_channels(
    mask: &DynamicImage,
    url: &str,
    strict: bool,
) -> DatasetResult<GrayImage> {
    if let DynamicImage::ImageLuma8(gray) = mask {
        return Ok(gray.clone());
    }
    let rgb = mask.to_rgb8();
    let diverging = rgb.pixels().any(|p| !p.0.iter().all_equal());
    if diverging {
        if strict {
            return Err(DatasetError::MaskChannelMismatch {
                url: url.to_string(),
            });
        }
        warn!("mask {} has diverging channels, keeping the first one", url);
    }
    let (width, height) = rgb.dimensions();
    let first_channel = rgb.pixels().map(|p| p.0[0]).collect::<Vec<u8>>();
    GrayImage::from_raw(width, height, first_channel).ok_or_else(|| {
        DatasetError::InvalidConfig(format!("mask {} has inconsistent dimensions", url))
    })
}

/// Resizes to exactly `dimensions`. Images already at that size are returned
/// untouched.
pub fn resize_exact<P>(image: &Buffer<P>, dimensions: (u32, u32), filter: FilterType) -> Buffer<P>
where
    P: Pixel + 'static,
    P::Subpixel: 'static,
{
    if image.dimensions() == dimensions {
        return image.clone();
    }
    imageops::resize(image, dimensions.0, dimensions.1, filter)
}

pub fn crop<P>(image: &Buffer<P>, left: u32, top: u32, width: u32, height: u32) -> Buffer<P>
where
    P: Pixel + 'static,
    P::Subpixel: 'static,
{
    imageops::crop_imm(image, left, top, width, height).to_image()
}

/// Converts an `HxWx3` image into a `3xHxW` float tensor scaled to `[0, 1]`.
pub fn rgb_image_to_tensor(image: &RgbImage) -> Tensor {
    let (width, height) = image.dimensions();
    Tensor::of_slice(image.as_raw())
        .view((height as i64, width as i64, 3))
        .permute(&[2, 0, 1])
        .contiguous()
        .to_kind(Kind::Float)
        / 255.
}

/// Converts a mask into a `1xHxW` float tensor holding only zeros and ones.
pub fn mask_to_tensor(mask: &GrayImage) -> Tensor {
    let (width, height) = mask.dimensions();
    let binary = mask
        .as_raw()
        .iter()
        .map(|&v| (v > 0) as u8)
        .collect::<Vec<u8>>();
    Tensor::of_slice(&binary)
        .view((1, height as i64, width as i64))
        .to_kind(Kind::Float)
}

/// Inverse of [`rgb_image_to_tensor`].
pub fn tensor_to_rgb_image(tensor: &Tensor) -> DatasetResult<RgbImage> {
    let (channels, height, width) = tensor.size3()?;
    if channels != 3 {
        return Err(DatasetError::InvalidConfig(format!(
            "expected a 3 channel image tensor, got {:?}",
            tensor.size()
        )));
    }
    let pixels = (tensor * 255. + 0.5)
        .to_kind(Kind::Uint8)
        .permute(&[1, 2, 0])
        .contiguous();
    let raw = Vec::<u8>::from(pixels);
    RgbImage::from_raw(width as u32, height as u32, raw).ok_or_else(|| {
        DatasetError::InvalidConfig(format!("tensor {:?} does not fit an image", tensor.size()))
    })
}

/// Draws every `[xmin, ymin, xmax, ymax]` row of `boxes` as an outline.
pub fn draw_boxes(image: &mut RgbImage, boxes: &Tensor) -> DatasetResult<()> {
    let (rows, _) = boxes.size2()?;
    for i in 0..rows {
        let xmin = boxes.double_value(&[i, 0]) as i32;
        let ymin = boxes.double_value(&[i, 1]) as i32;
        let xmax = boxes.double_value(&[i, 2]) as i32;
        let ymax = boxes.double_value(&[i, 3]) as i32;
        let rect = Rect::at(xmin, ymin).of_size(
            (xmax - xmin + 1).max(1) as u32,
            (ymax - ymin + 1).max(1) as u32,
        );
        drawing::draw_hollow_rect_mut(image, rect, BOX_COLOR);
    }
    Ok(())
}
