use anyhow::{ensure, Result};
use image::{imageops, Rgb, RgbImage};

/// Order of the colour channels stored in a [`Frame`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

impl ChannelOrder {
    /// Index of the red channel inside a pixel
    pub(crate) fn red(self) -> usize {
        match self {
            ChannelOrder::Rgb => 0,
            ChannelOrder::Bgr => 2,
        }
    }

    /// Index of the blue channel inside a pixel
    pub(crate) fn blue(self) -> usize {
        2 - self.red()
    }
}

/// An 8-bit, three channel picture together with the order its channels are stored in.
///
/// The pixel buffer is an [`RgbImage`] used purely as a three channel container, so a
/// frame in [`ChannelOrder::Bgr`] keeps blue in the first byte of every pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pixels: RgbImage,
    order: ChannelOrder,
}

impl Frame {
    pub fn new(pixels: RgbImage, order: ChannelOrder) -> Self {
        Self { pixels, order }
    }

    /// Frame of the given size with every pixel set to `value` (in `order`)
    pub fn filled(width: u32, height: u32, value: [u8; 3], order: ChannelOrder) -> Self {
        Self::new(RgbImage::from_pixel(width, height, Rgb(value)), order)
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn order(&self) -> ChannelOrder {
        self.order
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut RgbImage {
        &mut self.pixels
    }

    pub fn as_raw(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    /// Consume the frame, returning its pixels converted to RGB order
    pub fn into_rgb(self) -> RgbImage {
        self.into_order(ChannelOrder::Rgb).pixels
    }

    /// Convert the frame to `order`, swapping the first and last channel if needed
    pub fn into_order(mut self, order: ChannelOrder) -> Self {
        if self.order != order {
            for pixel in self.pixels.pixels_mut() {
                pixel.0.swap(0, 2);
            }
            self.order = order;
        }
        self
    }

    pub fn to_order(&self, order: ChannelOrder) -> Self {
        self.clone().into_order(order)
    }

    /// Horizontally mirrored copy
    pub fn mirrored(&self) -> Self {
        Self::new(imageops::flip_horizontal(&self.pixels), self.order)
    }

    /// Copy scaled to `width`x`height` with bilinear filtering; no-op copy if the size matches
    pub fn resized(&self, width: u32, height: u32) -> Self {
        if self.dimensions() == (width, height) {
            return self.clone();
        }
        let pixels = imageops::resize(&self.pixels, width, height, imageops::FilterType::Triangle);
        Self::new(pixels, self.order)
    }

    /// BT.601 luma of the pixel at (x, y)
    pub fn luma(&self, x: u32, y: u32) -> u8 {
        let pixel = self.pixels.get_pixel(x, y);
        let r = pixel[self.order.red()] as f32;
        let g = pixel[1] as f32;
        let b = pixel[self.order.blue()] as f32;
        (0.299 * r + 0.587 * g + 0.114 * b).round().clamp(0.0, 255.0) as u8
    }
}

/// Single channel f32 grid with the same spatial layout as a [`Frame`].
///
/// Used both for raw person probabilities and for the refined matte; values are
/// stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl Mask {
    pub fn from_vec(width: u32, height: u32, data: Vec<f32>) -> Result<Self> {
        ensure!(
            data.len() == width as usize * height as usize,
            "mask of {}x{} needs {} values, got {}",
            width,
            height,
            width as usize * height as usize,
            data.len()
        );
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Build a mask from parts already known to agree in size
    pub(crate) fn from_parts(width: u32, height: u32, data: Vec<f32>) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize);
        Self {
            width,
            height,
            data,
        }
    }

    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data[(y * self.width + x) as usize]
    }

    /// Grayscale visualisation of the mask, white where the value is 1.0
    pub fn to_frame(&self, order: ChannelOrder) -> Frame {
        let pixels = RgbImage::from_fn(self.width, self.height, |x, y| {
            let value = (self.get(x, y) * 255.0).clamp(0.0, 255.0) as u8;
            Rgb([value, value, value])
        });
        Frame::new(pixels, order)
    }
}
