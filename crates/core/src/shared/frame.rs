use std::borrow::Cow;

use image::{ImageBuffer, Rgb, RgbImage};
use ndarray::{ArrayView3, ArrayViewMut3};

/// Byte order of the color channels in a 3-channel [`Frame`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

/// A single camera frame: contiguous 8-bit pixels in row-major order.
///
/// Camera backends convert their native formats to 3-channel RGB at the
/// I/O boundary. The channel order is carried explicitly so consumers that
/// need a particular order can convert instead of assuming.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    order: ChannelOrder,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            order: ChannelOrder::Rgb,
            index,
        }
    }

    pub fn with_channel_order(mut self, order: ChannelOrder) -> Self {
        self.order = order;
        self
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn channel_order(&self) -> ChannelOrder {
        self.order
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns this frame in the requested channel order, borrowing when it
    /// already matches.
    pub fn to_channel_order(&self, order: ChannelOrder) -> Cow<'_, Frame> {
        if self.order == order || self.channels != 3 {
            return Cow::Borrowed(self);
        }
        let mut converted = self.clone();
        for px in converted.data.chunks_exact_mut(3) {
            px.swap(0, 2);
        }
        converted.order = order;
        Cow::Owned(converted)
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    pub fn as_ndarray_mut(&mut self) -> ArrayViewMut3<'_, u8> {
        ArrayViewMut3::from_shape(self.shape(), &mut self.data)
            .expect("Frame data length must match dimensions")
    }

    /// Borrowed image view over the pixel data (3-channel frames only).
    pub fn as_image(&self) -> Option<ImageBuffer<Rgb<u8>, &[u8]>> {
        if self.channels != 3 {
            return None;
        }
        ImageBuffer::from_raw(self.width, self.height, self.data.as_slice())
    }

    /// Runs `f` with the pixel buffer temporarily wrapped as an [`RgbImage`].
    ///
    /// The allocation is moved into the image and back, so drawing mutates
    /// this frame's buffer in place.
    pub fn with_image_mut<R>(&mut self, f: impl FnOnce(&mut RgbImage) -> R) -> Option<R> {
        if self.channels != 3 || self.data.len() != (self.width * self.height * 3) as usize {
            return None;
        }
        let data = std::mem::take(&mut self.data);
        let mut image = RgbImage::from_raw(self.width, self.height, data)?;
        let result = f(&mut image);
        self.data = image.into_raw();
        Some(result)
    }

    /// Builds a frame from an image, keeping `index` and channel order.
    pub fn from_image(image: RgbImage, order: ChannelOrder, index: usize) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height, 3, index).with_channel_order(order)
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}
