//! Minimal reader for the uncompressed BMP thumbnails kept in the cover cache.

use embedded_graphics::{
    Pixel,
    pixelcolor::BinaryColor,
    prelude::{DrawTarget, Point},
};
use thiserror::Error;

const FILE_HEADER_LEN: usize = 14;
const MIN_INFO_HEADER_LEN: usize = 40;
const MAX_DIMENSION: u32 = 4096;

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum BitmapError {
    #[error("bitmap is truncated")]
    Truncated,
    #[error("missing BM signature")]
    BadSignature,
    #[error("unsupported bitmap: {bits_per_pixel} bpp, compression {compression}")]
    Unsupported {
        bits_per_pixel: u16,
        compression: u32,
    },
    #[error("invalid bitmap dimensions")]
    BadDimensions,
}

pub struct Bitmap<'a> {
    width: u32,
    height: u32,
    top_down: bool,
    bits_per_pixel: u16,
    stride: usize,
    palette: &'a [u8],
    pixels: &'a [u8],
}

impl<'a> Bitmap<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self, BitmapError> {
        if data.len() < FILE_HEADER_LEN + MIN_INFO_HEADER_LEN {
            return Err(BitmapError::Truncated);
        }
        if &data[0..2] != b"BM" {
            return Err(BitmapError::BadSignature);
        }
        let pixel_offset = read_u32(data, 10) as usize;
        let info_len = read_u32(data, 14) as usize;
        let raw_width = read_i32(data, 18);
        let raw_height = read_i32(data, 22);
        let bits_per_pixel = read_u16(data, 28);
        let compression = read_u32(data, 30);
        let colors_used = read_u32(data, 46) as usize;

        // BI_BITFIELDS is accepted for 32 bpp, assuming the usual BGRA masks.
        let compression_ok = compression == 0 || (compression == 3 && bits_per_pixel == 32);
        if !matches!(bits_per_pixel, 1 | 8 | 24 | 32) || !compression_ok {
            return Err(BitmapError::Unsupported {
                bits_per_pixel,
                compression,
            });
        }
        if raw_width <= 0 || raw_height == 0 {
            return Err(BitmapError::BadDimensions);
        }
        let width = raw_width as u32;
        let height = raw_height.unsigned_abs();
        if width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(BitmapError::BadDimensions);
        }

        let stride = ((width as usize * bits_per_pixel as usize + 31) / 32) * 4;
        let needed = stride
            .checked_mul(height as usize)
            .and_then(|len| len.checked_add(pixel_offset))
            .ok_or(BitmapError::BadDimensions)?;
        if data.len() < needed {
            return Err(BitmapError::Truncated);
        }

        let palette = if bits_per_pixel <= 8 {
            let entries = if colors_used == 0 {
                1usize << bits_per_pixel
            } else {
                colors_used
            };
            let start = FILE_HEADER_LEN + info_len;
            let end = start + entries * 4;
            if end > pixel_offset || end > data.len() {
                return Err(BitmapError::Truncated);
            }
            &data[start..end]
        } else {
            &data[0..0]
        };

        Ok(Self {
            width,
            height,
            top_down: raw_height < 0,
            bits_per_pixel,
            stride,
            palette,
            pixels: &data[pixel_offset..needed],
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Luminance of the pixel at (x, y), origin top-left.
    pub fn luma(&self, x: u32, y: u32) -> u8 {
        if x >= self.width || y >= self.height {
            return 255;
        }
        let row = if self.top_down {
            y as usize
        } else {
            (self.height - 1 - y) as usize
        };
        let line = &self.pixels[row * self.stride..(row + 1) * self.stride];
        match self.bits_per_pixel {
            1 => {
                let bit = 7 - (x as usize % 8);
                let index = (line[x as usize / 8] >> bit) & 0x01;
                self.palette_luma(index as usize)
            }
            8 => self.palette_luma(line[x as usize] as usize),
            24 => {
                let px = &line[x as usize * 3..x as usize * 3 + 3];
                luminance(px[2], px[1], px[0])
            }
            _ => {
                let px = &line[x as usize * 4..x as usize * 4 + 4];
                luminance(px[2], px[1], px[0])
            }
        }
    }

    fn palette_luma(&self, index: usize) -> u8 {
        let Some(entry) = self.palette.get(index * 4..index * 4 + 4) else {
            return 255;
        };
        luminance(entry[2], entry[1], entry[0])
    }

    /// Draws the bitmap centred in `max_w`×`max_h` at (x, y), cropping anything
    /// larger than the cell. Ordered dithering maps gray to black and white.
    pub fn draw<D: DrawTarget<Color = BinaryColor>>(
        &self,
        target: &mut D,
        x: i32,
        y: i32,
        max_w: u32,
        max_h: u32,
    ) -> Result<(), D::Error> {
        let draw_w = self.width.min(max_w);
        let draw_h = self.height.min(max_h);
        let dest_x = x + (max_w as i32 - draw_w as i32) / 2;
        let dest_y = y + (max_h as i32 - draw_h as i32) / 2;

        let bayer: [[u8; 4]; 4] = [
            [0, 8, 2, 10],
            [12, 4, 14, 6],
            [3, 11, 1, 9],
            [15, 7, 13, 5],
        ];

        let pixels = (0..draw_h).flat_map(move |dy| {
            (0..draw_w).map(move |dx| {
                let lum = self.luma(dx, dy);
                let threshold = bayer[(dy as usize) & 3][(dx as usize) & 3] * 16 + 8;
                let color = if lum < threshold {
                    BinaryColor::Off
                } else {
                    BinaryColor::On
                };
                Pixel(Point::new(dest_x + dx as i32, dest_y + dy as i32), color)
            })
        });
        target.draw_iter(pixels)
    }
}

fn luminance(r: u8, g: u8, b: u8) -> u8 {
    ((r as u32 * 299 + g as u32 * 587 + b as u32 * 114) / 1000) as u8
}

fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn read_i32(data: &[u8], offset: usize) -> i32 {
    read_u32(data, offset) as i32
}
