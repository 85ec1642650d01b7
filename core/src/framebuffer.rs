use embedded_graphics::{Pixel, pixelcolor::BinaryColor, prelude::{DrawTarget, OriginDimensions, Size}};

use crate::ui::Rect;

/// Panel dimensions in its native landscape orientation.
pub const WIDTH: usize = 800;
pub const HEIGHT: usize = 480;
pub const BUFFER_SIZE: usize = WIDTH * HEIGHT / 8;

/// Display rotation/orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    /// No rotation (landscape, 800x480)
    Rotate0,
    /// 90° clockwise (portrait, 480x800)
    Rotate90,
    /// 180° rotation (landscape upside-down, 800x480)
    Rotate180,
    /// 270° clockwise (portrait, 480x800)
    Rotate270,
}

/// The shared 1-bit framebuffer. `On` is white. The inactive buffer holds the
/// last frame sent to the panel so drivers can compute fast partial refreshes.
pub struct DisplayBuffers {
    framebuffer: [[u8; BUFFER_SIZE]; 2],
    active: bool,
    rotation: Rotation,
}

impl Default for DisplayBuffers {
    fn default() -> Self {
        Self::new(Rotation::Rotate90)
    }
}

impl DisplayBuffers {
    pub fn new(rotation: Rotation) -> Self {
        Self {
            framebuffer: [[0xFF; BUFFER_SIZE]; 2],
            active: false,
            rotation,
        }
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn set_rotation(&mut self, rotation: Rotation) {
        self.rotation = rotation;
    }

    pub fn active_buffer(&self) -> &[u8; BUFFER_SIZE] {
        &self.framebuffer[self.active as usize]
    }

    pub fn inactive_buffer(&self) -> &[u8; BUFFER_SIZE] {
        &self.framebuffer[!self.active as usize]
    }

    fn active_buffer_mut(&mut self) -> &mut [u8; BUFFER_SIZE] {
        &mut self.framebuffer[self.active as usize]
    }

    /// Called by drivers once the active buffer has been sent to the panel.
    pub fn swap_buffers(&mut self) {
        self.active = !self.active;
        let (first, second) = self.framebuffer.split_at_mut(1);
        if self.active {
            second[0].copy_from_slice(&first[0]);
        } else {
            first[0].copy_from_slice(&second[0]);
        }
    }

    pub fn clear_screen(&mut self, color: BinaryColor) {
        let fill = if color == BinaryColor::On { 0xFF } else { 0x00 };
        self.active_buffer_mut().fill(fill);
    }

    pub fn fill_rect(&mut self, rect: Rect, color: BinaryColor) {
        for y in rect.y..rect.y + rect.h {
            for x in rect.x..rect.x + rect.w {
                self.set_pixel(x, y, color);
            }
        }
    }

    /// Maps a logical (rotated) coordinate onto the panel's bit index.
    fn panel_index(&self, x: i32, y: i32) -> Option<usize> {
        let size = self.size();
        if x < 0 || y < 0 || x as u32 >= size.width || y as u32 >= size.height {
            return None;
        }
        let (x, y) = (x as usize, y as usize);
        let (px, py) = match self.rotation {
            Rotation::Rotate0 => (x, y),
            Rotation::Rotate90 => (y, HEIGHT - 1 - x),
            Rotation::Rotate180 => (WIDTH - 1 - x, HEIGHT - 1 - y),
            Rotation::Rotate270 => (WIDTH - 1 - y, x),
        };
        (px < WIDTH && py < HEIGHT).then_some(py * WIDTH + px)
    }

    pub fn set_pixel(&mut self, x: i32, y: i32, color: BinaryColor) {
        let Some(index) = self.panel_index(x, y) else {
            return;
        };
        let mask = 1 << (7 - (index % 8));
        let byte = &mut self.active_buffer_mut()[index / 8];
        match color {
            BinaryColor::On => *byte |= mask,
            BinaryColor::Off => *byte &= !mask,
        }
    }

    /// Reads back a logical pixel; off-screen reads as white.
    pub fn pixel(&self, x: i32, y: i32) -> BinaryColor {
        let Some(index) = self.panel_index(x, y) else {
            return BinaryColor::On;
        };
        if (self.active_buffer()[index / 8] >> (7 - (index % 8))) & 0x01 == 1 {
            BinaryColor::On
        } else {
            BinaryColor::Off
        }
    }
}

impl OriginDimensions for DisplayBuffers {
    fn size(&self) -> Size {
        match self.rotation {
            Rotation::Rotate0 | Rotation::Rotate180 => Size::new(WIDTH as u32, HEIGHT as u32),
            Rotation::Rotate90 | Rotation::Rotate270 => Size::new(HEIGHT as u32, WIDTH as u32),
        }
    }
}

impl DrawTarget for DisplayBuffers {
    type Color = BinaryColor;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(coord, color) in pixels {
            self.set_pixel(coord.x, coord.y, color);
        }
        Ok(())
    }
}
