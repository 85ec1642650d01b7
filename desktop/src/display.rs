use std::sync::Arc;

use embedded_graphics::{pixelcolor::BinaryColor, prelude::OriginDimensions};
use minifb::{Key, Window};
use parking_lot::Mutex;
use tern_library_core::{
    display::{Display, RefreshMode},
    framebuffer::DisplayBuffers,
    input::{ButtonState, Buttons},
};

const WHITE: u32 = 0xFFFFFFFF;
const BLACK: u32 = 0xFF000000;

/// The window contents, written by the render thread and presented by the
/// window thread.
pub struct Frame {
    pub pixels: Vec<u32>,
    pub width: usize,
    pub height: usize,
    pub dirty: bool,
}

impl Frame {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            pixels: vec![WHITE; width * height],
            width,
            height,
            dirty: true,
        }
    }
}

/// Stands in for the e-paper panel. Every refresh mode blits the whole frame.
pub struct FrameDisplay {
    frame: Arc<Mutex<Frame>>,
}

impl FrameDisplay {
    pub fn new(frame: Arc<Mutex<Frame>>) -> Self {
        Self { frame }
    }
}

impl Display for FrameDisplay {
    fn display(&mut self, buffers: &mut DisplayBuffers, mode: RefreshMode) {
        {
            let mut frame = self.frame.lock();
            let size = buffers.size();
            let width = frame.width.min(size.width as usize);
            let height = frame.height.min(size.height as usize);
            let stride = frame.width;
            for y in 0..height {
                for x in 0..width {
                    frame.pixels[y * stride + x] = match buffers.pixel(x as i32, y as i32) {
                        BinaryColor::On => WHITE,
                        BinaryColor::Off => BLACK,
                    };
                }
            }
            frame.dirty = true;
        }
        log::debug!("Frame presented ({:?} refresh)", mode);
        buffers.swap_buffers();
    }
}

/// Maps the keyboard onto the device buttons.
pub fn sample_buttons(window: &Window) -> u8 {
    let keys: [(&[Key], Buttons); 7] = [
        (&[Key::Left], Buttons::Left),
        (&[Key::Right], Buttons::Right),
        (&[Key::Up], Buttons::Up),
        (&[Key::Down], Buttons::Down),
        (&[Key::Enter], Buttons::Confirm),
        (&[Key::Escape, Key::Backspace], Buttons::Back),
        (&[Key::Tab, Key::P], Buttons::Power),
    ];
    let mut current = 0;
    for (bound, button) in keys {
        if bound.iter().any(|key| window.is_key_down(*key)) {
            current |= ButtonState::mask(button);
        }
    }
    current
}
