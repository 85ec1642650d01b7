use crate::framebuffer::DisplayBuffers;

/// Refresh modes for the display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    /// Full refresh with complete waveform, clears ghosting
    Full,
    /// Fast partial refresh of what changed since the last frame
    Fast,
}

/// The physical panel. Implementations send the active buffer and then call
/// [`DisplayBuffers::swap_buffers`].
pub trait Display {
    fn display(&mut self, buffers: &mut DisplayBuffers, mode: RefreshMode);
}
