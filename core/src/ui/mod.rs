pub mod library_view;

pub use library_view::{LibraryView, RedrawPlan};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    pub const fn inset(self, by: i32) -> Self {
        Self::new(self.x + by, self.y + by, self.w - by * 2, self.h - by * 2)
    }
}
