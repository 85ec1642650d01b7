#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Buttons {
    Back,
    Confirm,
    Left,
    Right,
    Up,
    Down,
    Power,
}

/// Debounced button bitmask sampled once per tick, plus how long the current
/// press has lasted. On the tick a button is released `held_ms` still reports
/// the duration of that press.
#[derive(Clone, Copy, Debug, Default)]
pub struct ButtonState {
    current: u8,
    previous: u8,
    held_ms: u32,
}

impl ButtonState {
    pub const fn new() -> Self {
        Self {
            current: 0,
            previous: 0,
            held_ms: 0,
        }
    }

    pub fn mask(button: Buttons) -> u8 {
        1 << (button as u8)
    }

    pub fn update(&mut self, current: u8, elapsed_ms: u32) {
        self.previous = self.current;
        self.current = current;
        if self.pressed() != 0 {
            self.held_ms = 0;
        } else if self.current != 0 || self.released() != 0 {
            self.held_ms = self.held_ms.saturating_add(elapsed_ms);
        } else {
            self.held_ms = 0;
        }
    }

    fn held(&self) -> u8 {
        self.current & self.previous
    }

    fn pressed(&self) -> u8 {
        self.current & !self.previous
    }

    fn released(&self) -> u8 {
        !self.current & self.previous
    }

    pub fn is_held(&self, button: Buttons) -> bool {
        (self.held() & Self::mask(button)) != 0
    }

    pub fn is_pressed(&self, button: Buttons) -> bool {
        (self.pressed() & Self::mask(button)) != 0
    }

    pub fn is_released(&self, button: Buttons) -> bool {
        (self.released() & Self::mask(button)) != 0
    }

    pub fn held_ms(&self) -> u32 {
        self.held_ms
    }

    pub fn any_activity(&self) -> bool {
        self.current != 0 || self.previous != 0
    }
}
