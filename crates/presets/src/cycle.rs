/// Position in a preset list that wraps around at the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresetCycle {
    index: usize,
    len: usize,
}

impl PresetCycle {
    /// `start` is clamped into the list; an empty list stays at index 0.
    pub fn new(len: usize, start: usize) -> Self {
        let index = if len == 0 { 0 } else { start % len };
        Self { index, len }
    }

    pub fn current(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Moves to the next preset, wrapping to the first after the last.
    pub fn advance(&mut self) -> usize {
        if self.len > 0 {
            self.index = (self.index + 1) % self.len;
        }
        self.index
    }
}
