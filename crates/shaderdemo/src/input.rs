use renderer::Point2;

/// Mouse state fed to the `mouse` uniform.
///
/// `origin` is where the current press started, or [`Point2::SENTINEL`]
/// while no button is held. `position` follows the cursor only during a press.
#[derive(Debug, Clone, Copy)]
pub struct InputState {
    origin: Point2,
    position: Point2,
    cursor: Point2,
}

impl Default for InputState {
    fn default() -> Self {
        Self {
            origin: Point2::SENTINEL,
            position: Point2::ZERO,
            cursor: Point2::ZERO,
        }
    }
}

impl InputState {
    pub fn origin(&self) -> Point2 {
        self.origin
    }

    pub fn position(&self) -> Point2 {
        self.position
    }

    pub fn is_pressed(&self) -> bool {
        !self.origin.is_sentinel()
    }

    /// Press at the last known cursor location. `position` keeps its value
    /// until the cursor moves.
    pub fn pointer_down(&mut self) {
        self.origin = self.cursor;
    }

    pub fn pointer_move(&mut self, cursor: Point2) {
        self.cursor = cursor;
        if self.is_pressed() {
            self.position = cursor;
        }
    }

    pub fn pointer_up(&mut self) {
        self.origin = Point2::SENTINEL;
    }
}
