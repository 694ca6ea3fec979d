/// Frames counted in the current one-second window.
#[derive(Debug, Default, Clone, Copy)]
pub struct FpsCounter {
    window: u32,
}

impl FpsCounter {
    pub const fn record_frame(&mut self) {
        self.window = self.window.saturating_add(1);
    }

    /// Close the current window: return its count and start a new one.
    pub const fn roll(&mut self) -> u32 {
        let count = self.window;
        self.window = 0;
        count
    }

    #[must_use]
    pub const fn in_window(&self) -> u32 {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roll_resets() {
        let mut fps = FpsCounter::default();
        for _ in 0..5 {
            fps.record_frame();
        }
        assert_eq!(fps.in_window(), 5);
        assert_eq!(fps.roll(), 5);
        assert_eq!(fps.roll(), 0);
    }
}
