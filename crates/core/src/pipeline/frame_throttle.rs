/// Admits every Nth acquired frame into inference.
///
/// The counter is checked before it is incremented, so the first frame is
/// always admitted: with `N = 3` frames 0, 3, 6, ... pass.
#[derive(Debug)]
pub struct FrameThrottle {
    interval: usize,
    count: usize,
}

impl FrameThrottle {
    pub fn new(interval: usize) -> Result<Self, &'static str> {
        if interval < 1 {
            return Err("frame skip interval must be >= 1");
        }
        Ok(Self { interval, count: 0 })
    }

    /// Counts one acquired frame and returns whether it is admitted.
    pub fn admit(&mut self) -> bool {
        let admitted = self.count % self.interval == 0;
        self.count += 1;
        admitted
    }

    pub fn interval(&self) -> usize {
        self.interval
    }

    /// Frames counted so far.
    pub fn seen(&self) -> usize {
        self.count
    }
}
