//! Frame progress reporting through the log

use std::time::Instant;

use tracing::info;

pub struct Progress {
    total: Option<u64>,
    every: u64,
    count: u64,
    start: Instant,
}

impl Progress {
    /// `total` of `None` or zero means the length is unknown
    pub fn new(total: Option<u64>, every: u64) -> Self {
        Self {
            total: total.filter(|t| *t > 0),
            every: every.max(1),
            count: 0,
            start: Instant::now(),
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Count one frame, logging every `every` frames
    pub fn update(&mut self) {
        self.count += 1;
        if self.count % self.every == 0 {
            info!("{}", self.message());
        }
    }

    fn message(&self) -> String {
        let elapsed = self.start.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            self.count as f64 / elapsed
        } else {
            0.0
        };
        match self.total {
            Some(total) => format!(
                "Progress: {}/{} frames ({:.1}%), {:.1} fps",
                self.count,
                total,
                self.count as f64 * 100.0 / total as f64,
                rate
            ),
            None => format!("Progress: {} frames, {:.1} fps", self.count, rate),
        }
    }

    pub fn finish(&self) {
        info!("Processed {} frames in {:.2?}", self.count, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_with_total() {
        let mut progress = Progress::new(Some(200), 100);
        for _ in 0..50 {
            progress.update();
        }
        assert_eq!(progress.count(), 50);
        assert!(progress.message().starts_with("Progress: 50/200 frames (25.0%)"));
    }

    #[test]
    fn test_message_unknown_total() {
        let mut progress = Progress::new(Some(0), 0);
        progress.update();
        assert!(progress.message().starts_with("Progress: 1 frames"));
    }
}
