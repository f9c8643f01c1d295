/// Level reported for silence, in -dBov.
pub const MIN_LEVEL_DB: u8 = 127;

const MAX_SQUARED_LEVEL: f64 = 32768.0 * 32768.0;

/// RmsLevel accumulates the energy of 16-bit audio and reports its RMS level
/// in -dBov (0 is full scale, 127 is silence), as carried by the audio level
/// header extension.
#[derive(Default, Debug, Clone)]
pub struct RmsLevel {
    sum_square: f64,
    sample_count: usize,
}

impl RmsLevel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.sum_square = 0.0;
        self.sample_count = 0;
    }

    pub fn analyze(&mut self, samples: &[i16]) {
        self.sum_square += samples
            .iter()
            .map(|s| (*s as f64) * (*s as f64))
            .sum::<f64>();
        self.sample_count += samples.len();
    }

    /// Counts `length` samples of silence.
    pub fn analyze_muted(&mut self, length: usize) {
        self.sample_count += length;
    }

    /// Returns the level over everything analyzed since the last call and resets.
    pub fn average(&mut self) -> u8 {
        let level = if self.sample_count == 0 {
            MIN_LEVEL_DB
        } else {
            let rms = self.sum_square / (self.sample_count as f64 * MAX_SQUARED_LEVEL);
            if rms <= 0.0 {
                MIN_LEVEL_DB
            } else {
                let db = -10.0 * rms.log10();
                db.round().clamp(0.0, MIN_LEVEL_DB as f64) as u8
            }
        };
        self.reset();
        level
    }
}
