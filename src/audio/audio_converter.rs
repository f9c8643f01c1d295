use super::float_to_s16;

/// AudioConfig describes interleaved 16-bit audio.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AudioConfig {
    pub channels: usize,
    pub rate: u32,
}

impl AudioConfig {
    pub fn new(channels: usize, rate: u32) -> Self {
        AudioConfig { channels, rate }
    }
}

/// AudioConverter maps channels and resamples interleaved 16-bit audio by
/// linear interpolation. The read position carries over between calls, so
/// consecutive chunks resample as one continuous stream.
#[derive(Debug)]
pub struct AudioConverter {
    input: AudioConfig,
    output: AudioConfig,
    step: f64,
    position: f64,
    previous: Option<Vec<f32>>,
}

impl AudioConverter {
    pub fn new(input: AudioConfig, output: AudioConfig) -> Self {
        AudioConverter {
            input,
            output,
            step: input.rate as f64 / output.rate as f64,
            position: 0.0,
            previous: None,
        }
    }

    pub fn input_config(&self) -> AudioConfig {
        self.input
    }

    pub fn output_config(&self) -> AudioConfig {
        self.output
    }

    /// Converts `frames` frames of `input` and returns the converted
    /// interleaved samples.
    pub fn process(&mut self, input: &[i16], frames: usize) -> Vec<i16> {
        let frames = frames.min(input.len() / self.input.channels.max(1));
        let mapped = self.map_channels(input, frames);

        if self.input.rate == self.output.rate {
            return mapped.iter().map(|s| float_to_s16(*s)).collect();
        }
        self.resample(&mapped, frames)
    }

    fn map_channels(&self, input: &[i16], frames: usize) -> Vec<f32> {
        let (in_ch, out_ch) = (self.input.channels, self.output.channels);
        let mut out = Vec::with_capacity(frames * out_ch);
        for f in 0..frames {
            let frame = &input[f * in_ch..(f + 1) * in_ch];
            for c in 0..out_ch {
                let v = if in_ch == out_ch {
                    frame[c] as f32
                } else if out_ch == 1 {
                    frame.iter().map(|s| *s as f32).sum::<f32>() / in_ch as f32
                } else {
                    frame[c.min(in_ch - 1)] as f32
                };
                out.push(v / 32768.0);
            }
        }
        out
    }

    fn resample(&mut self, mapped: &[f32], frames: usize) -> Vec<i16> {
        let ch = self.output.channels;
        let capacity = frames * ch * self.output.rate as usize / self.input.rate.max(1) as usize;
        let mut out = Vec::with_capacity(capacity + ch);
        // a zero rate on either side never advances the read position
        if frames == 0 || self.input.rate == 0 || self.output.rate == 0 {
            return out;
        }

        // index 0 of the virtual stream is the last frame of the previous call
        let (previous, fresh) = match self.previous.take() {
            Some(previous) => (previous, mapped),
            None => (mapped[..ch].to_vec(), &mapped[ch..]),
        };
        let n = fresh.len() / ch;
        let sample = |idx: usize, c: usize| -> f32 {
            if idx == 0 {
                previous[c]
            } else {
                fresh[(idx - 1) * ch + c]
            }
        };

        while self.position < n as f64 {
            let idx = self.position.floor() as usize;
            let frac = (self.position - idx as f64) as f32;
            for c in 0..ch {
                let a = sample(idx, c);
                let b = sample(idx + 1, c);
                out.push(float_to_s16(a + (b - a) * frac));
            }
            self.position += self.step;
        }
        self.position -= n as f64;

        self.previous = Some(if n == 0 {
            previous
        } else {
            fresh[(n - 1) * ch..n * ch].to_vec()
        });
        out
    }
}
