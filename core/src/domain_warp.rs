use crate::NoiseGenerator;

// Warp never sums more octaves than this, whatever the primary field asks for
pub const MAX_WARP_OCTAVES: u32 = 4;

// Offset that decorrelates the second warp axis from the first
const AXIS_OFFSET: f64 = 5.2;

// Perturbs a sampling coordinate with a secondary, independently seeded field
// before the primary field is evaluated. The warp field is plain fBm with a
// fixed octave cap and never warps itself.
pub struct DomainWarp2D<'a> {
    pub warp: &'a dyn NoiseGenerator,
    pub octaves: u32,
    pub lacunarity: f64,
    pub gain: f64,
    // Displacement in the same units as the coordinates passed to `apply`
    pub strength: f64,
}

impl DomainWarp2D<'_> {
    fn fbm(&self, x: f64, y: f64) -> f64 {
        let mut amplitude = 1.0;
        let mut freq = 1.0;
        let mut total = 0.0;
        let mut max_amp = 0.0;
        for _ in 0..self.octaves.clamp(1, MAX_WARP_OCTAVES) {
            total += self.warp.get2(x * freq, y * freq) * amplitude;
            max_amp += amplitude;
            amplitude *= self.gain;
            freq *= self.lacunarity;
        }
        if max_amp > 0.0 { total / max_amp } else { 0.0 }
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        if self.strength <= 0.0 {
            return (x, y);
        }
        let dx = self.fbm(x, y);
        let dy = self.fbm(x + AXIS_OFFSET, y + AXIS_OFFSET);
        (x + dx * self.strength, y + dy * self.strength)
    }
}
