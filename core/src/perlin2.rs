use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use crate::NoiseGenerator;
use crate::compositor::mix_seed;

// Build a pseudorandom permutation table of size 256, duplicated into 512
// so corner hashing never needs a modulo.
pub(crate) fn permutation_table(seed: u64, salt: u64) -> [u8; 512] {
    let mut p: Vec<u8> = (0..=255).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(mix_seed(seed ^ salt));
    p.shuffle(&mut rng);
    let mut perm = [0u8; 512];
    for (i, slot) in perm.iter_mut().enumerate() {
        *slot = p[i & 255];
    }
    perm
}

// Single-octave 2D Perlin gradient noise. Octave summing lives in NoiseField.
#[derive(Clone)]
pub struct Perlin2D {
    perm: [u8; 512],
}

impl Perlin2D {
    pub fn new(seed: u64) -> Self {
        Self {
            perm: permutation_table(seed, 0xDEAD_BEEF_CAFE_BABE),
        }
    }

    // Ken Perlin's quintic fade 6t^5 − 15t^4 + 10t^3,
    // first and second derivatives are zero at t=0 and t=1
    #[inline]
    fn fade(t: f64) -> f64 {
        t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
    }

    #[inline]
    fn lerp(a: f64, b: f64, t: f64) -> f64 {
        a + t * (b - a)
    }

    // Low 4 bits of the hash pick one of the diagonal/axis gradients
    #[inline]
    fn grad(hash: u8, x: f64, y: f64) -> f64 {
        let h = (hash & 0xF) as usize;
        let u = if h < 8 { x } else { y };
        let v = if h < 8 { y } else { x };
        let sign_u = if (h & 1) == 0 { u } else { -u };
        let sign_v = if (h & 2) == 0 { v } else { -v };
        sign_u + sign_v
    }

    // Raw noise at (x, y); exactly zero on integer lattice points
    fn noise(&self, x: f64, y: f64) -> f64 {
        let xi = (x.floor() as i64 & 255) as usize;
        let yi = (y.floor() as i64 & 255) as usize;
        let xf = x - x.floor();
        let yf = y - y.floor();
        let u = Self::fade(xf);
        let v = Self::fade(yf);

        let a = self.perm[xi] as usize;
        let b = self.perm[xi + 1] as usize;
        let aa = self.perm[a + yi];
        let ab = self.perm[a + yi + 1];
        let ba = self.perm[b + yi];
        let bb = self.perm[b + yi + 1];

        let x1 = Self::lerp(Self::grad(aa, xf, yf), Self::grad(ba, xf - 1.0, yf), u);
        let x2 = Self::lerp(
            Self::grad(ab, xf, yf - 1.0),
            Self::grad(bb, xf - 1.0, yf - 1.0),
            u,
        );
        Self::lerp(x1, x2, v)
    }
}

impl NoiseGenerator for Perlin2D {
    fn get2(&self, x: f64, y: f64) -> f64 {
        self.noise(x, y).clamp(-1.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::{Perlin2D, permutation_table};
    use crate::NoiseGenerator;

    #[test]
    fn perlin2_determinism() {
        let p1 = Perlin2D::new(1234);
        let p2 = Perlin2D::new(1234);
        let a = p1.get2(10.5, -3.7);
        let b = p2.get2(10.5, -3.7);
        assert_eq!(a.to_bits(), b.to_bits());
    }

    #[test]
    fn perlin2_range() {
        let p = Perlin2D::new(0);
        for &(x, y) in &[(0.3, 0.7), (5.3, -1.2), (100.1, 200.2), (-77.7, 13.25)] {
            let v = p.get2(x, y);
            assert!((-1.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn perlin2_zero_on_lattice() {
        let p = Perlin2D::new(99);
        for &(x, y) in &[(0.0, 0.0), (3.0, -4.0), (-256.0, 512.0)] {
            assert_eq!(p.get2(x, y), 0.0);
        }
    }

    #[test]
    fn permutation_table_is_a_repeatable_permutation() {
        let a = permutation_table(7, 0xABCD);
        assert_eq!(a, permutation_table(7, 0xABCD));
        assert_ne!(a, permutation_table(8, 0xABCD));
        let mut seen = [false; 256];
        for &v in &a[..256] {
            seen[v as usize] = true;
        }
        assert!(seen.iter().all(|&s| s));
        assert_eq!(a[..256], a[256..]);
    }

    #[test]
    fn perlin2_seeds_differ() {
        let a = Perlin2D::new(1);
        let b = Perlin2D::new(2);
        let differs = (0..32).any(|i| {
            let x = i as f64 * 0.37 + 0.1;
            a.get2(x, x * 0.5) != b.get2(x, x * 0.5)
        });
        assert!(differs);
    }
}
