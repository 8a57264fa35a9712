//! Execution backends for grid-shaped work.
//!
//! Every stage fills grids through [`Backend`], so switching between the
//! serial and the rayon-parallel path never changes a single output bit.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Serial,
    #[default]
    Parallel,
}

impl Backend {
    pub fn name(self) -> &'static str {
        match self {
            Backend::Serial => "serial",
            Backend::Parallel => "parallel",
        }
    }

    /// Fill a `resolution × resolution` row-major buffer with `f(x, z)`.
    pub fn fill_grid<F>(self, resolution: usize, f: F) -> Vec<f32>
    where
        F: Fn(usize, usize) -> f32 + Sync,
    {
        let mut data = vec![0.0f32; resolution * resolution];
        match self {
            Backend::Serial => data
                .chunks_mut(resolution)
                .enumerate()
                .for_each(|(z, row)| fill_row(&f, z, row)),
            Backend::Parallel => data
                .par_chunks_mut(resolution)
                .enumerate()
                .for_each(|(z, row)| fill_row(&f, z, row)),
        }
        data
    }

    /// Run `f` for every index in `0..count`, preserving order.
    pub fn map<T, F>(self, count: usize, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        match self {
            Backend::Serial => (0..count).map(f).collect(),
            Backend::Parallel => (0..count).into_par_iter().map(f).collect(),
        }
    }
}

fn fill_row<F: Fn(usize, usize) -> f32>(f: &F, z: usize, row: &mut [f32]) {
    for (x, cell) in row.iter_mut().enumerate() {
        *cell = f(x, z);
    }
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "serial" | "cpu" => Ok(Backend::Serial),
            "parallel" | "rayon" => Ok(Backend::Parallel),
            other => Err(format!("unknown backend `{other}` (expected serial or parallel)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Backend;

    #[test]
    fn backends_agree_bit_for_bit() {
        let f = |x: usize, z: usize| ((x * 31 + z * 17) as f32).sin();
        let a = Backend::Serial.fill_grid(65, f);
        let b = Backend::Parallel.fill_grid(65, f);
        assert_eq!(a, b);
    }

    #[test]
    fn fill_is_row_major() {
        let g = Backend::Serial.fill_grid(3, |x, z| (z * 10 + x) as f32);
        assert_eq!(g[5], 12.0);
    }

    #[test]
    fn map_keeps_order() {
        let v = Backend::Parallel.map(100, |i| i * 2);
        assert_eq!(v, (0..100).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[test]
    fn parses_names() {
        assert_eq!("Parallel".parse::<Backend>(), Ok(Backend::Parallel));
        assert_eq!("serial".parse::<Backend>(), Ok(Backend::Serial));
        assert!("gpu".parse::<Backend>().is_err());
    }
}
