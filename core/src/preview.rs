//! Colored, hill-shaded previews of generated heightmaps.

use image::{Rgb, RgbImage};
use palette::{Gradient, LinSrgb};

use crate::grid::Grid;
use crate::landscape::GenerationOutput;

// Light direction: 45 degrees azimuth, 45 degrees altitude
const AZIMUTH: f32 = std::f32::consts::FRAC_PI_4;
const ALTITUDE: f32 = std::f32::consts::FRAC_PI_4;

/// Deep water to beach to grass to rock to snow over normalized height.
pub fn terrain_gradient() -> Gradient<LinSrgb> {
    Gradient::with_domain(vec![
        (0.00, LinSrgb::new(0.0, 0.0, 0.5)),
        (0.30, LinSrgb::new(0.8, 0.8, 0.5)),
        (0.50, LinSrgb::new(0.1, 0.6, 0.2)),
        (0.75, LinSrgb::new(0.5, 0.4, 0.3)),
        (1.00, LinSrgb::new(1.0, 1.0, 1.0)),
    ])
}

/// Lambertian shade in [0,1] of a `width × height` row-major field.
/// `z_scale` is the vertical exaggeration per sample step.
pub fn hillshade(heights: &[f32], width: usize, height: usize, z_scale: f32) -> Vec<f32> {
    let (sin_alt, cos_alt) = ALTITUDE.sin_cos();
    let light = [AZIMUTH.cos() * cos_alt, AZIMUTH.sin() * cos_alt, sin_alt];
    let at = |x: usize, y: usize| heights[y * width + x];

    let mut shade = vec![0.0; width * height];
    for y in 0..height {
        let (y0, y1) = (y.saturating_sub(1), (y + 1).min(height - 1));
        for x in 0..width {
            let (x0, x1) = (x.saturating_sub(1), (x + 1).min(width - 1));
            // one-sided on the border; a single row or column has no slope
            let dzdx = (at(x1, y) - at(x0, y)) / (x1 - x0).max(1) as f32 * z_scale;
            let dzdy = (at(x, y1) - at(x, y0)) / (y1 - y0).max(1) as f32 * z_scale;
            let len = (dzdx * dzdx + dzdy * dzdy + 1.0).sqrt();
            let n = [-dzdx / len, -dzdy / len, 1.0 / len];
            shade[y * width + x] = (n[0] * light[0] + n[1] * light[1] + n[2] * light[2]).max(0.0);
        }
    }
    shade
}

fn render(heights: &[f32], width: usize, height: usize, z_scale: f32) -> RgbImage {
    let gradient = terrain_gradient();
    let shade = hillshade(heights, width, height, z_scale);
    let mut img = RgbImage::new(width as u32, height as u32);
    for y in 0..height {
        for x in 0..width {
            let p = y * width + x;
            let h = heights[p];
            let h = if h.is_finite() { h.clamp(0.0, 1.0) } else { 0.0 };
            let rgb = gradient.get(h).into_format::<u8>();
            let light = (shade[p] * 0.5 + 0.5).clamp(0.0, 1.0);
            img.put_pixel(
                x as u32,
                y as u32,
                Rgb([
                    (rgb.red as f32 * light) as u8,
                    (rgb.green as f32 * light) as u8,
                    (rgb.blue as f32 * light) as u8,
                ]),
            );
        }
    }
    img
}

/// Preview of one tile. Heights are colored by absolute normalized value
/// so neighbouring tiles match.
pub fn render_tile(grid: &Grid, z_scale: f32) -> RgbImage {
    let res = grid.resolution();
    render(grid.as_slice(), res, res, z_scale)
}

/// One image for the whole layout; shared tile edges appear once.
pub fn render_layout(output: &GenerationOutput, z_scale: f32) -> RgbImage {
    let layout = &output.layout;
    let span = layout.resolution - 1;
    let width = layout.tiles_x as usize * span + 1;
    let height = layout.tiles_z as usize * span + 1;
    let mut heights = vec![0.0f32; width * height];
    for tile in &output.tiles {
        let ox = tile.coord.x as usize * span;
        let oz = tile.coord.z as usize * span;
        for (j, row) in tile.heightmap.rows().enumerate() {
            let start = (oz + j) * width + ox;
            heights[start..start + row.len()].copy_from_slice(row);
        }
    }
    render(&heights, width, height, z_scale)
}

/// Vertical exaggeration that makes a shade step match the real slope.
pub fn natural_z_scale(terrain_height: f64, tile_size: f64, resolution: usize) -> f32 {
    let step = tile_size / (resolution.max(2) - 1) as f64;
    (terrain_height / step) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_ground_is_evenly_lit() {
        let grid = Grid::filled(5, 0.5).unwrap();
        let shade = hillshade(grid.as_slice(), 5, 5, 10.0);
        let first = shade[0];
        assert!(shade.iter().all(|&s| (s - first).abs() < 1e-6));
        assert!((first - ALTITUDE.sin()).abs() < 1e-6);
    }

    #[test]
    fn tile_preview_matches_resolution() {
        let grid = Grid::filled(9, 0.9).unwrap();
        let img = render_tile(&grid, 1.0);
        assert_eq!(img.dimensions(), (9, 9));
        // snow is bright
        assert!(img.get_pixel(4, 4).0.iter().all(|&c| c > 150));
    }

    #[test]
    fn slopes_facing_the_light_are_brighter() {
        // height rising along +x faces away from the light
        let rising: Vec<f32> = (0..25).map(|p| (p % 5) as f32 * 0.1).collect();
        let falling: Vec<f32> = (0..25).map(|p| (4 - p % 5) as f32 * 0.1).collect();
        let a = hillshade(&rising, 5, 5, 4.0);
        let b = hillshade(&falling, 5, 5, 4.0);
        assert!(b[12] > a[12]);
    }

    #[test]
    fn uniform_slope_shades_evenly_up_to_the_border() {
        let ramp: Vec<f32> = (0..25).map(|p| (p % 5) as f32 * 0.1).collect();
        let shade = hillshade(&ramp, 5, 5, 4.0);
        for row in shade.chunks(5) {
            assert!(row.iter().all(|&s| (s - row[2]).abs() < 1e-6));
        }
    }

    #[test]
    fn z_scale_from_world_units() {
        assert!((natural_z_scale(100.0, 400.0, 5) - 1.0).abs() < 1e-6);
    }
}
