//! 2D simplex noise
//!
//! Gradient noise over a skewed triangular lattice. The permutation table is
//! the standard Ken Perlin table and the gradients are the 12 cube edge
//! directions; both are process-wide constants handed to the sampler by
//! reference so the noise stays a pure function of its input.

use glam::Vec2;

use super::NoiseConfig;

// ============================================================================
// TABLES
// ============================================================================
// Standard 256-element permutation table from Ken Perlin's reference implementation.
// This table must remain unchanged to keep generated terrain reproducible.
const PERM: [u8; 256] = [
    151, 160, 137, 91, 90, 15, 131, 13, 201, 95, 96, 53, 194, 233, 7, 225, 140, 36, 103, 30, 69,
    142, 8, 99, 37, 240, 21, 10, 23, 190, 6, 148, 247, 120, 234, 75, 0, 26, 197, 62, 94, 252, 219,
    203, 117, 35, 11, 32, 57, 177, 33, 88, 237, 149, 56, 87, 174, 20, 125, 136, 171, 168, 68, 175,
    74, 165, 71, 134, 139, 48, 27, 166, 77, 146, 158, 231, 83, 111, 229, 122, 60, 211, 133, 230,
    220, 105, 92, 41, 55, 46, 245, 40, 244, 102, 143, 54, 65, 25, 63, 161, 1, 216, 80, 73, 209, 76,
    132, 187, 208, 89, 18, 169, 200, 196, 135, 130, 116, 188, 159, 86, 164, 100, 109, 198, 173,
    186, 3, 64, 52, 217, 226, 250, 124, 123, 5, 202, 38, 147, 118, 126, 255, 82, 85, 212, 207, 206,
    59, 227, 47, 16, 58, 17, 182, 189, 28, 42, 223, 183, 170, 213, 119, 248, 152, 2, 44, 154, 163,
    70, 221, 153, 101, 155, 167, 43, 172, 9, 129, 22, 39, 253, 19, 98, 108, 110, 79, 113, 224, 232,
    178, 185, 112, 104, 218, 246, 97, 228, 251, 34, 242, 193, 238, 210, 144, 12, 191, 179, 162,
    241, 81, 51, 145, 235, 249, 14, 239, 107, 49, 192, 214, 31, 181, 199, 106, 157, 184, 84, 204,
    176, 115, 121, 50, 45, 127, 4, 150, 254, 138, 236, 205, 93, 222, 114, 67, 29, 24, 72, 243, 141,
    128, 195, 78, 66, 215, 61, 156, 180,
];

/// The 12 edge directions of a cube; 2D sampling uses the x/y components
const GRAD3: [[i8; 3]; 12] = [
    [1, 1, 0],
    [-1, 1, 0],
    [1, -1, 0],
    [-1, -1, 0],
    [1, 0, 1],
    [-1, 0, 1],
    [1, 0, -1],
    [-1, 0, -1],
    [0, 1, 1],
    [0, -1, 1],
    [0, 1, -1],
    [0, -1, -1],
];

/// Immutable lookup tables for the noise function
#[derive(Debug)]
pub struct NoiseTables {
    pub permutation: [u8; 256],
    pub gradients: [[i8; 3]; 12],
}

/// The one table set every sampler uses
pub static NOISE_TABLES: NoiseTables = NoiseTables {
    permutation: PERM,
    gradients: GRAD3,
};

impl NoiseTables {
    /// Permutation lookup with the table conceptually doubled to 512 entries
    #[inline]
    fn perm(&self, index: i64) -> usize {
        self.permutation[(index & 255) as usize] as usize
    }

    #[inline]
    fn dot(&self, gradient: usize, x: f64, y: f64) -> f64 {
        let g = self.gradients[gradient];
        g[0] as f64 * x + g[1] as f64 * y
    }
}

/// Corner contribution with radial falloff `(0.5 - r²)^4`
#[inline]
fn corner(tables: &NoiseTables, gradient: usize, x: f64, y: f64) -> f64 {
    let t = 0.5 - x * x - y * y;
    if t < 0.0 {
        0.0
    } else {
        let t2 = t * t;
        t2 * t2 * tables.dot(gradient, x, y)
    }
}

/// Sample 2D simplex noise
///
/// # Returns
/// Value in range [-1, 1]
pub fn simplex_2d(tables: &NoiseTables, x: f64, y: f64) -> f64 {
    let f2 = 0.5 * (3.0_f64.sqrt() - 1.0);
    let g2 = (3.0 - 3.0_f64.sqrt()) / 6.0;

    // Skew into simplex cell space
    let s = (x + y) * f2;
    let i = (x + s).floor() as i64;
    let j = (y + s).floor() as i64;

    // Unskew the cell origin back and take the offset from it
    let t = (i + j) as f64 * g2;
    let x0 = x - (i as f64 - t);
    let y0 = y - (j as f64 - t);

    // Lower or upper triangle of the cell
    let (i1, j1) = if x0 > y0 { (1, 0) } else { (0, 1) };

    let x1 = x0 - i1 as f64 + g2;
    let y1 = y0 - j1 as f64 + g2;
    let x2 = x0 - 1.0 + 2.0 * g2;
    let y2 = y0 - 1.0 + 2.0 * g2;

    let ii = i & 255;
    let jj = j & 255;
    let gi0 = tables.perm(ii + tables.perm(jj) as i64) % 12;
    let gi1 = tables.perm(ii + i1 + tables.perm(jj + j1) as i64) % 12;
    let gi2 = tables.perm(ii + 1 + tables.perm(jj + 1) as i64) % 12;

    let n0 = corner(tables, gi0, x0, y0);
    let n1 = corner(tables, gi1, x1, y1);
    let n2 = corner(tables, gi2, x2, y2);

    // Scale so the result spans [-1, 1]
    (70.0 * (n0 + n1 + n2)).clamp(-1.0, 1.0)
}

/// Sample simplex noise with fractal Brownian motion
///
/// Accumulates `config.octaves` layers, each at `lacunarity` times the
/// frequency and `persistence` times the amplitude of the previous one.
///
/// # Returns
/// Value in range [-1, 1]
pub fn sample_simplex_fbm(tables: &NoiseTables, position: Vec2, config: &NoiseConfig) -> f32 {
    let mut value = 0.0;
    let mut amplitude = 1.0;
    let mut frequency = 1.0;
    let mut max_value = 0.0;

    for _ in 0..config.octaves.max(1) {
        let p = position * frequency;
        value += simplex_2d(tables, p.x as f64, p.y as f64) as f32 * amplitude;
        max_value += amplitude;

        frequency *= config.lacunarity;
        amplitude *= config.persistence;
    }

    if max_value > 0.0 {
        value / max_value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_determinism() {
        let a = simplex_2d(&NOISE_TABLES, 3.7, -1.2);
        let b = simplex_2d(&NOISE_TABLES, 3.7, -1.2);
        assert_eq!(a, b, "Noise must be a pure function of its input");
    }

    #[test]
    fn test_range() {
        for i in 0..500 {
            let x = i as f64 * 0.173 - 40.0;
            let y = i as f64 * 0.311 - 70.0;
            let value = simplex_2d(&NOISE_TABLES, x, y);
            assert!(
                (-1.0..=1.0).contains(&value),
                "Value {} at ({}, {}) is outside [-1, 1]",
                value,
                x,
                y
            );
        }
    }

    #[test]
    fn test_lattice_origin_is_zero() {
        // Every corner contribution vanishes at an integer lattice point
        assert!(simplex_2d(&NOISE_TABLES, 0.0, 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_continuity() {
        let step = 1e-4;
        for i in 0..200 {
            let x = i as f64 * 0.37;
            let y = i as f64 * 0.23;
            let a = simplex_2d(&NOISE_TABLES, x, y);
            let b = simplex_2d(&NOISE_TABLES, x + step, y + step);
            assert!((a - b).abs() < 0.01, "Jump of {} at ({}, {})", (a - b).abs(), x, y);
        }
    }

    #[test]
    fn test_not_constant() {
        let values: Vec<f64> = (0..32)
            .map(|i| simplex_2d(&NOISE_TABLES, i as f64 * 0.5 + 0.25, 0.75))
            .collect();
        let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        assert!(max - min > 0.1);
    }

    #[test]
    fn test_fbm_range() {
        let config = NoiseConfig {
            octaves: 5,
            persistence: 0.5,
            lacunarity: 2.0,
        };
        for i in 0..100 {
            let p = Vec2::new(i as f32 * 0.7, i as f32 * 0.3);
            let value = sample_simplex_fbm(&NOISE_TABLES, p, &config);
            assert!((-1.0..=1.0).contains(&value));
        }
    }
}
