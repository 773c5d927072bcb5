//! Fibonacci-lattice capture directions.
//!
//! `generate(n, r)` places n near-uniform directions on a sphere of radius r:
//!
//! ```text
//! y_i = 1 - 2i/(n-1)
//! r_i = sqrt(1 - y_i²)
//! θ_i = 2πi/φ
//! d_i = r · (r_i cos θ_i, r_i sin θ_i, y_i)
//! ```
//!
//! The lattice is deterministic for a given n, so a restarted scan targets
//! the same directions.

use std::f64::consts::TAU;

use nalgebra::Vector3;

/// Golden ratio φ.
const GOLDEN_RATIO: f64 = 1.618_033_988_749_895;

/// One capture target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureDirection {
    /// Unit direction scaled by the lattice radius.
    pub position: Vector3<f64>,
    pub captured: bool,
}

impl CaptureDirection {
    pub fn unit(&self) -> Vector3<f64> {
        self.position.normalize()
    }
}

/// Fixed set of capture directions and their capture flags.
#[derive(Debug, Clone)]
pub struct TargetLattice {
    directions: Vec<CaptureDirection>,
    radius: f64,
}

impl TargetLattice {
    /// Generate `n` uncaptured directions at `radius`.
    pub fn generate(n: usize, radius: f64) -> Self {
        let directions = (0..n)
            .map(|i| {
                // A single target has no spacing to compute; point it at the pole.
                let y = if n > 1 {
                    1.0 - 2.0 * i as f64 / (n - 1) as f64
                } else {
                    1.0
                };
                let ring = (1.0 - y * y).max(0.0).sqrt();
                let theta = TAU * i as f64 / GOLDEN_RATIO;
                CaptureDirection {
                    position: Vector3::new(ring * theta.cos(), ring * theta.sin(), y) * radius,
                    captured: false,
                }
            })
            .collect();

        Self { directions, radius }
    }

    /// Index of the uncaptured direction best aligned with `forward`.
    ///
    /// Ties go to the lowest index. `None` once everything is captured.
    pub fn closest_uncaptured(&self, forward: &Vector3<f64>) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (index, direction) in self.directions.iter().enumerate() {
            if direction.captured {
                continue;
            }
            let score = forward.dot(&direction.unit());
            if best.is_none_or(|(_, best_score)| score > best_score) {
                best = Some((index, score));
            }
        }
        best.map(|(index, _)| index)
    }

    /// Flag `index` as captured. Returns `true` if it was not captured before.
    pub fn mark_captured(&mut self, index: usize) -> bool {
        match self.directions.get_mut(index) {
            Some(direction) if !direction.captured => {
                direction.captured = true;
                true
            }
            _ => false,
        }
    }

    /// Clear every capture flag.
    pub fn reset(&mut self) {
        for direction in &mut self.directions {
            direction.captured = false;
        }
    }

    /// Fraction of captured directions; 0 for an empty lattice.
    pub fn coverage(&self) -> f64 {
        if self.directions.is_empty() {
            return 0.0;
        }
        self.captured_count() as f64 / self.directions.len() as f64
    }

    pub fn is_complete(&self) -> bool {
        !self.directions.is_empty() && self.directions.iter().all(|d| d.captured)
    }

    pub fn captured_count(&self) -> usize {
        self.directions.iter().filter(|d| d.captured).count()
    }

    pub fn len(&self) -> usize {
        self.directions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directions.is_empty()
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn direction(&self, index: usize) -> Option<&CaptureDirection> {
        self.directions.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CaptureDirection> {
        self.directions.iter()
    }

    /// Flattened xyz of the uncaptured directions, for rendering.
    pub fn uncaptured_positions(&self) -> Vec<f32> {
        self.directions
            .iter()
            .filter(|d| !d.captured)
            .flat_map(|d| [d.position.x as f32, d.position.y as f32, d.position.z as f32])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_directions_have_radius_and_are_distinct() {
        for n in [2, 3, 26, 100] {
            let lattice = TargetLattice::generate(n, 5.0);
            assert_eq!(lattice.len(), n);

            for d in lattice.iter() {
                assert_relative_eq!(d.position.norm(), 5.0, epsilon = 1e-9);
                assert!(!d.captured);
            }
            for i in 0..n {
                for j in (i + 1)..n {
                    let a = lattice.direction(i).unwrap().position;
                    let b = lattice.direction(j).unwrap().position;
                    assert!((a - b).norm() > 1e-6, "n={} i={} j={}", n, i, j);
                }
            }
        }
    }

    #[test]
    fn test_poles_are_first_and_last() {
        let lattice = TargetLattice::generate(26, 1.0);
        assert_relative_eq!(lattice.direction(0).unwrap().position.z, 1.0);
        assert_relative_eq!(lattice.direction(25).unwrap().position.z, -1.0);
    }

    #[test]
    fn test_degenerate_sizes() {
        let single = TargetLattice::generate(1, 2.0);
        assert_relative_eq!(
            single.direction(0).unwrap().position,
            Vector3::new(0.0, 0.0, 2.0)
        );

        let empty = TargetLattice::generate(0, 2.0);
        assert_eq!(empty.coverage(), 0.0);
        assert!(!empty.is_complete());
        assert!(empty.closest_uncaptured(&Vector3::z()).is_none());
    }

    #[test]
    fn test_closest_uncaptured_skips_captured() {
        let mut lattice = TargetLattice::generate(26, 5.0);
        let forward = lattice.direction(7).unwrap().unit();

        assert_eq!(lattice.closest_uncaptured(&forward), Some(7));
        lattice.mark_captured(7);
        let next = lattice.closest_uncaptured(&forward).unwrap();
        assert_ne!(next, 7);
    }

    #[test]
    fn test_closest_uncaptured_tie_goes_to_lowest_index() {
        // A zero forward scores every direction 0.
        let lattice = TargetLattice::generate(10, 1.0);
        assert_eq!(lattice.closest_uncaptured(&Vector3::zeros()), Some(0));
    }

    #[test]
    fn test_capture_flags_are_monotonic() {
        let mut lattice = TargetLattice::generate(26, 5.0);
        assert!(lattice.mark_captured(3));
        assert!(!lattice.mark_captured(3));
        assert!(!lattice.mark_captured(99));

        for i in 0..26 {
            lattice.mark_captured(i);
            assert!(lattice.direction(3).unwrap().captured);
        }
        assert!(lattice.is_complete());
        assert!(lattice.closest_uncaptured(&Vector3::x()).is_none());
    }

    #[test]
    fn test_coverage_reaches_one() {
        let mut lattice = TargetLattice::generate(26, 5.0);
        for i in 0..26 {
            assert_relative_eq!(lattice.coverage(), i as f64 / 26.0);
            lattice.mark_captured(i);
        }
        assert_relative_eq!(lattice.coverage(), 1.0);
    }

    #[test]
    fn test_reset_clears_flags() {
        let mut lattice = TargetLattice::generate(26, 5.0);
        for i in (0..26).step_by(2) {
            lattice.mark_captured(i);
        }
        lattice.reset();

        assert_eq!(lattice.captured_count(), 0);
        assert_eq!(lattice.coverage(), 0.0);
        assert!(lattice.iter().all(|d| !d.captured));
    }

    #[test]
    fn test_uncaptured_positions_shrink() {
        let mut lattice = TargetLattice::generate(4, 1.0);
        assert_eq!(lattice.uncaptured_positions().len(), 12);
        lattice.mark_captured(0);
        let positions = lattice.uncaptured_positions();
        assert_eq!(positions.len(), 9);
        assert_relative_eq!(positions[0], lattice.direction(1).unwrap().position.x as f32);
    }
}
