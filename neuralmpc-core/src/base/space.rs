//! Box (continuous) space.
use crate::error::MpcError;
use ndarray::{Array, Array1, Array2, ArrayBase, Axis, Data, DataMut, Dimension};
use rand::Rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

/// Element-wise bounds of an observation or an action.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct BoxSpace {
    low: Vec<f32>,
    high: Vec<f32>,
}

impl BoxSpace {
    /// Creates a space with given bounds.
    pub fn new(low: Vec<f32>, high: Vec<f32>) -> Result<Self, MpcError> {
        if low.len() != high.len() {
            return Err(MpcError::ConfigurationError(format!(
                "low and high must have the same length, got {} and {}",
                low.len(),
                high.len()
            )));
        }
        if low.is_empty() {
            return Err(MpcError::ConfigurationError(
                "a space needs at least one dimension".to_string(),
            ));
        }
        if let Some(i) = (0..low.len()).find(|&i| !(low[i] <= high[i])) {
            return Err(MpcError::ConfigurationError(format!(
                "low[{}] = {} is not below high[{}] = {}",
                i, low[i], i, high[i]
            )));
        }
        Ok(Self { low, high })
    }

    /// Creates a space with the same bounds in every dimension.
    pub fn uniform(dim: usize, low: f32, high: f32) -> Result<Self, MpcError> {
        Self::new(vec![low; dim], vec![high; dim])
    }

    /// Dimension of the space.
    pub fn dim(&self) -> usize {
        self.low.len()
    }

    /// Whether every bound is finite.
    pub fn is_bounded(&self) -> bool {
        self.low.iter().chain(self.high.iter()).all(|v| v.is_finite())
    }

    /// Lower bounds.
    pub fn low(&self) -> &[f32] {
        &self.low
    }

    /// Upper bounds.
    pub fn high(&self) -> &[f32] {
        &self.high
    }

    /// The center of the space. Unbounded sides count as zero.
    pub fn midpoint(&self) -> Array1<f32> {
        self.low
            .iter()
            .zip(self.high.iter())
            .map(|(&l, &h)| match (l.is_finite(), h.is_finite()) {
                (true, true) => 0.5 * (l + h),
                (true, false) => l.max(0.0),
                (false, true) => h.min(0.0),
                (false, false) => 0.0,
            })
            .collect()
    }

    /// Clips every lane along the last axis of `x` into the space.
    pub fn clip<S, D>(&self, x: &mut ArrayBase<S, D>)
    where
        S: DataMut<Elem = f32>,
        D: Dimension,
    {
        let axis = Axis(x.ndim() - 1);
        for mut lane in x.lanes_mut(axis) {
            for (v, (&l, &h)) in lane.iter_mut().zip(self.low.iter().zip(self.high.iter())) {
                *v = v.max(l).min(h);
            }
        }
    }

    /// Returns `true` if every lane along the last axis of `x` lies in the space.
    ///
    /// NaN is never contained.
    pub fn contains<S, D>(&self, x: &ArrayBase<S, D>) -> bool
    where
        S: Data<Elem = f32>,
        D: Dimension,
    {
        if x.ndim() == 0 || x.shape()[x.ndim() - 1] != self.dim() {
            return false;
        }
        let axis = Axis(x.ndim() - 1);
        x.lanes(axis).into_iter().all(|lane| {
            lane.iter()
                .zip(self.low.iter().zip(self.high.iter()))
                .all(|(&v, (&l, &h))| !v.is_nan() && v >= l && v <= h)
        })
    }

    /// Samples `n` points uniformly, `[n, dim]`.
    ///
    /// Every bound must be finite.
    pub fn sample<R: Rng>(&self, rng: &mut R, n: usize) -> Result<Array2<f32>, MpcError> {
        let dists = self
            .low
            .iter()
            .zip(self.high.iter())
            .map(|(&l, &h)| {
                if l.is_finite() && h.is_finite() {
                    Ok(Uniform::new_inclusive(l, h))
                } else {
                    Err(MpcError::ConfigurationError(
                        "cannot sample from an unbounded space".to_string(),
                    ))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        let dim = self.dim();
        Ok(Array::from_shape_fn((n, dim), |(_, j)| dists[j].sample(&mut *rng)))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::{array, Array3};
    use rand::{rngs::SmallRng, SeedableRng};

    #[test]
    fn test_new_rejects_inverted_bounds() {
        assert!(matches!(
            BoxSpace::new(vec![1.0], vec![0.0]),
            Err(MpcError::ConfigurationError(_))
        ));
        assert!(matches!(
            BoxSpace::new(vec![0.0, 0.0], vec![1.0]),
            Err(MpcError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_clip_and_contains_on_3d_array() {
        let space = BoxSpace::new(vec![-2.0, 0.0], vec![2.0, 1.0]).unwrap();
        let mut x = Array3::<f32>::from_elem((3, 4, 2), 5.0);
        x[[1, 2, 0]] = -9.0;
        assert!(!space.contains(&x));

        space.clip(&mut x);
        assert!(space.contains(&x));
        assert_eq!(x[[0, 0, 0]], 2.0);
        assert_eq!(x[[0, 0, 1]], 1.0);
        assert_eq!(x[[1, 2, 0]], -2.0);
    }

    #[test]
    fn test_contains_rejects_nan_and_wrong_dim() {
        let space = BoxSpace::uniform(2, -1.0, 1.0).unwrap();
        assert!(!space.contains(&array![[0.0f32, f32::NAN]]));
        assert!(!space.contains(&array![[0.0f32, 0.0, 0.0]]));
        assert!(space.contains(&array![[0.0f32, 1.0]]));
    }

    #[test]
    fn test_sample() {
        let space = BoxSpace::uniform(3, -1.0, 1.0).unwrap();
        let mut rng = SmallRng::seed_from_u64(42);
        let x = space.sample(&mut rng, 100).unwrap();
        assert_eq!(x.dim(), (100, 3));
        assert!(space.contains(&x));
        assert!(space.is_bounded());

        let unbounded = BoxSpace::uniform(1, f32::NEG_INFINITY, f32::INFINITY).unwrap();
        assert!(!unbounded.is_bounded());
        assert!(unbounded.sample(&mut rng, 1).is_err());
        assert_eq!(unbounded.midpoint(), array![0.0f32]);
    }
}
