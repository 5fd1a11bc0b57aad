//! Weighted point sets consumed by manifold interpolation.
//!
//! A weighted point set pairs surrounding points with interpolation weights. Wherever such a
//! set is used to produce a new point, the weights must sum to one within
//! [`WEIGHT_SUM_TOLERANCE`].
use crate::allocators::DimAllocator;
use itertools::izip;
use nalgebra::{convert, DefaultAllocator, DimName, OPoint, OVector, RealField};

/// An owned weighted point set: weights and the points they belong to.
pub type QuadraturePair<T, D> = (Vec<T>, Vec<OPoint<T, D>>);

/// Tolerance within which interpolation weights must sum to one.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-10;

/// Returns `true` if the weights sum to one within [`WEIGHT_SUM_TOLERANCE`].
pub fn weights_are_normalized<T>(weights: &[T]) -> bool
where
    T: RealField,
{
    let sum = weights.iter().fold(T::zero(), |sum, w| sum + w.clone());
    (sum - T::one()).abs() < convert(WEIGHT_SUM_TOLERANCE)
}

/// Computes the weighted average of the given points.
///
/// The weights are assumed to be normalized.
///
/// # Panics
///
/// Panics if the number of points and the number of weights differ.
pub fn weighted_average<T, D>(points: &[OPoint<T, D>], weights: &[T]) -> OPoint<T, D>
where
    T: RealField,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    assert_eq!(points.len(), weights.len());
    let mut average = OVector::<T, D>::zeros();
    for (point, weight) in izip!(points, weights) {
        average += &point.coords * weight.clone();
    }
    OPoint::from(average)
}

/// The equal-weight interpolation rule over the given entity vertices.
pub fn uniform_vertex_rule<T, D>(vertices: &[OPoint<T, D>]) -> QuadraturePair<T, D>
where
    T: RealField,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    let weight = T::one() / convert(vertices.len() as f64);
    (vec![weight; vertices.len()], vertices.to_vec())
}
