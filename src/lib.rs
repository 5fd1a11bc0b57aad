use nalgebra::{DimMin, DimName};

pub mod allocators;
pub mod assembly;
pub mod manifold;
pub mod mesh;
pub mod quadrature;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;

/// A small, fixed-size dimension.
///
/// Used as a trait alias for various traits frequently needed by generic `wulfenite` routines.
pub trait SmallDim: DimName + DimMin<Self, Output = Self> {}

impl<D> SmallDim for D where D: DimName + DimMin<Self, Output = Self> {}
