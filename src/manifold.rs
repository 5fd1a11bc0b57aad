//! Manifold descriptions for curved and periodic mesh geometry.
//!
//! A manifold answers one question: given a weighted set of points surrounding a new mesh
//! point (the midpoint of an edge, the center of a face or cell), where does that new point
//! lie? On flat geometry the answer is the plain weighted average; on curved or periodic
//! geometry it is not, and the [`Manifold`] trait is the seam where the difference lives.
//!
//! Two concrete manifolds are provided. [`FlatManifold`] interpolates in Euclidean space and
//! understands per-axis periodicity, so that averaging across a periodic seam (an angular
//! coordinate, say) produces a point inside the seam rather than on the far side of the
//! domain. [`ChartManifold`] delegates interpolation to chart coordinates through a
//! user-supplied [`Chart`], which makes any geometry expressible via an invertible
//! parametrization (spherical shells, cylinders, ...) reuse the flat/periodic machinery.
//!
//! Manifolds are immutable after construction and are shared by reference across all cells
//! of a mesh.
use crate::allocators::{BiDimAllocator, DimAllocator};
use crate::mesh::{HexVertices, LineVertices, QuadVertices, HEX_EDGES, HEX_FACES};
use crate::quadrature::{uniform_vertex_rule, weighted_average, weights_are_normalized};
use crate::SmallDim;
use itertools::izip;
use nalgebra::allocator::Allocator;
use nalgebra::{convert, DefaultAllocator, DimName, OMatrix, OPoint, OVector, RealField, Scalar};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Display, Formatter};

/// Step width for the finite-difference tangent approximation.
const TANGENT_EPSILON: f64 = 1e-8;

/// Default relative tolerance for periodic box checks.
const DEFAULT_TOLERANCE: f64 = 1e-10;

/// Errors produced by manifold operations.
///
/// Every variant signals a violated precondition or a capability the manifold does not
/// provide. These are caller errors: they are not recoverable and should abort the
/// operation that triggered them.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ManifoldError {
    /// The manifold does not implement the requested operation.
    NotImplemented { operation: &'static str },
    /// The operation is not defined for the manifold's intrinsic dimension.
    InvalidDimension { operation: &'static str, dim: usize },
    /// Interpolation weights do not sum to one.
    UnnormalizedWeights,
    /// An interpolation weight lies outside `[0, 1]`.
    WeightOutOfRange,
    /// A surrounding point lies outside the declared periodic box.
    PointOutsidePeriodicBox { axis: usize },
    /// An entity was handed over with the wrong number of vertices.
    WrongVertexCount {
        operation: &'static str,
        expected: usize,
        actual: usize,
    },
}

impl Display for ManifoldError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotImplemented { operation } => {
                write!(f, "the manifold does not implement `{operation}`")
            }
            Self::InvalidDimension { operation, dim } => {
                write!(f, "`{operation}` is not defined for intrinsic dimension {dim}")
            }
            Self::UnnormalizedWeights => {
                write!(f, "the weights for the individual points should sum to 1")
            }
            Self::WeightOutOfRange => {
                write!(f, "the interpolation weight must lie in [0, 1]")
            }
            Self::PointOutsidePeriodicBox { axis } => {
                write!(f, "surrounding point lies outside the periodic box along axis {axis}")
            }
            Self::WrongVertexCount {
                operation,
                expected,
                actual,
            } => {
                write!(f, "`{operation}` expects {expected} vertices, got {actual}")
            }
        }
    }
}

impl std::error::Error for ManifoldError {}

fn entity_vertices<'a, T, D, const N: usize>(
    vertices: &'a [OPoint<T, D>],
    operation: &'static str,
) -> Result<&'a [OPoint<T, D>; N], ManifoldError>
where
    T: Scalar,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    vertices.try_into().map_err(|_| ManifoldError::WrongVertexCount {
        operation,
        expected: N,
        actual: vertices.len(),
    })
}

/// A description of where new mesh points lie, polymorphic over the geometry.
///
/// `Dim` is the intrinsic dimension of the mesh whose entities are interpolated, `SpaceDim`
/// the dimension of the space its points live in. All operations carry default
/// implementations expressed in terms of [`get_new_point`](Manifold::get_new_point), which
/// itself defaults to "average, then project": a concrete manifold that is not flat needs to
/// override nothing but [`project_to_manifold`](Manifold::project_to_manifold) to get
/// consistent behavior everywhere.
pub trait Manifold<T, Dim, SpaceDim>
where
    T: RealField,
    Dim: SmallDim,
    SpaceDim: SmallDim,
    DefaultAllocator: DimAllocator<T, SpaceDim>,
{
    /// Projects a candidate point onto the manifold.
    ///
    /// `surrounding_points` are the points that generated the candidate (typically by
    /// weighted averaging); implementations may use them to steer the projection. The
    /// default fails with [`ManifoldError::NotImplemented`]; it is the single override
    /// required by any non-flat manifold that relies on the default interpolation.
    fn project_to_manifold(
        &self,
        surrounding_points: &[OPoint<T, SpaceDim>],
        candidate: OPoint<T, SpaceDim>,
    ) -> Result<OPoint<T, SpaceDim>, ManifoldError> {
        let _ = (surrounding_points, candidate);
        Err(ManifoldError::NotImplemented {
            operation: "project_to_manifold",
        })
    }

    /// Returns the point of the manifold described by the weighted point set.
    ///
    /// The weights must sum to one within `1e-10`.
    ///
    /// # Panics
    ///
    /// Panics if the number of points and the number of weights differ.
    fn get_new_point(
        &self,
        points: &[OPoint<T, SpaceDim>],
        weights: &[T],
    ) -> Result<OPoint<T, SpaceDim>, ManifoldError> {
        assert_eq!(points.len(), weights.len());
        if !weights_are_normalized(weights) {
            return Err(ManifoldError::UnnormalizedWeights);
        }
        let candidate = weighted_average(points, weights);
        self.project_to_manifold(points, candidate)
    }

    /// Returns the point at parameter `w` on the manifold curve from `p1` (`w = 0`) to `p2`
    /// (`w = 1`).
    fn get_intermediate_point(
        &self,
        p1: &OPoint<T, SpaceDim>,
        p2: &OPoint<T, SpaceDim>,
        w: T,
    ) -> Result<OPoint<T, SpaceDim>, ManifoldError> {
        if w < T::zero() || w > T::one() {
            return Err(ManifoldError::WeightOutOfRange);
        }
        let points = [p1.clone(), p2.clone()];
        let weights = [T::one() - w.clone(), w];
        self.get_new_point(&points, &weights)
    }

    /// Returns the manifold midpoint of a line entity.
    fn get_new_point_on_line(
        &self,
        line: &LineVertices<T, SpaceDim>,
    ) -> Result<OPoint<T, SpaceDim>, ManifoldError> {
        let (weights, points) = uniform_vertex_rule(&line[..]);
        self.get_new_point(&points, &weights)
    }

    /// Returns the manifold center of a quad entity.
    ///
    /// Fails with [`ManifoldError::InvalidDimension`] when the mesh is one-dimensional:
    /// a 1-D mesh has no quads.
    fn get_new_point_on_quad(
        &self,
        quad: &QuadVertices<T, SpaceDim>,
    ) -> Result<OPoint<T, SpaceDim>, ManifoldError> {
        if Dim::dim() < 2 {
            return Err(ManifoldError::InvalidDimension {
                operation: "get_new_point_on_quad",
                dim: Dim::dim(),
            });
        }
        let (weights, points) = uniform_vertex_rule(&quad[..]);
        self.get_new_point(&points, &weights)
    }

    /// Returns the manifold center of a face of a cell.
    ///
    /// A face is a line in a 2-D mesh and a quad in a 3-D mesh; a 1-D mesh has no faces to
    /// interpolate on and the call fails with [`ManifoldError::InvalidDimension`].
    fn get_new_point_on_face(
        &self,
        face: &[OPoint<T, SpaceDim>],
    ) -> Result<OPoint<T, SpaceDim>, ManifoldError> {
        match Dim::dim() {
            2 => self.get_new_point_on_line(entity_vertices(face, "get_new_point_on_face")?),
            3 => self.get_new_point_on_quad(entity_vertices(face, "get_new_point_on_face")?),
            dim => Err(ManifoldError::InvalidDimension {
                operation: "get_new_point_on_face",
                dim,
            }),
        }
    }

    /// Returns the manifold center of a cell, dispatching on the intrinsic dimension.
    fn get_new_point_on_cell(
        &self,
        cell: &[OPoint<T, SpaceDim>],
    ) -> Result<OPoint<T, SpaceDim>, ManifoldError> {
        match Dim::dim() {
            1 => self.get_new_point_on_line(entity_vertices(cell, "get_new_point_on_cell")?),
            2 => self.get_new_point_on_quad(entity_vertices(cell, "get_new_point_on_cell")?),
            3 => self.get_new_point_on_hex(entity_vertices(cell, "get_new_point_on_cell")?),
            dim => Err(ManifoldError::InvalidDimension {
                operation: "get_new_point_on_cell",
                dim,
            }),
        }
    }

    /// Returns the manifold center of a hex cell.
    ///
    /// Only defined for three-dimensional meshes in three-dimensional space. The
    /// interpolation uses the interior structure of the hex, not just its vertices: the
    /// weighted point set consists of the 8 vertices (weight 1/128 each), the 12 edge
    /// midpoints (7/192 each) and the 6 face centers (1/12 each). The auxiliary points are
    /// themselves interpolated through the manifold, so they lie on curved geometry.
    fn get_new_point_on_hex(
        &self,
        hex: &HexVertices<T, SpaceDim>,
    ) -> Result<OPoint<T, SpaceDim>, ManifoldError> {
        if Dim::dim() != 3 || SpaceDim::dim() != 3 {
            return Err(ManifoldError::InvalidDimension {
                operation: "get_new_point_on_hex",
                dim: Dim::dim(),
            });
        }

        let mut points = Vec::with_capacity(26);
        let mut weights = Vec::with_capacity(26);
        let vertex_weight: T = convert(1.0 / 128.0);
        let edge_weight: T = convert(7.0 / 192.0);
        let face_weight: T = convert(1.0 / 12.0);

        for vertex in hex {
            points.push(vertex.clone());
            weights.push(vertex_weight.clone());
        }
        for [a, b] in HEX_EDGES {
            let edge = [hex[a].clone(), hex[b].clone()];
            points.push(self.get_new_point_on_line(&edge)?);
            weights.push(edge_weight.clone());
        }
        for [a, b, c, d] in HEX_FACES {
            let face = [hex[a].clone(), hex[b].clone(), hex[c].clone(), hex[d].clone()];
            points.push(self.get_new_point_on_quad(&face)?);
            weights.push(face_weight.clone());
        }

        self.get_new_point(&points, &weights)
    }

    /// Returns a vector tangent to the manifold at `x1`, pointing toward `x2`.
    ///
    /// The default is a finite-difference approximation: the manifold point an
    /// ε-fraction of the way from `x1` to `x2` is computed via
    /// [`get_new_point`](Manifold::get_new_point) and the secant scaled back by 1/ε.
    /// Concrete manifolds are expected to override this with an exact tangent where one is
    /// available.
    fn get_tangent_vector(
        &self,
        x1: &OPoint<T, SpaceDim>,
        x2: &OPoint<T, SpaceDim>,
    ) -> Result<OVector<T, SpaceDim>, ManifoldError> {
        let epsilon: T = convert(TANGENT_EPSILON);
        let points = [x1.clone(), x2.clone()];
        // The probe point sits an epsilon-fraction of the way from x1 toward x2, so the
        // scaled secant is consistent with exact overrides like the flat x2 - x1.
        let weights = [T::one() - epsilon.clone(), epsilon.clone()];
        let neighbor = self.get_new_point(&points, &weights)?;
        Ok((neighbor - x1) / epsilon)
    }
}

/// The Euclidean manifold, optionally periodic in a box.
///
/// With zero periodicity (the default), interpolation is the plain weighted average and
/// tangents are plain differences. A nonzero `periodicity` component declares the
/// corresponding axis periodic with that period: all surrounding points must then lie inside
/// `[0, period]` (up to a tolerance relative to the periodicity norm), and both
/// interpolation and tangents use shortest-path-around-the-torus semantics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
pub struct FlatManifold<T, D>
where
    T: Scalar,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    #[serde(bound(
        serialize = "<DefaultAllocator as Allocator<T, D>>::Buffer: Serialize",
        deserialize = "<DefaultAllocator as Allocator<T, D>>::Buffer: Deserialize<'de>"
    ))]
    periodicity: OVector<T, D>,
    tolerance: T,
}

impl<T, D> FlatManifold<T, D>
where
    T: RealField,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    /// Creates a flat manifold without periodicity.
    pub fn new() -> Self {
        Self::with_periodicity(OVector::<T, D>::zeros())
    }

    /// Creates a flat manifold periodic in the box described by `periodicity`.
    ///
    /// A zero component means "not periodic along this axis".
    pub fn with_periodicity(periodicity: OVector<T, D>) -> Self {
        Self::with_periodicity_and_tolerance(periodicity, convert(DEFAULT_TOLERANCE))
    }

    /// Like [`with_periodicity`](FlatManifold::with_periodicity), with an explicit relative
    /// tolerance for the periodic box check.
    pub fn with_periodicity_and_tolerance(periodicity: OVector<T, D>, tolerance: T) -> Self {
        Self { periodicity, tolerance }
    }

    /// The per-axis periods of the manifold.
    pub fn periodicity(&self) -> &OVector<T, D> {
        &self.periodicity
    }

    /// The relative tolerance used for the periodic box check.
    pub fn tolerance(&self) -> T {
        self.tolerance.clone()
    }

    /// Periodicity-aware weighted average.
    ///
    /// On a periodic axis the surrounding points may straddle the periodic seam, in which
    /// case their naive average lies on the wrong side of the domain. Points more than half
    /// a period above the axis-wise minimum are first wrapped down by one period, the
    /// weighted average is taken, and a negative result is wrapped back up. For points that
    /// do not straddle a seam this reduces to the plain weighted average.
    pub fn get_new_point(
        &self,
        points: &[OPoint<T, D>],
        weights: &[T],
    ) -> Result<OPoint<T, D>, ManifoldError> {
        assert_eq!(points.len(), weights.len());
        if !weights_are_normalized(weights) {
            return Err(ManifoldError::UnnormalizedWeights);
        }

        let period_norm = self.periodicity.norm();
        let check_period = period_norm > self.tolerance;
        let half: T = convert(0.5);

        let mut min_point = self.periodicity.clone();
        if check_period {
            let box_tolerance = self.tolerance.clone() * period_norm;
            for point in points {
                for d in 0..D::dim() {
                    if point[d] < min_point[d] {
                        min_point[d] = point[d].clone();
                    }
                    if self.periodicity[d] > T::zero()
                        && (point[d] < -box_tolerance.clone()
                            || point[d] >= self.periodicity[d].clone() + box_tolerance.clone())
                    {
                        return Err(ManifoldError::PointOutsidePeriodicBox { axis: d });
                    }
                }
            }
        }

        let mut new_point = OVector::<T, D>::zeros();
        for (point, weight) in izip!(points, weights) {
            let mut displaced = point.coords.clone();
            if check_period {
                for d in 0..D::dim() {
                    if self.periodicity[d] > T::zero()
                        && point[d].clone() - min_point[d].clone()
                            > self.periodicity[d].clone() * half.clone()
                    {
                        displaced[d] -= self.periodicity[d].clone();
                    }
                }
            }
            new_point += displaced * weight.clone();
        }

        if check_period {
            for d in 0..D::dim() {
                if self.periodicity[d] > T::zero() && new_point[d] < T::zero() {
                    new_point[d] += self.periodicity[d].clone();
                }
            }
        }

        Ok(OPoint::from(new_point))
    }

    /// Exact tangent from `x1` toward `x2`.
    ///
    /// On a periodic axis, a component of the raw difference larger than half the period in
    /// magnitude is shifted by one full period so that the tangent follows the shortest path
    /// around the torus.
    pub fn get_tangent_vector(&self, x1: &OPoint<T, D>, x2: &OPoint<T, D>) -> OVector<T, D> {
        let mut direction = x2 - x1;
        let half: T = convert(0.5);
        for d in 0..D::dim() {
            let period = self.periodicity[d].clone();
            if period > self.tolerance {
                let half_period = period.clone() * half.clone();
                if direction[d] < -half_period.clone() {
                    direction[d] += period;
                } else if direction[d] > half_period {
                    direction[d] -= period;
                }
            }
        }
        direction
    }
}

impl<T, D> Default for FlatManifold<T, D>
where
    T: RealField,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, Dim, D> Manifold<T, Dim, D> for FlatManifold<T, D>
where
    T: RealField,
    Dim: SmallDim,
    D: SmallDim,
    DefaultAllocator: DimAllocator<T, D>,
{
    /// Euclidean space needs no projection: the candidate is returned unchanged.
    fn project_to_manifold(
        &self,
        _surrounding_points: &[OPoint<T, D>],
        candidate: OPoint<T, D>,
    ) -> Result<OPoint<T, D>, ManifoldError> {
        Ok(candidate)
    }

    fn get_new_point(
        &self,
        points: &[OPoint<T, D>],
        weights: &[T],
    ) -> Result<OPoint<T, D>, ManifoldError> {
        FlatManifold::get_new_point(self, points, weights)
    }

    fn get_tangent_vector(
        &self,
        x1: &OPoint<T, D>,
        x2: &OPoint<T, D>,
    ) -> Result<OVector<T, D>, ManifoldError> {
        Ok(FlatManifold::get_tangent_vector(self, x1, x2))
    }
}

/// An invertible parametrization of a manifold over a chart space.
///
/// `pull_back` and `push_forward` must be inverses of each other on the chart's domain.
/// [`push_forward_gradient`](Chart::push_forward_gradient), the Jacobian of
/// `push_forward`, is only required for tangent transport and defaults to
/// [`ManifoldError::NotImplemented`].
pub trait Chart<T, SpaceDim, ChartDim>
where
    T: RealField,
    SpaceDim: SmallDim,
    ChartDim: SmallDim,
    DefaultAllocator: BiDimAllocator<T, SpaceDim, ChartDim>,
{
    /// Maps an ambient point to chart coordinates.
    fn pull_back(&self, point: &OPoint<T, SpaceDim>) -> OPoint<T, ChartDim>;

    /// Maps chart coordinates to an ambient point.
    fn push_forward(&self, chart_point: &OPoint<T, ChartDim>) -> OPoint<T, SpaceDim>;

    /// The Jacobian of [`push_forward`](Chart::push_forward) at the given chart point.
    fn push_forward_gradient(
        &self,
        chart_point: &OPoint<T, ChartDim>,
    ) -> Result<OMatrix<T, SpaceDim, ChartDim>, ManifoldError> {
        let _ = chart_point;
        Err(ManifoldError::NotImplemented {
            operation: "push_forward_gradient",
        })
    }
}

/// A manifold that interpolates in the coordinates of a [`Chart`].
///
/// Surrounding points are pulled back to chart space, interpolated there by an owned
/// [`FlatManifold`] sub-manifold (with the chart's periodicity, if any), and the result is
/// pushed forward to ambient space. This reuses the periodic averaging machinery for any
/// curved geometry with an invertible parametrization.
#[derive(Debug, Clone)]
pub struct ChartManifold<T, C, ChartDim>
where
    T: Scalar,
    ChartDim: DimName,
    DefaultAllocator: Allocator<T, ChartDim>,
{
    chart: C,
    sub_manifold: FlatManifold<T, ChartDim>,
}

impl<T, C, ChartDim> ChartManifold<T, C, ChartDim>
where
    T: RealField,
    ChartDim: DimName,
    DefaultAllocator: DimAllocator<T, ChartDim>,
{
    /// Wraps a chart without chart-space periodicity.
    pub fn new(chart: C) -> Self {
        Self {
            chart,
            sub_manifold: FlatManifold::new(),
        }
    }

    /// Wraps a chart whose coordinate space is periodic in the given box.
    pub fn with_periodicity(chart: C, periodicity: OVector<T, ChartDim>) -> Self {
        Self {
            chart,
            sub_manifold: FlatManifold::with_periodicity(periodicity),
        }
    }

    /// The wrapped chart.
    pub fn chart(&self) -> &C {
        &self.chart
    }

    /// The flat sub-manifold interpolating in chart space.
    pub fn sub_manifold(&self) -> &FlatManifold<T, ChartDim> {
        &self.sub_manifold
    }
}

impl<T, Dim, SpaceDim, ChartDim, C> Manifold<T, Dim, SpaceDim> for ChartManifold<T, C, ChartDim>
where
    T: RealField,
    Dim: SmallDim,
    SpaceDim: SmallDim,
    ChartDim: SmallDim,
    C: Chart<T, SpaceDim, ChartDim>,
    DefaultAllocator: BiDimAllocator<T, SpaceDim, ChartDim>,
{
    fn get_new_point(
        &self,
        points: &[OPoint<T, SpaceDim>],
        weights: &[T],
    ) -> Result<OPoint<T, SpaceDim>, ManifoldError> {
        let chart_points: Vec<_> = points.iter().map(|p| self.chart.pull_back(p)).collect();
        let chart_point = self.sub_manifold.get_new_point(&chart_points, weights)?;
        Ok(self.chart.push_forward(&chart_point))
    }

    /// First-order tangent transport: the chart-space tangent (periodicity-aware via the
    /// sub-manifold) mapped to ambient space by the chart Jacobian at `pull_back(x1)`.
    fn get_tangent_vector(
        &self,
        x1: &OPoint<T, SpaceDim>,
        x2: &OPoint<T, SpaceDim>,
    ) -> Result<OVector<T, SpaceDim>, ManifoldError> {
        let chart_x1 = self.chart.pull_back(x1);
        let chart_x2 = self.chart.pull_back(x2);
        let jacobian = self.chart.push_forward_gradient(&chart_x1)?;
        let delta = self.sub_manifold.get_tangent_vector(&chart_x1, &chart_x2);
        Ok(jacobian * delta)
    }
}
