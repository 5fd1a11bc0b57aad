//! Vertex conventions for the mesh entities handed to manifold interpolation.
//!
//! Mesh storage, refinement and iteration live outside this crate. The manifold API only ever
//! sees an entity through its vertex coordinates, ordered as documented here. Vertices follow
//! a bit-pattern ordering: vertex `v` of the unit entity has coordinates given by the binary
//! digits of `v`, with the x digit least significant.
//!
//! For a quad:
//!
//! ```text
//! 2_________3
//! |         |
//! |         |
//! 0_________1
//! ```
//!
//! For a hex, vertices `0..4` form the bottom (z = 0) face in quad order and vertices `4..8`
//! the top (z = 1) face.
use nalgebra::OPoint;

/// The two vertices of a line entity.
pub type LineVertices<T, D> = [OPoint<T, D>; 2];

/// The four vertices of a quadrilateral entity.
pub type QuadVertices<T, D> = [OPoint<T, D>; 4];

/// The eight vertices of a hexahedral entity.
pub type HexVertices<T, D> = [OPoint<T, D>; 8];

/// Vertex index pairs for the twelve edges of a hex.
pub const HEX_EDGES: [[usize; 2]; 12] = [
    // x-directed
    [0, 1],
    [2, 3],
    [4, 5],
    [6, 7],
    // y-directed
    [0, 2],
    [1, 3],
    [4, 6],
    [5, 7],
    // z-directed
    [0, 4],
    [1, 5],
    [2, 6],
    [3, 7],
];

/// Vertex index quadruples for the six faces of a hex, each in quad order.
pub const HEX_FACES: [[usize; 4]; 6] = [
    // x = 0, x = 1
    [0, 2, 4, 6],
    [1, 3, 5, 7],
    // y = 0, y = 1
    [0, 1, 4, 5],
    [2, 3, 6, 7],
    // z = 0, z = 1
    [0, 1, 2, 3],
    [4, 5, 6, 7],
];
