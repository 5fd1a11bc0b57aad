//! Contracts between the assembler and its per-cell collaborators.
use eyre::eyre;
use nalgebra::{DMatrixViewMut, DVectorViewMut, Scalar};

/// Access to the global degree-of-freedom numbering of a discretization.
///
/// The numbering itself (which unknown sits on which mesh entity) is built elsewhere; the
/// assembler only needs the total count for sizing checks and the per-cell index lists for
/// scatter.
pub trait DofMap {
    /// Total number of unknowns in the global system.
    fn num_dofs(&self) -> usize;

    /// Number of cells covered by the numbering.
    fn num_cells(&self) -> usize;

    /// Number of degrees of freedom local to the given cell.
    fn cell_dof_count(&self, cell_index: usize) -> usize;

    /// Writes the global indices of the cell's degrees of freedom into `output`,
    /// which must have length [`cell_dof_count`](DofMap::cell_dof_count).
    fn populate_cell_dofs(&self, output: &mut [usize], cell_index: usize);
}

/// A shape-function evaluator that can be re-bound to a cell.
///
/// Constructing the evaluator (element description, quadrature rule, update flags) is the
/// caller's business; the assembler only re-binds it to the current cell before handing it
/// to the equation.
pub trait ShapeFunctionEvaluator {
    fn reinit(&mut self, cell_index: usize) -> eyre::Result<()>;
}

/// The no-op evaluator, for equations that need no shape-function data.
impl ShapeFunctionEvaluator for () {
    fn reinit(&mut self, _cell_index: usize) -> eyre::Result<()> {
        Ok(())
    }
}

/// Per-cell integral contributions of an equation.
///
/// The assembler picks the entry point matching its assembly mode. An equation overrides
/// the entry points for the modes it supports; the defaults report the missing capability
/// as an error, so using an equation in an unsupported mode is a caller error rather than a
/// silent no-op.
pub trait Equation<T: Scalar, Fe> {
    /// Fills both the local matrix and the local right-hand side for the given cell.
    fn assemble_system(
        &self,
        matrix: DMatrixViewMut<T>,
        rhs: DVectorViewMut<T>,
        fe_values: &Fe,
        cell_index: usize,
    ) -> eyre::Result<()> {
        let _ = (matrix, rhs, fe_values, cell_index);
        Err(eyre!("equation does not implement combined matrix/rhs assembly"))
    }

    /// Fills the local matrix for the given cell.
    fn assemble_matrix(
        &self,
        matrix: DMatrixViewMut<T>,
        fe_values: &Fe,
        cell_index: usize,
    ) -> eyre::Result<()> {
        let _ = (matrix, fe_values, cell_index);
        Err(eyre!("equation does not implement matrix-only assembly"))
    }

    /// Fills the local right-hand side for the given cell.
    fn assemble_rhs(
        &self,
        rhs: DVectorViewMut<T>,
        fe_values: &Fe,
        cell_index: usize,
    ) -> eyre::Result<()> {
        let _ = (rhs, fe_values, cell_index);
        Err(eyre!("equation does not implement rhs-only assembly"))
    }
}
