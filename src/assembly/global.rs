//! Local-to-global scatter of per-cell contributions.
use crate::assembly::local::{DofMap, Equation, ShapeFunctionEvaluator};
use eyre::{bail, ensure};
use log::{debug, trace};
use nalgebra::{ClosedAdd, DMatrix, DMatrixViewMut, DVector, DVectorViewMut, RealField, Scalar};
use nalgebra_sparse::CooMatrix;

/// Additive entry access to a global matrix.
///
/// Implementations must *accumulate*: multiple cells share degrees of freedom on their
/// common boundary, and their contributions to the same entry must sum.
pub trait GlobalMatrix<T> {
    fn nrows(&self) -> usize;

    fn ncols(&self) -> usize;

    /// Adds `value` to the entry at `(row, col)`.
    fn add(&mut self, row: usize, col: usize, value: T);
}

/// Additive entry access to a global vector.
pub trait GlobalVector<T> {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adds `value` to the entry at `index`.
    fn add(&mut self, index: usize, value: T);
}

/// Triplet storage accumulates duplicates by construction, which makes it the canonical
/// sparse backend for assembly: the summation happens on conversion to CSR/CSC.
impl<T: Scalar> GlobalMatrix<T> for CooMatrix<T> {
    fn nrows(&self) -> usize {
        CooMatrix::nrows(self)
    }

    fn ncols(&self) -> usize {
        CooMatrix::ncols(self)
    }

    fn add(&mut self, row: usize, col: usize, value: T) {
        self.push(row, col, value);
    }
}

impl<T: Scalar + ClosedAdd> GlobalMatrix<T> for DMatrix<T> {
    fn nrows(&self) -> usize {
        DMatrix::nrows(self)
    }

    fn ncols(&self) -> usize {
        DMatrix::ncols(self)
    }

    fn add(&mut self, row: usize, col: usize, value: T) {
        self[(row, col)] += value;
    }
}

impl<T: Scalar + ClosedAdd> GlobalVector<T> for DVector<T> {
    fn len(&self) -> usize {
        self.nrows()
    }

    fn add(&mut self, index: usize, value: T) {
        self[index] += value;
    }
}

/// Assembles the per-cell contributions of an [`Equation`] into global storage.
///
/// The assembler is bound to a degree-of-freedom numbering and to the global storage it
/// scatters into. Which storage handles are present determines the assembly mode: matrix
/// and rhs, matrix only, or rhs only. Each cell visit runs three phases in order: bind
/// (re-init the shape-function evaluator, clear the local matrix/vector), integrate
/// (delegate to the matching [`Equation`] entry point) and scatter (accumulate the local
/// entries into the global storage through the cell's dof indices). Local state never
/// persists across cells.
///
/// The assembler performs no locking; it assumes exclusive access to its storage handles
/// for the duration of each cell's scatter.
pub struct Assembler<'a, T, Fe> {
    dof_map: &'a dyn DofMap,
    matrix: Option<&'a mut dyn GlobalMatrix<T>>,
    rhs: Option<&'a mut dyn GlobalVector<T>>,
    fe_values: Fe,
    cell_matrix: DMatrix<T>,
    cell_vector: DVector<T>,
    cell_dofs: Vec<usize>,
}

impl<'a, T, Fe> Assembler<'a, T, Fe>
where
    T: RealField,
    Fe: ShapeFunctionEvaluator,
{
    /// Creates an assembler for the given dof numbering and global storage handles.
    ///
    /// Fails if a present matrix handle is not square with side `dof_map.num_dofs()`, or a
    /// present vector handle does not have that length.
    pub fn new(
        dof_map: &'a dyn DofMap,
        matrix: Option<&'a mut dyn GlobalMatrix<T>>,
        rhs: Option<&'a mut dyn GlobalVector<T>>,
        fe_values: Fe,
    ) -> eyre::Result<Self> {
        let num_dofs = dof_map.num_dofs();
        if let Some(matrix) = &matrix {
            ensure!(
                matrix.nrows() == num_dofs && matrix.ncols() == num_dofs,
                "global matrix is {} x {}, but the dof numbering has {} dofs",
                matrix.nrows(),
                matrix.ncols(),
                num_dofs
            );
        }
        if let Some(rhs) = &rhs {
            ensure!(
                rhs.len() == num_dofs,
                "global rhs vector has length {}, but the dof numbering has {} dofs",
                rhs.len(),
                num_dofs
            );
        }
        debug!(
            "assembler bound to {} dofs over {} cells (matrix: {}, rhs: {})",
            num_dofs,
            dof_map.num_cells(),
            matrix.is_some(),
            rhs.is_some()
        );
        Ok(Self {
            dof_map,
            matrix,
            rhs,
            fe_values,
            cell_matrix: DMatrix::zeros(0, 0),
            cell_vector: DVector::zeros(0),
            cell_dofs: Vec::new(),
        })
    }

    /// The shape-function evaluator, bound to the most recently assembled cell.
    pub fn fe_values(&self) -> &Fe {
        &self.fe_values
    }

    /// Assembles one cell into the bound global storage.
    ///
    /// Fails if neither a matrix nor an rhs handle is bound ("nothing to assemble" is a
    /// caller error), or if the evaluator or the equation fails; in the latter cases
    /// nothing is scattered.
    pub fn assemble_cell(&mut self, cell_index: usize, equation: &dyn Equation<T, Fe>) -> eyre::Result<()> {
        // Bind phase
        self.fe_values.reinit(cell_index)?;
        let n = self.dof_map.cell_dof_count(cell_index);
        self.cell_matrix.resize_mut(n, n, T::zero());
        self.cell_matrix.fill(T::zero());
        self.cell_vector.resize_vertically_mut(n, T::zero());
        self.cell_vector.fill(T::zero());

        // Integrate phase
        match (self.matrix.is_some(), self.rhs.is_some()) {
            (true, true) => equation.assemble_system(
                DMatrixViewMut::from(&mut self.cell_matrix),
                DVectorViewMut::from(&mut self.cell_vector),
                &self.fe_values,
                cell_index,
            )?,
            (true, false) => equation.assemble_matrix(
                DMatrixViewMut::from(&mut self.cell_matrix),
                &self.fe_values,
                cell_index,
            )?,
            (false, true) => equation.assemble_rhs(
                DVectorViewMut::from(&mut self.cell_vector),
                &self.fe_values,
                cell_index,
            )?,
            (false, false) => bail!("nothing to assemble: neither a global matrix nor a global rhs vector is bound"),
        }

        // Scatter phase. The dof indices are fetched exactly once and shared by the matrix
        // and vector loops, so both use the same index ordering for this cell.
        self.cell_dofs.resize(n, 0);
        self.dof_map.populate_cell_dofs(&mut self.cell_dofs, cell_index);

        if let Some(matrix) = self.matrix.as_mut() {
            for i in 0..n {
                for j in 0..n {
                    matrix.add(
                        self.cell_dofs[i],
                        self.cell_dofs[j],
                        self.cell_matrix[(i, j)].clone(),
                    );
                }
            }
        }
        if let Some(rhs) = self.rhs.as_mut() {
            for j in 0..n {
                rhs.add(self.cell_dofs[j], self.cell_vector[j].clone());
            }
        }
        trace!("assembled cell {} ({} local dofs)", cell_index, n);
        Ok(())
    }
}
