use matrixcompare::assert_matrix_eq;
use nalgebra::{DMatrix, DMatrixViewMut, DVector, DVectorViewMut};

use wulfenite::assembly::global::{Assembler, GlobalMatrix, GlobalVector};
use wulfenite::assembly::local::{DofMap, Equation, ShapeFunctionEvaluator};
use wulfenite::nalgebra_sparse::{CooMatrix, CsrMatrix};

struct MockDofMap {
    num_dofs: usize,
    cell_dofs: Vec<Vec<usize>>,
}

impl DofMap for MockDofMap {
    fn num_dofs(&self) -> usize {
        self.num_dofs
    }

    fn num_cells(&self) -> usize {
        self.cell_dofs.len()
    }

    fn cell_dof_count(&self, cell_index: usize) -> usize {
        self.cell_dofs[cell_index].len()
    }

    fn populate_cell_dofs(&self, output: &mut [usize], cell_index: usize) {
        output.copy_from_slice(&self.cell_dofs[cell_index]);
    }
}

fn fill_stencil(matrix: &mut DMatrixViewMut<f64>) {
    matrix[(0, 0)] = 1.0;
    matrix[(0, 1)] = -1.0;
    matrix[(1, 0)] = -1.0;
    matrix[(1, 1)] = 1.0;
}

/// The local system of a 1-D linear diffusion element with a unit load.
struct TwoNodeStencil;

impl<Fe> Equation<f64, Fe> for TwoNodeStencil {
    fn assemble_system(
        &self,
        mut matrix: DMatrixViewMut<f64>,
        mut rhs: DVectorViewMut<f64>,
        _fe_values: &Fe,
        _cell_index: usize,
    ) -> eyre::Result<()> {
        fill_stencil(&mut matrix);
        rhs[0] = 0.5;
        rhs[1] = 0.5;
        Ok(())
    }

    fn assemble_matrix(
        &self,
        mut matrix: DMatrixViewMut<f64>,
        _fe_values: &Fe,
        _cell_index: usize,
    ) -> eyre::Result<()> {
        fill_stencil(&mut matrix);
        Ok(())
    }

    fn assemble_rhs(
        &self,
        mut rhs: DVectorViewMut<f64>,
        _fe_values: &Fe,
        _cell_index: usize,
    ) -> eyre::Result<()> {
        rhs[0] = 0.5;
        rhs[1] = 0.5;
        Ok(())
    }
}

/// An equation that only knows how to produce a load vector.
struct LoadOnly;

impl<Fe> Equation<f64, Fe> for LoadOnly {
    fn assemble_rhs(
        &self,
        mut rhs: DVectorViewMut<f64>,
        _fe_values: &Fe,
        _cell_index: usize,
    ) -> eyre::Result<()> {
        rhs.fill(1.0);
        Ok(())
    }
}

/// Adds into the local matrix instead of overwriting, to expose stale local state.
struct AccumulatingStencil;

impl<Fe> Equation<f64, Fe> for AccumulatingStencil {
    fn assemble_matrix(
        &self,
        mut matrix: DMatrixViewMut<f64>,
        _fe_values: &Fe,
        _cell_index: usize,
    ) -> eyre::Result<()> {
        for i in 0..matrix.nrows() {
            matrix[(i, i)] += 1.0;
        }
        Ok(())
    }
}

struct RecordingEvaluator {
    cells: Vec<usize>,
}

impl ShapeFunctionEvaluator for RecordingEvaluator {
    fn reinit(&mut self, cell_index: usize) -> eyre::Result<()> {
        self.cells.push(cell_index);
        Ok(())
    }
}

struct FailingEvaluator;

impl ShapeFunctionEvaluator for FailingEvaluator {
    fn reinit(&mut self, cell_index: usize) -> eyre::Result<()> {
        eyre::bail!("no quadrature data for cell {cell_index}")
    }
}

#[test]
fn two_cells_sharing_a_dof_accumulate_their_contributions() {
    let dof_map = MockDofMap {
        num_dofs: 3,
        cell_dofs: vec![vec![0, 1], vec![1, 2]],
    };
    let mut matrix = CooMatrix::new(3, 3);
    let mut rhs = DVector::zeros(3);
    {
        let mut assembler = Assembler::new(
            &dof_map,
            Some(&mut matrix as &mut dyn GlobalMatrix<f64>),
            Some(&mut rhs as &mut dyn GlobalVector<f64>),
            (),
        )
        .unwrap();
        for cell_index in 0..dof_map.num_cells() {
            assembler.assemble_cell(cell_index, &TwoNodeStencil).unwrap();
        }
    }

    // The shared node receives the sum of both cells' contributions.
    let csr = CsrMatrix::from(&matrix);
    #[rustfmt::skip]
    let expected = DMatrix::from_row_slice(3, 3, &[
         1.0, -1.0,  0.0,
        -1.0,  2.0, -1.0,
         0.0, -1.0,  1.0,
    ]);
    assert_matrix_eq!(csr, expected, comp = abs, tol = 1e-14);
    assert_eq!(rhs, DVector::from_vec(vec![0.5, 1.0, 0.5]));
}

#[test]
fn assembling_the_same_cell_twice_doubles_every_entry() {
    let dof_map = MockDofMap {
        num_dofs: 2,
        cell_dofs: vec![vec![0, 1]],
    };
    let mut matrix = DMatrix::zeros(2, 2);
    let mut rhs = DVector::zeros(2);
    {
        let mut assembler = Assembler::new(
            &dof_map,
            Some(&mut matrix as &mut dyn GlobalMatrix<f64>),
            Some(&mut rhs as &mut dyn GlobalVector<f64>),
            (),
        )
        .unwrap();
        assembler.assemble_cell(0, &TwoNodeStencil).unwrap();
        assembler.assemble_cell(0, &TwoNodeStencil).unwrap();
    }

    #[rustfmt::skip]
    let expected = DMatrix::from_row_slice(2, 2, &[
         2.0, -2.0,
        -2.0,  2.0,
    ]);
    assert_eq!(matrix, expected);
    assert_eq!(rhs, DVector::from_vec(vec![1.0, 1.0]));
}

#[test]
fn rhs_only_assembly_fills_the_vector() {
    let dof_map = MockDofMap {
        num_dofs: 3,
        cell_dofs: vec![vec![0, 1], vec![1, 2]],
    };
    let mut rhs = DVector::zeros(3);
    {
        let mut assembler =
            Assembler::new(&dof_map, None, Some(&mut rhs as &mut dyn GlobalVector<f64>), ()).unwrap();
        for cell_index in 0..dof_map.num_cells() {
            assembler.assemble_cell(cell_index, &LoadOnly).unwrap();
        }
    }
    assert_eq!(rhs, DVector::from_vec(vec![1.0, 2.0, 1.0]));
}

#[test]
fn unsupported_assembly_mode_is_an_error_and_scatters_nothing() {
    let dof_map = MockDofMap {
        num_dofs: 2,
        cell_dofs: vec![vec![0, 1]],
    };
    let mut matrix = DMatrix::zeros(2, 2);
    {
        let mut assembler =
            Assembler::new(&dof_map, Some(&mut matrix as &mut dyn GlobalMatrix<f64>), None, ()).unwrap();
        // LoadOnly has no matrix entry point, so matrix-only assembly must fail.
        assert!(assembler.assemble_cell(0, &LoadOnly).is_err());
    }
    assert_eq!(matrix, DMatrix::zeros(2, 2));
}

#[test]
fn assembling_without_any_target_is_an_error() {
    let dof_map = MockDofMap {
        num_dofs: 2,
        cell_dofs: vec![vec![0, 1]],
    };
    let mut assembler = Assembler::<f64, ()>::new(&dof_map, None, None, ()).unwrap();
    let error = assembler.assemble_cell(0, &TwoNodeStencil).unwrap_err();
    assert!(error.to_string().contains("nothing to assemble"));
}

#[test]
fn mismatched_global_sizes_fail_at_construction() {
    let dof_map = MockDofMap {
        num_dofs: 3,
        cell_dofs: vec![vec![0, 1], vec![1, 2]],
    };

    let mut matrix = CooMatrix::<f64>::new(2, 2);
    assert!(Assembler::new(&dof_map, Some(&mut matrix as &mut dyn GlobalMatrix<f64>), None, ()).is_err());

    let mut rhs = DVector::<f64>::zeros(4);
    assert!(Assembler::new(&dof_map, None, Some(&mut rhs as &mut dyn GlobalVector<f64>), ()).is_err());
}

#[test]
fn local_contributions_do_not_leak_between_cells() {
    let dof_map = MockDofMap {
        num_dofs: 4,
        cell_dofs: vec![vec![0, 1], vec![2, 3]],
    };
    let mut matrix = DMatrix::zeros(4, 4);
    {
        let mut assembler =
            Assembler::new(&dof_map, Some(&mut matrix as &mut dyn GlobalMatrix<f64>), None, ()).unwrap();
        assembler.assemble_cell(0, &AccumulatingStencil).unwrap();
        assembler.assemble_cell(1, &AccumulatingStencil).unwrap();
    }
    // The equation adds into the local matrix; stale local state would make the
    // second cell scatter twice its contribution.
    assert_eq!(matrix, DMatrix::identity(4, 4));
}

#[test]
fn the_evaluator_is_rebound_to_every_cell() {
    let dof_map = MockDofMap {
        num_dofs: 3,
        cell_dofs: vec![vec![0, 1], vec![1, 2]],
    };
    let mut rhs = DVector::zeros(3);
    let mut assembler = Assembler::new(
        &dof_map,
        None,
        Some(&mut rhs as &mut dyn GlobalVector<f64>),
        RecordingEvaluator { cells: Vec::new() },
    )
    .unwrap();
    assembler.assemble_cell(0, &LoadOnly).unwrap();
    assembler.assemble_cell(1, &LoadOnly).unwrap();
    assert_eq!(assembler.fe_values().cells, vec![0, 1]);
}

#[test]
fn evaluator_failure_aborts_the_cell_before_scatter() {
    let dof_map = MockDofMap {
        num_dofs: 2,
        cell_dofs: vec![vec![0, 1]],
    };
    let mut matrix = DMatrix::zeros(2, 2);
    {
        let mut assembler = Assembler::new(
            &dof_map,
            Some(&mut matrix as &mut dyn GlobalMatrix<f64>),
            None,
            FailingEvaluator,
        )
        .unwrap();
        assert!(assembler.assemble_cell(0, &TwoNodeStencil).is_err());
    }
    assert_eq!(matrix, DMatrix::zeros(2, 2));
}
