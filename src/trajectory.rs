//! Recorded plant trajectories
//!
//! One row per tick of true process values, columns in
//! `ProcessVariables::COLUMNS` order.

use ndarray::{Array2, ArrayView1};

use crate::plant::ProcessVariables;

#[derive(Debug, Clone, Default)]
pub struct Trajectory {
    samples: Vec<f64>,
    rows: usize,
}

impl Trajectory {
    pub const WIDTH: usize = ProcessVariables::COLUMNS.len();

    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, process: &ProcessVariables) {
        self.samples.extend_from_slice(&process.to_row());
        self.rows += 1;
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn as_array(&self) -> Array2<f64> {
        Array2::from_shape_vec((self.rows, Self::WIDTH), self.samples.clone())
            .unwrap_or_else(|_| Array2::zeros((0, Self::WIDTH)))
    }

    /// Values of one variable over time, if the column exists.
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let index = ProcessVariables::COLUMNS.iter().position(|c| *c == name)?;
        let array = self.as_array();
        let column: ArrayView1<f64> = array.column(index);
        Some(column.to_vec())
    }

    /// Largest absolute difference between two runs, or None if their shapes differ.
    pub fn max_abs_diff(&self, other: &Trajectory) -> Option<f64> {
        if self.rows != other.rows {
            return None;
        }
        let diff = &self.as_array() - &other.as_array();
        Some(diff.iter().fold(0.0_f64, |acc, d| acc.max(d.abs())))
    }
}
