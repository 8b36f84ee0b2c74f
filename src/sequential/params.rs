//! Parameter store: weight matrices and bias vectors of the connection layers,
//! plus the per-layer working buffers (gradients and Adam moments) shaped like them.

use rand::{distributions::Uniform, prelude::Distribution, Rng};

/// Dense row-major matrix.
///
/// Connection weights use `rows = source neurons` and `cols = destination neurons`,
/// so `get(i, j)` is the weight of the link from neuron `i` to neuron `j`.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Matrix {
        Matrix {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Same as `Matrix::zeros`, returning `None` instead of aborting when `rows x cols`
    /// overflows or cannot be allocated.
    pub(crate) fn try_zeros(rows: usize, cols: usize) -> Option<Matrix> {
        Some(Matrix {
            rows,
            cols,
            data: try_zeroed_vec(rows.checked_mul(cols)?)?,
        })
    }

    /// Builds a matrix out of row vectors. Returns `None` if rows have different lengths.
    pub fn from_rows(rows: &[Vec<f64>]) -> Option<Matrix> {
        let cols = rows.first().map_or(0, |r| r.len());
        if rows.iter().any(|r| r.len() != cols) {
            return None;
        }
        Some(Matrix {
            rows: rows.len(),
            cols,
            data: rows.iter().flatten().copied().collect(),
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.cols + col] = value;
    }

    /// Weights going out of one source neuron.
    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        (0..self.rows).map(|r| self.row(r).to_vec()).collect()
    }

    /// Appends a row, taking its values from `values`.
    pub(crate) fn push_row(&mut self, values: impl Iterator<Item = f64>) {
        self.data
            .extend(values.chain(std::iter::repeat(0.0)).take(self.cols));
        self.rows += 1;
    }

    /// Appends a column, taking its values from `values`.
    pub(crate) fn push_col(&mut self, mut values: impl Iterator<Item = f64>) {
        let mut data = Vec::with_capacity(self.rows * (self.cols + 1));
        for r in 0..self.rows {
            data.extend_from_slice(self.row(r));
            data.push(values.next().unwrap_or(0.0));
        }
        self.data = data;
        self.cols += 1;
    }

    pub(crate) fn remove_row(&mut self, row: usize) {
        self.data.drain(row * self.cols..(row + 1) * self.cols);
        self.rows -= 1;
    }

    pub(crate) fn remove_col(&mut self, col: usize) {
        let cols = self.cols;
        let mut index = 0;
        self.data.retain(|_| {
            let keep = index % cols != col;
            index += 1;
            keep
        });
        self.cols -= 1;
    }
}

/// Weights and biases joining topology layer `i` to layer `i + 1`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Connection {
    /// `inputs x outputs`
    pub(crate) weights: Matrix,
    /// One per destination neuron.
    pub(crate) biases: Vec<f64>,
}

impl Connection {
    pub(crate) fn try_zeros(inputs: usize, outputs: usize) -> Option<Connection> {
        Some(Connection {
            weights: Matrix::try_zeros(inputs, outputs)?,
            biases: try_zeroed_vec(outputs)?,
        })
    }

    /// Redraws the weights from `[0, sqrt(2 / inputs))` and zeroes the biases.
    pub(crate) fn randomize<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let between = Uniform::from(0.0..(2.0 / self.weights.rows() as f64).sqrt());
        for w in self.weights.as_mut_slice() {
            *w = between.sample(rng);
        }
        self.biases.iter_mut().for_each(|b| *b = 0.0);
    }

    #[cfg(test)]
    pub(crate) fn inputs(&self) -> usize {
        self.weights.rows()
    }

    pub(crate) fn outputs(&self) -> usize {
        self.weights.cols()
    }
}

/// Per-connection working state: the gradient of the last backward pass and the Adam moments.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Accumulators {
    pub(crate) grads: Connection,
    /// First raw moment.
    pub(crate) first: Connection,
    /// Second raw moment.
    pub(crate) second: Connection,
}

impl Accumulators {
    pub(crate) fn try_zeros(inputs: usize, outputs: usize) -> Option<Accumulators> {
        Some(Accumulators {
            grads: Connection::try_zeros(inputs, outputs)?,
            first: Connection::try_zeros(inputs, outputs)?,
            second: Connection::try_zeros(inputs, outputs)?,
        })
    }

    pub(crate) fn for_each_mut(&mut self, mut f: impl FnMut(&mut Connection)) {
        f(&mut self.grads);
        f(&mut self.first);
        f(&mut self.second);
    }
}

fn try_zeroed_vec(len: usize) -> Option<Vec<f64>> {
    let mut values = Vec::new();
    values.try_reserve_exact(len).ok()?;
    values.resize(len, 0.0);
    Some(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Matrix {
        Matrix::from_rows(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap()
    }

    #[test]
    fn rows_and_columns() {
        let m = sample();
        assert_eq!((m.rows(), m.cols()), (2, 3));
        assert_eq!(m.get(1, 0), 4.0);
        assert_eq!(m.row(0), &[1.0, 2.0, 3.0]);
        assert_eq!(m.to_rows(), vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
        assert!(Matrix::from_rows(&[vec![1.0], vec![1.0, 2.0]]).is_none());
    }

    #[test]
    fn push_and_remove_column() {
        let mut m = sample();
        m.push_col([7.0, 8.0].iter().copied());
        assert_eq!(m.to_rows(), vec![vec![1.0, 2.0, 3.0, 7.0], vec![4.0, 5.0, 6.0, 8.0]]);
        m.remove_col(1);
        assert_eq!(m.to_rows(), vec![vec![1.0, 3.0, 7.0], vec![4.0, 6.0, 8.0]]);
        assert_eq!(m.cols(), 3);
    }

    #[test]
    fn push_and_remove_row() {
        let mut m = sample();
        m.push_row(std::iter::repeat(9.0));
        assert_eq!(m.rows(), 3);
        assert_eq!(m.row(2), &[9.0, 9.0, 9.0]);
        m.remove_row(0);
        assert_eq!(m.to_rows(), vec![vec![4.0, 5.0, 6.0], vec![9.0, 9.0, 9.0]]);
    }

    #[test]
    fn random_weights_stay_in_range() {
        let mut rng = rand::thread_rng();
        let mut c = Connection::try_zeros(8, 5).unwrap();
        c.biases[2] = 1.5;
        c.randomize(&mut rng);
        let bound = (2.0f64 / 8.0).sqrt();
        assert!(c.weights.as_slice().iter().all(|&w| (0.0..bound).contains(&w)));
        assert!(c.biases.iter().all(|&b| b == 0.0));
    }

    #[test]
    fn oversized_matrices_are_refused() {
        assert!(Matrix::try_zeros(usize::MAX, 2).is_none());
        assert!(Matrix::try_zeros(1 << 31, 1 << 31).is_none());
        assert!(Connection::try_zeros(1, usize::MAX).is_none());
        assert_eq!(Matrix::try_zeros(2, 3), Some(Matrix::zeros(2, 3)));
    }
}
