//! Reference element shapes and their linear Lagrange bases.
//!
//! Chart (xi) coordinates are unit coordinates: `[0, 1]^d` for line, square and cube shapes, and
//! the unit simplex for triangles and tetrahedra. Nodes of tensor-product shapes are numbered
//! with the first xi direction varying fastest.
use nalgebra::DMatrixViewMut;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementShape {
    Line2,
    Triangle3,
    Quad4,
    Tetrahedron4,
    Hex8,
}

impl ElementShape {
    pub fn dimension(&self) -> usize {
        match self {
            ElementShape::Line2 => 1,
            ElementShape::Triangle3 | ElementShape::Quad4 => 2,
            ElementShape::Tetrahedron4 | ElementShape::Hex8 => 3,
        }
    }

    pub fn node_count(&self) -> usize {
        match self {
            ElementShape::Line2 => 2,
            ElementShape::Triangle3 => 3,
            ElementShape::Quad4 | ElementShape::Tetrahedron4 => 4,
            ElementShape::Hex8 => 8,
        }
    }

    pub fn is_simplex(&self) -> bool {
        matches!(self, ElementShape::Triangle3 | ElementShape::Tetrahedron4)
    }

    /// Evaluates each basis function at the given chart coordinates.
    ///
    /// Panics if `basis_values` does not have exactly one entry per node, or if fewer than
    /// `dimension()` chart coordinates are given.
    pub fn populate_basis(&self, basis_values: &mut [f64], xi: &[f64]) {
        assert_eq!(basis_values.len(), self.node_count(), "One basis value per node required");
        let xi = &xi[..self.dimension()];
        if self.is_simplex() {
            basis_values[0] = 1.0 - xi.iter().sum::<f64>();
            basis_values[1..].copy_from_slice(xi);
        } else {
            for (node, value) in basis_values.iter_mut().enumerate() {
                *value = xi
                    .iter()
                    .enumerate()
                    .map(|(k, &xi_k)| phi_linear(corner_bit(node, k), xi_k))
                    .product();
            }
        }
    }

    /// Populates a `dimension x node_count` matrix whose columns are the gradients of each basis
    /// function with respect to the chart coordinates.
    pub fn populate_basis_gradients(&self, mut gradients: DMatrixViewMut<f64>, xi: &[f64]) {
        let dim = self.dimension();
        assert_eq!(gradients.nrows(), dim);
        assert_eq!(gradients.ncols(), self.node_count());
        let xi = &xi[..dim];
        if self.is_simplex() {
            gradients.fill(0.0);
            for j in 0..dim {
                gradients[(j, 0)] = -1.0;
                gradients[(j, j + 1)] = 1.0;
            }
        } else {
            for node in 0..self.node_count() {
                for j in 0..dim {
                    gradients[(j, node)] = xi
                        .iter()
                        .enumerate()
                        .map(|(k, &xi_k)| {
                            let bit = corner_bit(node, k);
                            if k == j {
                                phi_linear_derivative(bit)
                            } else {
                                phi_linear(bit, xi_k)
                            }
                        })
                        .product();
                }
            }
        }
    }

    /// Whether the chart coordinates lie within the element, up to the given tolerance.
    pub fn contains_xi(&self, xi: &[f64], tolerance: f64) -> bool {
        let xi = &xi[..self.dimension()];
        if xi.iter().any(|&x| x < -tolerance) {
            return false;
        }
        if self.is_simplex() {
            xi.iter().sum::<f64>() <= 1.0 + tolerance
        } else {
            xi.iter().all(|&x| x <= 1.0 + tolerance)
        }
    }

    /// Moves chart coordinates onto the closest point of the element, approximately for simplices.
    pub fn clamp_xi(&self, xi: &mut [f64]) {
        let xi = &mut xi[..self.dimension()];
        for x in xi.iter_mut() {
            *x = x.max(0.0);
        }
        if self.is_simplex() {
            let sum: f64 = xi.iter().sum();
            if sum > 1.0 {
                for x in xi.iter_mut() {
                    *x /= sum;
                }
            }
        } else {
            for x in xi.iter_mut() {
                *x = x.min(1.0);
            }
        }
    }

    /// Chart coordinates of the element centre.
    pub fn centre_xi(&self) -> Vec<f64> {
        let dim = self.dimension();
        let centre = if self.is_simplex() { 1.0 / (dim + 1) as f64 } else { 0.5 };
        vec![centre; dim]
    }

    /// Chart coordinates of local node `node`, padded with zeros to three entries.
    pub fn node_xi(&self, node: usize) -> [f64; 3] {
        assert!(node < self.node_count(), "Node index out of bounds");
        let mut xi = [0.0; 3];
        if self.is_simplex() {
            if node > 0 {
                xi[node - 1] = 1.0;
            }
        } else {
            for (k, x) in xi.iter_mut().enumerate().take(self.dimension()) {
                *x = if corner_bit(node, k) { 1.0 } else { 0.0 };
            }
        }
        xi
    }
}

impl fmt::Display for ElementShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementShape::Line2 => "line",
            ElementShape::Triangle3 => "triangle",
            ElementShape::Quad4 => "square",
            ElementShape::Tetrahedron4 => "tetrahedron",
            ElementShape::Hex8 => "cube",
        };
        write!(f, "{}", name)
    }
}

fn corner_bit(node: usize, direction: usize) -> bool {
    (node >> direction) & 1 == 1
}

/// Linear 1D shape function that is one at `xi = bit` and zero at the other end.
fn phi_linear(bit: bool, xi: f64) -> f64 {
    if bit {
        xi
    } else {
        1.0 - xi
    }
}

fn phi_linear_derivative(bit: bool) -> f64 {
    if bit {
        1.0
    } else {
        -1.0
    }
}
