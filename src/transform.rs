//! The edge payload: a rigid-body relation between two frames, stored as a
//! row-major homogeneous 4x4 matrix. The graph treats the value as opaque;
//! composing, inverting or interpolating transforms is up to the consumer.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub mat: [[f64; 4]; 4],
}

impl Transform {
    pub fn new(mat: [[f64; 4]; 4]) -> Self {
        Transform { mat }
    }

    /// The identity transform.
    pub fn identity() -> Self {
        let mut mat = [[0.0; 4]; 4];
        for (i, row) in mat.iter_mut().enumerate() {
            row[i] = 1.0;
        }
        Transform { mat }
    }

    /// Pure translation by (x, y, z).
    pub fn translation(x: f64, y: f64, z: f64) -> Self {
        let mut tf = Self::identity();
        tf.mat[0][3] = x;
        tf.mat[1][3] = y;
        tf.mat[2][3] = z;
        tf
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_identity() {
        let tf = Transform::default();
        for i in 0..4 {
            for j in 0..4 {
                assert_eq!(tf.mat[i][j], if i == j { 1.0 } else { 0.0 });
            }
        }
    }

    #[test]
    fn serde_round_trip() {
        let tf = Transform::translation(1.0, 2.0, 3.0);
        let json = serde_json::to_string(&tf).unwrap();
        let back: Transform = serde_json::from_str(&json).unwrap();
        assert_eq!(tf, back);
    }
}
