use nalgebra::{Matrix3, Vector3};

pub struct MatrixHelper;

impl MatrixHelper {
    pub fn nan_vector() -> Vector3<f64> {
        Vector3::from_element(f64::NAN)
    }

    pub fn nan_matrix() -> Matrix3<f64> {
        Matrix3::from_element(f64::NAN)
    }

    /// Maps a vector and its covariance through `r`: `(r v, r S r^T)`.
    pub fn rotate(
        r: &Matrix3<f64>,
        vector: &Vector3<f64>,
        covariance: &Matrix3<f64>,
    ) -> (Vector3<f64>, Matrix3<f64>) {
        (r * vector, r * covariance * r.transpose())
    }

    /// Matrix whose columns are the given basis vectors.
    pub fn from_basis(basis: &[Vector3<f64>; 3]) -> Matrix3<f64> {
        Matrix3::from_columns(basis)
    }
}
