use nalgebra::{Matrix3, Matrix4, Vector3};

/// A rigid map `v -> R * v + t` with `R` orthogonal (possibly `det = -1`)
/// and `t` a Cartesian translation.
///
/// The rotation and translation are stored separately; applying the
/// transform performs the translation first, then the rotation, which is
/// the composition order the candidate-transform search needs.
#[derive(Debug, Clone, PartialEq)]
pub struct RigidTransform {
    rotation: Matrix3<f64>,
    translation: Vector3<f64>,
}

impl RigidTransform {
    pub fn identity() -> Self {
        Self {
            rotation: Matrix3::identity(),
            translation: Vector3::zeros(),
        }
    }

    pub fn rotation(&self) -> &Matrix3<f64> {
        &self.rotation
    }

    pub fn translation(&self) -> &Vector3<f64> {
        &self.translation
    }

    /// Apply to a Cartesian vector: `rotation * v + translation`.
    pub fn apply(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * v + self.translation
    }

    /// Right-multiply by a pure rotation: the rotation acts before this
    /// transform's translation.
    pub fn rotate(&mut self, mat: &Matrix3<f64>) -> &mut Self {
        self.multiply_by(mat, &Vector3::zeros())
    }

    /// Left-multiply by a pure rotation.
    pub fn prerotate(&mut self, mat: &Matrix3<f64>) -> &mut Self {
        self.premultiply_by(mat, &Vector3::zeros())
    }

    /// Right-multiply by a pure translation.
    pub fn translate(&mut self, vec: &Vector3<f64>) -> &mut Self {
        self.multiply_by(&Matrix3::identity(), vec)
    }

    /// Left-multiply by a pure translation.
    pub fn pretranslate(&mut self, vec: &Vector3<f64>) -> &mut Self {
        self.premultiply_by(&Matrix3::identity(), vec)
    }

    /// `self = self * (other_rot, other_trans)`: the other transform acts
    /// first, its translation carried through this rotation.
    pub fn multiply_by(&mut self, other_rot: &Matrix3<f64>, other_trans: &Vector3<f64>) -> &mut Self {
        self.translation += self.rotation * other_trans;
        self.rotation *= other_rot;
        self
    }

    /// `self = (other_rot, other_trans) * self`.
    pub fn premultiply_by(
        &mut self,
        other_rot: &Matrix3<f64>,
        other_trans: &Vector3<f64>,
    ) -> &mut Self {
        self.rotation = other_rot * self.rotation;
        self.translation = other_rot * self.translation + other_trans;
        self
    }

    /// The 4x4 homogeneous matrix of this transform.
    pub fn to_homogeneous(&self) -> Matrix4<f64> {
        let mut out = Matrix4::identity();
        out.fixed_view_mut::<3, 3>(0, 0).copy_from(&self.rotation);
        out.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        out
    }
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::{matrix, vector};

    use super::RigidTransform;

    #[test]
    fn test_apply_translate_then_rotate() {
        // Rotation by 90 degrees around z
        let rot = matrix![
            0.0, -1.0, 0.0;
            1.0, 0.0, 0.0;
            0.0, 0.0, 1.0;
        ];
        let mut transform = RigidTransform::identity();
        transform.rotate(&rot);
        transform.translate(&vector![1.0, 0.0, 0.0]);

        // translate is applied before the rotation
        let out = transform.apply(&vector![0.0, 0.0, 0.0]);
        assert_relative_eq!(out, vector![0.0, 1.0, 0.0], epsilon = 1e-12);
    }

    #[test]
    fn test_pre_multiplication() {
        let rot = matrix![
            0.0, -1.0, 0.0;
            1.0, 0.0, 0.0;
            0.0, 0.0, 1.0;
        ];
        let mut transform = RigidTransform::identity();
        transform.translate(&vector![1.0, 0.0, 0.0]);
        transform.prerotate(&rot);

        let out = transform.apply(&vector![0.0, 0.0, 0.0]);
        assert_relative_eq!(out, vector![0.0, 1.0, 0.0], epsilon = 1e-12);
    }

    #[test]
    fn test_homogeneous() {
        let mut transform = RigidTransform::identity();
        transform.translate(&vector![1.0, 2.0, 3.0]);
        let h = transform.to_homogeneous();
        assert_relative_eq!(h[(0, 3)], 1.0);
        assert_relative_eq!(h[(1, 3)], 2.0);
        assert_relative_eq!(h[(2, 3)], 3.0);
        assert_relative_eq!(h[(3, 3)], 1.0);
    }
}
