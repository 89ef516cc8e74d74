/// A 2x3 affine transformation matrix.
///
/// Stored as `[a, b, c, d, tx, ty]`: a 2x2 linear part plus a translation,
/// mapping `(x, y)` to `(a*x + c*y + tx, b*x + d*y + ty)`. Used for 2D
/// transformations (translate, rotate, scale) that compose parent→child
/// down the scene tree.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Matrix2d {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub tx: f32,
    pub ty: f32,
}

impl Matrix2d {
    /// Identity matrix (no transformation)
    pub const IDENTITY: Self = Self {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        tx: 0.0,
        ty: 0.0,
    };

    /// Create an identity matrix
    pub fn identity() -> Self {
        Self::IDENTITY
    }

    /// Create a translation matrix
    pub fn translate(x: f32, y: f32) -> Self {
        Self {
            tx: x,
            ty: y,
            ..Self::IDENTITY
        }
    }

    /// Create a rotation matrix (counter-clockwise, radians)
    pub fn rotate(angle_radians: f32) -> Self {
        let cos = angle_radians.cos();
        let sin = angle_radians.sin();
        Self {
            a: cos,
            b: sin,
            c: -sin,
            d: cos,
            tx: 0.0,
            ty: 0.0,
        }
    }

    /// Create a non-uniform scale matrix
    pub fn scale(sx: f32, sy: f32) -> Self {
        Self {
            a: sx,
            d: sy,
            ..Self::IDENTITY
        }
    }

    /// Build a local matrix from position, rotation, scale, and pivot.
    ///
    /// Composition order is scale → rotate → translate, with the pivot acting
    /// as a pre-translation so rotation and scale occur about the pivot rather
    /// than the local origin: `T(x, y) ∘ R(rotation) ∘ S(sx, sy) ∘ T(-pivot)`.
    #[allow(clippy::too_many_arguments)]
    pub fn from_components(
        x: f32,
        y: f32,
        rotation: f32,
        scale_x: f32,
        scale_y: f32,
        pivot_x: f32,
        pivot_y: f32,
    ) -> Self {
        let cos = rotation.cos();
        let sin = rotation.sin();

        let a = cos * scale_x;
        let b = sin * scale_x;
        let c = -sin * scale_y;
        let d = cos * scale_y;

        Self {
            a,
            b,
            c,
            d,
            tx: x - (pivot_x * a + pivot_y * c),
            ty: y - (pivot_x * b + pivot_y * d),
        }
    }

    /// Compose this matrix with another: `self ∘ other`.
    /// Applies `other` first, then `self`.
    pub fn then(&self, other: &Matrix2d) -> Matrix2d {
        Matrix2d {
            a: self.a * other.a + self.c * other.b,
            b: self.b * other.a + self.d * other.b,
            c: self.a * other.c + self.c * other.d,
            d: self.b * other.c + self.d * other.d,
            tx: self.a * other.tx + self.c * other.ty + self.tx,
            ty: self.b * other.tx + self.d * other.ty + self.ty,
        }
    }

    /// Transform a 2D point by this matrix
    pub fn transform_point(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a * x + self.c * y + self.tx,
            self.b * x + self.d * y + self.ty,
        )
    }

    /// The six elements in `[a, b, c, d, tx, ty]` order
    pub fn elements(&self) -> [f32; 6] {
        [self.a, self.b, self.c, self.d, self.tx, self.ty]
    }

    /// Check if this is the identity matrix
    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

impl Default for Matrix2d {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    fn matrix_approx_eq(m: &Matrix2d, expected: [f32; 6]) -> bool {
        m.elements()
            .iter()
            .zip(expected.iter())
            .all(|(a, b)| approx_eq(*a, *b))
    }

    #[test]
    fn test_identity() {
        let m = Matrix2d::identity();
        assert!(matrix_approx_eq(&m, [1.0, 0.0, 0.0, 1.0, 0.0, 0.0]));
        assert!(m.is_identity());
    }

    #[test]
    fn test_translate() {
        let m = Matrix2d::translate(10.0, 20.0);
        assert!(matrix_approx_eq(&m, [1.0, 0.0, 0.0, 1.0, 10.0, 20.0]));

        let (x, y) = m.transform_point(5.0, 5.0);
        assert!(approx_eq(x, 15.0));
        assert!(approx_eq(y, 25.0));
    }

    #[test]
    fn test_rotate() {
        let m = Matrix2d::rotate(std::f32::consts::FRAC_PI_2);
        assert!(matrix_approx_eq(&m, [0.0, 1.0, -1.0, 0.0, 0.0, 0.0]));

        let (x, y) = m.transform_point(1.0, 0.0);
        assert!(approx_eq(x, 0.0));
        assert!(approx_eq(y, 1.0));
    }

    #[test]
    fn test_scale() {
        let m = Matrix2d::scale(2.0, 3.0);
        assert!(matrix_approx_eq(&m, [2.0, 0.0, 0.0, 3.0, 0.0, 0.0]));

        let (x, y) = m.transform_point(1.0, 1.0);
        assert!(approx_eq(x, 2.0));
        assert!(approx_eq(y, 3.0));
    }

    #[test]
    fn test_compose() {
        // Translate then scale: point (0,0) -> translate -> (10,0) -> scale -> (20,0)
        let translate = Matrix2d::translate(10.0, 0.0);
        let scale = Matrix2d::scale(2.0, 2.0);
        let composed = scale.then(&translate);
        let (x, y) = composed.transform_point(0.0, 0.0);
        assert!(approx_eq(x, 20.0));
        assert!(approx_eq(y, 0.0));
    }

    #[test]
    fn test_from_components_translation_only() {
        let m = Matrix2d::from_components(10.0, 20.0, 0.0, 1.0, 1.0, 0.0, 0.0);
        assert!(matrix_approx_eq(&m, [1.0, 0.0, 0.0, 1.0, 10.0, 20.0]));
    }

    #[test]
    fn test_from_components_pivot() {
        // The pivot is the point that lands on the node position; rotation
        // happens around it
        let m = Matrix2d::from_components(100.0, 0.0, std::f32::consts::PI, 1.0, 1.0, 5.0, 0.0);
        let (px, py) = m.transform_point(5.0, 0.0);
        assert!(approx_eq(px, 100.0));
        assert!(approx_eq(py, 0.0));
        // The local origin sits 5 left of the pivot; after a half turn it is
        // 5 right of the position
        let (x, y) = m.transform_point(0.0, 0.0);
        assert!(approx_eq(x, 105.0));
        assert!(approx_eq(y, 0.0));
    }

    #[test]
    fn test_from_components_scale_about_pivot() {
        let m = Matrix2d::from_components(50.0, 50.0, 0.0, 2.0, 2.0, 10.0, 10.0);
        // The pivot lands on the position regardless of scale
        let (px, py) = m.transform_point(10.0, 10.0);
        assert!(approx_eq(px, 50.0));
        assert!(approx_eq(py, 50.0));
        // Offsets from the pivot scale by the factor
        let (x, y) = m.transform_point(11.0, 10.0);
        assert!(approx_eq(x, 52.0));
        assert!(approx_eq(y, 50.0));
    }
}
