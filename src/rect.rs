use crate::matrix::Matrix2d;

/// An axis-aligned rectangle in either local or world coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The four corners in (top-left, top-right, bottom-left, bottom-right) order.
    pub fn corners(&self) -> [(f32, f32); 4] {
        [
            (self.x, self.y),
            (self.x + self.width, self.y),
            (self.x, self.y + self.height),
            (self.x + self.width, self.y + self.height),
        ]
    }

    /// Axis-aligned bounding box of a set of points.
    pub fn from_points(points: &[(f32, f32)]) -> Self {
        let (min_x, max_x, min_y, max_y) = points.iter().fold(
            (
                f32::INFINITY,
                f32::NEG_INFINITY,
                f32::INFINITY,
                f32::NEG_INFINITY,
            ),
            |(min_x, max_x, min_y, max_y), &(x, y)| {
                (min_x.min(x), max_x.max(x), min_y.min(y), max_y.max(y))
            },
        );
        Rect::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }

    /// AABB of this rectangle pushed through an affine matrix.
    ///
    /// When the matrix includes rotation this is a conservative bound of the
    /// rotated rectangle, suitable for culling tests.
    pub fn transformed_aabb(&self, matrix: &Matrix2d) -> Rect {
        let corners = self.corners();
        let transformed: Vec<(f32, f32)> = corners
            .iter()
            .map(|&(x, y)| matrix.transform_point(x, y))
            .collect();
        Rect::from_points(&transformed)
    }

    /// Whether two rectangles overlap (touching edges count as overlapping).
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x <= other.x + other.width
            && other.x <= self.x + self.width
            && self.y <= other.y + other.height
            && other.y <= self.y + self.height
    }
}
