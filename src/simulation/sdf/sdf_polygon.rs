use crate::{bounding_box::BoundingBox, floating_type_mod::FT, vec2f, VF};

/**
 * A closed 2D polygon given by its corners in counter-clockwise order. The edges are
 * (0, 1), (1, 2), ..., (n-1, 0). The left hand side of every edge (when going from edge start
 * to edge end) is the inside of the shape.
 */
#[derive(Clone, Debug)]
pub struct SdfPolygon {
    point: Vec<VF<2>>,

    /// The direction between the adjacent edges (i-1, i) and (i, i+1) that points inwards.
    point_pseudo_normal: Vec<VF<2>>,

    normalized_line_dir: Vec<VF<2>>,
}

enum ClosestObject {
    Point { point_idx: usize, point_dir: VF<2> },

    // start index of the line
    Line { dist_left: FT },
}

fn rotate_left_90_degrees(v: VF<2>) -> VF<2> {
    vec2f(-v.y, v.x)
}

impl SdfPolygon {
    pub fn from_points(points: &[VF<2>]) -> SdfPolygon {
        assert!(points.len() >= 3, "a polygon needs at least three corners");

        let mut normalized_line_dir: Vec<VF<2>> = Vec::with_capacity(points.len());
        let mut point_pseudo_normal: Vec<VF<2>> = Vec::with_capacity(points.len());

        for i in 0..points.len() {
            let mut line_dir = points[(i + 1) % points.len()] - points[i];
            assert!(line_dir.norm_squared() > 0.00001);
            line_dir.normalize_mut();
            normalized_line_dir.push(line_dir);
        }

        for i in 0..points.len() {
            let prev_line_dir = normalized_line_dir[if i == 0 { points.len() - 1 } else { i - 1 }];
            let next_line_dir = normalized_line_dir[i];

            let pseudo_normal = rotate_left_90_degrees(prev_line_dir) + rotate_left_90_degrees(next_line_dir);

            // "pseudo_normal = 0" means the adjacent edges run back over each other (zero width).
            assert!(pseudo_normal.norm_squared() > 0.00001);

            point_pseudo_normal.push(pseudo_normal);
        }

        SdfPolygon {
            point: points.to_vec(),
            normalized_line_dir,
            point_pseudo_normal,
        }
    }

    pub fn new_box(min: VF<2>, max: VF<2>) -> SdfPolygon {
        SdfPolygon::from_points(&[
            vec2f(min.x, min.y),
            vec2f(max.x, min.y),
            vec2f(max.x, max.y),
            vec2f(min.x, max.y),
        ])
    }

    pub fn points(&self) -> &[VF<2>] {
        &self.point
    }

    pub fn bounds(&self) -> BoundingBox<2> {
        BoundingBox::from_points(&self.point).unwrap_or_else(|| BoundingBox::new(VF::<2>::zeros(), VF::<2>::zeros()))
    }

    fn find_min_dist_object(&self, x: VF<2>) -> (ClosestObject, FT) {
        let mut min_dist_object = ClosestObject::Point {
            point_idx: 0,
            point_dir: VF::<2>::zeros(),
        };
        let mut min_dist_sq = FT::INFINITY;

        for line_start_idx in 0..self.point.len() {
            let line_start = self.point[line_start_idx];
            let line_end = self.point[(line_start_idx + 1) % self.point.len()];
            let line_len_sq = (line_end - line_start).norm_squared();
            let line_dir = self.normalized_line_dir[line_start_idx];
            let point_dir = x - line_start;
            let left_normalized_dir: VF<2> = rotate_left_90_degrees(line_dir);

            let projection_len = point_dir.dot(&line_dir);
            if projection_len > 0. && projection_len * projection_len < line_len_sq {
                let point_line_dist = point_dir.dot(&left_normalized_dir);
                let point_line_dist_sq = point_line_dist * point_line_dist;
                if point_line_dist_sq < min_dist_sq {
                    min_dist_object = ClosestObject::Line {
                        dist_left: point_line_dist,
                    };
                    min_dist_sq = point_line_dist_sq;
                }
            }

            // corner analysis
            let corner_dist_sq = point_dir.norm_squared();
            if corner_dist_sq < min_dist_sq {
                min_dist_object = ClosestObject::Point {
                    point_idx: line_start_idx,
                    point_dir,
                };
                min_dist_sq = corner_dist_sq;
            }
        }

        (min_dist_object, min_dist_sq)
    }

    /** Distance to the nearest edge. Negative inside the polygon, positive outside. */
    pub fn signed_distance(&self, x: VF<2>) -> FT {
        let (min_dist_object, min_dist_sq) = self.find_min_dist_object(x);
        match min_dist_object {
            ClosestObject::Point { point_idx, point_dir } => {
                let inside = self.point_pseudo_normal[point_idx].dot(&point_dir) >= 0.;
                let dist = min_dist_sq.sqrt();
                if inside {
                    -dist
                } else {
                    dist
                }
            }
            ClosestObject::Line { dist_left } => -dist_left,
        }
    }
}

#[test]
fn polygon_signed_distance() {
    let square = SdfPolygon::new_box(vec2f(0., 0.), vec2f(2., 2.));

    crate::assert_ft_approx_eq(square.signed_distance(vec2f(1., 1.)), -1., 1e-5, || "center".into());
    crate::assert_ft_approx_eq(square.signed_distance(vec2f(1., 0.25)), -0.25, 1e-5, || "near bottom".into());
    crate::assert_ft_approx_eq(square.signed_distance(vec2f(3., 1.)), 1., 1e-5, || "right".into());
    crate::assert_ft_approx_eq(square.signed_distance(vec2f(3., 3.)), FT::sqrt(2.), 1e-5, || "corner".into());
    assert!(square.signed_distance(vec2f(1.9, 1.95)) < 0.);
    assert_eq!(square.bounds().upper, vec2f(2., 2.));
}
