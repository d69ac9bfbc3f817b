use serde::{Deserialize, Serialize};

use crate::{floating_type_mod::FT, VF};

/// Axis aligned box given by its lower and upper corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox<const D: usize> {
    pub lower: VF<D>,
    pub upper: VF<D>,
}

impl<const D: usize> BoundingBox<D> {
    pub fn new(lower: VF<D>, upper: VF<D>) -> Self {
        BoundingBox { lower, upper }
    }

    pub fn from_points(points: &[VF<D>]) -> Option<Self> {
        let first = *points.first()?;
        let mut lower = first;
        let mut upper = first;
        for p in points {
            for d in 0..D {
                lower[d] = FT::min(lower[d], p[d]);
                upper[d] = FT::max(upper[d], p[d]);
            }
        }
        Some(BoundingBox { lower, upper })
    }

    pub fn size(&self) -> VF<D> {
        self.upper - self.lower
    }

    pub fn min_dimension(&self) -> FT {
        self.size().min()
    }

    pub fn contains(&self, p: VF<D>) -> bool {
        (0..D).all(|d| self.lower[d] <= p[d] && p[d] <= self.upper[d])
    }
}

#[test]
fn bounding_box_from_points() {
    use crate::vec2f;

    let bb = BoundingBox::from_points(&[vec2f(1., -1.), vec2f(-2., 3.), vec2f(0., 0.)]).unwrap();
    assert_eq!(bb.lower, vec2f(-2., -1.));
    assert_eq!(bb.upper, vec2f(1., 3.));
    assert_eq!(bb.min_dimension(), 3.);
    assert!(bb.contains(vec2f(0.5, 2.)));
    assert!(!bb.contains(vec2f(1.6, 0.)));
    assert!(BoundingBox::<2>::from_points(&[]).is_none());
}
