use crate::{bounding_box::BoundingBox, floating_type_mod::FT, vec2f, VF};

use super::{SdfBall, SdfBox, SdfPolygon};

/// Analytic shapes that can be probed for the signed distance to their surface
/// (negative inside).
#[derive(Clone, Debug)]
pub enum Sdf<const D: usize> {
    Polygon(SdfPolygon),
    Ball(SdfBall<D>),
    Box(SdfBox<D>),
}

impl From<SdfPolygon> for Sdf<2> {
    fn from(v: SdfPolygon) -> Sdf<2> {
        Sdf::<2>::Polygon(v)
    }
}

impl<const D: usize> From<SdfBall<D>> for Sdf<D> {
    fn from(v: SdfBall<D>) -> Sdf<D> {
        Sdf::Ball(v)
    }
}

impl<const D: usize> From<SdfBox<D>> for Sdf<D> {
    fn from(v: SdfBox<D>) -> Sdf<D> {
        Sdf::Box(v)
    }
}

impl<const D: usize> Sdf<D> {
    pub fn signed_distance(&self, x: VF<D>) -> FT {
        match self {
            Sdf::Polygon(sdf) => {
                assert!(D == 2, "polygon shapes are two dimensional");
                sdf.signed_distance(vec2f(x[0], x[1]))
            }
            Sdf::Ball(sdf) => sdf.signed_distance(x),
            Sdf::Box(sdf) => sdf.signed_distance(x),
        }
    }

    pub fn bounds(&self) -> BoundingBox<D> {
        match self {
            Sdf::Polygon(sdf) => {
                assert!(D == 2, "polygon shapes are two dimensional");
                let bb = sdf.bounds();
                BoundingBox::new(
                    VF::<D>::from_iterator(bb.lower.iter().cloned()),
                    VF::<D>::from_iterator(bb.upper.iter().cloned()),
                )
            }
            Sdf::Ball(sdf) => sdf.bounds(),
            Sdf::Box(sdf) => sdf.bounds(),
        }
    }
}

#[test]
fn sdf_dispatches_to_shapes() {
    let ball: Sdf<2> = super::SdfBall::new(vec2f(0., 0.), 1.).into();
    crate::assert_ft_approx_eq(ball.signed_distance(vec2f(2., 0.)), 1., 1e-6, || "ball".into());
    assert_eq!(ball.bounds().upper, vec2f(1., 1.));

    let polygon: Sdf<2> = SdfPolygon::new_box(vec2f(0., 0.), vec2f(1., 1.)).into();
    assert!(polygon.signed_distance(vec2f(0.5, 0.5)) < 0.);
    assert_eq!(polygon.bounds().lower, vec2f(0., 0.));
}
