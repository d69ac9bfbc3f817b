use crate::{bounding_box::BoundingBox, floating_type_mod::FT, VF};

#[derive(Clone, Debug)]
pub struct SdfBall<const D: usize> {
    center: VF<D>,
    radius: FT,
}

impl<const D: usize> SdfBall<D> {
    pub fn new(center: VF<D>, radius: FT) -> Self {
        SdfBall { center, radius }
    }

    pub fn signed_distance(&self, x: VF<D>) -> FT {
        (x - self.center).norm() - self.radius
    }

    pub fn bounds(&self) -> BoundingBox<D> {
        BoundingBox::new(
            self.center.map(|c| c - self.radius),
            self.center.map(|c| c + self.radius),
        )
    }
}

/// Solid axis aligned box.
#[derive(Clone, Debug)]
pub struct SdfBox<const D: usize> {
    bounds: BoundingBox<D>,
}

impl<const D: usize> SdfBox<D> {
    pub fn new(lower: VF<D>, upper: VF<D>) -> Self {
        SdfBox {
            bounds: BoundingBox::new(lower, upper),
        }
    }

    pub fn signed_distance(&self, x: VF<D>) -> FT {
        let center = (self.bounds.lower + self.bounds.upper) * 0.5;
        let half_size = self.bounds.size() * 0.5;
        let q: VF<D> = (x - center).map(|v| v.abs()) - half_size;

        let outside = q.map(|v| FT::max(v, 0.)).norm();
        let inside = FT::min(q.max(), 0.);
        outside + inside
    }

    pub fn bounds(&self) -> BoundingBox<D> {
        self.bounds
    }
}

#[test]
fn ball_and_box_signed_distance() {
    use crate::{vec2f, vec3f};

    let ball = SdfBall::new(vec3f(1., 0., 0.), 0.5);
    crate::assert_ft_approx_eq(ball.signed_distance(vec3f(1., 0., 0.)), -0.5, 1e-6, || "ball center".into());
    crate::assert_ft_approx_eq(ball.signed_distance(vec3f(1., 2., 0.)), 1.5, 1e-6, || "ball outside".into());

    let b = SdfBox::new(vec2f(-1., -1.), vec2f(1., 1.));
    crate::assert_ft_approx_eq(b.signed_distance(vec2f(0., 0.)), -1., 1e-6, || "box center".into());
    crate::assert_ft_approx_eq(b.signed_distance(vec2f(0.5, 0.)), -0.5, 1e-6, || "box inside".into());
    crate::assert_ft_approx_eq(b.signed_distance(vec2f(2., 0.)), 1., 1e-6, || "box side".into());
    crate::assert_ft_approx_eq(b.signed_distance(vec2f(4., 5.)), 5., 1e-6, || "box corner".into());
}
