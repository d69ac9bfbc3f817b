pub use self::{
    sdf::Sdf,
    sdf_polygon::SdfPolygon,
    sdf_primitives::{SdfBall, SdfBox},
};

mod sdf;
mod sdf_polygon;
mod sdf_primitives;
