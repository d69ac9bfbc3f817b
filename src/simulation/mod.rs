pub mod adaptivity;
pub mod body;
pub mod body_relation;
pub mod bounding_box;
pub mod cell_linked_list;
pub mod concurrency;
pub mod error;
pub mod level_set;
pub mod neighborhood;
pub mod particles;
pub mod sdf;
pub mod simulation_parameters;
pub mod sph_kernels;

pub type IT = i32;

#[cfg(feature = "double-precision")]
pub mod floating_type_mod {
    pub type FT = f64;
    pub use std::f64::consts::{PI, TAU};
}

#[cfg(not(feature = "double-precision"))]
pub mod floating_type_mod {
    pub type FT = f32;
    pub use std::f32::consts::{PI, TAU};
}

use std::fmt::Display;

use floating_type_mod::FT;

use nalgebra::SVector;
use num_traits::Float;

#[allow(dead_code)]
pub type V<T, const D: usize> = SVector<T, D>;

pub type VF<const D: usize> = V<FT, D>;
pub type VI<const D: usize> = V<IT, D>;

pub fn vec2f(x: FT, y: FT) -> V<FT, 2> {
    [x, y].into()
}

pub fn vec3f(x: FT, y: FT, z: FT) -> V<FT, 3> {
    [x, y, z].into()
}

/// Tolerance used by the admissibility predicates of the split/merge policy.
pub const EPS: FT = 1.0e-6;

/// Relative comparison, falls back to absolute comparison close to zero.
pub fn is_ft_approx_eq<T: Float>(a: T, b: T, tolerance: T) -> bool {
    let scale = T::max(T::one(), T::max(a.abs(), b.abs()));
    (a - b).abs() <= tolerance * scale
}

pub fn assert_ft_approx_eq<T: Float + Display>(a: T, b: T, tolerance: T, s: impl FnOnce() -> String) {
    if !is_ft_approx_eq(a, b, tolerance) {
        panic!(
            "{} value not equal with a tolerance of {}:\n\ta={}\n\tb={}\n",
            s(),
            tolerance,
            a,
            b
        );
    }
}

pub use adaptivity::{RefinementPolicy, ResolutionParameters, SphAdaptation};
pub use body::RealBody;
pub use body_relation::{ContactRelation, InnerRelation};
pub use bounding_box::BoundingBox;
pub use cell_linked_list::{BaseCellLinkedList, CellLinkedList, CellLinkedListTrait, MultilevelCellLinkedList};
pub use error::SphError;
pub use level_set::{BaseLevelSet, LevelSet, LevelSetTrait, MultilevelLevelSet};
pub use neighborhood::{NeighborEntry, Neighborhood};
pub use particles::{BaseParticles, VariableId};
pub use sdf::Sdf;
pub use sph_kernels::{DimensionUtils, DimensionUtils2d, DimensionUtils3d, Kernel, KernelType};
