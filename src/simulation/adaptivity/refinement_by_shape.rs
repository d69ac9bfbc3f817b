use serde::{Deserialize, Serialize};

use crate::{floating_type_mod::FT, sdf::Sdf, VF};

use super::ResolutionParameters;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShapeRefinementKind {
    /// Symmetric band of fine particles straddling the surface.
    NearSurface,
    /// Fine particles everywhere inside the shape, blended out beyond the surface.
    WithinShape,
}

/// Adaptive resolution within a body according to the distance to a target surface.
#[derive(Debug, Clone)]
pub struct RefinementByShape<const D: usize> {
    target_shape: Sdf<D>,
    kind: ShapeRefinementKind,
}

impl<const D: usize> RefinementByShape<D> {
    pub fn new(target_shape: Sdf<D>, kind: ShapeRefinementKind) -> Self {
        RefinementByShape { target_shape, kind }
    }

    pub fn kind(&self) -> ShapeRefinementKind {
        self.kind
    }

    pub fn target_shape(&self) -> &Sdf<D> {
        &self.target_shape
    }

    /// The transition thickness is the reference spacing.
    pub fn local_spacing(&self, params: &ResolutionParameters, position: VF<D>) -> FT {
        let phi = self.target_shape.signed_distance(position);
        match self.kind {
            ShapeRefinementKind::NearSurface => params.smoothed_spacing(phi.abs(), params.reference_spacing()),
            ShapeRefinementKind::WithinShape => {
                if phi < 0.0 {
                    params.minimum_spacing()
                } else {
                    params.smoothed_spacing(phi, params.reference_spacing())
                }
            }
        }
    }
}
