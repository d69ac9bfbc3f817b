use log::info;

use crate::{
    adaptivity::SphAdaptation,
    bounding_box::BoundingBox,
    cell_linked_list::BaseCellLinkedList,
    error::SphError,
    floating_type_mod::FT,
    particles::BaseParticles,
    sph_kernels::DimensionUtils,
};

/// A named particle collection together with its resolution model and spatial index.
pub struct RealBody<DU: DimensionUtils<D>, const D: usize> {
    name: String,
    particles: BaseParticles<D>,
    adaptation: SphAdaptation<DU, D>,
    domain_bounds: BoundingBox<D>,
    cell_linked_list: BaseCellLinkedList<DU, D>,
}

impl<DU: DimensionUtils<D>, const D: usize> RealBody<DU, D> {
    /// Registers the smoothing length ratio and builds the spatial index over `domain_bounds`.
    pub fn new(
        name: &str,
        mut particles: BaseParticles<D>,
        mut adaptation: SphAdaptation<DU, D>,
        domain_bounds: BoundingBox<D>,
    ) -> Self {
        adaptation.register_smoothing_length_ratio(&mut particles);
        let cell_linked_list = adaptation.create_cell_linked_list(&domain_bounds, &particles);
        info!(
            "body `{}`: {} particles (bound {}), {} cell list levels",
            name,
            particles.total_real_particles(),
            particles.real_particles_bound(),
            adaptation.cell_linked_list_total_levels()
        );
        RealBody {
            name: name.to_string(),
            particles,
            adaptation,
            domain_bounds,
            cell_linked_list,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn particles(&self) -> &BaseParticles<D> {
        &self.particles
    }

    /// Changing the particle count may require a resize of every relation of this body.
    pub fn particles_mut(&mut self) -> &mut BaseParticles<D> {
        &mut self.particles
    }

    pub fn adaptation(&self) -> &SphAdaptation<DU, D> {
        &self.adaptation
    }

    pub fn domain_bounds(&self) -> &BoundingBox<D> {
        &self.domain_bounds
    }

    pub fn cell_linked_list(&self) -> &BaseCellLinkedList<DU, D> {
        &self.cell_linked_list
    }

    pub fn smoothing_length_ratio(&self, i: usize) -> FT {
        self.adaptation.smoothing_length_ratio(&self.particles, i)
    }

    /// Rebuilds the spatial index from the current positions.
    pub fn update_cell_linked_list(&mut self) {
        self.adaptation
            .update_cell_linked_list(&mut self.cell_linked_list, &self.particles);
    }

    pub fn update_smoothing_length_ratio_by_shape(&mut self) -> Result<(), SphError> {
        self.adaptation
            .update_smoothing_length_ratio_by_shape(&mut self.particles)
    }

    /// Splits particle `i`, only possible for the split and merge policy.
    pub fn split_particle(&mut self, i: usize, delta: FT) -> Option<usize> {
        let h_ratio = self.adaptation.smoothing_length_ratio_variable()?;
        self.adaptation
            .split_and_merge_policy()?
            .split_particle(&mut self.particles, h_ratio, i, delta)
    }

    /// Merges particle `j` into particle `i`, only possible for the split and merge policy.
    pub fn merge_particles(&mut self, i: usize, j: usize) -> Option<usize> {
        let h_ratio = self.adaptation.smoothing_length_ratio_variable()?;
        self.adaptation
            .split_and_merge_policy()?
            .merge_particles(&mut self.particles, h_ratio, i, j)
    }
}
