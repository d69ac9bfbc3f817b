/*!
Neighbor relations of a body with itself (inner) and with other bodies (contact).

A relation keeps one [`Neighborhood`] per particle slot of the subject body, sized to the particle
bound. An update runs in two phases: the neighbor counts of all live particles are reset, then
every live particle searches its neighbors. Both phases run in parallel over disjoint particles;
the end of the first parallel pass is the barrier between them.
*/

use log::debug;

use crate::{
    body::RealBody,
    cell_linked_list::CellLinkedListTrait,
    concurrency::{par_for_blocked_range, par_iter_mut1},
    error::SphError,
    floating_type_mod::FT,
    neighborhood::{NeighborEntry, Neighborhood},
    sph_kernels::{DimensionUtils, Kernel},
    VF,
};

fn check_bound(live_count: usize, bound: usize) -> Result<(), SphError> {
    if live_count > bound {
        return Err(SphError::BoundExceeded { live_count, bound });
    }
    Ok(())
}

/// The candidate search indexes into the live positions, so the cells have to match them.
fn check_spatial_index<DU: DimensionUtils<D>, const D: usize>(body: &RealBody<DU, D>) -> Result<(), SphError> {
    let indexed_count = body.cell_linked_list().indexed_particles();
    let live_count = body.particles().total_real_particles();
    if indexed_count != live_count {
        return Err(SphError::StaleSpatialIndex {
            body: body.name().to_string(),
            indexed_count,
            live_count,
        });
    }
    Ok(())
}

fn resize_configuration<const D: usize>(configuration: &mut Vec<Neighborhood<D>>, bound: usize) {
    configuration.resize_with(bound, Neighborhood::new);
}

fn reset_current_sizes<const D: usize>(configuration: &mut [Neighborhood<D>]) {
    par_for_blocked_range(configuration, |_range, block| {
        for neighborhood in block {
            neighborhood.reset();
        }
    });
}

/// Smoothing length ratio of every particle slot, `None` under uniform resolution.
fn smoothing_length_ratios<DU: DimensionUtils<D>, const D: usize>(body: &RealBody<DU, D>) -> Option<&[FT]> {
    body.adaptation().smoothing_length_ratios(body.particles())
}

fn ratio_of(h_ratio: Option<&[FT]>, i: usize) -> FT {
    h_ratio.map(|h| h[i]).unwrap_or(1.0)
}

/// Kernel values for a pair at distance `r` using the kernel scaled by `h_ratio`.
fn neighbor_entry<DU: DimensionUtils<D>, const D: usize>(
    kernel: &Kernel,
    h_ratio: FT,
    j: usize,
    displacement: VF<D>,
    r: FT,
) -> NeighborEntry<D> {
    NeighborEntry {
        j,
        w_ij: kernel.w_scaled::<DU, D>(h_ratio, r),
        dw_ij: kernel.dw_scaled::<DU, D>(h_ratio, r),
        r_ij: r,
        e_ij: if r > 0. { displacement / r } else { VF::<D>::zeros() },
    }
}

pub struct InnerRelation<const D: usize> {
    inner_configuration: Vec<Neighborhood<D>>,
    bound_generation: u64,
}

impl<const D: usize> InnerRelation<D> {
    pub fn new<DU: DimensionUtils<D>>(body: &RealBody<DU, D>) -> Self {
        let mut relation = InnerRelation {
            inner_configuration: Vec::new(),
            bound_generation: body.particles().bound_generation(),
        };
        relation.update_configuration_memories(body);
        relation
    }

    /// Resizes the neighborhoods to the particle bound. Existing neighborhoods are kept.
    pub fn update_configuration_memories<DU: DimensionUtils<D>>(&mut self, body: &RealBody<DU, D>) {
        let bound = body.particles().real_particles_bound();
        resize_configuration(&mut self.inner_configuration, bound);
        self.bound_generation = body.particles().bound_generation();
        debug!("inner relation of `{}` sized to {}", body.name(), bound);
    }

    /// The particle bound changed since the last resize.
    pub fn is_outdated<DU: DimensionUtils<D>>(&self, body: &RealBody<DU, D>) -> bool {
        self.bound_generation != body.particles().bound_generation()
            || self.inner_configuration.len() != body.particles().real_particles_bound()
    }

    pub fn reset_neighborhood_current_size<DU: DimensionUtils<D>>(
        &mut self,
        body: &RealBody<DU, D>,
    ) -> Result<(), SphError> {
        let live = body.particles().total_real_particles();
        check_bound(live, self.inner_configuration.len())?;
        reset_current_sizes(&mut self.inner_configuration[..live]);
        Ok(())
    }

    /**
     * Rebuilds the neighbor lists from the spatial index of `body`. Particles `i` and `j` are
     * neighbors if their distance is smaller than the larger of both cutoff radii.
     */
    pub fn update_configuration<DU: DimensionUtils<D>>(&mut self, body: &RealBody<DU, D>) -> Result<(), SphError> {
        check_spatial_index(body)?;
        self.reset_neighborhood_current_size(body)?;

        let live = body.particles().total_real_particles();
        let positions = body.particles().live_positions();
        let h_ratio = smoothing_length_ratios(body);
        let kernel = body.adaptation().kernel();
        let cutoff_radius = kernel.cutoff_radius();
        let cell_linked_list = body.cell_linked_list();

        par_iter_mut1(&mut self.inner_configuration[..live], |i, neighborhood| {
            let x_i = positions[i];
            let h_i = ratio_of(h_ratio, i);
            cell_linked_list.for_each_candidate(x_i, cutoff_radius / h_i, |j| {
                if j == i {
                    return;
                }
                let h_ij = FT::min(h_i, ratio_of(h_ratio, j));
                let displacement = x_i - positions[j];
                let r = displacement.norm();
                if r < cutoff_radius / h_ij {
                    neighborhood.push_entry(neighbor_entry::<DU, D>(kernel, h_ij, j, displacement, r));
                }
            });
        });
        Ok(())
    }

    pub fn inner_configuration(&self) -> &[Neighborhood<D>] {
        &self.inner_configuration
    }
}

pub struct ContactRelation<const D: usize> {
    contact_configuration: Vec<Vec<Neighborhood<D>>>,
    contact_names: Vec<String>,
    bound_generation: u64,
}

impl<const D: usize> ContactRelation<D> {
    pub fn new<DU: DimensionUtils<D>>(body: &RealBody<DU, D>, contact_bodies: &[&RealBody<DU, D>]) -> Self {
        let mut relation = ContactRelation {
            contact_configuration: (0..contact_bodies.len()).map(|_| Vec::new()).collect(),
            contact_names: contact_bodies.iter().map(|b| b.name().to_string()).collect(),
            bound_generation: body.particles().bound_generation(),
        };
        relation.update_configuration_memories(body);
        relation
    }

    pub fn contact_count(&self) -> usize {
        self.contact_configuration.len()
    }

    pub fn contact_names(&self) -> &[String] {
        &self.contact_names
    }

    /// Resizes the neighborhoods of every contact to the particle bound of the subject body.
    pub fn update_configuration_memories<DU: DimensionUtils<D>>(&mut self, body: &RealBody<DU, D>) {
        let bound = body.particles().real_particles_bound();
        for configuration in &mut self.contact_configuration {
            resize_configuration(configuration, bound);
        }
        self.bound_generation = body.particles().bound_generation();
        debug!(
            "contact relation of `{}` with {} bodies sized to {}",
            body.name(),
            self.contact_configuration.len(),
            bound
        );
    }

    pub fn is_outdated<DU: DimensionUtils<D>>(&self, body: &RealBody<DU, D>) -> bool {
        let bound = body.particles().real_particles_bound();
        self.bound_generation != body.particles().bound_generation()
            || self.contact_configuration.iter().any(|c| c.len() != bound)
    }

    fn check_bounds<DU: DimensionUtils<D>>(&self, body: &RealBody<DU, D>) -> Result<usize, SphError> {
        let live = body.particles().total_real_particles();
        for configuration in &self.contact_configuration {
            check_bound(live, configuration.len())?;
        }
        Ok(live)
    }

    /// Resets the neighbor counts for all contacts, the contacts are processed in parallel.
    pub fn reset_neighborhood_current_size<DU: DimensionUtils<D>>(
        &mut self,
        body: &RealBody<DU, D>,
    ) -> Result<(), SphError> {
        let live = self.check_bounds(body)?;
        par_iter_mut1(&mut self.contact_configuration, |_k, configuration| {
            reset_current_sizes(&mut configuration[..live]);
        });
        Ok(())
    }

    /// Resets the neighbor counts for contact `k` only.
    pub fn reset_contact_neighborhood_current_size<DU: DimensionUtils<D>>(
        &mut self,
        body: &RealBody<DU, D>,
        k: usize,
    ) -> Result<(), SphError> {
        let live = body.particles().total_real_particles();
        let configuration = &mut self.contact_configuration[k];
        check_bound(live, configuration.len())?;
        reset_current_sizes(&mut configuration[..live]);
        Ok(())
    }

    /**
     * Rebuilds the neighbor lists against every contact body. The interaction radius of a pair
     * is the larger of both cutoff radii, the kernel of the subject body is evaluated at the
     * matching smoothing length ratio.
     */
    pub fn update_configuration<DU: DimensionUtils<D>>(
        &mut self,
        body: &RealBody<DU, D>,
        contact_bodies: &[&RealBody<DU, D>],
    ) -> Result<(), SphError> {
        if contact_bodies.len() != self.contact_configuration.len() {
            return Err(SphError::DimensionMismatch {
                name: "contact bodies",
                expected: self.contact_configuration.len(),
                got: contact_bodies.len(),
            });
        }
        for contact_body in contact_bodies {
            check_spatial_index(contact_body)?;
        }
        self.reset_neighborhood_current_size(body)?;

        let live = body.particles().total_real_particles();
        let positions = body.particles().live_positions();
        let h_ratio = smoothing_length_ratios(body);
        let kernel = body.adaptation().kernel();
        let cutoff_radius = kernel.cutoff_radius();

        for (configuration, contact_body) in self.contact_configuration.iter_mut().zip(contact_bodies) {
            let contact_positions = contact_body.particles().live_positions();
            let contact_h_ratio = smoothing_length_ratios(contact_body);
            let contact_cutoff_radius = contact_body.adaptation().kernel().cutoff_radius();
            let cell_linked_list = contact_body.cell_linked_list();

            par_iter_mut1(&mut configuration[..live], |i, neighborhood| {
                let x_i = positions[i];
                let search_radius = cutoff_radius / ratio_of(h_ratio, i);
                cell_linked_list.for_each_candidate(x_i, search_radius, |j| {
                    let interaction_radius =
                        FT::max(search_radius, contact_cutoff_radius / ratio_of(contact_h_ratio, j));
                    let displacement = x_i - contact_positions[j];
                    let r = displacement.norm();
                    if r < interaction_radius {
                        let h_ij = cutoff_radius / interaction_radius;
                        neighborhood.push_entry(neighbor_entry::<DU, D>(kernel, h_ij, j, displacement, r));
                    }
                });
            });
        }
        Ok(())
    }

    pub fn contact_configuration(&self, k: usize) -> &[Neighborhood<D>] {
        &self.contact_configuration[k]
    }
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::{
        adaptivity::SphAdaptation, bounding_box::BoundingBox, particles::BaseParticles, vec2f, DimensionUtils2d,
    };

    type Body2d = RealBody<DimensionUtils2d, 2>;

    fn unit_domain() -> BoundingBox<2> {
        BoundingBox::new(vec2f(0., 0.), vec2f(1., 1.))
    }

    fn random_positions(n: usize, seed: u64) -> Vec<VF<2>> {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| vec2f(rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0)))
            .collect()
    }

    fn uniform_body(name: &str, positions: &[VF<2>], bound: usize) -> Body2d {
        let adaptation = SphAdaptation::new(0.05, 1.3, 1.0).unwrap();
        let particles = BaseParticles::from_positions(positions, 0.0025, bound);
        RealBody::new(name, particles, adaptation, unit_domain())
    }

    fn dummy_entry() -> NeighborEntry<2> {
        NeighborEntry {
            j: 0,
            w_ij: 1.,
            dw_ij: -1.,
            r_ij: 0.1,
            e_ij: vec2f(1., 0.),
        }
    }

    #[test]
    fn resize_then_reset_only_touches_live_particles() {
        let body = uniform_body("water", &random_positions(50, 1), 100);
        assert_eq!(body.particles().real_particles_bound(), 100);

        let mut relation = InnerRelation::new(&body);
        relation.update_configuration_memories(&body);
        assert_eq!(relation.inner_configuration().len(), 100);
        for neighborhood in &mut relation.inner_configuration {
            neighborhood.push_entry(dummy_entry());
        }

        relation.reset_neighborhood_current_size(&body).unwrap();
        let configuration = relation.inner_configuration();
        assert!(configuration[..50].iter().all(|n| n.current_size() == 0));
        assert!(configuration[50..].iter().all(|n| n.current_size() == 1));
    }

    #[test]
    fn contact_reset_is_isolated() {
        let positions = random_positions(30, 2);
        let body = uniform_body("water", &positions, 30);
        let wall_a = uniform_body("wall a", &random_positions(10, 3), 10);
        let wall_b = uniform_body("wall b", &random_positions(10, 4), 10);

        let mut relation = ContactRelation::new(&body, &[&wall_a, &wall_b]);
        assert_eq!(relation.contact_count(), 2);
        assert_eq!(relation.contact_names()[1], "wall b");
        for configuration in &mut relation.contact_configuration {
            for neighborhood in configuration.iter_mut() {
                neighborhood.push_entry(dummy_entry());
                neighborhood.push_entry(dummy_entry());
            }
        }

        relation.reset_contact_neighborhood_current_size(&body, 0).unwrap();
        assert!(relation.contact_configuration(0).iter().all(|n| n.current_size() == 0));
        assert!(relation.contact_configuration(1).iter().all(|n| n.current_size() == 2));

        relation.reset_neighborhood_current_size(&body).unwrap();
        assert!(relation.contact_configuration(1).iter().all(|n| n.current_size() == 0));
    }

    #[test]
    fn growth_without_resize_is_a_consistency_error() {
        let mut body = uniform_body("water", &random_positions(4, 5), 4);
        let mut relation = InnerRelation::new(&body);
        let wall = uniform_body("wall", &random_positions(4, 6), 4);
        let mut contact = ContactRelation::new(&body, &[&wall]);
        assert!(!relation.is_outdated(&body));

        body.particles_mut().add_real_particle(vec2f(0.5, 0.5), 0.0025);
        assert!(relation.is_outdated(&body));
        assert!(contact.is_outdated(&body));
        body.update_cell_linked_list();

        let err = relation.update_configuration(&body).unwrap_err();
        assert_eq!(err, SphError::BoundExceeded { live_count: 5, bound: 4 });
        assert!(err.is_consistency_error());
        assert!(contact.update_configuration(&body, &[&wall]).is_err());

        relation.update_configuration_memories(&body);
        contact.update_configuration_memories(&body);
        assert!(!relation.is_outdated(&body));
        relation.update_configuration(&body).unwrap();
        contact.update_configuration(&body, &[&wall]).unwrap();

        assert!(matches!(
            contact.update_configuration(&body, &[]),
            Err(SphError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn merge_without_index_update_is_a_consistency_error() {
        let positions = [vec2f(0.5, 0.5), vec2f(0.51, 0.5), vec2f(0.6, 0.5)];
        let adaptation = SphAdaptation::split_and_merge(0.05, 1.3, 1.0, 2).unwrap();
        let v_min = adaptation.split_and_merge_policy().unwrap().minimum_volume();
        let particles = BaseParticles::from_positions(&positions, v_min, 8);
        let mut body: Body2d = RealBody::new("water", particles, adaptation, unit_domain());
        let wall = uniform_body("wall", &random_positions(10, 12), 10);

        let mut relation = InnerRelation::new(&body);
        let mut contact = ContactRelation::new(&wall, &[&body]);
        relation.update_configuration(&body).unwrap();

        assert_eq!(body.merge_particles(0, 1), Some(0));
        assert_eq!(body.particles().total_real_particles(), 2);
        assert!(!relation.is_outdated(&body));

        assert_eq!(
            relation.update_configuration(&body).unwrap_err(),
            SphError::StaleSpatialIndex {
                body: "water".to_string(),
                indexed_count: 3,
                live_count: 2,
            }
        );
        let err = contact.update_configuration(&wall, &[&body]).unwrap_err();
        assert!(err.is_consistency_error());

        body.update_cell_linked_list();
        relation.update_configuration(&body).unwrap();
        contact.update_configuration(&wall, &[&body]).unwrap();
        assert!(relation.inner_configuration()[..2].iter().all(|n| n.iter().all(|e| e.j < 2)));

        // splitting adds a particle the index does not know yet
        body.particles_mut().volume[1] = 4.0 * v_min;
        assert!(body.split_particle(1, 0.).is_some());
        assert!(matches!(
            relation.update_configuration(&body),
            Err(SphError::StaleSpatialIndex {
                indexed_count: 2,
                live_count: 3,
                ..
            })
        ));
    }

    fn brute_force_neighbors(positions: &[VF<2>], h_ratio: &[FT], cutoff: FT, i: usize) -> Vec<usize> {
        (0..positions.len())
            .filter(|&j| {
                j != i && (positions[i] - positions[j]).norm() < cutoff / FT::min(h_ratio[i], h_ratio[j])
            })
            .collect()
    }

    #[test]
    fn inner_relation_matches_brute_force_with_local_refinement() {
        let positions = random_positions(400, 8);
        let adaptation = SphAdaptation::with_local_refinement(0.05, 1.3, 1.0, 2).unwrap();
        let particles = BaseParticles::from_positions(&positions, 0.0025, 400);
        let mut body: Body2d = RealBody::new("water", particles, adaptation, unit_domain());

        let id = body.adaptation().smoothing_length_ratio_variable().unwrap();
        let h_ratio: Vec<FT> = (0..400).map(|i| [1.0, 1.5, 2.0, 4.0][i % 4]).collect();
        body.particles_mut().variable_mut(id)[..400].copy_from_slice(&h_ratio);
        body.update_cell_linked_list();

        let mut relation = InnerRelation::new(&body);
        relation.update_configuration(&body).unwrap();

        let cutoff = body.adaptation().kernel().cutoff_radius();
        let configuration = relation.inner_configuration();
        for i in 0..400 {
            let mut found: Vec<usize> = configuration[i].iter().map(|e| e.j).collect();
            found.sort_unstable();
            assert_eq!(found, brute_force_neighbors(&positions, &h_ratio, cutoff, i), "particle {}", i);

            for entry in configuration[i].iter() {
                let back = configuration[entry.j].iter().find(|e| e.j == i).unwrap();
                crate::assert_ft_approx_eq(entry.w_ij, back.w_ij, 1e-5, || "symmetric kernel".into());
                crate::assert_ft_approx_eq(entry.r_ij, back.r_ij, 1e-6, || "symmetric distance".into());
                assert!((entry.e_ij + back.e_ij).norm() < 1e-5);
                assert!(entry.w_ij >= 0.);
            }
        }
    }

    #[test]
    fn contact_relation_finds_pairs_across_bodies() {
        let water_positions = random_positions(200, 9);
        let wall_positions = random_positions(100, 10);
        let water = uniform_body("water", &water_positions, 200);
        let wall = uniform_body("wall", &wall_positions, 100);

        let mut relation = ContactRelation::new(&water, &[&wall]);
        relation.update_configuration(&water, &[&wall]).unwrap();

        let cutoff = water.adaptation().kernel().cutoff_radius();
        let expected_weight = |r: FT| water.adaptation().kernel().w::<DimensionUtils2d, 2>(r);
        for (i, neighborhood) in relation.contact_configuration(0)[..200].iter().enumerate() {
            let mut found: Vec<usize> = neighborhood.iter().map(|e| e.j).collect();
            found.sort_unstable();
            let expected: Vec<usize> = (0..100)
                .filter(|&j| (water_positions[i] - wall_positions[j]).norm() < cutoff)
                .collect();
            assert_eq!(found, expected);
            for entry in neighborhood.iter() {
                crate::assert_ft_approx_eq(entry.w_ij, expected_weight(entry.r_ij), 1e-5, || "weight".into());
            }
        }
    }
}
