/*!
Resolution model of a particle body.

`SphAdaptation` derives the smoothing length, the kernel and the reference number density from
one reference spacing. The refinement policy (uniform, local, shape driven or split/merge) is
chosen at construction and decides how spatial indices are sized.
*/

use std::marker::PhantomData;

use log::{debug, info};

use crate::{
    bounding_box::BoundingBox,
    cell_linked_list::{BaseCellLinkedList, CellLinkedList, CellLinkedListTrait, MultilevelCellLinkedList},
    concurrency::par_iter_mut1,
    error::{check_positive, SphError},
    floating_type_mod::FT,
    level_set::{BaseLevelSet, LevelSet, MultilevelLevelSet},
    particles::{BaseParticles, VariableId},
    sdf::Sdf,
    simulation_parameters::{RefinementMethod, SimulationParams},
    sph_kernels::{DimensionUtils, Kernel, KernelType},
    EPS, VF,
};

pub mod refinement_by_shape;
pub mod split_and_merge;

pub use refinement_by_shape::{RefinementByShape, ShapeRefinementKind};
pub use split_and_merge::SplitAndMerge;

/// Name under which the per-particle smoothing length ratio is registered.
pub const SMOOTHING_LENGTH_RATIO: &str = "SmoothingLengthRatio";

/// Place synthetic particles on a lattice with the given spacing and sum up their kernel weights.
pub fn compute_reference_number_density<DU: DimensionUtils<D>, const D: usize>(
    kernel: &Kernel,
    particle_spacing: FT,
) -> FT {
    let cutoff_radius = kernel.cutoff_radius();
    let search_depth = (cutoff_radius / particle_spacing).ceil() as i32 + 1;

    let mut sigma = 0.;
    DU::iterate_grid_neighbors(search_depth, |offset| {
        let particle_location: VF<D> = offset.map(|i| i as FT * particle_spacing);
        let distance = particle_location.norm();
        if distance < cutoff_radius {
            sigma += kernel.w::<DU, D>(distance);
        }
    });
    sigma
}

/**
 * Resolution quantities derived from the reference spacing.
 *
 * The fields depend on each other in declaration order (spacing -> smoothing length -> kernel
 * -> number density) and are therefore always derived together.
 */
#[derive(Debug, Clone)]
pub struct ResolutionParameters {
    /// ratio of reference kernel smoothing length to particle spacing
    h_spacing_ratio: FT,
    /// ratio of system resolution to body resolution
    system_refinement_ratio: FT,
    local_refinement_level: usize,
    spacing_ref: FT,
    h_ref: FT,
    kernel: Kernel,
    sigma0_ref: FT,
    spacing_min: FT,
    /// ratio between the reference smoothing length and the minimum smoothing length
    h_ratio_max: FT,
}

impl ResolutionParameters {
    fn derive<DU: DimensionUtils<D>, const D: usize>(
        resolution_ref: FT,
        h_spacing_ratio: FT,
        system_refinement_ratio: FT,
        local_refinement_level: usize,
        kernel_type: KernelType,
        most_refined_spacing: impl Fn(FT, usize) -> FT,
    ) -> Result<Self, SphError> {
        check_positive("resolution_ref", resolution_ref)?;
        check_positive("h_spacing_ratio", h_spacing_ratio)?;
        check_positive("system_refinement_ratio", system_refinement_ratio)?;

        let spacing_ref = check_positive("reference_spacing", resolution_ref / system_refinement_ratio)?;
        let h_ref = h_spacing_ratio * spacing_ref;
        let kernel = Kernel::new(kernel_type, h_ref);
        let sigma0_ref = compute_reference_number_density::<DU, D>(&kernel, spacing_ref);

        let spacing_min = most_refined_spacing(spacing_ref, local_refinement_level);
        if !(spacing_min.is_finite() && spacing_min > 0. && spacing_min <= spacing_ref) {
            return Err(SphError::InconsistentRefinement {
                refinement_level: local_refinement_level,
                reference_spacing: spacing_ref,
                minimum_spacing: spacing_min,
            });
        }

        Ok(ResolutionParameters {
            h_spacing_ratio,
            system_refinement_ratio,
            local_refinement_level,
            spacing_ref,
            h_ref,
            kernel,
            sigma0_ref,
            spacing_min,
            h_ratio_max: spacing_ref / spacing_min,
        })
    }

    pub fn h_spacing_ratio(&self) -> FT {
        self.h_spacing_ratio
    }

    pub fn system_refinement_ratio(&self) -> FT {
        self.system_refinement_ratio
    }

    pub fn local_refinement_level(&self) -> usize {
        self.local_refinement_level
    }

    pub fn reference_spacing(&self) -> FT {
        self.spacing_ref
    }

    pub fn minimum_spacing(&self) -> FT {
        self.spacing_min
    }

    pub fn reference_smoothing_length(&self) -> FT {
        self.h_ref
    }

    pub fn minimum_smoothing_length(&self) -> FT {
        self.h_ref / self.h_ratio_max
    }

    pub fn max_smoothing_length_ratio(&self) -> FT {
        self.h_ratio_max
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    /**
     * Blends from the minimum spacing (at `measure = 0`) to the reference spacing (at
     * `measure >= 2 * kernel_size * transition_thickness`) along the kernel profile.
     * A non-positive transition thickness disables the blending.
     */
    pub fn smoothed_spacing(&self, measure: FT, transition_thickness: FT) -> FT {
        if !(transition_thickness > 0.) {
            return self.spacing_ref;
        }

        let ratio_ref = measure.max(0.) / (2.0 * transition_thickness);
        if ratio_ref < self.kernel.kernel_size() {
            let weight = self.kernel.w_1d(ratio_ref) / self.kernel.w_1d(0.);
            weight * self.spacing_min + (1.0 - weight) * self.spacing_ref
        } else {
            self.spacing_ref
        }
    }
}

/// The closed set of refinement strategies.
#[derive(Debug, Clone)]
pub enum RefinementPolicy<const D: usize> {
    Uniform,
    Local,
    ByShape(RefinementByShape<D>),
    SplitAndMerge(SplitAndMerge),
}

impl<const D: usize> RefinementPolicy<D> {
    pub fn name(&self) -> &'static str {
        match self {
            RefinementPolicy::Uniform => "uniform",
            RefinementPolicy::Local => "local",
            RefinementPolicy::ByShape(r) => match r.kind() {
                ShapeRefinementKind::NearSurface => "near-surface",
                ShapeRefinementKind::WithinShape => "within-shape",
            },
            RefinementPolicy::SplitAndMerge(_) => "split-and-merge",
        }
    }

    pub fn has_local_refinement(&self) -> bool {
        !matches!(self, RefinementPolicy::Uniform)
    }

    /// Spacing after `refinement_level` refinement steps from `coarse_particle_spacing`.
    pub fn most_refined_spacing(&self, coarse_particle_spacing: FT, refinement_level: usize) -> FT {
        match self {
            // 2^level children per coarse particle
            RefinementPolicy::SplitAndMerge(_) => {
                let minimum_spacing_particles = (2.0 as FT).powi(refinement_level as i32);
                coarse_particle_spacing / minimum_spacing_particles.powf(1.0 / D as FT)
            }
            _ => coarse_particle_spacing / (2.0 as FT).powi(refinement_level as i32),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SphAdaptation<DU: DimensionUtils<D>, const D: usize> {
    params: ResolutionParameters,
    policy: RefinementPolicy<D>,
    h_ratio: Option<VariableId>,
    _du: PhantomData<DU>,
}

impl<DU: DimensionUtils<D>, const D: usize> SphAdaptation<DU, D> {
    fn build(
        resolution_ref: FT,
        h_spacing_ratio: FT,
        system_refinement_ratio: FT,
        local_refinement_level: usize,
        mut policy: RefinementPolicy<D>,
    ) -> Result<Self, SphError> {
        let local_refinement_level = if policy.has_local_refinement() {
            local_refinement_level
        } else {
            0
        };

        let params = ResolutionParameters::derive::<DU, D>(
            resolution_ref,
            h_spacing_ratio,
            system_refinement_ratio,
            local_refinement_level,
            KernelType::default(),
            |spacing, level| policy.most_refined_spacing(spacing, level),
        )?;

        if let RefinementPolicy::SplitAndMerge(split_and_merge) = &mut policy {
            split_and_merge.reset_volumes::<D>(params.spacing_min, params.spacing_ref);
        }

        info!(
            "{} adaptation: spacing={} h={} sigma0={} min_spacing={} level={}",
            policy.name(),
            params.spacing_ref,
            params.h_ref,
            params.sigma0_ref,
            params.spacing_min,
            params.local_refinement_level
        );

        Ok(SphAdaptation {
            params,
            policy,
            h_ratio: None,
            _du: PhantomData,
        })
    }

    /// Single resolution with the reference spacing `resolution_ref / system_refinement_ratio`.
    pub fn new(resolution_ref: FT, h_spacing_ratio: FT, system_refinement_ratio: FT) -> Result<Self, SphError> {
        Self::build(
            resolution_ref,
            h_spacing_ratio,
            system_refinement_ratio,
            0,
            RefinementPolicy::Uniform,
        )
    }

    pub fn with_local_refinement(
        resolution_ref: FT,
        h_spacing_ratio: FT,
        system_refinement_ratio: FT,
        local_refinement_level: usize,
    ) -> Result<Self, SphError> {
        Self::build(
            resolution_ref,
            h_spacing_ratio,
            system_refinement_ratio,
            local_refinement_level,
            RefinementPolicy::Local,
        )
    }

    /// Refines a band around the surface of `target_shape`.
    pub fn refinement_near_surface(
        resolution_ref: FT,
        h_spacing_ratio: FT,
        system_refinement_ratio: FT,
        local_refinement_level: usize,
        target_shape: Sdf<D>,
    ) -> Result<Self, SphError> {
        Self::build(
            resolution_ref,
            h_spacing_ratio,
            system_refinement_ratio,
            local_refinement_level,
            RefinementPolicy::ByShape(RefinementByShape::new(target_shape, ShapeRefinementKind::NearSurface)),
        )
    }

    /// Refines the whole inside of `target_shape` and blends out beyond its surface.
    pub fn refinement_within_shape(
        resolution_ref: FT,
        h_spacing_ratio: FT,
        system_refinement_ratio: FT,
        local_refinement_level: usize,
        target_shape: Sdf<D>,
    ) -> Result<Self, SphError> {
        Self::build(
            resolution_ref,
            h_spacing_ratio,
            system_refinement_ratio,
            local_refinement_level,
            RefinementPolicy::ByShape(RefinementByShape::new(target_shape, ShapeRefinementKind::WithinShape)),
        )
    }

    pub fn split_and_merge(
        resolution_ref: FT,
        h_spacing_ratio: FT,
        system_refinement_ratio: FT,
        local_refinement_level: usize,
    ) -> Result<Self, SphError> {
        Self::build(
            resolution_ref,
            h_spacing_ratio,
            system_refinement_ratio,
            local_refinement_level,
            RefinementPolicy::SplitAndMerge(SplitAndMerge::default()),
        )
    }

    pub fn from_params(params: &SimulationParams, mut target_shape: Option<Sdf<D>>) -> Result<Self, SphError> {
        let mut shape_policy = |kind: ShapeRefinementKind, policy: &'static str| {
            target_shape
                .take()
                .map(|shape| RefinementPolicy::ByShape(RefinementByShape::new(shape, kind)))
                .ok_or(SphError::MissingShape { policy })
        };

        let policy = match params.refinement {
            RefinementMethod::Uniform => RefinementPolicy::Uniform,
            RefinementMethod::Local => RefinementPolicy::Local,
            RefinementMethod::NearSurface => shape_policy(ShapeRefinementKind::NearSurface, "near-surface")?,
            RefinementMethod::WithinShape => shape_policy(ShapeRefinementKind::WithinShape, "within-shape")?,
            RefinementMethod::SplitAndMerge => RefinementPolicy::SplitAndMerge(SplitAndMerge::default()),
        };

        let mut adaptation = Self::build(
            params.resolution_ref,
            params.h_spacing_ratio,
            params.system_refinement_ratio,
            params.local_refinement_level,
            policy,
        )?;
        if params.kernel != KernelType::default() {
            adaptation.reset_kernel(params.kernel);
        }
        Ok(adaptation)
    }

    pub fn params(&self) -> &ResolutionParameters {
        &self.params
    }

    pub fn policy(&self) -> &RefinementPolicy<D> {
        &self.policy
    }

    pub fn local_refinement_level(&self) -> usize {
        self.params.local_refinement_level
    }

    pub fn reference_spacing(&self) -> FT {
        self.params.spacing_ref
    }

    pub fn minimum_spacing(&self) -> FT {
        self.params.spacing_min
    }

    pub fn reference_smoothing_length(&self) -> FT {
        self.params.h_ref
    }

    pub fn minimum_smoothing_length(&self) -> FT {
        self.params.minimum_smoothing_length()
    }

    pub fn kernel(&self) -> &Kernel {
        &self.params.kernel
    }

    /// Reference number density for a particle with the given smoothing length ratio.
    pub fn reference_number_density(&self, smoothing_length_ratio: FT) -> FT {
        self.params.sigma0_ref * smoothing_length_ratio.powi(D as i32)
    }

    /**
     * Re-derives every resolution quantity for new ratios. Nothing changes if the new ratios
     * are rejected.
     */
    pub fn reset_adaptation_ratios(
        &mut self,
        h_spacing_ratio: FT,
        new_system_refinement_ratio: FT,
    ) -> Result<(), SphError> {
        let resolution_ref = self.params.spacing_ref * self.params.system_refinement_ratio;
        let policy = &self.policy;
        let params = ResolutionParameters::derive::<DU, D>(
            resolution_ref,
            h_spacing_ratio,
            new_system_refinement_ratio,
            self.params.local_refinement_level,
            self.params.kernel.kernel_type(),
            |spacing, level| policy.most_refined_spacing(spacing, level),
        )?;

        if let RefinementPolicy::SplitAndMerge(split_and_merge) = &mut self.policy {
            split_and_merge.reset_volumes::<D>(params.spacing_min, params.spacing_ref);
        }
        debug!(
            "reset adaptation ratios: h_spacing_ratio={} system_refinement_ratio={} spacing={}",
            h_spacing_ratio, new_system_refinement_ratio, params.spacing_ref
        );
        self.params = params;
        Ok(())
    }

    /// Replaces the kernel function, keeping the smoothing length.
    pub fn reset_kernel(&mut self, kernel_type: KernelType) {
        self.params.kernel = Kernel::new(kernel_type, self.params.h_ref);
        self.params.sigma0_ref = compute_reference_number_density::<DU, D>(&self.params.kernel, self.params.spacing_ref);
        debug!("kernel reset to {:?}, sigma0={}", kernel_type, self.params.sigma0_ref);
    }

    /**
     * Registers the per-particle smoothing length ratio (initialized with 1.0) for local
     * refinement policies. The variable grows with the particle bound.
     */
    pub fn register_smoothing_length_ratio(&mut self, particles: &mut BaseParticles<D>) -> Option<VariableId> {
        if !self.policy.has_local_refinement() {
            return None;
        }
        let id = particles.register_variable(SMOOTHING_LENGTH_RATIO, 1.0);
        self.h_ratio = Some(id);
        Some(id)
    }

    pub fn smoothing_length_ratio_variable(&self) -> Option<VariableId> {
        self.h_ratio
    }

    pub fn smoothing_length_ratio(&self, particles: &BaseParticles<D>, particle_index_i: usize) -> FT {
        match self.h_ratio {
            Some(id) => particles.variable(id)[particle_index_i],
            None => 1.0,
        }
    }

    /// Ratios of all particle slots, `None` under uniform resolution.
    pub fn smoothing_length_ratios<'a>(&self, particles: &'a BaseParticles<D>) -> Option<&'a [FT]> {
        self.h_ratio.map(|id| particles.variable(id))
    }

    pub fn cell_linked_list_total_levels(&self) -> usize {
        match &self.policy {
            RefinementPolicy::Uniform => 1,
            RefinementPolicy::Local | RefinementPolicy::ByShape(_) => self.params.local_refinement_level + 1,
            // rounded down, never more levels than needed
            RefinementPolicy::SplitAndMerge(_) => {
                1 + FT::floor((self.params.spacing_ref / self.params.spacing_min).log2() + EPS) as usize
            }
        }
    }

    /// The signed distance pyramid has one level more than the cell grid.
    pub fn level_set_total_levels(&self) -> usize {
        self.cell_linked_list_total_levels() + 1
    }

    /// Spatial index over `domain_bounds` filled with the live particles.
    pub fn create_cell_linked_list(
        &self,
        domain_bounds: &BoundingBox<D>,
        particles: &BaseParticles<D>,
    ) -> BaseCellLinkedList<DU, D> {
        let cutoff_radius = self.params.kernel.cutoff_radius();
        let mut cell_linked_list: BaseCellLinkedList<DU, D> = match self.policy {
            RefinementPolicy::Uniform => CellLinkedList::new(domain_bounds, cutoff_radius).into(),
            _ => MultilevelCellLinkedList::new(domain_bounds, cutoff_radius, self.cell_linked_list_total_levels())
                .into(),
        };
        self.update_cell_linked_list(&mut cell_linked_list, particles);
        cell_linked_list
    }

    pub fn update_cell_linked_list(
        &self,
        cell_linked_list: &mut BaseCellLinkedList<DU, D>,
        particles: &BaseParticles<D>,
    ) {
        let n = particles.total_real_particles();
        let h_ratio = self.smoothing_length_ratios(particles).map(|h| &h[..n]).unwrap_or(&[]);
        cell_linked_list.update_cell_lists(particles.live_positions(), h_ratio);
    }

    pub fn create_level_set(&self, shape: &Sdf<D>, refinement_ratio: FT) -> Result<BaseLevelSet<D>, SphError> {
        check_positive("refinement_ratio", refinement_ratio)?;
        let bounds = shape.bounds();

        if self.policy.has_local_refinement() {
            let levels = self.level_set_total_levels();
            debug!("create multilevel level set with {} levels", levels);
            return Ok(
                MultilevelLevelSet::new(&bounds, self.reference_spacing() / refinement_ratio, levels, shape).into(),
            );
        }

        // estimate the required mesh levels
        let estimated = (bounds.min_dimension() / self.reference_spacing()).log10().trunc().max(0.) as usize;
        let total_levels = estimated + 2;
        let coarsest_spacing = self.reference_spacing() * (2.0 as FT).powi(total_levels as i32 - 1);
        let coarser_level_sets =
            MultilevelLevelSet::new(&bounds, coarsest_spacing / refinement_ratio, total_levels - 1, shape);
        debug!("create refined level set from {} coarser levels", total_levels - 1);

        // only the finest level is kept
        Ok(LevelSet::refined(coarser_level_sets.finest(), shape).into())
    }

    /// Target spacing at `position`, only available for shape driven refinement.
    pub fn local_spacing_by_shape(&self, position: VF<D>) -> Option<FT> {
        match &self.policy {
            RefinementPolicy::ByShape(by_shape) => Some(by_shape.local_spacing(&self.params, position)),
            _ => None,
        }
    }

    /// Sets the smoothing length ratio of every live particle from its target spacing.
    pub fn update_smoothing_length_ratio_by_shape(&mut self, particles: &mut BaseParticles<D>) -> Result<(), SphError> {
        if !matches!(self.policy, RefinementPolicy::ByShape(_)) {
            return Err(SphError::MissingShape {
                policy: self.policy.name(),
            });
        }
        let id = match self.h_ratio {
            Some(id) => id,
            None => particles.register_variable(SMOOTHING_LENGTH_RATIO, 1.0),
        };
        self.h_ratio = Some(id);

        let by_shape = match &self.policy {
            RefinementPolicy::ByShape(by_shape) => by_shape,
            _ => unreachable!(),
        };
        let params = &self.params;
        let n = particles.total_real_particles();
        let (position, h_ratio) = particles.positions_and_variable_mut(id);
        par_iter_mut1(&mut h_ratio[..n], |i, h| {
            *h = params.spacing_ref / by_shape.local_spacing(params, position[i]);
        });
        Ok(())
    }

    pub fn split_and_merge_policy(&self) -> Option<&SplitAndMerge> {
        match &self.policy {
            RefinementPolicy::SplitAndMerge(s) => Some(s),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assert_ft_approx_eq,
        sdf::SdfPolygon,
        vec2f, vec3f, DimensionUtils2d, DimensionUtils3d,
    };

    type Adaptation2d = SphAdaptation<DimensionUtils2d, 2>;

    fn unit_square() -> Sdf<2> {
        SdfPolygon::new_box(vec2f(0., 0.), vec2f(1., 1.)).into()
    }

    #[test]
    fn smoothing_length_follows_spacing() {
        let adaptation = Adaptation2d::new(0.1, 1.3, 1.0).unwrap();
        assert_ft_approx_eq(adaptation.reference_smoothing_length(), 0.13, 1e-5, || "h_ref".into());
        assert_ft_approx_eq(adaptation.kernel().cutoff_radius(), 0.26, 1e-5, || "cutoff".into());
        assert_eq!(adaptation.minimum_spacing(), adaptation.reference_spacing());
        assert_eq!(adaptation.cell_linked_list_total_levels(), 1);

        let refined = Adaptation2d::new(0.1, 1.3, 2.0).unwrap();
        assert_ft_approx_eq(refined.reference_spacing(), 0.05, 1e-5, || "system refinement".into());
    }

    #[test]
    fn local_refinement_levels() {
        for level in 0..4 {
            let adaptation = Adaptation2d::with_local_refinement(0.1, 1.3, 1.0, level).unwrap();
            assert_eq!(adaptation.cell_linked_list_total_levels(), level + 1);
            assert_eq!(adaptation.level_set_total_levels(), level + 2);
            assert!(adaptation.minimum_spacing() <= adaptation.reference_spacing());
            assert_ft_approx_eq(
                adaptation.minimum_spacing() * (2.0 as FT).powi(level as i32),
                adaptation.reference_spacing(),
                1e-5,
                || format!("level {}", level),
            );
            assert_ft_approx_eq(
                adaptation.minimum_smoothing_length(),
                adaptation.params().h_spacing_ratio() * adaptation.minimum_spacing(),
                1e-5,
                || "h_min".into(),
            );
        }
    }

    #[test]
    fn split_and_merge_levels() {
        let adaptation = Adaptation2d::split_and_merge(0.1, 1.3, 1.0, 2).unwrap();
        // four children per coarse particle halve the spacing in 2d
        assert_ft_approx_eq(adaptation.minimum_spacing(), 0.05, 1e-5, || "min spacing".into());
        assert_eq!(adaptation.cell_linked_list_total_levels(), 2);
        assert_eq!(adaptation.level_set_total_levels(), 3);

        let policy = adaptation.split_and_merge_policy().unwrap();
        assert_ft_approx_eq(policy.minimum_volume(), 0.0025, 1e-5, || "v_min".into());
        assert_ft_approx_eq(policy.maximum_volume(), 0.01, 1e-5, || "v_max".into());
    }

    #[test]
    fn reset_is_idempotent_and_atomic() {
        let mut adaptation = Adaptation2d::with_local_refinement(0.1, 1.3, 1.0, 2).unwrap();
        let before = adaptation.params().clone();

        adaptation.reset_adaptation_ratios(1.3, 1.0).unwrap();
        assert_ft_approx_eq(adaptation.reference_spacing(), before.reference_spacing(), 1e-6, || "spacing".into());
        assert_ft_approx_eq(
            adaptation.reference_number_density(1.0),
            before.sigma0_ref,
            1e-5,
            || "sigma0".into(),
        );
        assert_ft_approx_eq(
            adaptation.params().max_smoothing_length_ratio(),
            before.max_smoothing_length_ratio(),
            1e-6,
            || "h_ratio_max".into(),
        );

        let err = adaptation.reset_adaptation_ratios(-1.0, 1.0).unwrap_err();
        assert!(err.is_configuration_error());
        assert_eq!(adaptation.params().h_spacing_ratio(), 1.3);

        adaptation.reset_adaptation_ratios(1.3, 2.0).unwrap();
        assert_ft_approx_eq(adaptation.reference_spacing(), 0.05, 1e-5, || "refined spacing".into());
        assert_ft_approx_eq(adaptation.minimum_spacing(), 0.0125, 1e-5, || "refined min spacing".into());
    }

    #[test]
    fn non_positive_spacing_is_rejected() {
        assert!(matches!(
            Adaptation2d::new(0.0, 1.3, 1.0),
            Err(SphError::InvalidParameter { .. })
        ));
        assert!(matches!(
            Adaptation2d::new(0.1, 1.3, -2.0),
            Err(SphError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn number_density_scales_with_ratio() {
        let adaptation = Adaptation2d::new(0.1, 1.3, 1.0).unwrap();
        let sigma0 = adaptation.reference_number_density(1.0);
        assert!(sigma0 > 0.);
        assert_ft_approx_eq(adaptation.reference_number_density(2.0), 4.0 * sigma0, 1e-5, || "2d".into());

        let adaptation3d = SphAdaptation::<DimensionUtils3d, 3>::new(0.1, 1.3, 1.0).unwrap();
        let sigma0 = adaptation3d.reference_number_density(1.0);
        assert_ft_approx_eq(adaptation3d.reference_number_density(2.0), 8.0 * sigma0, 1e-5, || "3d".into());
    }

    #[test]
    fn number_density_is_close_to_inverse_volume() {
        let spacing = 0.1;
        let kernel = Kernel::new(KernelType::WendlandC2, 1.3 * spacing);
        let sigma0 = compute_reference_number_density::<DimensionUtils2d, 2>(&kernel, spacing);
        assert_ft_approx_eq(sigma0 * spacing * spacing, 1.0, 0.05, || "partition of unity".into());
    }

    #[test]
    fn kernel_reset_keeps_smoothing_length() {
        let mut adaptation = Adaptation2d::new(0.1, 1.3, 1.0).unwrap();
        let sigma0 = adaptation.reference_number_density(1.0);
        adaptation.reset_kernel(KernelType::CubicSpline);
        assert_eq!(adaptation.kernel().kernel_type(), KernelType::CubicSpline);
        assert_ft_approx_eq(adaptation.reference_smoothing_length(), 0.13, 1e-5, || "h".into());
        assert_ft_approx_eq(adaptation.reference_number_density(1.0), sigma0, 0.1, || "sigma0".into());
    }

    #[test]
    fn smoothed_spacing_blends_between_bounds() {
        let adaptation = Adaptation2d::with_local_refinement(0.1, 1.3, 1.0, 2).unwrap();
        let params = adaptation.params();
        let thickness = params.reference_spacing();

        assert_ft_approx_eq(params.smoothed_spacing(0., thickness), params.minimum_spacing(), 1e-6, || "at 0".into());
        assert_eq!(params.smoothed_spacing(4.0 * thickness, thickness), params.reference_spacing());
        assert_eq!(params.smoothed_spacing(0., 0.), params.reference_spacing());

        let mut last = params.smoothed_spacing(0., thickness);
        for k in 1..=100 {
            let measure = 4.0 * thickness * k as FT / 100.;
            let spacing = params.smoothed_spacing(measure, thickness);
            assert!(spacing + 1e-6 >= last, "spacing decreases at {}", measure);
            assert!(spacing >= params.minimum_spacing() - 1e-6 && spacing <= params.reference_spacing() + 1e-6);
            last = spacing;
        }
        // continuous at the end of the transition band
        let just_inside = params.smoothed_spacing(4.0 * thickness - 1e-4, thickness);
        assert_ft_approx_eq(just_inside, params.reference_spacing(), 1e-4, || "continuity".into());
    }

    #[test]
    fn within_shape_is_finest_inside() {
        let adaptation = Adaptation2d::refinement_within_shape(0.1, 1.3, 1.0, 2, unit_square()).unwrap();
        assert_eq!(adaptation.local_spacing_by_shape(vec2f(0.5, 0.5)), Some(adaptation.minimum_spacing()));
        assert_eq!(adaptation.local_spacing_by_shape(vec2f(0.02, 0.5)), Some(adaptation.minimum_spacing()));
        assert_eq!(adaptation.local_spacing_by_shape(vec2f(3., 0.5)), Some(adaptation.reference_spacing()));

        let uniform = Adaptation2d::new(0.1, 1.3, 1.0).unwrap();
        assert_eq!(uniform.local_spacing_by_shape(vec2f(0.5, 0.5)), None);
    }

    #[test]
    fn near_surface_is_finest_on_surface() {
        let adaptation = Adaptation2d::refinement_near_surface(0.1, 1.3, 1.0, 2, unit_square()).unwrap();
        let on_surface = adaptation.local_spacing_by_shape(vec2f(0., 0.5)).unwrap();
        assert_ft_approx_eq(on_surface, adaptation.minimum_spacing(), 1e-5, || "surface".into());
        assert_eq!(adaptation.local_spacing_by_shape(vec2f(0.5, 0.5)), Some(adaptation.reference_spacing()));
    }

    #[test]
    fn smoothing_length_ratio_by_shape() {
        let mut adaptation = Adaptation2d::refinement_within_shape(0.1, 1.3, 1.0, 2, unit_square()).unwrap();
        let mut particles = BaseParticles::from_positions(&[vec2f(0.5, 0.5), vec2f(5., 5.)], 0.01, 4);
        assert!(adaptation.register_smoothing_length_ratio(&mut particles).is_some());

        adaptation.update_smoothing_length_ratio_by_shape(&mut particles).unwrap();
        assert_ft_approx_eq(adaptation.smoothing_length_ratio(&particles, 0), 4.0, 1e-5, || "inside".into());
        assert_ft_approx_eq(adaptation.smoothing_length_ratio(&particles, 1), 1.0, 1e-5, || "outside".into());

        let mut uniform = Adaptation2d::new(0.1, 1.3, 1.0).unwrap();
        assert!(uniform.register_smoothing_length_ratio(&mut particles).is_none());
        assert_eq!(uniform.smoothing_length_ratio(&particles, 0), 1.0);
        assert!(matches!(
            uniform.update_smoothing_length_ratio_by_shape(&mut particles),
            Err(SphError::MissingShape { .. })
        ));
    }

    #[test]
    fn from_params_requires_shape() {
        let mut params = SimulationParams::default();
        params.resolution_ref = 0.1;
        params.refinement = RefinementMethod::NearSurface;
        params.local_refinement_level = 1;
        assert!(matches!(
            Adaptation2d::from_params(&params, None),
            Err(SphError::MissingShape { .. })
        ));

        let adaptation = Adaptation2d::from_params(&params, Some(unit_square())).unwrap();
        assert_eq!(adaptation.policy().name(), "near-surface");
        assert_eq!(adaptation.local_refinement_level(), 1);

        params.refinement = RefinementMethod::Uniform;
        params.kernel = KernelType::CubicSpline;
        let uniform = Adaptation2d::from_params(&params, None).unwrap();
        assert_eq!(uniform.local_refinement_level(), 0);
        assert_eq!(uniform.kernel().kernel_type(), KernelType::CubicSpline);
    }

    #[test]
    fn split_thresholds() {
        let adaptation = Adaptation2d::split_and_merge(0.1, 1.3, 1.0, 2).unwrap();
        let policy = adaptation.split_and_merge_policy().unwrap();
        let v_min = policy.minimum_volume();
        let delta = 1e-4;

        assert!(policy.is_split_allowed(2.0 * v_min + delta));
        assert!(policy.is_split_allowed(2.0 * v_min));
        assert!(!policy.is_split_allowed(2.0 * v_min - delta));

        assert!(policy.merge_resolution_check(1.2 * v_min - delta));
        assert!(policy.merge_resolution_check(1.2 * v_min));
        assert!(!policy.merge_resolution_check(1.2 * v_min + delta));
    }

    #[test]
    fn split_thresholds_at_fine_3d_resolution() {
        let adaptation = SphAdaptation::<DimensionUtils3d, 3>::split_and_merge(0.01, 1.3, 1.0, 1).unwrap();
        let policy = adaptation.split_and_merge_policy().unwrap();
        let v_min = policy.minimum_volume();
        let v_max = policy.maximum_volume();
        assert!((v_min / 5.0e-7 - 1.0).abs() < 1e-4, "v_min={}", v_min);
        assert!((v_max / 1.0e-6 - 1.0).abs() < 1e-4, "v_max={}", v_max);

        // children of a split have to keep the minimum volume
        assert!(!policy.is_split_allowed(v_min));
        assert!(!policy.is_split_allowed(1.5 * v_min));
        assert!(!policy.is_split_allowed(2.0 * v_min * (1.0 - 1e-4)));
        assert!(policy.is_split_allowed(2.0 * v_min));
        assert!(policy.is_split_allowed(1.01 * v_max));

        // coarse particles are never merge candidates
        assert!(!policy.merge_resolution_check(v_max));
        assert!(!policy.merge_resolution_check(1.3 * v_min));
        assert!(!policy.merge_resolution_check(1.2 * v_min * (1.0 + 1e-4)));
        assert!(policy.merge_resolution_check(1.2 * v_min));
        assert!(policy.merge_resolution_check(v_min));
    }

    #[test]
    fn shape_refinement_levels() {
        use crate::level_set::LevelSetTrait;

        for level in 0..4 {
            let near_surface = Adaptation2d::refinement_near_surface(0.1, 1.3, 1.0, level, unit_square()).unwrap();
            let within_shape = Adaptation2d::refinement_within_shape(0.1, 1.3, 1.0, level, unit_square()).unwrap();
            for adaptation in [near_surface, within_shape] {
                assert_eq!(adaptation.cell_linked_list_total_levels(), level + 1);
                assert_eq!(adaptation.level_set_total_levels(), level + 2);
                assert_ft_approx_eq(
                    adaptation.params().max_smoothing_length_ratio(),
                    (2.0 as FT).powi(level as i32),
                    1e-5,
                    || format!("{} level {}", adaptation.policy().name(), level),
                );

                let level_set = adaptation.create_level_set(&unit_square(), 1.0).unwrap();
                assert_eq!(level_set.total_levels(), level + 2);
            }
        }
    }

    #[test]
    fn splitting_pattern_is_symmetric() {
        let policy = SphAdaptation::<DimensionUtils3d, 3>::split_and_merge(0.1, 1.3, 1.0, 3).unwrap();
        let policy = policy.split_and_merge_policy().unwrap();
        let pos = vec3f(1., 2., 3.);
        let delta = 0.3;
        let a = policy.splitting_pattern(pos, 0.1, delta);
        let b = policy.splitting_pattern(pos, 0.1, delta + crate::floating_type_mod::PI);

        let center = (a + b) * 0.5;
        assert!((center - pos).norm() < 1e-5);
        assert_ft_approx_eq((a - b).norm(), 0.1, 1e-5, || "child distance".into());
        assert_eq!(a.z, 3.);
        assert_eq!(b.z, 3.);
    }

    #[test]
    fn split_then_merge_restores_particle() {
        let mut adaptation = Adaptation2d::split_and_merge(0.1, 1.3, 1.0, 2).unwrap();
        let mut particles = BaseParticles::from_positions(&[vec2f(1., 1.)], 0.01, 1);
        let h_ratio = adaptation.register_smoothing_length_ratio(&mut particles).unwrap();
        let policy = adaptation.split_and_merge_policy().unwrap().clone();
        let generation = particles.bound_generation();

        let child = policy.split_particle(&mut particles, h_ratio, 0, 0.).unwrap();
        assert_eq!(child, 1);
        assert_eq!(particles.total_real_particles(), 2);
        assert!(particles.bound_generation() > generation);
        assert_ft_approx_eq(particles.volume[0], 0.005, 1e-5, || "half volume".into());
        assert_ft_approx_eq(particles.position[0].x, 1.05, 1e-5, || "child 0".into());
        assert_ft_approx_eq(particles.position[1].x, 0.95, 1e-5, || "child 1".into());
        let expected_ratio = 0.1 / (0.005 as FT).sqrt();
        assert_ft_approx_eq(particles.variable(h_ratio)[1], expected_ratio, 1e-4, || "h ratio".into());

        // children are still too large to merge
        assert_eq!(policy.merge_particles(&mut particles, h_ratio, 0, 1), None);

        // split down to the minimum volume and merge two quarters again
        policy.split_particle(&mut particles, h_ratio, 0, 0.5).unwrap();
        assert!(policy.split_particle(&mut particles, h_ratio, 0, 0.5).is_none());
        let merged = policy.merge_particles(&mut particles, h_ratio, 0, 2).unwrap();
        assert_eq!(merged, 0);
        assert_eq!(particles.total_real_particles(), 2);
        assert_ft_approx_eq(particles.volume[0], 0.005, 1e-5, || "merged volume".into());
        assert_ft_approx_eq(particles.position[0].x, 1.05, 1e-5, || "merged center".into());

    }
}
