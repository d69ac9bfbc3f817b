use anyhow::{Context, Result};
use log::{debug, info, warn};
use rand::{rngs::StdRng, Rng, SeedableRng};

use sph_adaptation::{
    floating_type_mod::{FT, TAU},
    simulation_parameters::{SceneConfig, SimulationParams},
    BaseParticles, ContactRelation, DimensionUtils, InnerRelation, LevelSetTrait, Neighborhood, RealBody,
    RefinementPolicy, SphAdaptation, VF,
};

// every body gets room for this many times its initial particle count
const BOUND_FACTOR: usize = 2;

fn log_statistics<const D: usize>(label: &str, step: usize, configuration: &[Neighborhood<D>]) {
    if configuration.is_empty() {
        return;
    }
    let (min, max, sum) = configuration.iter().fold((usize::MAX, 0, 0), |(min, max, sum), n| {
        let size = n.current_size();
        (min.min(size), max.max(size), sum + size)
    });
    info!(
        "step {}: {} neighbors min={} max={} avg={:.2}",
        step,
        label,
        min,
        max,
        sum as f64 / configuration.len() as f64
    );
}

fn jitter_positions<const D: usize>(particles: &mut BaseParticles<D>, amplitude: FT, rng: &mut StdRng) {
    let n = particles.total_real_particles();
    for x in &mut particles.position[..n] {
        *x += VF::<D>::from_fn(|_, _| rng.gen_range(-amplitude..=amplitude));
    }
}

/// Splits a few random particles of the subject body, growing its particle bound if needed.
fn split_random_particles<DU: DimensionUtils<D>, const D: usize>(body: &mut RealBody<DU, D>, rng: &mut StdRng) {
    let n = body.particles().total_real_particles();
    if n == 0 {
        return;
    }
    let mut splits = 0;
    for _ in 0..usize::max(1, n / 100) {
        let i = rng.gen_range(0..n);
        if body.split_particle(i, rng.gen_range(0.0..TAU)).is_some() {
            splits += 1;
        }
    }
    debug!("split {} particles of `{}`", splits, body.name());
}

pub fn run_scene<DU: DimensionUtils<D>, const D: usize>(
    params: &SimulationParams,
    scene_config: &SceneConfig,
    steps: usize,
    jitter: FT,
) -> Result<()> {
    let domain_bounds = scene_config.domain_bounds::<D>()?;
    let target_shape = scene_config.target_shape::<D>()?;
    let mut rng = StdRng::seed_from_u64(0);

    let mut bodies = Vec::with_capacity(scene_config.bodies.len());
    for (k, body_config) in scene_config.bodies.iter().enumerate() {
        // only the first body is refined
        let adaptation = if k == 0 {
            SphAdaptation::<DU, D>::from_params(params, target_shape.clone())?
        } else {
            SphAdaptation::<DU, D>::new(params.resolution_ref, params.h_spacing_ratio, params.system_refinement_ratio)?
        };

        let positions = body_config
            .lattice_positions::<D>(adaptation.reference_spacing())
            .with_context(|| format!("invalid body `{}`", body_config.name))?;
        let spacing = body_config.spacing.unwrap_or(adaptation.reference_spacing());
        let particles =
            BaseParticles::from_positions(&positions, spacing.powi(D as i32), BOUND_FACTOR * positions.len());

        let mut body = RealBody::new(&body_config.name, particles, adaptation, domain_bounds);
        if matches!(body.adaptation().policy(), RefinementPolicy::ByShape(_)) {
            body.update_smoothing_length_ratio_by_shape()?;
            body.update_cell_linked_list();
        }
        bodies.push(body);
    }

    let (subject, contacts) = bodies
        .split_first_mut()
        .context("the scene has to contain at least one body")?;

    if let Some(shape) = &target_shape {
        let level_set = subject
            .adaptation()
            .create_level_set(shape, params.level_set_refinement_ratio)?;
        let n = subject.particles().total_real_particles();
        let inside = (0..n)
            .filter(|&i| {
                let x = subject.particles().position[i];
                level_set.probe_signed_distance(x, subject.smoothing_length_ratio(i)) < 0.
            })
            .count();
        info!(
            "level set with {} levels (finest spacing {}), {} of {} particles inside the target shape",
            level_set.total_levels(),
            level_set.finest_spacing(),
            inside,
            n
        );
    }

    let mut inner_relation = InnerRelation::new(subject);
    let mut contact_relation = {
        let contact_bodies: Vec<&RealBody<DU, D>> = contacts.iter().collect();
        ContactRelation::new(subject, &contact_bodies)
    };
    let split_and_merge = subject.adaptation().split_and_merge_policy().is_some();

    for step in 0..steps {
        if split_and_merge {
            split_random_particles(subject, &mut rng);
        }
        let amplitude = jitter.abs() * subject.adaptation().minimum_spacing();
        jitter_positions(subject.particles_mut(), amplitude, &mut rng);
        subject.update_cell_linked_list();
        for contact in contacts.iter_mut() {
            contact.update_cell_linked_list();
        }

        if inner_relation.is_outdated(subject) {
            warn!(
                "particle bound of `{}` changed to {}, resizing relations",
                subject.name(),
                subject.particles().real_particles_bound()
            );
            inner_relation.update_configuration_memories(subject);
        }
        if contact_relation.is_outdated(subject) {
            contact_relation.update_configuration_memories(subject);
        }

        let live = subject.particles().total_real_particles();
        inner_relation.update_configuration(subject)?;
        log_statistics("inner", step, &inner_relation.inner_configuration()[..live]);

        let contact_bodies: Vec<&RealBody<DU, D>> = contacts.iter().collect();
        contact_relation.update_configuration(subject, &contact_bodies)?;
        for (k, name) in contact_relation.contact_names().iter().enumerate() {
            log_statistics(name, step, &contact_relation.contact_configuration(k)[..live]);
        }
    }

    info!(
        "finished {} steps with {} particles in `{}`",
        steps,
        subject.particles().total_real_particles(),
        subject.name()
    );
    Ok(())
}
