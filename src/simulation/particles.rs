use log::{debug, warn};

use crate::{floating_type_mod::FT, VF};

/// Handle of a per-particle scalar variable registered with [`BaseParticles`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VariableId(usize);

#[derive(Debug, Clone)]
struct RegisteredVariable {
    name: String,
    default: FT,
    data: Vec<FT>,
}

/**
 * Particle storage of one body.
 *
 * All arrays span `real_particles_bound` slots, of which the first `total_real_particles` are live.
 * Every change of the bound increments `bound_generation` so that dependent containers can detect
 * that they have to be resized.
 */
#[derive(Debug, Clone)]
pub struct BaseParticles<const D: usize> {
    pub position: Vec<VF<D>>,
    pub volume: Vec<FT>,
    total_real_particles: usize,
    real_particles_bound: usize,
    bound_generation: u64,
    variables: Vec<RegisteredVariable>,
}

impl<const D: usize> BaseParticles<D> {
    pub fn new(bound: usize) -> Self {
        BaseParticles {
            position: vec![VF::<D>::zeros(); bound],
            volume: vec![0.; bound],
            total_real_particles: 0,
            real_particles_bound: bound,
            bound_generation: 0,
            variables: Vec::new(),
        }
    }

    /// Live particles at `position` with uniform `volume`, leaving room for `bound` particles.
    pub fn from_positions(positions: &[VF<D>], volume: FT, bound: usize) -> Self {
        let mut particles = BaseParticles::new(usize::max(bound, positions.len()));
        particles.position[..positions.len()].copy_from_slice(positions);
        for v in &mut particles.volume[..positions.len()] {
            *v = volume;
        }
        particles.total_real_particles = positions.len();
        particles
    }

    pub fn total_real_particles(&self) -> usize {
        self.total_real_particles
    }

    pub fn real_particles_bound(&self) -> usize {
        self.real_particles_bound
    }

    pub fn bound_generation(&self) -> u64 {
        self.bound_generation
    }

    pub fn live_positions(&self) -> &[VF<D>] {
        &self.position[..self.total_real_particles]
    }

    /**
     * Registers a scalar variable that is initialized with `default` for every slot up to the
     * bound. Registering a name twice returns the existing handle.
     */
    pub fn register_variable(&mut self, name: &str, default: FT) -> VariableId {
        if let Some(idx) = self.variables.iter().position(|v| v.name == name) {
            return VariableId(idx);
        }
        debug!("register particle variable `{}` (default {})", name, default);
        self.variables.push(RegisteredVariable {
            name: name.to_string(),
            default,
            data: vec![default; self.real_particles_bound],
        });
        VariableId(self.variables.len() - 1)
    }

    pub fn find_variable(&self, name: &str) -> Option<VariableId> {
        self.variables.iter().position(|v| v.name == name).map(VariableId)
    }

    pub fn variable(&self, id: VariableId) -> &[FT] {
        &self.variables[id.0].data
    }

    pub fn variable_mut(&mut self, id: VariableId) -> &mut [FT] {
        &mut self.variables[id.0].data
    }

    /// Positions and a mutable variable at the same time.
    pub fn positions_and_variable_mut(&mut self, id: VariableId) -> (&[VF<D>], &mut [FT]) {
        (&self.position, &mut self.variables[id.0].data)
    }

    /// Mutable positions, volumes and one variable at the same time.
    pub fn split_variable_mut(&mut self, id: VariableId) -> (&mut [VF<D>], &mut [FT], &mut [FT]) {
        (&mut self.position, &mut self.volume, &mut self.variables[id.0].data)
    }

    /// Grows every array to `new_bound` slots. Shrinking is not supported.
    pub fn increase_bound(&mut self, new_bound: usize) {
        if new_bound <= self.real_particles_bound {
            return;
        }
        self.position.resize(new_bound, VF::<D>::zeros());
        self.volume.resize(new_bound, 0.);
        for v in &mut self.variables {
            v.data.resize(new_bound, v.default);
        }
        self.real_particles_bound = new_bound;
        self.bound_generation += 1;
        debug!("particle bound increased to {}", new_bound);
    }

    /**
     * Appends a live particle and returns its index. The bound is doubled if it is exhausted,
     * which requires every relation of this body to be resized before its next update.
     */
    pub fn add_real_particle(&mut self, position: VF<D>, volume: FT) -> usize {
        if self.total_real_particles == self.real_particles_bound {
            let new_bound = usize::max(2 * self.real_particles_bound, 16);
            warn!(
                "particle bound {} exhausted, growing to {}",
                self.real_particles_bound, new_bound
            );
            self.increase_bound(new_bound);
        }
        let i = self.total_real_particles;
        self.position[i] = position;
        self.volume[i] = volume;
        for v in &mut self.variables {
            v.data[i] = v.default;
        }
        self.total_real_particles += 1;
        i
    }

    /// Copies every per-particle value of slot `from` into slot `to`.
    pub fn copy_particle(&mut self, from: usize, to: usize) {
        self.position[to] = self.position[from];
        self.volume[to] = self.volume[from];
        for v in &mut self.variables {
            v.data[to] = v.data[from];
        }
    }

    /// Removes live particle `i` by moving the last live particle into its slot.
    pub fn remove_real_particle(&mut self, i: usize) {
        assert!(i < self.total_real_particles, "particle {} is not live", i);
        let last = self.total_real_particles - 1;
        if i != last {
            self.copy_particle(last, i);
        }
        self.total_real_particles -= 1;
    }
}

#[test]
fn registered_variables_grow_with_the_bound() {
    use crate::vec2f;

    let mut particles = BaseParticles::<2>::from_positions(&[vec2f(0., 0.), vec2f(1., 0.)], 1., 2);
    let h_ratio = particles.register_variable("SmoothingLengthRatio", 1.0);
    assert_eq!(particles.register_variable("SmoothingLengthRatio", 3.0), h_ratio);
    assert_eq!(particles.find_variable("SmoothingLengthRatio"), Some(h_ratio));
    assert_eq!(particles.variable(h_ratio), &[1.0, 1.0]);

    particles.variable_mut(h_ratio)[1] = 2.0;
    let generation = particles.bound_generation();
    let i = particles.add_real_particle(vec2f(2., 0.), 0.5);

    assert_eq!(i, 2);
    assert_eq!(particles.total_real_particles(), 3);
    assert!(particles.real_particles_bound() >= 3);
    assert!(particles.bound_generation() > generation);
    assert_eq!(particles.variable(h_ratio).len(), particles.real_particles_bound());
    assert_eq!(particles.variable(h_ratio)[1], 2.0);
    assert_eq!(particles.variable(h_ratio)[2], 1.0);
}

#[test]
fn remove_real_particle_swaps_in_last() {
    use crate::vec2f;

    let mut particles = BaseParticles::<2>::from_positions(&[vec2f(0., 0.), vec2f(1., 0.), vec2f(2., 0.)], 1., 4);
    particles.remove_real_particle(0);
    assert_eq!(particles.total_real_particles(), 2);
    assert_eq!(particles.live_positions(), &[vec2f(2., 0.), vec2f(1., 0.)]);
    assert_eq!(particles.real_particles_bound(), 4);
}
