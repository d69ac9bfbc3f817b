use crate::{
    floating_type_mod::{FT, PI},
    particles::{BaseParticles, VariableId},
    EPS, VF,
};

/**
 * Adaptive resolution by splitting large particles and merging small ones.
 *
 * The particle volume is tracked by the particle storage; the policy only holds the volume bounds
 * derived from the minimum and reference spacing. Volume comparisons are relative to the compared
 * threshold.
 */
#[derive(Debug, Clone, Default)]
pub struct SplitAndMerge {
    minimum_volume: FT,
    maximum_volume: FT,
    spacing_ref: FT,
}

impl SplitAndMerge {
    pub(super) fn reset_volumes<const D: usize>(&mut self, spacing_min: FT, spacing_ref: FT) {
        self.minimum_volume = spacing_min.powi(D as i32);
        self.maximum_volume = spacing_ref.powi(D as i32);
        self.spacing_ref = spacing_ref;
    }

    pub fn minimum_volume(&self) -> FT {
        self.minimum_volume
    }

    pub fn maximum_volume(&self) -> FT {
        self.maximum_volume
    }

    /// Both halves of a split particle still have to meet the minimum volume.
    pub fn is_split_allowed(&self, current_volume: FT) -> bool {
        let threshold = 2.0 * self.minimum_volume;
        current_volume - threshold > -EPS * threshold
    }

    /// Only particles close to the finest volume are merge candidates.
    pub fn merge_resolution_check(&self, volume: FT) -> bool {
        let threshold = 1.2 * self.minimum_volume;
        volume - threshold < EPS * threshold
    }

    /**
     * Child position for a split at angle `delta`. The displacement lies in the plane of the first
     * two axes, every other coordinate is kept.
     */
    pub fn splitting_pattern<const D: usize>(&self, pos: VF<D>, particle_spacing: FT, delta: FT) -> VF<D> {
        let mut child = pos;
        child[0] += 0.5 * particle_spacing * delta.cos();
        child[1] += 0.5 * particle_spacing * delta.sin();
        child
    }

    fn smoothing_length_ratio_for_volume<const D: usize>(&self, volume: FT) -> FT {
        self.spacing_ref / volume.powf(1.0 / D as FT)
    }

    /**
     * Splits live particle `i` into two halves placed at angles `delta` and `delta + PI`
     * around its old position. Returns the index of the new particle.
     *
     * The particle bound may grow, in which case relations of this body need a resize.
     */
    pub fn split_particle<const D: usize>(
        &self,
        particles: &mut BaseParticles<D>,
        h_ratio: VariableId,
        i: usize,
        delta: FT,
    ) -> Option<usize> {
        assert!(i < particles.total_real_particles(), "particle {} is not live", i);
        let volume = particles.volume[i];
        if !self.is_split_allowed(volume) {
            return None;
        }

        let particle_spacing = volume.powf(1.0 / D as FT);
        let position = particles.position[i];
        let child_volume = 0.5 * volume;
        let child_h_ratio = self.smoothing_length_ratio_for_volume::<D>(child_volume);

        let j = particles.add_real_particle(position, child_volume);
        particles.copy_particle(i, j);

        particles.position[i] = self.splitting_pattern(position, particle_spacing, delta);
        particles.position[j] = self.splitting_pattern(position, particle_spacing, delta + PI);
        for k in [i, j] {
            particles.volume[k] = child_volume;
            particles.variable_mut(h_ratio)[k] = child_h_ratio;
        }

        Some(j)
    }

    /**
     * Merges live particle `j` into live particle `i` at their volume weighted center. Returns
     * the index of the merged particle (it moves if `i` was the last live particle) or `None` if
     * the pair is not admissible.
     */
    pub fn merge_particles<const D: usize>(
        &self,
        particles: &mut BaseParticles<D>,
        h_ratio: VariableId,
        i: usize,
        j: usize,
    ) -> Option<usize> {
        let n = particles.total_real_particles();
        assert!(i < n && j < n, "merge partners have to be live");
        if i == j {
            return None;
        }

        let (volume_i, volume_j) = (particles.volume[i], particles.volume[j]);
        let merged_volume = volume_i + volume_j;
        if !self.merge_resolution_check(volume_i)
            || !self.merge_resolution_check(volume_j)
            || merged_volume - self.maximum_volume > EPS * self.maximum_volume
        {
            return None;
        }

        let (position, volume, h) = particles.split_variable_mut(h_ratio);
        position[i] = (position[i] * volume_i + position[j] * volume_j) / merged_volume;
        volume[i] = merged_volume;
        h[i] = self.smoothing_length_ratio_for_volume::<D>(merged_volume).max(1.0);

        let merged = if i == n - 1 { j } else { i };
        particles.remove_real_particle(j);
        Some(merged)
    }
}
