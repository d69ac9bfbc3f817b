/*!
Signed distance fields sampled on node grids.

The fields are probed instead of the analytic shapes whenever a distance is needed per particle.
The node grid extends two cells beyond the bounds of the shape.
*/

use enum_dispatch::enum_dispatch;
use log::debug;

use crate::{
    bounding_box::BoundingBox, concurrency::par_iter_mut1, floating_type_mod::FT, sdf::Sdf, EPS, V, VF,
};

const PADDING_CELLS: usize = 2;

#[derive(Debug, Clone)]
pub struct LevelSet<const D: usize> {
    lower: VF<D>,
    spacing: FT,
    // number of nodes per axis
    size: V<usize, D>,
    phi: Vec<FT>,
}

impl<const D: usize> LevelSet<D> {
    fn empty(lower: VF<D>, spacing: FT, size: V<usize, D>) -> Self {
        let num_nodes = size.fold(1, |acc, x| acc * x);
        LevelSet {
            lower,
            spacing,
            size,
            phi: vec![0.; num_nodes],
        }
    }

    /// Samples `shape` on a grid with the given spacing.
    pub fn new(bounds: &BoundingBox<D>, spacing: FT, shape: &Sdf<D>) -> Self {
        assert!(spacing > 0.);
        let lower = bounds.lower.map(|x| x - PADDING_CELLS as FT * spacing);
        let size: V<usize, D> = bounds
            .size()
            .map(|x| (x / spacing - EPS).ceil().max(0.) as usize + 2 * PADDING_CELLS + 1);

        let mut level_set = Self::empty(lower, spacing, size);
        let (lower, size) = (level_set.lower, level_set.size);
        par_iter_mut1(&mut level_set.phi, |idx, phi| {
            *phi = shape.signed_distance(node_position(lower, spacing, size, idx));
        });
        debug!("level set with spacing {} and {} nodes", spacing, level_set.phi.len());
        level_set
    }

    /**
     * Halves the spacing of `coarse`. Nodes close to the interface are sampled from `shape`,
     * all others are interpolated from the coarse field.
     */
    pub fn refined(coarse: &LevelSet<D>, shape: &Sdf<D>) -> Self {
        let spacing = 0.5 * coarse.spacing;
        let size = coarse.size.map(|n| 2 * n - 1);
        let band = 2. * coarse.spacing;

        let mut level_set = Self::empty(coarse.lower, spacing, size);
        let lower = level_set.lower;
        par_iter_mut1(&mut level_set.phi, |idx, phi| {
            let x = node_position(lower, spacing, size, idx);
            let interpolated = coarse.interpolate(x);
            *phi = if interpolated.abs() < band {
                shape.signed_distance(x)
            } else {
                interpolated
            };
        });
        debug!("refined level set to spacing {}", spacing);
        level_set
    }

    pub fn spacing(&self) -> FT {
        self.spacing
    }

    pub fn bounds(&self) -> BoundingBox<D> {
        BoundingBox::new(
            self.lower,
            self.lower + self.size.map(|n| (n - 1) as FT * self.spacing),
        )
    }

    fn node_index(&self, node: V<usize, D>) -> usize {
        let mut multiplier = 1;
        let mut idx = 0;
        for d in 0..D {
            idx += multiplier * node[d];
            multiplier *= self.size[d];
        }
        idx
    }

    /// Multilinear interpolation. Outside of the grid the distance to the grid is added.
    fn interpolate(&self, x: VF<D>) -> FT {
        let grid_bounds = self.bounds();
        let mut clamped = x;
        let mut base = V::<usize, D>::zeros();
        let mut t = VF::<D>::zeros();
        for d in 0..D {
            clamped[d] = x[d].max(grid_bounds.lower[d]).min(grid_bounds.upper[d]);
            let local = (clamped[d] - self.lower[d]) / self.spacing;
            let cell = (local.floor().max(0.) as usize).min(self.size[d] - 2);
            base[d] = cell;
            t[d] = (local - cell as FT).max(0.).min(1.);
        }

        let mut value = 0.;
        for corner in 0..(1usize << D) {
            let mut weight = 1.;
            let mut node = base;
            for d in 0..D {
                if corner & (1 << d) != 0 {
                    node[d] += 1;
                    weight *= t[d];
                } else {
                    weight *= 1. - t[d];
                }
            }
            value += weight * self.phi[self.node_index(node)];
        }

        value + (x - clamped).norm()
    }

    fn interpolated_normal(&self, x: VF<D>) -> VF<D> {
        let eps = 0.5 * self.spacing;
        let gradient = VF::<D>::from_iterator((0..D).map(|i| {
            let mut xp = x;
            let mut xn = x;
            xp[i] += eps;
            xn[i] -= eps;
            (self.interpolate(xp) - self.interpolate(xn)) / (2. * eps)
        }));
        let norm = gradient.norm();
        if norm > 0. {
            gradient / norm
        } else {
            gradient
        }
    }
}

fn node_position<const D: usize>(lower: VF<D>, spacing: FT, size: V<usize, D>, mut idx: usize) -> VF<D> {
    let mut x = lower;
    for d in 0..D {
        x[d] += (idx % size[d]) as FT * spacing;
        idx /= size[d];
    }
    x
}

/**
 * Stack of level sets, level `l` has the spacing `reference_spacing / 2^l`. Each level is
 * refined from the previous one.
 */
#[derive(Debug, Clone)]
pub struct MultilevelLevelSet<const D: usize> {
    levels: Vec<LevelSet<D>>,
}

impl<const D: usize> MultilevelLevelSet<D> {
    pub fn new(bounds: &BoundingBox<D>, reference_spacing: FT, total_levels: usize, shape: &Sdf<D>) -> Self {
        assert!(total_levels > 0);
        let mut levels = Vec::with_capacity(total_levels);
        levels.push(LevelSet::new(bounds, reference_spacing, shape));
        for l in 1..total_levels {
            let finer = LevelSet::refined(&levels[l - 1], shape);
            levels.push(finer);
        }
        MultilevelLevelSet { levels }
    }

    pub fn level(&self, level: usize) -> &LevelSet<D> {
        &self.levels[level]
    }

    pub fn finest(&self) -> &LevelSet<D> {
        &self.levels[self.levels.len() - 1]
    }

    /// Level used for particles with the given smoothing length ratio.
    pub fn level_of(&self, h_ratio: FT) -> usize {
        let level = FT::floor(FT::max(h_ratio, 1.0).log2() + EPS) as usize + 1;
        usize::min(level, self.levels.len() - 1)
    }
}

#[enum_dispatch]
pub trait LevelSetTrait<const D: usize> {
    fn total_levels(&self) -> usize;

    fn finest_spacing(&self) -> FT;

    /// Signed distance for a particle with the given smoothing length ratio (negative inside).
    fn probe_signed_distance(&self, position: VF<D>, h_ratio: FT) -> FT;

    /// Normalized gradient of the signed distance.
    fn probe_normal(&self, position: VF<D>, h_ratio: FT) -> VF<D>;
}

impl<const D: usize> LevelSetTrait<D> for LevelSet<D> {
    fn total_levels(&self) -> usize {
        1
    }

    fn finest_spacing(&self) -> FT {
        self.spacing
    }

    fn probe_signed_distance(&self, position: VF<D>, _h_ratio: FT) -> FT {
        self.interpolate(position)
    }

    fn probe_normal(&self, position: VF<D>, _h_ratio: FT) -> VF<D> {
        self.interpolated_normal(position)
    }
}

impl<const D: usize> LevelSetTrait<D> for MultilevelLevelSet<D> {
    fn total_levels(&self) -> usize {
        self.levels.len()
    }

    fn finest_spacing(&self) -> FT {
        self.finest().spacing
    }

    fn probe_signed_distance(&self, position: VF<D>, h_ratio: FT) -> FT {
        self.levels[self.level_of(h_ratio)].interpolate(position)
    }

    fn probe_normal(&self, position: VF<D>, h_ratio: FT) -> VF<D> {
        self.levels[self.level_of(h_ratio)].interpolated_normal(position)
    }
}

#[enum_dispatch(LevelSetTrait<D>)]
#[derive(Debug, Clone)]
pub enum BaseLevelSet<const D: usize> {
    LevelSet(LevelSet<D>),
    MultilevelLevelSet(MultilevelLevelSet<D>),
}

#[test]
fn level_set_approximates_ball() {
    use crate::{sdf::SdfBall, vec2f};

    let shape: Sdf<2> = SdfBall::new(vec2f(0.5, 0.5), 0.3).into();
    let level_set = LevelSet::new(&shape.bounds(), 0.02, &shape);
    assert!(level_set.bounds().contains(vec2f(0.16, 0.16)));

    for x in [vec2f(0.5, 0.5), vec2f(0.8, 0.5), vec2f(0.5, 0.25), vec2f(0.9, 0.9)] {
        let exact = shape.signed_distance(x);
        crate::assert_ft_approx_eq(level_set.probe_signed_distance(x, 1.0), exact, 0.01, || format!("{:?}", x));
    }

    // far outside the grid the distance keeps growing
    assert!(level_set.probe_signed_distance(vec2f(5., 0.5), 1.0) > 4.);

    let normal = level_set.probe_normal(vec2f(0.8, 0.5), 1.0);
    crate::assert_ft_approx_eq(normal.x, 1., 0.01, || "normal x".into());
    crate::assert_ft_approx_eq(normal.y, 0., 0.01, || "normal y".into());
}

#[test]
fn refined_level_set_is_exact_near_interface() {
    use crate::{sdf::SdfBox, vec3f};

    let shape: Sdf<3> = SdfBox::new(vec3f(0., 0., 0.), vec3f(1., 1., 1.)).into();
    let coarse = LevelSet::new(&shape.bounds(), 0.25, &shape);
    let fine = LevelSet::refined(&coarse, &shape);
    crate::assert_ft_approx_eq(fine.spacing(), 0.125, 1e-6, || "spacing".into());
    assert_eq!(fine.bounds(), coarse.bounds());

    // node on the surface of the box
    let x = vec3f(1.0, 0.5, 0.5);
    crate::assert_ft_approx_eq(fine.probe_signed_distance(x, 1.0), 0., 1e-5, || "surface".into());
    let x = vec3f(0.5, 0.5, 0.5);
    crate::assert_ft_approx_eq(fine.probe_signed_distance(x, 1.0), -0.5, 1e-5, || "center".into());
}

#[test]
fn multilevel_level_set_picks_level_by_ratio() {
    use crate::{sdf::SdfBall, vec2f};

    let shape: Sdf<2> = SdfBall::new(vec2f(0., 0.), 1.).into();
    let level_set: BaseLevelSet<2> = MultilevelLevelSet::new(&shape.bounds(), 0.2, 4, &shape).into();
    assert_eq!(level_set.total_levels(), 4);
    crate::assert_ft_approx_eq(level_set.finest_spacing(), 0.025, 1e-6, || "finest".into());

    if let BaseLevelSet::MultilevelLevelSet(multilevel) = &level_set {
        assert_eq!(multilevel.level_of(1.0), 1);
        assert_eq!(multilevel.level_of(2.0), 2);
        assert_eq!(multilevel.level_of(4.0), 3);
        assert_eq!(multilevel.level_of(100.0), 3);
        crate::assert_ft_approx_eq(multilevel.level(2).spacing(), 0.05, 1e-6, || "level 2".into());
    } else {
        unreachable!();
    }

    let d = level_set.probe_signed_distance(vec2f(0.5, 0.), 4.0);
    crate::assert_ft_approx_eq(d, -0.5, 0.01, || "inside".into());
}
