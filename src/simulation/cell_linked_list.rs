use std::marker::PhantomData;

use enum_dispatch::enum_dispatch;
use log::debug;

use crate::{bounding_box::BoundingBox, floating_type_mod::FT, sph_kernels::DimensionUtils, EPS, IT, V, VF, VI};

struct Cell {
    particle_ids: Vec<usize>,
}

impl Cell {
    fn new() -> Cell {
        Cell {
            particle_ids: Vec::new(),
        }
    }
}

/**
 * Uniform grid of cells covering the domain bounds. Positions outside the domain are
 * clamped into the boundary cells.
 */
struct CellGrid<const D: usize> {
    lower: VF<D>,
    cell_size: FT,
    size: V<usize, D>,
    cells: Vec<Cell>,
}

impl<const D: usize> CellGrid<D> {
    fn new(bounds: &BoundingBox<D>, cell_size: FT) -> CellGrid<D> {
        let size: V<usize, D> = bounds.size().map(|x| usize::max(1, (x / cell_size).ceil() as usize));
        let num_elements = size.fold(1, |acc, x| acc * x);
        CellGrid {
            lower: bounds.lower,
            cell_size,
            size,
            cells: (0..num_elements).map(|_| Cell::new()).collect(),
        }
    }

    fn cell_pos(&self, position: VF<D>) -> VI<D> {
        let mut cell_pos = VI::<D>::zeros();
        for d in 0..D {
            let x = ((position[d] - self.lower[d]) / self.cell_size).floor();
            // NaN ends up in the first cell
            cell_pos[d] = x.max(0.).min((self.size[d] - 1) as FT) as IT;
        }
        cell_pos
    }

    fn pos_to_idx(&self, cell_pos: VI<D>) -> Option<usize> {
        let mut multiplier = 1;
        let mut idx: usize = 0;
        for d in 0..D {
            if cell_pos[d] < 0 || cell_pos[d] as usize >= self.size[d] {
                return None;
            }
            idx += multiplier * cell_pos[d] as usize;
            multiplier *= self.size[d];
        }
        Some(idx)
    }

    fn clear(&mut self) {
        for cell in &mut self.cells {
            cell.particle_ids.clear();
        }
    }

    fn insert(&mut self, particle_id: usize, position: VF<D>) {
        let cell_pos = self.cell_pos(position);
        if let Some(idx) = self.pos_to_idx(cell_pos) {
            self.cells[idx].particle_ids.push(particle_id);
        }
    }

    /// Every particle within `search_radius` of `position` is visited, plus some farther ones.
    fn for_each_in_range<DU: DimensionUtils<D>>(&self, position: VF<D>, search_radius: FT, f: &mut impl FnMut(usize)) {
        let depth = IT::max(1, (search_radius / self.cell_size).ceil() as IT);
        let center = self.cell_pos(position);
        DU::iterate_grid_neighbors(depth, |offset| {
            if let Some(idx) = self.pos_to_idx(center + offset) {
                for &particle_id in &self.cells[idx].particle_ids {
                    f(particle_id);
                }
            }
        });
    }
}

/**
 * Spatial index of the live particles of one body.
 *
 * `for_each_candidate` visits at least every particle `j` with a distance smaller than
 * `search_radius` or smaller than the cutoff radius of `j` itself. The caller filters the
 * candidates by distance.
 */
#[enum_dispatch]
pub trait CellLinkedListTrait<const D: usize> {
    fn total_levels(&self) -> usize;

    /// Rebuilds the cells from scratch. `h_ratio` is empty for uniform resolution.
    fn update_cell_lists(&mut self, positions: &[VF<D>], h_ratio: &[FT]);

    fn for_each_candidate(&self, position: VF<D>, search_radius: FT, f: impl FnMut(usize));

    /// Number of particles the cells were last built from.
    fn indexed_particles(&self) -> usize;
}

/// Single grid with the reference cutoff radius as cell size.
pub struct CellLinkedList<DU: DimensionUtils<D>, const D: usize> {
    grid: CellGrid<D>,
    indexed_particles: usize,
    _du: PhantomData<DU>,
}

impl<DU: DimensionUtils<D>, const D: usize> CellLinkedList<DU, D> {
    pub fn new(domain_bounds: &BoundingBox<D>, cutoff_radius: FT) -> Self {
        let grid = CellGrid::new(domain_bounds, cutoff_radius);
        debug!("cell linked list with {} cells", grid.cells.len());
        CellLinkedList {
            grid,
            indexed_particles: 0,
            _du: PhantomData,
        }
    }

    pub fn cell_size(&self) -> FT {
        self.grid.cell_size
    }
}

impl<DU: DimensionUtils<D>, const D: usize> CellLinkedListTrait<D> for CellLinkedList<DU, D> {
    fn total_levels(&self) -> usize {
        1
    }

    fn update_cell_lists(&mut self, positions: &[VF<D>], _h_ratio: &[FT]) {
        self.grid.clear();
        for (particle_id, position) in positions.iter().enumerate() {
            self.grid.insert(particle_id, *position);
        }
        self.indexed_particles = positions.len();
    }

    fn for_each_candidate(&self, position: VF<D>, search_radius: FT, mut f: impl FnMut(usize)) {
        self.grid.for_each_in_range::<DU>(position, search_radius, &mut f);
    }

    fn indexed_particles(&self) -> usize {
        self.indexed_particles
    }
}

/**
 * One grid per refinement level, level `l` has the cell size `cutoff / 2^l`. A particle is
 * stored in the finest level whose cells still cover its own cutoff radius.
 */
pub struct MultilevelCellLinkedList<DU: DimensionUtils<D>, const D: usize> {
    levels: Vec<CellGrid<D>>,
    indexed_particles: usize,
    _du: PhantomData<DU>,
}

impl<DU: DimensionUtils<D>, const D: usize> MultilevelCellLinkedList<DU, D> {
    pub fn new(domain_bounds: &BoundingBox<D>, cutoff_radius: FT, total_levels: usize) -> Self {
        assert!(total_levels > 0);
        let levels: Vec<CellGrid<D>> = (0..total_levels)
            .map(|l| CellGrid::new(domain_bounds, cutoff_radius / (2.0 as FT).powi(l as i32)))
            .collect();
        debug!(
            "multilevel cell linked list with {} levels, {} cells on the finest level",
            total_levels,
            levels[total_levels - 1].cells.len()
        );
        MultilevelCellLinkedList {
            levels,
            indexed_particles: 0,
            _du: PhantomData,
        }
    }

    /// Finest level with a cell size of at least `cutoff / h_ratio`.
    pub fn level_of(&self, h_ratio: FT) -> usize {
        let level = FT::floor(FT::max(h_ratio, 1.0).log2() + EPS) as usize;
        usize::min(level, self.levels.len() - 1)
    }

    pub fn cell_size(&self, level: usize) -> FT {
        self.levels[level].cell_size
    }
}

impl<DU: DimensionUtils<D>, const D: usize> CellLinkedListTrait<D> for MultilevelCellLinkedList<DU, D> {
    fn total_levels(&self) -> usize {
        self.levels.len()
    }

    fn update_cell_lists(&mut self, positions: &[VF<D>], h_ratio: &[FT]) {
        for grid in &mut self.levels {
            grid.clear();
        }
        for (particle_id, position) in positions.iter().enumerate() {
            let level = self.level_of(h_ratio.get(particle_id).copied().unwrap_or(1.0));
            self.levels[level].insert(particle_id, *position);
        }
        self.indexed_particles = positions.len();
    }

    fn for_each_candidate(&self, position: VF<D>, search_radius: FT, mut f: impl FnMut(usize)) {
        for grid in &self.levels {
            grid.for_each_in_range::<DU>(position, search_radius, &mut f);
        }
    }

    fn indexed_particles(&self) -> usize {
        self.indexed_particles
    }
}

#[enum_dispatch(CellLinkedListTrait<D>)]
pub enum BaseCellLinkedList<DU: DimensionUtils<D>, const D: usize> {
    CellLinkedList(CellLinkedList<DU, D>),
    MultilevelCellLinkedList(MultilevelCellLinkedList<DU, D>),
}

#[cfg(test)]
use crate::sph_kernels::{DimensionUtils2d, DimensionUtils3d};

#[cfg(test)]
fn rstar_neighbors(positions: &[VF<2>], position: VF<2>, radius: FT) -> Vec<usize> {
    use rstar::{primitives::GeomWithData, RTree};

    let elems: Vec<GeomWithData<[FT; 2], usize>> = positions
        .iter()
        .enumerate()
        .map(|(idx, p)| GeomWithData::new((*p).into(), idx))
        .collect();
    let rtree = RTree::bulk_load(elems);
    let mut result: Vec<usize> = rtree
        .locate_within_distance(position.into(), radius * radius)
        .map(|e| e.data)
        .filter(|&j| (positions[j] - position).norm() < radius)
        .collect();
    result.sort_unstable();
    result
}

#[test]
fn cell_linked_list_finds_all_neighbors() {
    use rand::{Rng, SeedableRng};

    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    let bounds = BoundingBox::new(VF::<2>::zeros(), VF::<2>::repeat(1.));
    let positions: Vec<VF<2>> = (0..400)
        .map(|_| VF::<2>::from_fn(|_, _| rng.gen_range(-0.1..1.1)))
        .collect();

    let cutoff = 0.1;
    let mut cll: BaseCellLinkedList<DimensionUtils2d, 2> = CellLinkedList::new(&bounds, cutoff).into();
    cll.update_cell_lists(&positions, &[]);
    assert_eq!(cll.total_levels(), 1);

    for (i, &x) in positions.iter().enumerate() {
        for radius in [cutoff, 0.25] {
            let mut found = Vec::new();
            cll.for_each_candidate(x, radius, |j| {
                if (positions[j] - x).norm() < radius {
                    found.push(j)
                }
            });
            found.sort_unstable();
            assert_eq!(found, rstar_neighbors(&positions, x, radius), "particle {}", i);
        }
    }
}

#[test]
fn multilevel_cell_linked_list_covers_both_cutoffs() {
    use rand::{Rng, SeedableRng};

    let mut rng = rand::rngs::StdRng::seed_from_u64(11);
    let bounds = BoundingBox::new(VF::<3>::zeros(), VF::<3>::repeat(1.));
    let positions: Vec<VF<3>> = (0..300)
        .map(|_| VF::<3>::from_fn(|_, _| rng.gen_range(0.0..1.0)))
        .collect();
    let h_ratio: Vec<FT> = (0..300).map(|i| [1.0, 2.0, 4.0][i % 3]).collect();

    let cutoff = 0.2;
    let mut cll = MultilevelCellLinkedList::<DimensionUtils3d, 3>::new(&bounds, cutoff, 3);
    assert_eq!(cll.level_of(1.0), 0);
    assert_eq!(cll.level_of(2.0), 1);
    assert_eq!(cll.level_of(3.0), 1);
    assert_eq!(cll.level_of(64.0), 2);
    cll.update_cell_lists(&positions, &h_ratio);

    for (i, &x) in positions.iter().enumerate() {
        let mut candidates = Vec::new();
        cll.for_each_candidate(x, cutoff / h_ratio[i], |j| candidates.push(j));
        candidates.sort_unstable();
        candidates.dedup();

        for (j, &y) in positions.iter().enumerate() {
            let r = (x - y).norm();
            let interaction_radius = cutoff / FT::min(h_ratio[i], h_ratio[j]);
            if r < interaction_radius {
                assert!(candidates.binary_search(&j).is_ok(), "pair {} {} missing", i, j);
            }
        }
    }
}

#[test]
fn base_cell_linked_list_dispatches_and_counts_particles() {
    let bounds = BoundingBox::new(VF::<3>::zeros(), VF::<3>::repeat(1.));
    let positions = [VF::<3>::repeat(0.5), VF::<3>::repeat(0.55), VF::<3>::repeat(0.9)];

    let lists: Vec<BaseCellLinkedList<DimensionUtils3d, 3>> = vec![
        CellLinkedList::new(&bounds, 0.2).into(),
        MultilevelCellLinkedList::new(&bounds, 0.2, 3).into(),
    ];
    for (mut cll, levels) in lists.into_iter().zip([1, 3]) {
        assert_eq!(cll.total_levels(), levels);
        assert_eq!(cll.indexed_particles(), 0);

        cll.update_cell_lists(&positions, &[1.0, 2.0, 4.0]);
        assert_eq!(cll.indexed_particles(), 3);

        let mut candidates = Vec::new();
        cll.for_each_candidate(positions[0], 0.2, |j| candidates.push(j));
        candidates.sort_unstable();
        candidates.dedup();
        assert!(candidates.contains(&0) && candidates.contains(&1));

        cll.update_cell_lists(&positions[..2], &[1.0, 2.0]);
        assert_eq!(cll.indexed_particles(), 2);
    }
}
