use crate::{error::SphError, floating_type_mod::FT, VF};

/// One neighbor `j` of particle `i`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeighborEntry<const D: usize> {
    pub j: usize,
    pub w_ij: FT,
    /// dW/dr
    pub dw_ij: FT,
    pub r_ij: FT,
    /// unit vector from `j` to `i`, zero for coincident particles
    pub e_ij: VF<D>,
}

/**
 * Neighbor list of a single particle.
 *
 * Entries at and beyond `current_size` are stale. Their storage is kept between rebuilds so that
 * a rebuild does not allocate in the common case.
 */
#[derive(Debug, Clone, Default)]
pub struct Neighborhood<const D: usize> {
    current_size: usize,
    entries: Vec<NeighborEntry<D>>,
}

impl<const D: usize> Neighborhood<D> {
    pub fn new() -> Self {
        Neighborhood {
            current_size: 0,
            entries: Vec::new(),
        }
    }

    pub fn current_size(&self) -> usize {
        self.current_size
    }

    pub fn allocated_size(&self) -> usize {
        self.entries.len()
    }

    pub fn reset(&mut self) {
        self.current_size = 0;
    }

    pub fn push_entry(&mut self, entry: NeighborEntry<D>) {
        if self.current_size < self.entries.len() {
            self.entries[self.current_size] = entry;
        } else {
            self.entries.push(entry);
        }
        self.current_size += 1;
    }

    pub fn entry(&self, n: usize) -> Result<&NeighborEntry<D>, SphError> {
        if n >= self.current_size {
            return Err(SphError::StaleNeighborhoodRead {
                index: n,
                current_size: self.current_size,
            });
        }
        Ok(&self.entries[n])
    }

    pub fn entries(&self) -> &[NeighborEntry<D>] {
        &self.entries[..self.current_size]
    }

    pub fn iter(&self) -> impl Iterator<Item = &NeighborEntry<D>> + '_ {
        self.entries().iter()
    }
}

#[test]
fn stale_entries_are_not_readable() {
    let entry = |j| NeighborEntry::<2> {
        j,
        w_ij: 1.,
        dw_ij: -1.,
        r_ij: 0.5,
        e_ij: crate::vec2f(1., 0.),
    };

    let mut neighborhood = Neighborhood::<2>::new();
    neighborhood.push_entry(entry(3));
    neighborhood.push_entry(entry(4));
    assert_eq!(neighborhood.current_size(), 2);
    assert_eq!(neighborhood.entry(1).unwrap().j, 4);

    neighborhood.reset();
    assert_eq!(neighborhood.iter().count(), 0);
    assert!(matches!(
        neighborhood.entry(0),
        Err(SphError::StaleNeighborhoodRead {
            index: 0,
            current_size: 0
        })
    ));

    // storage is reused
    neighborhood.push_entry(entry(7));
    assert_eq!(neighborhood.allocated_size(), 2);
    assert_eq!(neighborhood.iter().map(|e| e.j).collect::<Vec<_>>(), vec![7]);
    assert!(neighborhood.entry(1).unwrap_err().is_consistency_error());
}
