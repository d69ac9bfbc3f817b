use std::ops::Range;

use rayon::prelude::*;

pub fn par_iter_mut1<T1: Send + Sync, F: Fn(usize, &mut T1) + Send + Sync>(arr1: &mut [T1], f: F) {
    arr1.into_par_iter().enumerate().for_each(|(idx, v1)| {
        f(idx, v1);
    });
}

/**
 * Runs `f` on disjoint blocks of `arr`, one block per worker thread. `f` receives the index
 * range the block covers. Returns after every block has been processed.
 */
pub fn par_for_blocked_range<T: Send, F: Fn(Range<usize>, &mut [T]) + Send + Sync>(arr: &mut [T], f: F) {
    if arr.is_empty() {
        return;
    }
    let block_size = arr.len().div_ceil(rayon::current_num_threads().max(1));
    arr.par_chunks_mut(block_size).enumerate().for_each(|(k, block)| {
        let start = k * block_size;
        f(start..start + block.len(), block);
    });
}

#[test]
fn par_for_blocked_range_visits_each_element() {
    let mut v = vec![0usize; 1031];
    par_for_blocked_range(&mut v, |range, block| {
        for (idx, x) in range.zip(block.iter_mut()) {
            *x += idx + 1;
        }
    });
    assert!(v.iter().enumerate().all(|(i, &x)| x == i + 1));
}

#[test]
fn par_for_blocked_range_passes_matching_ranges() {
    for len in [1, 7, 64, 1000] {
        let mut v = vec![usize::MAX; len];
        par_for_blocked_range(&mut v, |range, block| {
            assert_eq!(range.len(), block.len());
            for (idx, x) in range.zip(block.iter_mut()) {
                assert_eq!(*x, usize::MAX, "element {} visited twice", idx);
                *x = idx;
            }
        });
        assert!(v.iter().enumerate().all(|(i, &x)| x == i));
    }
    par_for_blocked_range(&mut Vec::<usize>::new(), |_, _| panic!("no blocks for empty input"));
}
