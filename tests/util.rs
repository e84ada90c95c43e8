#![allow(dead_code)]
use std::sync::Arc;

use scatter_io::comm::ThreadComm;

/// Run `f` once per rank of a fresh `size`-rank group, one thread per rank.
/// Results come back indexed by rank; a panic on any rank fails the test.
pub fn run_group<T, F>(size: usize, f: F) -> Vec<T>
where
    T: Send + 'static,
    F: Fn(ThreadComm) -> T + Send + Sync + 'static,
{
    let f = Arc::new(f);
    let handles: Vec<_> = ThreadComm::split(size)
        .into_iter()
        .map(|comm| {
            let f = Arc::clone(&f);
            std::thread::spawn(move || f(comm))
        })
        .collect();
    handles
        .into_iter()
        .map(|h| h.join().expect("rank thread panicked"))
        .collect()
}

/// Split `ids` into `parts` chunks at random cut points (chunks may be empty).
pub fn random_split<R: rand::Rng>(rng: &mut R, ids: &[i64], parts: usize) -> Vec<Vec<i64>> {
    let mut cuts: Vec<usize> = (0..parts - 1)
        .map(|_| rng.gen_range(0..=ids.len()))
        .collect();
    cuts.sort_unstable();
    cuts.insert(0, 0);
    cuts.push(ids.len());
    cuts.windows(2).map(|w| ids[w[0]..w[1]].to_vec()).collect()
}
