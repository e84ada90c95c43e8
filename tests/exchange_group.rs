//! Multi-rank exchange tests: one thread per rank over `ThreadComm`.

mod util;
use util::*;

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use scatter_io::comm::Communicator;
use scatter_io::decomp::{create_decomp, transfer_field, Direction, IoPolicy};
use scatter_io::error::ErrorKind;
use scatter_io::wire;

fn id_bytes(ids: &[i64]) -> Vec<u8> {
    wire::cast_slice(ids).to_vec()
}

#[test]
fn single_rank_round_trip() {
    let results = run_group(1, |comm| {
        let compute_ids = [0i64, 1, 2, 3];
        let decomp = create_decomp(&comm, &compute_ids, IoPolicy::new(1, 1)).unwrap();
        assert_eq!(decomp.io_start(), 0);
        assert_eq!(decomp.io_count(), 4);
        assert_eq!(decomp.comp_list().len(), 4);
        assert_eq!(decomp.io_list().len(), 4);

        let input = id_bytes(&[10, 20, 30, 40]);
        let mut io_buf = vec![0u8; 32];
        transfer_field(&comm, &decomp, Direction::CompToIo, 8, &input, &mut io_buf).unwrap();
        let mut back = vec![0u8; 32];
        transfer_field(&comm, &decomp, Direction::IoToComp, 8, &io_buf, &mut back).unwrap();
        back == input
    });
    assert!(results[0]);
}

/// Interleaved compute layout: rank r holds r, r+4, r+8, r+12.
#[test]
fn interleaved_layout_lands_element_sorted_on_io_ranks() {
    let results = run_group(4, |comm| {
        let r = comm.rank() as i64;
        let compute_ids = [r, r + 4, r + 8, r + 12];
        let decomp = create_decomp(&comm, &compute_ids, IoPolicy::new(2, 2)).unwrap();

        let input = id_bytes(&compute_ids);
        let mut io_buf = vec![0u8; decomp.io_count() as usize * 8];
        transfer_field(&comm, &decomp, Direction::CompToIo, 8, &input, &mut io_buf).unwrap();
        (decomp.io_start(), decomp.io_count(), io_buf)
    });

    assert_eq!(results[0].0, 0);
    assert_eq!(results[0].1, 8);
    assert_eq!(results[0].2, id_bytes(&(0..8).collect::<Vec<i64>>()));
    assert_eq!(results[1].1, 0);
    assert_eq!(results[2].0, 8);
    assert_eq!(results[2].1, 8);
    assert_eq!(results[2].2, id_bytes(&(8..16).collect::<Vec<i64>>()));
    assert_eq!(results[3].1, 0);
}

/// Contiguous compute layout, same policy: identical I/O-side contents.
#[test]
fn contiguous_layout_lands_element_sorted_on_io_ranks() {
    let results = run_group(4, |comm| {
        let r = comm.rank() as i64;
        let compute_ids = [4 * r, 4 * r + 1, 4 * r + 2, 4 * r + 3];
        let decomp = create_decomp(&comm, &compute_ids, IoPolicy::new(2, 2)).unwrap();

        let input = id_bytes(&compute_ids);
        let mut io_buf = vec![0u8; decomp.io_count() as usize * 8];
        transfer_field(&comm, &decomp, Direction::CompToIo, 8, &input, &mut io_buf).unwrap();
        (decomp.io_start(), decomp.io_count(), io_buf)
    });

    assert_eq!(results[0].2, id_bytes(&(0..8).collect::<Vec<i64>>()));
    assert_eq!(results[2].2, id_bytes(&(8..16).collect::<Vec<i64>>()));
}

#[test]
fn oversubscribed_policy_fails_on_every_rank() {
    let results = run_group(4, |comm| {
        let r = comm.rank() as i64;
        create_decomp(&comm, &[r], IoPolicy::new(3, 2))
            .unwrap_err()
            .kind()
    });
    for kind in results {
        assert_eq!(kind, ErrorKind::InvalidArgument);
    }
}

#[test]
fn duplicate_compute_id_fails_construction() {
    let results = run_group(4, |comm| {
        let r = comm.rank() as i64;
        // Rank 1 holds element 0 a second time instead of element 7.
        let compute_ids = if comm.rank() == 1 {
            [4, 5, 6, 0]
        } else {
            [4 * r, 4 * r + 1, 4 * r + 2, 4 * r + 3]
        };
        create_decomp(&comm, &compute_ids, IoPolicy::new(2, 2)).err()
    });
    let failures: Vec<_> = results.into_iter().flatten().collect();
    assert!(!failures.is_empty());
    for err in failures {
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}

/// Round-trip identity over randomized layouts, group sizes and element
/// sizes. The transfer engine never looks at the bytes, so any content must
/// survive compute -> I/O -> compute unchanged.
#[test]
fn random_round_trips_across_group_sizes_and_element_sizes() {
    for size in [1usize, 2, 4, 8, 16] {
        for esize in [1usize, 4, 8, 37, 1024] {
            let mut rng = StdRng::seed_from_u64(size as u64 * 10_007 + esize as u64);

            let n_global = rng.gen_range(0..200usize);
            let mut ids: Vec<i64> = (0..n_global as i64).collect();
            ids.shuffle(&mut rng);
            let chunks = random_split(&mut rng, &ids, size);

            let num_io_tasks = rng.gen_range(1..=size);
            let io_stride = rng.gen_range(1..=size / num_io_tasks);
            let policy = IoPolicy::new(num_io_tasks, io_stride);

            let payloads: Vec<Vec<u8>> = chunks
                .iter()
                .map(|c| (0..c.len() * esize).map(|_| rng.gen()).collect())
                .collect();

            let chunks = Arc::new(chunks);
            let payloads = Arc::new(payloads);
            let results = run_group(size, move |comm| {
                let r = comm.rank();
                let decomp = create_decomp(&comm, &chunks[r], policy).unwrap();

                let mut io_buf = vec![0u8; decomp.io_count() as usize * esize];
                transfer_field(
                    &comm,
                    &decomp,
                    Direction::CompToIo,
                    esize,
                    &payloads[r],
                    &mut io_buf,
                )
                .unwrap();
                let mut back = vec![0u8; payloads[r].len()];
                transfer_field(&comm, &decomp, Direction::IoToComp, esize, &io_buf, &mut back)
                    .unwrap();
                back == payloads[r]
            });
            assert!(
                results.iter().all(|&ok| ok),
                "round trip failed for size {size}, element size {esize}"
            );
        }
    }
}

/// Two transfers through the same handle with the same input agree.
#[test]
fn repeated_transfers_are_identical() {
    let results = run_group(4, |comm| {
        let r = comm.rank() as i64;
        let compute_ids = [r, r + 4, r + 8, r + 12];
        let decomp = create_decomp(&comm, &compute_ids, IoPolicy::new(4, 1)).unwrap();

        let input = id_bytes(&compute_ids);
        let mut first = vec![0u8; decomp.io_count() as usize * 8];
        transfer_field(&comm, &decomp, Direction::CompToIo, 8, &input, &mut first).unwrap();
        let mut second = vec![0u8; first.len()];
        transfer_field(&comm, &decomp, Direction::CompToIo, 8, &input, &mut second).unwrap();
        first == second
    });
    assert!(results.into_iter().all(|ok| ok));
}

/// Ranks that hold no compute elements still take part in the collective.
#[test]
fn empty_compute_rank_participates() {
    let results = run_group(2, |comm| {
        let compute_ids: Vec<i64> = if comm.rank() == 0 {
            (0..6).collect()
        } else {
            Vec::new()
        };
        let decomp = create_decomp(&comm, &compute_ids, IoPolicy::new(2, 1)).unwrap();

        let input = id_bytes(&compute_ids);
        let mut io_buf = vec![0u8; decomp.io_count() as usize * 8];
        transfer_field(&comm, &decomp, Direction::CompToIo, 8, &input, &mut io_buf).unwrap();
        (decomp.io_start(), decomp.io_count(), io_buf)
    });

    // Six elements split 3/3 across the two I/O ranks.
    assert_eq!(results[0].0, 0);
    assert_eq!(results[0].1, 3);
    assert_eq!(results[0].2, id_bytes(&[0, 1, 2]));
    assert_eq!(results[1].0, 3);
    assert_eq!(results[1].1, 3);
    assert_eq!(results[1].2, id_bytes(&[3, 4, 5]));
}
