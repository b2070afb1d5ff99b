// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Property-style coverage over a larger random fixture: every appended
//! vector must be retrievable byte-for-byte, and cosine ranking must return
//! the closest vector to itself first.

use mindb_core::{Dataset, DatasetOptions, ReadMask, SortOrder};
use rand::Rng;
use test_log::test;

const DIM: u32 = 16;
const COUNT: usize = 200;

#[test]
fn random_vectors_round_trip_and_self_ranks_first() -> mindb_core::Result<()> {
    let dir = tempfile::tempdir().expect("tempdir");
    let dataset = Dataset::open(
        dir.path(),
        "notes",
        DatasetOptions::new().vector_size(DIM).max_vector_append_buffer_size(17),
    )?;

    let mut rng = rand::rng();
    let mut vectors = Vec::with_capacity(COUNT);

    for i in 0..COUNT {
        let vector: Vec<f32> = (0..DIM).map(|_| rng.random_range(-1.0..1.0)).collect();
        let appended = dataset.append(mindb_core::NewItem {
            data: i.to_le_bytes().to_vec(),
            data_descriptor: 1,
            vector: Some(vector.clone()),
            ..Default::default()
        })?;
        assert_eq!(i as u64, appended.id);
        vectors.push(vector);
    }

    for (i, vector) in vectors.iter().enumerate() {
        let record = dataset.read(i as u64, ReadMask::VECTOR)?;
        assert_eq!(Some(vector.clone()), record.vector);
    }

    let probe = &vectors[COUNT / 2];
    let ranked = dataset.vector_search(probe, SortOrder::Descending, 1)?;
    assert_eq!((COUNT / 2) as u64, ranked[0].id);
    assert!((ranked[0].score - 1.0).abs() < 1e-4);

    Ok(())
}
