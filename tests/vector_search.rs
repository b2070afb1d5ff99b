// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Brute-force cosine vector search.

use mindb_core::{Dataset, DatasetOptions, Error, NewItem, SortOrder};
use test_log::test;

#[test]
fn ranks_by_descending_cosine_similarity() -> mindb_core::Result<()> {
    let dir = tempfile::tempdir().expect("tempdir");
    let dataset = Dataset::open(dir.path(), "notes", DatasetOptions::new().vector_size(2))?;

    let a = dataset.append(NewItem { data_descriptor: 1, vector: Some(vec![1.0, 0.0]), ..Default::default() })?;
    let b = dataset.append(NewItem { data_descriptor: 1, vector: Some(vec![0.9, 0.1]), ..Default::default() })?;
    dataset.append(NewItem { data_descriptor: 1, vector: Some(vec![0.0, 1.0]), ..Default::default() })?;
    // No vector at all: must be excluded from the candidate set entirely.
    dataset.append(NewItem { data_descriptor: 1, ..Default::default() })?;

    let ranked = dataset.vector_search(&[1.0, 0.0], SortOrder::Descending, 0)?;

    assert_eq!(3, ranked.len());
    assert_eq!(a.id, ranked[0].id);
    assert_eq!(b.id, ranked[1].id);

    Ok(())
}

#[test]
fn limit_truncates_results() -> mindb_core::Result<()> {
    let dir = tempfile::tempdir().expect("tempdir");
    let dataset = Dataset::open(dir.path(), "notes", DatasetOptions::new().vector_size(1))?;

    for i in 0..5 {
        dataset.append(NewItem { data_descriptor: 1, vector: Some(vec![i as f32]), ..Default::default() })?;
    }

    let ranked = dataset.vector_search(&[1.0], SortOrder::Descending, 2)?;
    assert_eq!(2, ranked.len());

    Ok(())
}

#[test]
fn query_dimension_mismatch_errors() -> mindb_core::Result<()> {
    let dir = tempfile::tempdir().expect("tempdir");
    let dataset = Dataset::open(dir.path(), "notes", DatasetOptions::new().vector_size(3))?;
    dataset.append(NewItem { data_descriptor: 1, vector: Some(vec![1.0, 0.0, 0.0]), ..Default::default() })?;

    let result = dataset.vector_search(&[1.0, 0.0], SortOrder::Descending, 0);
    assert!(matches!(result, Err(Error::VectorDimensionMismatch { .. })));

    Ok(())
}

#[test]
fn set_vector_replaces_an_existing_vector_in_place() -> mindb_core::Result<()> {
    let dir = tempfile::tempdir().expect("tempdir");
    let dataset = Dataset::open(dir.path(), "notes", DatasetOptions::new().vector_size(2))?;

    let appended = dataset.append(NewItem { data_descriptor: 1, vector: Some(vec![1.0, 0.0]), ..Default::default() })?;
    dataset.set_vector(appended.id, &[0.0, 1.0])?;

    let record = dataset.read(appended.id, mindb_core::ReadMask::VECTOR)?;
    assert_eq!(Some(vec![0.0, 1.0]), record.vector);

    Ok(())
}

#[test]
fn set_vector_appends_when_record_had_none() -> mindb_core::Result<()> {
    let dir = tempfile::tempdir().expect("tempdir");
    let dataset = Dataset::open(dir.path(), "notes", DatasetOptions::new().vector_size(2))?;

    let appended = dataset.append(NewItem { data_descriptor: 1, ..Default::default() })?;
    dataset.set_vector(appended.id, &[0.5, 0.5])?;

    let record = dataset.read(appended.id, mindb_core::ReadMask::VECTOR)?;
    assert_eq!(Some(vec![0.5, 0.5]), record.vector);

    Ok(())
}
