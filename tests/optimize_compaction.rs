// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Scenario S3: soft-delete then `optimize`, including tag remapping to the
//! new dense id space.

use mindb_core::{Dataset, DatasetOptions, NewItem, ReadMask};
use test_log::test;

#[test]
fn optimize_drops_deleted_rows_and_compacts() -> mindb_core::Result<()> {
    let dir = tempfile::tempdir().expect("tempdir");
    let dataset = Dataset::open(dir.path(), "notes", DatasetOptions::new().vector_size(1))?;

    for i in 0..4u8 {
        dataset.append(NewItem { data: vec![i], data_descriptor: 1, ..Default::default() })?;
    }

    dataset.add_tags(0, &["zero".to_string()])?;
    dataset.add_tags(3, &["three".to_string()])?;

    dataset.delete(1)?;
    dataset.delete(2)?;

    dataset.optimize()?;

    assert_eq!(2, dataset.count()?);
    assert_eq!(Some(vec![0]), dataset.read(0, ReadMask::DATA)?.data);
    assert_eq!(Some(vec![3]), dataset.read(1, ReadMask::DATA)?.data);

    let tagged_zero = dataset.read(0, ReadMask::TAGS)?.tags.unwrap();
    assert_eq!(vec!["zero".to_string()], tagged_zero);

    let tagged_three = dataset.read(1, ReadMask::TAGS)?.tags.unwrap();
    assert_eq!(vec!["three".to_string()], tagged_three);

    Ok(())
}

#[test]
fn optimize_leaves_no_surviving_row_marked_for_removal() -> mindb_core::Result<()> {
    let dir = tempfile::tempdir().expect("tempdir");
    let dataset = Dataset::open(dir.path(), "notes", DatasetOptions::new().vector_size(1))?;

    for i in 0..6u8 {
        dataset.append(NewItem { data: vec![i], data_descriptor: 1, ..Default::default() })?;
    }
    dataset.delete(2)?;
    dataset.delete(4)?;

    dataset.optimize()?;

    assert_eq!(4, dataset.count()?);
    for id in 0..4 {
        let record = dataset.read(id, ReadMask::NONE)?;
        assert_eq!(0, record.flags & mindb_core::MARKED_FOR_REMOVAL);
    }

    Ok(())
}

#[test]
fn optimize_remaps_group_membership_to_new_ids() -> mindb_core::Result<()> {
    let dir = tempfile::tempdir().expect("tempdir");
    let dataset = Dataset::open(dir.path(), "notes", DatasetOptions::new().vector_size(1))?;

    let a = dataset.append(NewItem { data: vec![0], data_descriptor: 1, group_id: -1, place: 0, ..Default::default() })?;
    let group_id = a.group_id.unwrap();

    dataset.append(NewItem { data: vec![1], data_descriptor: 1, ..Default::default() })?; // id 1, to be removed

    let c = dataset.append(NewItem {
        data: vec![2],
        data_descriptor: 1,
        group_id: group_id as i64,
        place: 1,
        ..Default::default()
    })?;

    dataset.delete(1)?;
    dataset.optimize()?;

    // old ids 0 and 2 survive as new ids 0 and 1.
    let members = dataset.get_group_members(group_id)?;
    assert_eq!(vec![0, 1], members);
    let _ = (a.id, c.id);

    Ok(())
}

#[test]
fn optimize_on_an_empty_dataset_is_a_no_op() -> mindb_core::Result<()> {
    let dir = tempfile::tempdir().expect("tempdir");
    let dataset = Dataset::open(dir.path(), "notes", DatasetOptions::new().vector_size(1))?;
    dataset.optimize()?;
    assert_eq!(0, dataset.count()?);
    Ok(())
}

#[test]
fn optimize_ignores_a_stale_temp_file_left_by_a_prior_failed_run() -> mindb_core::Result<()> {
    let dir = tempfile::tempdir().expect("tempdir");
    let dataset = Dataset::open(dir.path(), "notes", DatasetOptions::new().vector_size(1))?;

    for i in 0..4u8 {
        dataset.append(NewItem { data: vec![i], data_descriptor: 1, ..Default::default() })?;
    }
    dataset.delete(1)?;

    // Simulate what a crash mid-optimize would leave behind: a non-empty
    // temp file at the exact path `optimize` rebuilds into.
    let collection_dir = dir.path().join("notes");
    std::fs::write(collection_dir.join(".optimize.dat.tmp"), b"garbage-from-a-prior-run")?;
    std::fs::write(collection_dir.join(".optimize.met.tmp"), b"garbage-from-a-prior-run")?;

    dataset.optimize()?;

    assert_eq!(3, dataset.count()?);
    assert_eq!(Some(vec![0]), dataset.read(0, ReadMask::DATA)?.data);
    assert_eq!(Some(vec![2]), dataset.read(1, ReadMask::DATA)?.data);
    assert_eq!(Some(vec![3]), dataset.read(2, ReadMask::DATA)?.data);

    assert!(!collection_dir.join(".optimize.dat.tmp").exists());
    assert!(!collection_dir.join(".optimize.met.tmp").exists());

    Ok(())
}
