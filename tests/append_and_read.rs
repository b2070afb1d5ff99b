// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Scenario S1: append a record with data, metadata, a vector, tags, and a
//! "new group" hint, then read it back with every field loaded.

use mindb_core::{Dataset, DatasetOptions, NewItem, ReadMask};
use test_log::test;

#[test]
fn append_and_read_all_fields() -> mindb_core::Result<()> {
    let dir = tempfile::tempdir().expect("tempdir");
    let dataset = Dataset::open(dir.path(), "notes", DatasetOptions::new().vector_size(3))?;

    let appended = dataset.append(NewItem {
        data: b"hello".to_vec(),
        data_descriptor: 1,
        meta: b"m".to_vec(),
        meta_descriptor: 1,
        vector: Some(vec![1.0, 2.0, 3.0]),
        tags: vec!["a".into(), "B".into()],
        group_id: -1,
        place: 0,
    })?;

    assert_eq!(0, appended.id);
    assert!(appended.group_id.unwrap_or(0) >= 1);

    let record = dataset.read(appended.id, ReadMask::ALL)?;

    assert_eq!(b"hello".to_vec(), record.data.unwrap());
    assert_eq!(b"m".to_vec(), record.meta.unwrap());
    assert_eq!(1, record.data_descriptor);
    assert_eq!(1, record.meta_descriptor);
    assert_eq!(Some(vec![1.0, 2.0, 3.0]), record.vector);

    let mut tags = record.tags.unwrap();
    tags.sort();
    assert_eq!(vec!["a".to_string(), "b".to_string()], tags);

    let group = record.group.expect("group info");
    assert_eq!(0, group.place);

    Ok(())
}

#[test]
fn append_with_empty_data_and_meta_uses_sentinel_offsets() -> mindb_core::Result<()> {
    let dir = tempfile::tempdir().expect("tempdir");
    let dataset = Dataset::open(dir.path(), "notes", DatasetOptions::new().vector_size(1))?;

    let appended = dataset.append(NewItem { data_descriptor: 1, meta_descriptor: 1, ..Default::default() })?;
    let record = dataset.read(appended.id, ReadMask::ALL)?;

    assert_eq!(Some(Vec::new()), record.data);
    assert_eq!(Some(Vec::new()), record.meta);
    assert_eq!(None, record.vector);
    assert_eq!(None, record.group);

    Ok(())
}

#[test]
fn read_with_no_mask_loads_only_index_fields() -> mindb_core::Result<()> {
    let dir = tempfile::tempdir().expect("tempdir");
    let dataset = Dataset::open(dir.path(), "notes", DatasetOptions::new().vector_size(1))?;

    dataset.append(NewItem {
        data: b"x".to_vec(),
        data_descriptor: 1,
        tags: vec!["t".into()],
        ..Default::default()
    })?;

    let record = dataset.read(0, ReadMask::NONE)?;
    assert_eq!(None, record.data);
    assert_eq!(None, record.meta);
    assert_eq!(None, record.vector);
    assert_eq!(None, record.tags);
    assert_eq!(None, record.group);
    assert_eq!(1, record.data_descriptor);

    Ok(())
}

#[test]
fn reopen_after_flush_preserves_every_record() -> mindb_core::Result<()> {
    let dir = tempfile::tempdir().expect("tempdir");
    let name = "notes";

    {
        let dataset = Dataset::open(dir.path(), name, DatasetOptions::new().vector_size(2))?;
        for i in 0..5u8 {
            dataset.append(NewItem { data: vec![i], data_descriptor: 1, ..Default::default() })?;
        }
        dataset.flush()?;
        dataset.close()?;
    }

    let reopened = Dataset::open(dir.path(), name, DatasetOptions::new().vector_size(2))?;
    assert_eq!(5, reopened.count()?);
    for i in 0..5u8 {
        let record = reopened.read(u64::from(i), ReadMask::DATA)?;
        assert_eq!(Some(vec![i]), record.data);
    }

    Ok(())
}
