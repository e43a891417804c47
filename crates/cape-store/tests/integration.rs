//! Integration tests exercising the full labeling pipeline:
//! intern → canonicalize → group → level → object, across crate
//! boundaries.

use std::collections::BTreeSet;

use cape_store::{Store, StoreError};

#[test]
fn end_to_end_labeling() {
    let store = Store::open_in_memory().unwrap();

    // Intern two values; repeat interning changes nothing.
    let alpha = store.intern_token("alpha").unwrap();
    let beta = store.intern_token("beta").unwrap();
    assert_eq!(store.intern_token("alpha").unwrap(), alpha);

    // A group over both tokens.
    let eng = store
        .create_or_update_group("eng", &[alpha, beta].into_iter().collect())
        .unwrap();

    // A level with an empty own set referencing the group.
    let own = store.get_or_create_token_set(&BTreeSet::new()).unwrap();
    let level = store
        .get_or_create_level(own, &[eng].into_iter().collect())
        .unwrap();
    assert_eq!(
        store.level_ids(level).unwrap(),
        [alpha, beta].into_iter().collect::<BTreeSet<_>>()
    );

    // Attach the level to an object and read the label back through it.
    let object = store.create_object(level, None).unwrap();
    let found = store.object_by_uuid(&object.uuid).unwrap();
    assert_eq!(found.level, level);
    assert_eq!(
        store.level_ids(found.level).unwrap(),
        [alpha, beta].into_iter().collect::<BTreeSet<_>>()
    );

    // Deleting the object leaves the label structure intact.
    store.delete_object(object.id).unwrap();
    assert!(matches!(
        store.object_by_uuid(&object.uuid),
        Err(StoreError::NotFound("object", _))
    ));
    assert!(store.level(level).is_ok());
    assert!(store.group_by_name("eng").is_ok());
    assert_eq!(
        store.group_ids(eng).unwrap(),
        [alpha, beta].into_iter().collect::<BTreeSet<_>>()
    );
}

#[test]
fn group_mutation_is_visible_through_objects() {
    let store = Store::open_in_memory().unwrap();

    let members = store.intern_tokens(["t1", "t2"]).unwrap();
    let eng = store.create_or_update_group("eng", &members).unwrap();

    let own = store.get_or_create_token_set(&BTreeSet::new()).unwrap();
    let level = store
        .get_or_create_level(own, &[eng].into_iter().collect())
        .unwrap();
    let object = store.create_object(level, None).unwrap();

    // Shrink the group; the object's effective label follows with no
    // object or level writes.
    let t2 = store.intern_token("t2").unwrap();
    store
        .create_or_update_group("eng", &[t2].into_iter().collect())
        .unwrap();

    let found = store.object_by_uuid(&object.uuid).unwrap();
    let values = store.level_values(found.level).unwrap();
    assert_eq!(values, ["t2".to_string()].into_iter().collect());
}

#[test]
fn deletion_never_resurrects_ids() {
    let store = Store::open_in_memory().unwrap();

    let t1 = store.intern_token("t1").unwrap();
    let members: BTreeSet<_> = [t1].into_iter().collect();

    let old_group = store.create_or_update_group("eng", &members).unwrap();
    let old_set = store.group_by_name("eng").unwrap().token_set;
    store.delete_group(old_group).unwrap();
    assert!(matches!(
        store.group_by_name("eng"),
        Err(StoreError::NotFound("group", _))
    ));

    let new_group = store.create_or_update_group("eng", &members).unwrap();
    let new_set = store.group_by_name("eng").unwrap().token_set;
    assert_ne!(old_group, new_group);
    assert_ne!(old_set, new_set);
    assert_eq!(store.group_ids(new_group).unwrap(), members);
}
