//! End-to-end scenarios from spec §8, run against `World`'s built-in
//! `TableStore`. Component values stay opaque to this crate (§1): these
//! scenarios assert on which events fire, with which `source`, not on any
//! byte-level component content.

use std::cell::RefCell;
use std::rc::Rc;

use rel_trav::event::{EmitDesc, EmitFlags};
use rel_trav::id::{Entity, Id, CHILD_OF, IS_A};
use rel_trav::observer::{Event, Notification, ObserverContext, ObserverDesc, ObserverTerm};
use rel_trav::table::RecordStore;
use rel_trav::world::World;

fn e(i: u32) -> Entity {
    Entity::new(i, 1)
}

struct Recorded {
    event: Event,
    id: Id,
    source: Option<Entity>,
}

fn recorder() -> (rel_trav::observer::Callback, Rc<RefCell<Vec<Recorded>>>) {
    let log: Rc<RefCell<Vec<Recorded>>> = Rc::new(RefCell::new(Vec::new()));
    let log2 = Rc::clone(&log);
    let cb: rel_trav::observer::Callback = Rc::new(RefCell::new(move |n: &Notification| {
        log2.borrow_mut().push(Recorded {
            event: n.event,
            id: n.id,
            source: n.source,
        });
    }));
    (cb, log)
}

#[test]
fn override_copy_sets_new_value_and_leaves_velocity_alone() {
    let mut world = World::new();
    let position = Id::component(e(100));
    let velocity = Id::component(e(101));

    let prefab = e(1);
    let prefab_ty = vec![position, velocity];
    let prefab_table = world.store_mut().table_for_type(&prefab_ty);
    world.store_mut().push_row(prefab_table, prefab);
    world.ensure_id(position).unwrap();
    world.ensure_id(velocity).unwrap();

    let instance = e(2);
    let instance_ty = vec![Id::pair(IS_A, prefab), position];
    let instance_table = world.store_mut().table_for_type(&instance_ty);
    world.store_mut().push_row(instance_table, instance);
    let is_a_prefab = Id::pair(IS_A, prefab);
    world.ensure_id(is_a_prefab).unwrap();

    let (cb, log) = recorder();
    world.observer_register(ObserverDesc {
        events: vec![Event::Wildcard],
        term: ObserverTerm {
            id: Id::component(rel_trav::id::ANY),
            relation: None,
            subject: None,
        },
        callback: cb,
        ctx: ObserverContext::default(),
        match_prefab: false,
        match_disabled: false,
        instanced: false,
        yield_existing: false,
    });

    world.emit(EmitDesc {
        event: Event::Add,
        ids: vec![is_a_prefab],
        table: instance_table,
        offset: 0,
        count: 1,
        other_table: None,
        flags: EmitFlags::empty(),
        ctx: ObserverContext::default(),
    })
    .unwrap();

    let log = log.borrow();
    assert!(log.iter().any(|r| r.event == Event::Add && r.id == is_a_prefab));
    let position_set = log.iter().find(|r| r.event == Event::Set && r.id == position);
    assert!(position_set.is_some(), "expected a Set(Position) event on override");
    assert_eq!(position_set.unwrap().source, Some(prefab));
    assert!(!log.iter().any(|r| r.event == Event::Set && r.id == velocity));
}

#[test]
fn base_reexposure_on_remove() {
    let mut world = World::new();
    let position = Id::component(e(200));

    let prefab = e(1);
    let prefab_table = world.store_mut().table_for_type(&[position]);
    world.store_mut().push_row(prefab_table, prefab);
    world.ensure_id(position).unwrap();

    let instance = e(2);
    let instance_ty = vec![Id::pair(IS_A, prefab), position];
    let instance_table = world.store_mut().table_for_type(&instance_ty);
    world.store_mut().push_row(instance_table, instance);
    world.ensure_id(Id::pair(IS_A, prefab)).unwrap();

    let (cb, log) = recorder();
    world.observer_register(ObserverDesc {
        events: vec![Event::Wildcard],
        term: ObserverTerm { id: Id::component(rel_trav::id::ANY), relation: None, subject: None },
        callback: cb,
        ctx: ObserverContext::default(),
        match_prefab: false,
        match_disabled: false,
        instanced: false,
        yield_existing: false,
    });

    world.emit(EmitDesc {
        event: Event::Remove,
        ids: vec![position],
        table: instance_table,
        offset: 0,
        count: 1,
        other_table: None,
        flags: EmitFlags::empty(),
        ctx: ObserverContext::default(),
    })
    .unwrap();

    let log = log.borrow();
    assert!(log.iter().any(|r| r.event == Event::Remove && r.id == position));
    let reexposed = log.iter().find(|r| r.event == Event::Set && r.id == position);
    assert!(reexposed.is_some(), "expected base's Position to be re-exposed");
    assert_eq!(reexposed.unwrap().source, Some(prefab));
}

#[test]
fn unset_on_unreachable_remove() {
    let mut world = World::new();
    let position = Id::component(e(300));

    let instance = e(1);
    let instance_table = world.store_mut().table_for_type(&[position]);
    world.store_mut().push_row(instance_table, instance);
    world.ensure_id(position).unwrap();

    let (cb, log) = recorder();
    world.observer_register(ObserverDesc {
        events: vec![Event::Wildcard],
        term: ObserverTerm { id: Id::component(rel_trav::id::ANY), relation: None, subject: None },
        callback: cb,
        ctx: ObserverContext::default(),
        match_prefab: false,
        match_disabled: false,
        instanced: false,
        yield_existing: false,
    });

    world.emit(EmitDesc {
        event: Event::Remove,
        ids: vec![position],
        table: instance_table,
        offset: 0,
        count: 1,
        other_table: None,
        flags: EmitFlags::empty(),
        ctx: ObserverContext::default(),
    })
    .unwrap();

    let log = log.borrow();
    assert!(log.iter().any(|r| r.event == Event::Remove && r.id == position));
    assert!(log.iter().any(|r| r.event == Event::Unset && r.id == position));
    assert!(!log.iter().any(|r| r.event == Event::Set && r.id == position));
}

#[test]
fn transitive_inheritance_through_two_is_a_hops() {
    let mut world = World::new();
    let tag = Id::component(e(400));

    let a = e(1);
    let a_table = world.store_mut().table_for_type(&[tag]);
    world.store_mut().push_row(a_table, a);

    let b = e(2);
    let b_ty = vec![Id::pair(IS_A, a)];
    let b_table = world.store_mut().table_for_type(&b_ty);
    world.store_mut().push_row(b_table, b);

    let c = e(3);
    let c_ty = vec![Id::pair(IS_A, b)];
    let c_table = world.store_mut().table_for_type(&c_ty);
    world.store_mut().push_row(c_table, c);

    world.ensure_id(Id::pair(IS_A, a)).unwrap();
    world.ensure_id(Id::pair(IS_A, b)).unwrap();

    let result = world.traverse_up(IS_A, c_table, tag);
    assert_eq!(result.map(|(src, _, _)| src), Some(a));
}

#[test]
fn downward_propagation_reaches_every_child_table() {
    let mut world = World::new();
    let health = Id::component(e(500));

    let parent = e(1);
    let parent_table = world.store_mut().table_for_type(&[]);
    world.store_mut().push_row(parent_table, parent);

    let child_of_parent = Id::pair(CHILD_OF, parent);
    let c1 = e(2);
    let c1_table = world.store_mut().table_for_type(&[child_of_parent]);
    world.store_mut().push_row(c1_table, c1);

    let c2 = e(3);
    let c2_table = world.store_mut().table_for_type(&[child_of_parent]);
    world.store_mut().push_row(c2_table, c2);

    let rel_head = world.idx_mut().ensure(Id::first_wildcard(CHILD_OF), |_, _| false).unwrap();
    world.idx_mut().record_mut(rel_head).flags.insert(rel_trav::index::IdFlags::ACYCLIC);
    world
        .idx_mut()
        .register_table(
            child_of_parent,
            c1_table,
            rel_trav::table::TableRecord { table: c1_table, column: 0, count: 1 },
            1,
            |_, _| false,
        )
        .unwrap();
    world
        .idx_mut()
        .register_table(
            child_of_parent,
            c2_table,
            rel_trav::table::TableRecord { table: c2_table, column: 0, count: 1 },
            1,
            |_, _| false,
        )
        .unwrap();

    let (cb, log) = recorder();
    world.observer_register(ObserverDesc {
        events: vec![Event::Add],
        term: ObserverTerm { id: health, relation: Some(CHILD_OF), subject: None },
        callback: cb,
        ctx: ObserverContext::default(),
        match_prefab: false,
        match_disabled: false,
        instanced: false,
        yield_existing: false,
    });

    world.emit(EmitDesc {
        event: Event::Add,
        ids: vec![health],
        table: parent_table,
        offset: 0,
        count: 1,
        other_table: None,
        flags: EmitFlags::empty(),
        ctx: ObserverContext::default(),
    })
    .unwrap();

    let log = log.borrow();
    let fired_tables: Vec<_> = log.iter().filter(|r| r.event == Event::Add && r.id == health).collect();
    assert_eq!(fired_tables.len(), 2, "expected one propagated Add per child table");
}

#[test]
fn exclusive_add_with_existing_instance_fails() {
    let mut world = World::new();
    let rel = e(700);
    let old_target = e(701);
    let new_target = e(702);

    let rel_head = world.idx_mut().ensure(Id::first_wildcard(rel), |_, _| false).unwrap();
    world.idx_mut().record_mut(rel_head).flags.insert(rel_trav::index::IdFlags::EXCLUSIVE);

    let entity = e(1);
    let ty = vec![Id::pair(rel, old_target)];
    let table = world.table_for_type(&ty);
    world.push_row(table, entity);

    let err = world.check_exclusive_add(rel, entity, new_target).unwrap_err();
    match err {
        rel_trav::error::RelTravError::ConstraintViolated(rel_trav::error::ConstraintViolation::Exclusive) => {}
        other => panic!("expected Exclusive violation, got {other:?}"),
    }

    // Re-adding the same target isn't a conflict.
    world.check_exclusive_add(rel, entity, old_target).unwrap();
}

#[test]
fn is_a_cycle_add_fails() {
    let mut world = World::new();
    let a = e(1);
    let b = e(2);

    let a_ty = vec![Id::pair(IS_A, b)];
    let a_table = world.table_for_type(&a_ty);
    world.push_row(a_table, a);

    // b is-a a would close a's -> b -> a cycle.
    let err = world.check_acyclic_add(IS_A, b, a).unwrap_err();
    match err {
        rel_trav::error::RelTravError::ConstraintViolated(rel_trav::error::ConstraintViolation::Cycle) => {}
        other => panic!("expected Cycle violation, got {other:?}"),
    }
}

#[test]
fn invalidation_picks_up_a_freshly_added_grandchild() {
    let mut world = World::new();
    let root = e(1);
    let root_table = world.store_mut().table_for_type(&[]);
    world.store_mut().push_row(root_table, root);

    let rel_head = world.idx_mut().ensure(Id::first_wildcard(CHILD_OF), |_, _| false).unwrap();
    world.idx_mut().record_mut(rel_head).flags.insert(rel_trav::index::IdFlags::ACYCLIC);

    let with = Id::component(e(600));
    let before = world.traverse_down(CHILD_OF, root, with);
    assert!(before.is_empty());

    let grandchild = e(2);
    let grandchild_ty = vec![Id::pair(CHILD_OF, root), with];
    let grandchild_table = world.store_mut().table_for_type(&grandchild_ty);
    world.store_mut().push_row(grandchild_table, grandchild);
    world
        .idx_mut()
        .register_table(
            Id::pair(CHILD_OF, root),
            grandchild_table,
            rel_trav::table::TableRecord { table: grandchild_table, column: 0, count: 1 },
            1,
            |_, _| false,
        )
        .unwrap();

    world.on_entity_modified(root);
    let after = world.traverse_down(CHILD_OF, root, with);
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].table, grandchild_table);
    assert!(after[0].leaf);
}
