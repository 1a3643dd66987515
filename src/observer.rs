//! Observer index (component F, §4.6): the map from `(event, id)` to the
//! sets of observers that must be notified, partitioned by how narrowly
//! they're scoped.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;
use hashbrown::HashMap;

use crate::id::{Entity, Id};

/// One of the four event kinds an observer can match, plus the universal
/// wildcard key every concrete event is also notified under (§4.6).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Event {
    /// A component or relationship pair started being present on an entity.
    Add,
    /// A component or relationship pair stopped being present on an entity.
    Remove,
    /// A component's effective value changed, whether owned or inherited.
    Set,
    /// A component's effective value stopped being available.
    Unset,
    /// Matches any of the above; observers registered on `Wildcard` fire for
    /// every concrete event.
    Wildcard,
}

/// Opaque two-word context passed back into an observer's callback, per §9:
/// "model as a pair (callable, context-pair)".
#[derive(Clone, Copy, Default, Debug)]
pub struct ObserverContext {
    /// Opaque caller-supplied value, returned verbatim in each [`Notification`].
    pub ctx: usize,
    /// Opaque caller-supplied value for the callback's binding scope.
    pub binding_ctx: usize,
}

/// Handle to a registered observer, returned from [`ObserverIndex::register`].
pub type ObserverId = Entity;

/// A single notification fired to an observer callback (§4.7 step 5-6).
pub struct Notification<'a> {
    /// Which event kind fired.
    pub event: Event,
    /// The id the notification is about.
    pub id: Id,
    /// The table the affected rows live in.
    pub table: crate::table::TableHandle,
    /// Offset of the first affected row within `table`.
    pub offset: usize,
    /// Number of affected rows starting at `offset`.
    pub count: usize,
    /// Set on override/unset/re-exposure synthesis (§4.7 steps 3, 4, 8, 9).
    pub source: Option<Entity>,
    /// The context the observer was registered with.
    pub ctx: &'a ObserverContext,
}

/// Shared so the same observer can be registered under several event keys
/// without needing to clone a `dyn FnMut` (§5: single-threaded, so `Rc` over
/// `Arc` matches the rest of the crate's no-synchronization posture).
pub type Callback = Rc<RefCell<dyn FnMut(&Notification)>>;

struct ObserverRecord {
    id: ObserverId,
    callback: Callback,
    ctx: ObserverContext,
    match_prefab: bool,
    match_disabled: bool,
    instanced: bool,
}

impl Clone for ObserverRecord {
    fn clone(&self) -> Self {
        ObserverRecord {
            id: self.id,
            callback: Rc::clone(&self.callback),
            ctx: self.ctx,
            match_prefab: self.match_prefab,
            match_disabled: self.match_disabled,
            instanced: self.instanced,
        }
    }
}

/// Term an observer was registered against: which id, and how it's scoped
/// along a relation and/or pinned to a concrete subject entity (§4.6).
#[derive(Clone, Copy, Debug)]
pub struct ObserverTerm {
    /// The id (component or relationship pair, wildcards allowed) to match.
    pub id: Id,
    /// `Some(R)` restricts matches to occurrences reached via relation `R`
    /// (the `superset[R]` bucket); `None` means self-occurrences only.
    pub relation: Option<Entity>,
    /// Pins the observer to a concrete subject entity.
    pub subject: Option<Entity>,
}

/// Registration descriptor for [`ObserverIndex::register`] (§6 `observer_register`).
pub struct ObserverDesc {
    /// Event kinds this observer should fire for.
    pub events: Vec<Event>,
    /// The id/relation/subject term to match against.
    pub term: ObserverTerm,
    /// The callback to invoke on a match.
    pub callback: Callback,
    /// Opaque context handed back in each [`Notification`].
    pub ctx: ObserverContext,
    /// Whether this observer also fires for rows on prefab entities.
    pub match_prefab: bool,
    /// Whether this observer also fires for rows on disabled entities.
    pub match_disabled: bool,
    /// Whether this observer is scoped to a single instanced entity.
    pub instanced: bool,
    /// Replay current matching state as synthesized `Add` notifications
    /// right after registration (§B).
    pub yield_existing: bool,
}

/// Invokes a single observer's callback, catching (and `error!`-logging) a
/// panic at this boundary under `std` so one misbehaving observer can't take
/// down the whole notification pass. No-op guard under `no_std`: there's no
/// unwind-catching primitive available there, so a panicking observer still
/// aborts the call stack as normal.
fn invoke(r: &ObserverRecord, n: &Notification) {
    #[cfg(feature = "std")]
    {
        let callback = &r.callback;
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            (&mut *callback.borrow_mut())(n);
        }));
        if result.is_err() {
            #[cfg(feature = "tracing")]
            tracing::error!(observer = ?r.id, "observer callback panicked");
        }
    }
    #[cfg(not(feature = "std"))]
    {
        (&mut *r.callback.borrow_mut())(n);
    }
}

#[derive(Default)]
struct Bucket {
    triggers: Vec<ObserverRecord>,
    superset: HashMap<Entity, Vec<ObserverRecord>>,
    entity: HashMap<Entity, Vec<ObserverRecord>>,
    superset_entity: HashMap<Entity, Vec<ObserverRecord>>,
}

impl Bucket {
    fn is_empty(&self) -> bool {
        self.triggers.is_empty()
            && self.superset.values().all(Vec::is_empty)
            && self.entity.values().all(Vec::is_empty)
            && self.superset_entity.values().all(Vec::is_empty)
    }
}

/// `true`/`false` transition of an `(event, id)` pair's trigger count across
/// zero, for broadcasting `triggers-for-id` / `no-triggers-for-id` (§4.6).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TriggerTransition {
    /// The key had no observers before this registration and now has one.
    NowHasTriggers,
    /// The key's last observer was just removed.
    NoLongerHasTriggers,
}

/// The observer index (§4.6).
#[derive(Default)]
pub struct ObserverIndex {
    buckets: HashMap<(Event, Id), Bucket>,
    next_id: u32,
}

impl ObserverIndex {
    /// An empty observer index.
    #[must_use]
    pub fn new() -> Self {
        ObserverIndex::default()
    }

    /// `observer_register` (§6): returns the new observer's id and, for each
    /// distinct `(event, id)` key touched, whether its trigger count just
    /// transitioned across zero.
    pub fn register(&mut self, desc: ObserverDesc) -> (ObserverId, Vec<((Event, Id), TriggerTransition)>) {
        let observer_id = Entity::new(self.next_id, 1);
        self.next_id += 1;

        let ObserverDesc {
            events,
            term,
            callback,
            ctx,
            match_prefab,
            match_disabled,
            instanced,
            yield_existing: _,
        } = desc;

        let mut transitions = Vec::new();
        for event in events {
            let key = (event, term.id);
            let was_empty = self.buckets.get(&key).map_or(true, Bucket::is_empty);
            let bucket = self.buckets.entry(key).or_default();

            let record = ObserverRecord {
                id: observer_id,
                callback: Rc::clone(&callback),
                ctx,
                match_prefab,
                match_disabled,
                instanced,
            };
            Self::insert_into(bucket, term, record);

            if was_empty {
                transitions.push((key, TriggerTransition::NowHasTriggers));
            }
        }
        (observer_id, transitions)
    }

    fn insert_into(bucket: &mut Bucket, term: ObserverTerm, record: ObserverRecord) {
        match (term.relation, term.subject) {
            (None, None) => bucket.triggers.push(record),
            (Some(r), None) => bucket.superset.entry(r).or_default().push(record),
            (None, Some(s)) => bucket.entity.entry(s).or_default().push(record),
            (Some(_), Some(s)) => bucket.superset_entity.entry(s).or_default().push(record),
        }
    }

    /// Removes every observer with `observer_id` from every bucket. Returns
    /// transitions for any `(event, id)` key whose trigger count fell to zero.
    pub fn unregister(&mut self, observer_id: ObserverId) -> Vec<((Event, Id), TriggerTransition)> {
        let mut transitions = Vec::new();
        self.buckets.retain(|&key, bucket| {
            let had = !bucket.is_empty();
            bucket.triggers.retain(|r| r.id != observer_id);
            for v in bucket.superset.values_mut() {
                v.retain(|r| r.id != observer_id);
            }
            for v in bucket.entity.values_mut() {
                v.retain(|r| r.id != observer_id);
            }
            for v in bucket.superset_entity.values_mut() {
                v.retain(|r| r.id != observer_id);
            }
            let now_empty = bucket.is_empty();
            if had && now_empty {
                transitions.push((key, TriggerTransition::NoLongerHasTriggers));
            }
            !now_empty
        });
        transitions
    }

    /// Notifies every observer matching `(event, id)` in spec order (§5
    /// ordering guarantee): general self-observers first, then
    /// relation-superset observers, then entity-filtered, then
    /// superset-entity-filtered.
    pub fn notify(&mut self, event: Event, id: Id, relation: Option<Entity>, subject: Option<Entity>, n: &Notification) {
        let Some(bucket) = self.buckets.get_mut(&(event, id)) else {
            return;
        };
        #[cfg(feature = "tracing")]
        tracing::trace!(?event, ?id, path = "self", n = bucket.triggers.len(), "notify");
        for r in &bucket.triggers {
            invoke(r, n);
        }
        if let Some(rel) = relation {
            if let Some(v) = bucket.superset.get(&rel) {
                #[cfg(feature = "tracing")]
                tracing::trace!(?event, ?id, ?rel, path = "superset", n = v.len(), "notify");
                for r in v {
                    invoke(r, n);
                }
            }
        }
        if let Some(subj) = subject {
            if let Some(v) = bucket.entity.get(&subj) {
                #[cfg(feature = "tracing")]
                tracing::trace!(?event, ?id, ?subj, path = "entity", n = v.len(), "notify");
                for r in v {
                    invoke(r, n);
                }
            }
            if let Some(v) = bucket.superset_entity.get(&subj) {
                #[cfg(feature = "tracing")]
                tracing::trace!(?event, ?id, ?subj, path = "superset_entity", n = v.len(), "notify");
                for r in v {
                    invoke(r, n);
                }
            }
        }
    }

    /// Total number of observers currently registered under `(event, id)`.
    #[must_use]
    pub fn trigger_count(&self, event: Event, id: Id) -> usize {
        self.buckets.get(&(event, id)).map_or(0, |b| {
            b.triggers.len()
                + b.superset.values().map(Vec::len).sum::<usize>()
                + b.entity.values().map(Vec::len).sum::<usize>()
                + b.superset_entity.values().map(Vec::len).sum::<usize>()
        })
    }
}
