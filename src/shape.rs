//! Hidden-class transition tree — the C2 shape tree.
//!
//! Generalized from the teacher's `inline_cache.rs::Shape`, which kept a flat
//! `Vec<(String, u16)>` of properties per shape and minted a fresh shape for
//! every `with_prop` call with no sharing. This version builds the actual
//! parent-pointer transition tree §4.1 requires: a shape's identity is
//! determined by the sequence of `(name, attrs)` edges taken from the root,
//! and two objects that took the same edges land on the identical `Shape`
//! (pointer-equal, enforced by interning each parent's transitions in a
//! `DashMap` keyed by the edge).

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;

/// Per-property attributes (§3.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Attrs {
    pub writable: bool,
    pub enumerable: bool,
    pub configurable: bool,
    pub accessor: bool,
}

impl Attrs {
    pub const DEFAULT: Attrs = Attrs { writable: true, enumerable: true, configurable: true, accessor: false };
}

impl Default for Attrs {
    fn default() -> Self {
        Attrs::DEFAULT
    }
}

/// The edge key a parent's transition table is keyed by: "add property
/// `name` with attributes `attrs`". Named after the teacher-adjacent `boa`
/// engine's `TransitionKey` (`object/shape/shared_shape.rs`), which is the
/// clearest precedent in the example pack for this exact concept.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TransitionKey {
    name: Arc<str>,
    attrs: Attrs,
}

/// Array element storage class (§3.3). Ordered so that `SmiOrLess < Double <
/// Object` models the monotone generalization lattice, with a HOLEY variant
/// per kind carried as a separate flag rather than doubling the enum, which
/// keeps `join` a simple max-plus-or on two small fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ElementKind {
    Smi,
    Double,
    Object,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArrayKind {
    pub kind: ElementKind,
    pub holey: bool,
}

impl ArrayKind {
    pub const SMI: ArrayKind = ArrayKind { kind: ElementKind::Smi, holey: false };

    /// Join of two element kinds: monotone generalization, never narrows.
    pub fn join(self, other: ArrayKind) -> ArrayKind {
        ArrayKind {
            kind: self.kind.max(other.kind),
            holey: self.holey || other.holey,
        }
    }

    /// `true` if `self` already subsumes `requested` (so a transition to it
    /// would be a no-op per §4.1's idempotence rule).
    pub fn subsumes(self, requested: ArrayKind) -> bool {
        self.join(requested) == self
    }
}

static NEXT_SHAPE_ID: AtomicU64 = AtomicU64::new(1); // 0 is reserved for the root

struct ShapeInner {
    id: u64,
    parent: Option<Shape>,
    /// The edge that reached this shape from `parent`; `None` only for the
    /// root.
    edge: Option<(Arc<str>, Attrs)>,
    slot: Option<u32>, // this property's own slot index; None for the root
    num_slots: u32,
    transitions: DashMap<TransitionKey, Shape>,
    /// Populated only on array shapes; `None` for plain object shapes.
    array_kind: Option<ArrayKind>,
    array_transitions: DashMap<ArrayKind, Shape>,
    /// Deprecation pointer (§3.2): set exactly once, guarded by `ArcSwapOption`
    /// so `deprecate` is a single atomic publish rather than taking a lock.
    migration_target: ArcSwapOption<Shape>,
}

/// A handle into the shape tree. Cheap to clone (`Arc` underneath);
/// `PartialEq`/`Eq` compare by shape identity (the pointer-equality the spec
/// requires), not structurally.
#[derive(Clone)]
pub struct Shape(Arc<ShapeInner>);

impl PartialEq for Shape {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for Shape {}

impl std::hash::Hash for Shape {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state)
    }
}

impl std::fmt::Debug for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Shape#{}(slots={})", self.0.id, self.0.num_slots)
    }
}

impl Shape {
    fn new_raw(
        parent: Option<Shape>,
        edge: Option<(Arc<str>, Attrs)>,
        slot: Option<u32>,
        num_slots: u32,
        array_kind: Option<ArrayKind>,
    ) -> Shape {
        Shape(Arc::new(ShapeInner {
            id: NEXT_SHAPE_ID.fetch_add(1, Ordering::Relaxed),
            parent,
            edge,
            slot,
            num_slots,
            transitions: DashMap::new(),
            array_kind,
            array_transitions: DashMap::new(),
            migration_target: ArcSwapOption::from(None),
        }))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn num_slots(&self) -> u32 {
        self.0.num_slots
    }

    /// Walks the parent chain looking for `name`, returning its slot and
    /// attributes. Past `flatten_threshold` hops the caller should prefer a
    /// flattened cache (`ShapeTree::flattened`); this method always does the
    /// honest walk and is what backs the cache when it misses.
    pub fn lookup(&self, name: &str) -> Option<(u32, Attrs)> {
        let mut cur = self;
        let mut owned;
        loop {
            if let Some((edge_name, attrs)) = &cur.0.edge {
                if &**edge_name == name {
                    return Some((cur.0.slot.unwrap(), *attrs));
                }
            }
            match &cur.0.parent {
                Some(p) => {
                    owned = p.clone();
                    cur = &owned;
                }
                None => return None,
            }
        }
    }

    pub fn array_kind(&self) -> Option<ArrayKind> {
        self.0.array_kind
    }

    pub fn is_deprecated(&self) -> bool {
        self.0.migration_target.load().is_some()
    }
}

/// The hidden-class transition tree for one runtime. Owns the unique root
/// and mediates every `child`/`deprecate` call so shape identity is governed
/// centrally rather than by each `Shape` mutating itself.
pub struct ShapeTree {
    root: Shape,
    /// Parent-chain length above which `slot`/`attrs` lookups prefer a
    /// flattened per-shape table instead of walking parents one at a time.
    flatten_threshold: usize,
    flattened: DashMap<u64, Arc<Vec<(Arc<str>, u32, Attrs)>>>,
    /// Every shape ever minted by this tree, by id. Used to answer "is this
    /// shape still reachable" when reconstructing escaped objects from deopt
    /// metadata (§4.2.1), which only ever has a `shape_id` to go on.
    registry: DashMap<u64, Shape>,
}

impl ShapeTree {
    pub fn new(flatten_threshold: usize) -> Self {
        let root = Shape::new_raw(None, None, None, 0, None);
        let registry = DashMap::new();
        registry.insert(root.id(), root.clone());
        ShapeTree {
            root,
            flatten_threshold,
            flattened: DashMap::new(),
            registry,
        }
    }

    pub fn root(&self) -> Shape {
        self.root.clone()
    }

    /// The empty array-shape root: same tree, but tagged SMI so
    /// `transition_element_kind` has a starting point.
    pub fn array_root(&self) -> Shape {
        let shape = Shape::new_raw(None, None, None, 0, Some(ArrayKind::SMI));
        self.registry.insert(shape.id(), shape.clone());
        shape
    }

    /// Looks up a shape by id among every shape this tree has ever minted.
    /// Returns `None` for an id this tree never produced, which deopt
    /// materialization treats as `FatalError::UnreachableShape`.
    pub fn find(&self, id: u64) -> Option<Shape> {
        self.registry.get(&id).map(|s| s.clone())
    }

    /// `child(parent, name, attrs)` (§4.1). Structurally shared: repeated
    /// calls with identical arguments on the identical parent return the
    /// identical `Shape`.
    pub fn child(&self, parent: &Shape, name: &str, attrs: Attrs) -> Shape {
        if let Some((_, existing_attrs)) = parent.lookup(name) {
            if existing_attrs == attrs {
                return parent.clone(); // no-op: already present with same attrs
            }
            // Conflicting attributes: deprecate `parent` to a reconfigured shape.
            let reconfigured = self.reconfigure(parent, name, attrs);
            self.deprecate(parent, &reconfigured);
            return reconfigured;
        }

        let key = TransitionKey { name: Arc::from(name), attrs };
        if let Some(existing) = parent.0.transitions.get(&key) {
            return existing.clone();
        }
        let child = Shape::new_raw(
            Some(parent.clone()),
            Some((key.name.clone(), attrs)),
            Some(parent.0.num_slots),
            parent.0.num_slots + 1,
            parent.0.array_kind,
        );
        let child = parent.0.transitions.entry(key).or_insert(child).clone();
        self.registry.insert(child.id(), child.clone());
        child
    }

    /// Builds a fresh shape with all of `parent`'s properties except `name`
    /// reinserted with its original attributes, then `name` with `attrs`.
    /// Used only by `child` when a property is re-added with different
    /// attributes (the deprecation path of §4.1's edge cases).
    fn reconfigure(&self, parent: &Shape, name: &str, attrs: Attrs) -> Shape {
        let mut props = self.flatten(parent);
        if let Some(pos) = props.iter().position(|(n, _, _)| &**n == name) {
            props[pos].2 = attrs;
        }
        let mut cur = self.root();
        for (prop_name, _, prop_attrs) in props.iter() {
            cur = self.child(&cur, prop_name, *prop_attrs);
        }
        cur
    }

    pub fn slot(&self, shape: &Shape, name: &str) -> Option<u32> {
        shape.lookup(name).map(|(slot, _)| slot)
    }

    pub fn attrs(&self, shape: &Shape, name: &str) -> Option<Attrs> {
        shape.lookup(name).map(|(_, attrs)| attrs)
    }

    /// Mark `old` deprecated in favor of `new`. Idempotent: redundantly
    /// deprecating to the same target is a no-op.
    pub fn deprecate(&self, old: &Shape, new: &Shape) {
        tracing::trace!(old = old.id(), new = new.id(), "deprecating shape");
        old.0.migration_target.store(Some(Arc::new(new.clone())));
    }

    /// Follows deprecation chains to the terminal live shape.
    pub fn migration_target(&self, shape: &Shape) -> Shape {
        let mut cur = shape.clone();
        loop {
            match cur.0.migration_target.load().as_ref() {
                Some(next) => cur = (**next).clone(),
                None => return cur,
            }
        }
    }

    /// Element-kind transition on an array shape (§3.3, §4.1): joins the
    /// current kind with `requested`; returns `self` if already subsumed,
    /// otherwise the (tree-shared) sibling shape with the joined kind.
    pub fn transition_element_kind(&self, arr_shape: &Shape, requested: ArrayKind) -> Shape {
        let current = arr_shape.array_kind().expect("transition_element_kind called on a non-array shape");
        let joined = current.join(requested);
        if current.subsumes(requested) {
            return arr_shape.clone();
        }
        if let Some(existing) = arr_shape.0.array_transitions.get(&joined) {
            return existing.clone();
        }
        let sibling = Shape::new_raw(
            arr_shape.0.parent.clone(),
            arr_shape.0.edge.clone(),
            arr_shape.0.slot,
            arr_shape.0.num_slots,
            Some(joined),
        );
        let sibling = arr_shape.0.array_transitions.entry(joined).or_insert(sibling).clone();
        self.registry.insert(sibling.id(), sibling.clone());
        sibling
    }

    /// Flattens a shape's full property list (root-to-shape order), caching
    /// the result once the parent chain exceeds `flatten_threshold`, per the
    /// teacher-adjacent caching note in §4.1's algorithm description.
    fn flatten(&self, shape: &Shape) -> Vec<(Arc<str>, u32, Attrs)> {
        if let Some(cached) = self.flattened.get(&shape.id()) {
            return (**cached).clone();
        }
        let mut chain = vec![];
        let mut cur = shape.clone();
        while let Some((name, attrs)) = cur.0.edge.clone() {
            chain.push((name, cur.0.slot.unwrap(), attrs));
            cur = cur.0.parent.clone().unwrap();
        }
        chain.reverse();
        if chain.len() > self.flatten_threshold {
            self.flattened.insert(shape.id(), Arc::new(chain.clone()));
        }
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_sharing_by_identical_edge_sequence() {
        let tree = ShapeTree::new(8);
        let root = tree.root();
        let s1 = tree.child(&tree.child(&root, "x", Attrs::DEFAULT), "y", Attrs::DEFAULT);
        let s2 = tree.child(&tree.child(&root, "x", Attrs::DEFAULT), "y", Attrs::DEFAULT);
        assert_eq!(s1, s2);
        assert_eq!(tree.slot(&s1, "x"), Some(0));
        assert_eq!(tree.slot(&s1, "y"), Some(1));
    }

    #[test]
    fn slot_of_child_equals_parent_slot_count() {
        let tree = ShapeTree::new(8);
        let root = tree.root();
        let child = tree.child(&root, "a", Attrs::DEFAULT);
        assert_eq!(tree.slot(&child, "a"), Some(root.num_slots() as u32));
    }

    #[test]
    fn readding_same_attrs_is_a_noop() {
        let tree = ShapeTree::new(8);
        let root = tree.root();
        let s1 = tree.child(&root, "x", Attrs::DEFAULT);
        let s2 = tree.child(&s1, "x", Attrs::DEFAULT);
        assert_eq!(s1, s2);
    }

    #[test]
    fn conflicting_attrs_deprecate_the_old_shape() {
        let tree = ShapeTree::new(8);
        let root = tree.root();
        let s1 = tree.child(&root, "x", Attrs::DEFAULT);
        let different = Attrs { writable: false, ..Attrs::DEFAULT };
        let s2 = tree.child(&s1, "x", different);
        assert_ne!(s1, s2);
        assert!(s1.is_deprecated());
        assert_eq!(tree.migration_target(&s1), s2);
    }

    #[test]
    fn array_kind_transitions_are_monotone_and_idempotent() {
        let tree = ShapeTree::new(8);
        let smi = tree.array_root();
        let double = tree.transition_element_kind(&smi, ArrayKind { kind: ElementKind::Double, holey: false });
        assert_eq!(double.array_kind().unwrap().kind, ElementKind::Double);
        let still_double = tree.transition_element_kind(&double, ArrayKind::SMI);
        assert_eq!(still_double, double, "narrowing back to SMI must be a no-op");
        let object = tree.transition_element_kind(&double, ArrayKind { kind: ElementKind::Object, holey: false });
        assert_eq!(object.array_kind().unwrap().kind, ElementKind::Object);
    }

    #[test]
    fn array_kind_join_is_associative() {
        let a = ArrayKind::SMI;
        let b = ArrayKind { kind: ElementKind::Double, holey: false };
        let c = ArrayKind { kind: ElementKind::Object, holey: true };
        assert_eq!(a.join(b).join(c), a.join(b.join(c)));
    }

    #[test]
    fn find_resolves_any_previously_minted_shape_by_id() {
        let tree = ShapeTree::new(8);
        let child = tree.child(&tree.root(), "x", Attrs::DEFAULT);
        assert_eq!(tree.find(child.id()), Some(child));
        assert_eq!(tree.find(999_999), None);
    }

    #[test]
    fn flattening_is_transparent_past_the_threshold() {
        let tree = ShapeTree::new(2);
        let mut cur = tree.root();
        for i in 0..5 {
            cur = tree.child(&cur, &format!("p{i}"), Attrs::DEFAULT);
        }
        for i in 0..5 {
            assert_eq!(tree.slot(&cur, &format!("p{i}")), Some(i as u32));
        }
    }
}
