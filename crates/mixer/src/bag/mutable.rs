use super::Bag;
use crate::{
    error::{Error, Result},
    value::Value,
};
use core::fmt;
use parking_lot::RwLock;
use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

/// The parent a [`MutableBag`] layer falls through to on a lookup miss.
#[derive(Clone)]
enum Parent {
    Empty,
    Frozen(Arc<dyn Bag>),
    Mutable(Arc<Layer>),
}

#[derive(Default)]
struct State {
    values: HashMap<String, Value>,
    deleted: HashSet<String>,
}

/// Storage shared between a [`MutableBag`] handle and the handles of its
/// children.
///
/// `parent` is `None` once the layer has been reclaimed. A released layer
/// with live children keeps its storage until the last child is released,
/// so children can keep reading through it.
struct Layer {
    parent: RwLock<Option<Parent>>,
    state: RwLock<State>,
    released: AtomicBool,
    reclaimed: AtomicBool,
    children: AtomicUsize,
}

impl Layer {
    fn new(parent: Parent) -> Self {
        Self {
            parent: RwLock::new(Some(parent)),
            state: RwLock::new(State::default()),
            released: AtomicBool::new(false),
            reclaimed: AtomicBool::new(false),
            children: AtomicUsize::new(0),
        }
    }

    fn lookup(&self, name: &str) -> Option<Value> {
        {
            let state = self.state.read();
            if let Some(value) = state.values.get(name) {
                return Some(value.clone());
            }
            if state.deleted.contains(name) {
                return None;
            }
        }

        match &*self.parent.read() {
            Some(Parent::Frozen(bag)) => bag.get(name),
            Some(Parent::Mutable(layer)) => layer.lookup(name),
            Some(Parent::Empty) | None => None,
        }
    }

    fn collect_names(&self, names: &mut HashSet<String>) {
        match &*self.parent.read() {
            Some(Parent::Frozen(bag)) => names.extend(bag.names()),
            Some(Parent::Mutable(layer)) => layer.collect_names(names),
            Some(Parent::Empty) | None => {}
        }

        let state = self.state.read();
        for name in &state.deleted {
            names.remove(name);
        }
        names.extend(state.values.keys().cloned());
    }

    /// Drops the layer's storage and detaches it from its parent, cascading
    /// to a parent that was released while waiting on this child.
    fn reclaim(&self) {
        if self.reclaimed.swap(true, Ordering::SeqCst) {
            return;
        }

        {
            let mut state = self.state.write();
            state.values.clear();
            state.deleted.clear();
        }

        let parent = self.parent.write().take();
        if let Some(Parent::Mutable(parent)) = parent {
            if parent.children.fetch_sub(1, Ordering::SeqCst) == 1
                && parent.released.load(Ordering::SeqCst)
            {
                parent.reclaim();
            }
        }
    }
}

/// A writable attribute layer over a parent bag.
///
/// Writes land in this layer only: setting or deleting a name never touches
/// the parent or any sibling. Reads check this layer first, then fall
/// through the parent chain.
///
/// ## Lifecycle
///
/// A `MutableBag` has a single owner, which must call [`done`] exactly once
/// when it is finished with the bag. After that, [`get`], [`set`],
/// [`delete`], [`child`], [`merge`] and [`names`] panic, and so does a
/// second [`done`]. Children spawned with [`child`] must each be released as
/// well; a parent released before its children keeps its storage alive for
/// them and reclaims it when the last child is done.
///
/// [`done`]: MutableBag::done
/// [`get`]: MutableBag::get
/// [`set`]: MutableBag::set
/// [`delete`]: MutableBag::delete
/// [`child`]: MutableBag::child
/// [`merge`]: MutableBag::merge
/// [`names`]: MutableBag::names
pub struct MutableBag {
    layer: Arc<Layer>,
}

impl MutableBag {
    /// Creates a root bag with no parent attributes.
    pub fn new() -> Self {
        Self::from_parent(Parent::Empty)
    }

    /// Creates a bag layered over an immutable parent.
    pub fn with_parent(parent: Arc<dyn Bag>) -> Self {
        Self::from_parent(Parent::Frozen(parent))
    }

    fn from_parent(parent: Parent) -> Self {
        Self {
            layer: Arc::new(Layer::new(parent)),
        }
    }

    fn live(&self) -> &Layer {
        assert!(
            !self.layer.released.load(Ordering::SeqCst),
            "use of a released MutableBag"
        );
        &self.layer
    }

    /// Looks up `name` in this layer, then in the parent chain.
    ///
    /// # Panics
    ///
    /// Panics if the bag has been released.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.live().lookup(name)
    }

    /// Every visible name: the parent's names minus local deletions, plus
    /// local overrides.
    ///
    /// # Panics
    ///
    /// Panics if the bag has been released.
    pub fn names(&self) -> Vec<String> {
        let mut names = HashSet::new();
        self.live().collect_names(&mut names);
        names.into_iter().collect()
    }

    /// Installs or overwrites a local value for `name`.
    ///
    /// # Panics
    ///
    /// Panics if the bag has been released.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let mut state = self.live().state.write();
        state.deleted.remove(&name);
        state.values.insert(name, value.into());
    }

    /// Hides `name` in this layer and its children, whatever the parent
    /// chain holds.
    ///
    /// # Panics
    ///
    /// Panics if the bag has been released.
    pub fn delete(&mut self, name: impl Into<String>) {
        let name = name.into();
        let mut state = self.live().state.write();
        state.values.remove(&name);
        state.deleted.insert(name);
    }

    /// Spawns a new mutable layer whose parent is this bag.
    ///
    /// # Panics
    ///
    /// Panics if the bag has been released.
    pub fn child(&self) -> Self {
        self.live().children.fetch_add(1, Ordering::SeqCst);
        Self::from_parent(Parent::Mutable(Arc::clone(&self.layer)))
    }

    /// Copies the local overrides of every bag in `bags` into this bag.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MergeConflict`] naming the first attribute that two
    /// of the given bags set to different values. Whatever was merged before
    /// the conflict was found stays in this bag.
    ///
    /// # Panics
    ///
    /// Panics if this bag or any of `bags` has been released.
    pub fn merge(&mut self, bags: &[&MutableBag]) -> Result<()> {
        let mut seen: HashMap<String, Value> = HashMap::new();
        let mut dst = self.live().state.write();

        for bag in bags {
            let src = bag.live().state.read();
            for (name, value) in &src.values {
                match seen.get(name) {
                    Some(prev) if prev != value => {
                        #[cfg(feature = "tracing")]
                        tracing::debug!("merge conflict on attribute {name}");
                        return Err(Error::MergeConflict { name: name.clone() });
                    }
                    Some(_) => continue,
                    None => {}
                }
                seen.insert(name.clone(), value.clone());
                dst.deleted.remove(name);
                dst.values.insert(name.clone(), value.clone());
            }
        }

        Ok(())
    }

    /// Releases the bag.
    ///
    /// # Panics
    ///
    /// Panics if the bag was already released.
    pub fn done(&self) {
        let layer = &self.layer;
        assert!(
            !layer.released.swap(true, Ordering::SeqCst),
            "MutableBag::done called on a released bag"
        );
        if layer.children.load(Ordering::SeqCst) == 0 {
            layer.reclaim();
        }
    }

    /// Returns `true` once [`done`](MutableBag::done) has been called.
    pub fn is_released(&self) -> bool {
        self.layer.released.load(Ordering::SeqCst)
    }

    /// Returns `true` once the layer's storage has been dropped and it no
    /// longer references its parent.
    pub fn is_reclaimed(&self) -> bool {
        self.layer.reclaimed.load(Ordering::SeqCst) && self.layer.parent.read().is_none()
    }
}

impl Default for MutableBag {
    fn default() -> Self {
        Self::new()
    }
}

impl Bag for MutableBag {
    fn get(&self, name: &str) -> Option<Value> {
        Self::get(self, name)
    }

    fn names(&self) -> Vec<String> {
        Self::names(self)
    }
}

impl fmt::Debug for MutableBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.layer.state.read();
        f.debug_struct("MutableBag")
            .field("values", &state.values)
            .field("deleted", &state.deleted)
            .field("released", &self.layer.released.load(Ordering::SeqCst))
            .field("children", &self.layer.children.load(Ordering::SeqCst))
            .finish()
    }
}
