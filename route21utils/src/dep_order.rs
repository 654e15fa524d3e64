//!
//! # Dependency-Ordering Trait and Helpers
//!

// Std-lib
use std::collections::HashSet;
use std::marker::PhantomData;

///
/// # Dependency-Ordering Trait
///
/// Hierarchical cells form a graph of dependencies: a cell depends on every
/// cell it instantiates. Extraction must visit that graph children-first, so
/// that a sub-instance's equipotentials are available (as child-equi caches)
/// when its parent is swept. Graph nodes are commonly stored unordered, and
/// get dependency-ordered here before processing.
///
/// The [DepOrder] trait requires a single user-defined method `process`,
/// which processes a single `Item` (commonly a pointer to a graph node).
/// The implementation of `process` is responsible for iterating over
/// `item`'s (direct) dependencies, and passing each as an argument to
/// `orderer.push`. The `push` method, implemented on local helper-type
/// [DepOrderer], recursively traverses dependencies, calling `process` on
/// each. `push` also monitors for graph-cycles and returns the associated
/// `Error` type if one is detected.
///
/// The default-implemented [DepOrder::order] creates and returns a
/// dependency-ordered vector of `Item`s, and serves as the primary
/// entrypoint for typical usage.
///
pub trait DepOrder: Sized {
    /// Item Type. Typically pointers or keys to the nodes in the dependency graph.
    type Item: Clone + Eq + std::hash::Hash;
    /// Error Type
    type Error;

    /// Dependency-order all entries in slice `items`
    fn order(items: &[Self::Item]) -> Result<Vec<Self::Item>, Self::Error> {
        DepOrderer::<Self>::order(items)
    }

    /// Process a single `item`, typically depth-first
    fn process(item: &Self::Item, orderer: &mut DepOrderer<Self>) -> Result<(), Self::Error>;
    /// Failure-handler. Return our `Error` type.
    fn fail() -> Result<(), Self::Error>;
}

/// # Dependency Order Helper
/// Should not be used directly.
/// Public solely for use in the call-signature of [DepOrder::process].
pub struct DepOrderer<P: DepOrder> {
    /// Ordered, completed items
    stack: Vec<P::Item>,
    /// Hash-set of completed items, for quick membership tests
    seen: HashSet<P::Item>,
    /// Hash-set of pending items, for cycle detection
    pending: HashSet<P::Item>,
    // Item-processor phantom reference
    p: PhantomData<P>,
}
impl<P: DepOrder> DepOrderer<P> {
    /// Dependency-order all entries in slice `items`
    pub fn order(items: &[P::Item]) -> Result<Vec<P::Item>, P::Error> {
        let len = items.len();
        let mut this = Self {
            stack: Vec::with_capacity(len),
            seen: HashSet::with_capacity(len),
            pending: HashSet::new(),
            p: PhantomData,
        };
        for item in items.iter() {
            this.push(item)?;
        }
        Ok(this.stack)
    }
    /// Push `item`'s dependencies, and then itself, onto the stack
    pub fn push(&mut self, item: &P::Item) -> Result<(), P::Error> {
        // Depth-first search over instantiated cells
        if !self.seen.contains(item) {
            // Check for cycles, indicated if `item` is in the pending-set,
            // i.e. an open recursive stack-frame.
            if self.pending.contains(item) {
                return P::fail();
            }
            self.pending.insert(item.clone());
            // Process the Item, dependencies first
            P::process(item, self)?;
            if !self.pending.remove(item) {
                return P::fail();
            }
            self.seen.insert(item.clone());
            self.stack.push(item.clone());
        }
        Ok(())
    }
}
