use std::cmp::Ordering::{Equal, Greater, Less};
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

type NodePtr<K, V> = *mut ConcurrentMapNode<K, V>;
type Edge<K, V> = AtomicPtr<ConcurrentMapNode<K, V>>;

/// A node in a [`ConcurrentMap`].
///
/// The key is immutable after construction. The value slot is
/// default-constructed at allocation and mutable in place afterwards
/// through whatever interior mutability the caller's `V` provides; the
/// container itself never synchronizes access to it. The two child
/// edges are the only shared mutable state and each transitions at
/// most once, from null to a linked node.
///
#[derive(Debug)]
pub struct ConcurrentMapNode<K, V> {
    /// `None` exactly for the sentinel root. A real key can therefore
    /// never be mistaken for the sentinel during traversal.
    key: Option<K>,
    value: V,
    lower: Edge<K, V>,
    higher: Edge<K, V>,
}

impl<K, V> ConcurrentMapNode<K, V>
where
    K: Ord,
    V: Default,
{
    fn new(key: K) -> Self {
        ConcurrentMapNode {
            key: Some(key),
            value: V::default(),
            lower: AtomicPtr::new(ptr::null_mut()),
            higher: AtomicPtr::new(ptr::null_mut()),
        }
    }

    fn new_sentinel() -> Self {
        ConcurrentMapNode {
            key: None,
            value: V::default(),
            lower: AtomicPtr::new(ptr::null_mut()),
            higher: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Select the child edge `key` descends through, or `None` if this
    /// node already holds `key`.
    ///
    #[inline]
    fn edge_for(&self, key: &K) -> Option<&Edge<K, V>> {
        match &self.key {
            Some(node_key) => match key.cmp(node_key) {
                Equal => None,
                Less => Some(&self.lower),
                Greater => Some(&self.higher),
            },
            // The sentinel holds no key; every real key descends
            // through its higher edge.
            None => Some(&self.higher),
        }
    }
}

/// A concurrent map implemented as an unbalanced binary search tree.
///
/// The map supports concurrent insertion but not removal or
/// rebalancing; much like [`ConcurrentList`](super::ConcurrentList),
/// nodes are only freed when the whole map is dropped. The tree shape
/// is a direct function of insertion order, so adversarial (e.g.
/// monotonically increasing) key sequences degrade lookups to linear
/// depth. This is the accepted price of avoiding locks and
/// rebalancing machinery.
///
/// `find_or_allocate` walks the tree looking for the exact key. When
/// it reaches a null edge where the key belongs it tries to
/// compare-and-swap a freshly allocated node into place. Losing that
/// race means some node now occupies the edge, so the loser frees its
/// allocation and resumes the search from the same parent, converging
/// onto whichever node won. Exactly one node per distinct key ever
/// survives.
///
pub struct ConcurrentMap<K, V> {
    /// Sentinel root; contains no key and its value slot is never
    /// handed out.
    root: ConcurrentMapNode<K, V>,
}

impl<K, V> ConcurrentMap<K, V>
where
    K: Ord,
    V: Default,
{
    /// Creates a new map holding only the sentinel root.
    ///
    pub fn new() -> Self {
        ConcurrentMap {
            root: ConcurrentMapNode::new_sentinel(),
        }
    }

    /// Returns a reference to the value slot for `key`, allocating the
    /// entry on first observation of the key.
    ///
    /// Never fails: barring allocation failure (which aborts), some
    /// usable reference is always returned, and all callers racing on
    /// the same key converge onto the same slot. The slot itself is
    /// not synchronized by the map; cross-thread reads and writes of
    /// `V` are the caller's responsibility.
    ///
    pub fn find_or_allocate(&self, mut key: K) -> &V {
        let mut current: &ConcurrentMapNode<K, V> = &self.root;

        loop {
            let edge = match current.edge_for(&key) {
                // Found the node we were looking for.
                None => return &current.value,
                Some(edge) => edge,
            };

            // If the edge is populated, follow it.
            //
            let observed = edge.load(Ordering::Acquire);
            if !observed.is_null() {
                // SAFETY: a published node is never freed or relinked
                // while the map is alive.
                current = unsafe { &*observed };
                continue;
            }

            // The edge is empty: allocate a node and try to install it.
            //
            let new_node = Box::into_raw(Box::new(ConcurrentMapNode::new(key)));

            match edge.compare_exchange_weak(
                ptr::null_mut(),
                new_node,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    // SAFETY: the CAS published the node; it now lives
                    // until the map is dropped.
                    return unsafe { &(*new_node).value };
                }
                Err(_) => {
                    // Another thread claimed the edge first (or the
                    // weak CAS failed spuriously). The allocation was
                    // never published, so this thread is still its
                    // unique owner: reclaim the key, free the node and
                    // re-inspect the same parent. The edge now points
                    // at a node that may or may not hold our key.
                    //
                    // SAFETY: new_node came from Box::into_raw above
                    // and was never shared.
                    let lost = unsafe { Box::from_raw(new_node) };
                    key = lost.key.expect("freshly allocated node carries a key");
                }
            }
        }
    }
}

impl<K, V> Default for ConcurrentMap<K, V>
where
    K: Ord,
    V: Default,
{
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: the child edges are the only shared mutable state and each
// is written exactly once, via CAS. A linked node is never freed while
// the map is alive, so value references handed out by
// find_or_allocate stay valid for the life of the borrow. Keys and
// values inserted on one thread may be read or dropped on another,
// hence the Send bounds.
unsafe impl<K: Send, V: Send> Send for ConcurrentMap<K, V> {}
unsafe impl<K: Send + Sync, V: Send + Sync> Sync for ConcurrentMap<K, V> {}

impl<K, V> Drop for ConcurrentMap<K, V> {
    fn drop(&mut self) {
        // Free every allocated node with an explicit stack. Insertion
        // order can degenerate the tree to linear depth, so a
        // recursive teardown could exhaust the call stack.
        //
        let mut stack = Vec::new();

        for child in [
            self.root.lower.load(Ordering::Acquire),
            self.root.higher.load(Ordering::Acquire),
        ] {
            if !child.is_null() {
                stack.push(child);
            }
        }

        while let Some(node) = stack.pop() {
            // SAFETY: exclusive access during drop; every reachable
            // node was allocated with Box::new and each edge holds a
            // distinct node, so each is freed exactly once.
            let node = unsafe { Box::from_raw(node) };

            for child in [
                node.lower.load(Ordering::Acquire),
                node.higher.load(Ordering::Acquire),
            ] {
                if !child.is_null() {
                    stack.push(child);
                }
            }
        }

        // The sentinel is inline and freed with the map itself.
    }
}
