use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

type NodePtr<T> = *mut ConcurrentListNode<T>;

/// A node in a [`ConcurrentList`].
///
/// Once a node is linked into a list its successor pointer is never
/// written again, so readers can follow chains without any
/// synchronization beyond the acquire load that discovered the node.
///
#[derive(Debug)]
pub struct ConcurrentListNode<T> {
    payload: T,
    next: AtomicPtr<ConcurrentListNode<T>>,
}

impl<T> ConcurrentListNode<T> {
    fn new(payload: T) -> Self {
        ConcurrentListNode {
            payload,
            next: AtomicPtr::new(ptr::null_mut()),
        }
    }

    // =========================================================================
    // Next pointer accessors
    // =========================================================================

    /// Load next pointer (Acquire ordering)
    #[inline]
    fn get_next(&self) -> NodePtr<T> {
        self.next.load(Ordering::Acquire)
    }

    /// Store next pointer (Relaxed ordering).
    ///
    /// Only called while the node is still private to the pushing
    /// thread; the publishing CAS on the list head releases the write.
    ///
    #[inline]
    fn set_next(&self, ptr: NodePtr<T>) {
        self.next.store(ptr, Ordering::Relaxed)
    }

    /// Deallocate this node.
    ///
    /// # Safety
    /// - The pointer must have been allocated by `push_front`
    /// - Must only be called once
    /// - Node must not be accessed after this call
    ///
    unsafe fn dealloc_ptr(ptr: NodePtr<T>) {
        // SAFETY: caller must ensure ptr was allocated with Box::new
        unsafe { drop(Box::from_raw(ptr)) };
    }
}

/// A lock-free singly-linked list supporting concurrent prepend and
/// snapshot iteration.
///
/// `push_front` allocates a new node and attempts to compare-and-swap
/// the head pointer with a pointer to the new node. The CAS may fail
/// many times under contention, but every failure means another thread
/// linked its node first, so the loop is lock-free. The harder feature
/// of removing nodes is deliberately not supported: a linked node is
/// owned by the list and freed only when the list is dropped, which is
/// what makes iteration safe without a reclamation scheme.
///
pub struct ConcurrentList<T> {
    head: AtomicPtr<ConcurrentListNode<T>>,
}

impl<T> ConcurrentList<T> {
    /// Creates a new empty list.
    ///
    pub fn new() -> Self {
        ConcurrentList {
            head: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Prepend a value to the list.
    ///
    /// The new node's successor is pointed at the observed head; on CAS
    /// failure the successor is refreshed from the freshly observed
    /// head and the CAS retried.
    ///
    pub fn push_front(&self, value: T) {
        let new_node = Box::into_raw(Box::new(ConcurrentListNode::new(value)));

        let mut observed = self.head.load(Ordering::Acquire);

        loop {
            // The node is unpublished, so this store needs no ordering;
            // the successful CAS below releases it.
            //
            unsafe { (*new_node).set_next(observed) };

            match self.head.compare_exchange_weak(
                observed,
                new_node,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => observed = actual,
            }
        }
    }

    /// Whether the list has no linked nodes.
    ///
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire).is_null()
    }

    /// Returns a snapshot iterator over the list.
    ///
    /// The head pointer is captured once; nodes pushed after the
    /// iterator is created are not observed. Elements are yielded in
    /// reverse order of successful insertion (most recent first).
    ///
    pub fn iter(&self) -> ConcurrentListIter<'_, T> {
        ConcurrentListIter {
            node: self.head.load(Ordering::Acquire),
            _list: PhantomData,
        }
    }

    /// Returns a mutable iterator over the list.
    ///
    /// Requires exclusive access, so no snapshot semantics apply: the
    /// borrow rules guarantee no concurrent pushes or readers exist.
    ///
    pub fn iter_mut(&mut self) -> ConcurrentListIterMut<'_, T> {
        ConcurrentListIterMut {
            node: self.head.load(Ordering::Acquire),
            _list: PhantomData,
        }
    }
}

impl<T> Default for ConcurrentList<T> {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: the head pointer is the only shared mutable state and all
// mutation goes through CAS. A linked node is never freed or relinked
// while the list is alive, so references observed through an acquire
// load of the head stay valid for the life of the borrow.
unsafe impl<T: Send> Send for ConcurrentList<T> {}
unsafe impl<T: Send + Sync> Sync for ConcurrentList<T> {}

impl<T> Drop for ConcurrentList<T> {
    fn drop(&mut self) {
        // Walk the chain and free every node. Exclusive access is
        // guaranteed by &mut self.
        //
        let mut curr = self.head.load(Ordering::Acquire);

        while !curr.is_null() {
            unsafe {
                let next = (*curr).get_next();
                ConcurrentListNode::dealloc_ptr(curr);
                curr = next;
            }
        }
    }
}

/// Snapshot iterator over a [`ConcurrentList`].
///
pub struct ConcurrentListIter<'a, T> {
    node: NodePtr<T>,
    _list: PhantomData<&'a ConcurrentList<T>>,
}

impl<'a, T> Iterator for ConcurrentListIter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.node.is_null() {
            return None;
        }

        // SAFETY: the node was reachable from a captured head and the
        // borrowed list cannot drop or relink it.
        unsafe {
            let node: &'a ConcurrentListNode<T> = &*self.node;
            self.node = node.get_next();
            Some(&node.payload)
        }
    }
}

impl<'a, T> IntoIterator for &'a ConcurrentList<T> {
    type Item = &'a T;
    type IntoIter = ConcurrentListIter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Mutable iterator over a [`ConcurrentList`].
///
pub struct ConcurrentListIterMut<'a, T> {
    node: NodePtr<T>,
    _list: PhantomData<&'a mut ConcurrentList<T>>,
}

impl<'a, T> Iterator for ConcurrentListIterMut<'a, T> {
    type Item = &'a mut T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.node.is_null() {
            return None;
        }

        // SAFETY: exclusive borrow of the list, and the chain is
        // acyclic, so each payload is handed out at most once.
        unsafe {
            let node: &'a mut ConcurrentListNode<T> = &mut *self.node;
            self.node = node.get_next();
            Some(&mut node.payload)
        }
    }
}

impl<'a, T> IntoIterator for &'a mut ConcurrentList<T> {
    type Item = &'a mut T;
    type IntoIter = ConcurrentListIterMut<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}
