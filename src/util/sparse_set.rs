/*!
Sparse sets of op indices, and the hybrid set that keys the lazy DFA.
*/

use crate::{error::Error, util::bits::BitVec};

/// A sparse set of `u32` values below a fixed capacity.
///
/// This supports constant time addition, membership testing and clearing.
/// Iteration yields elements in the order in which they were inserted,
/// which is what gives the simulator its thread priority order.
///
/// The data structure is based on: https://research.swtch.com/sparse
/// Note though that we don't actually use uninitialized memory; the sets
/// are long lived and reused, so the initial zeroing cost is paid once.
#[derive(Clone)]
pub(crate) struct SparseSet {
    /// The number of elements currently in this set.
    len: usize,
    /// Dense contains the values in the order in which they were inserted.
    dense: Vec<u32>,
    /// Sparse maps values to their location in dense.
    ///
    /// A value v is in the set if and only if
    /// sparse[v] < len && dense[sparse[v]] == v.
    sparse: Vec<u32>,
}

impl SparseSet {
    /// Create a new sparse set that can hold values in `0..capacity`.
    pub(crate) fn new(capacity: usize) -> SparseSet {
        SparseSet {
            len: 0,
            dense: vec![0; capacity],
            sparse: vec![0; capacity],
        }
    }

    /// Resizes this sparse set to the new capacity. The set is
    /// automatically cleared.
    pub(crate) fn resize(&mut self, new_capacity: usize) {
        self.clear();
        self.dense.resize(new_capacity, 0);
        self.sparse.resize(new_capacity, 0);
    }

    /// Shrinks the capacity while keeping the set's members. Unlike
    /// [`SparseSet::resize`] this fails rather than dropping elements:
    /// shrinking below the cardinality, or past a member's value, is an
    /// invalid argument.
    pub(crate) fn shrink_to(
        &mut self,
        new_capacity: usize,
    ) -> Result<(), Error> {
        if new_capacity >= self.capacity() {
            return Ok(());
        }
        if new_capacity < self.len {
            return Err(Error::invalid_argument(
                "cannot shrink a sparse set below its cardinality",
            ));
        }
        if self.iter().any(|v| v as usize >= new_capacity) {
            return Err(Error::invalid_argument(
                "cannot shrink a sparse set past one of its members",
            ));
        }
        self.dense.truncate(new_capacity);
        self.sparse.truncate(new_capacity);
        Ok(())
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.dense.len()
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert the value into this set and return true if it was not
    /// previously a member. Inserting a value at or beyond the capacity
    /// is a bug in the caller and panics.
    #[inline(always)]
    pub(crate) fn insert(&mut self, value: u32) -> bool {
        if self.contains(value) {
            return false;
        }
        let i = self.len;
        assert!(
            i < self.capacity(),
            "sparse set capacity {} exhausted when inserting {}",
            self.capacity(),
            value,
        );
        self.dense[i] = value;
        self.sparse[value as usize] = i as u32;
        self.len += 1;
        true
    }

    #[inline]
    pub(crate) fn contains(&self, value: u32) -> bool {
        let i = self.sparse[value as usize] as usize;
        i < self.len && self.dense[i] == value
    }

    /// Removes the value from this set, in constant time, by swapping the
    /// last-inserted member into its dense slot. Removing a value that is
    /// not a member is an invalid argument.
    pub(crate) fn remove(&mut self, value: u32) -> Result<(), Error> {
        if !self.contains(value) {
            return Err(Error::invalid_argument(
                "cannot remove a value that is not in the sparse set",
            ));
        }
        let i = self.sparse[value as usize] as usize;
        let last = self.dense[self.len - 1];
        self.dense[i] = last;
        self.sparse[last as usize] = i as u32;
        self.len -= 1;
        Ok(())
    }

    /// Clear this set such that it has no members.
    #[inline]
    pub(crate) fn clear(&mut self) {
        self.len = 0;
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.dense[..self.len].iter().copied()
    }
}

impl core::fmt::Debug for SparseSet {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let elements: Vec<u32> = self.iter().collect();
        f.debug_tuple("SparseSet").field(&elements).finish()
    }
}

/// A sparse set paired with a dense bitset shadow of the same membership.
///
/// The sparse side gives O(1) insertion, membership and insertion-order
/// iteration; the shadow gives O(capacity/64) equality and a total order,
/// so the set can key an ordered map. The two views agree after every
/// operation.
#[derive(Clone, Debug)]
pub(crate) struct HybridSet {
    set: SparseSet,
    shadow: BitVec,
}

impl HybridSet {
    pub(crate) fn new(capacity: usize) -> HybridSet {
        HybridSet {
            set: SparseSet::new(capacity),
            shadow: BitVec::new(capacity),
        }
    }

    #[inline(always)]
    pub(crate) fn insert(&mut self, value: u32) -> bool {
        if !self.set.insert(value) {
            return false;
        }
        self.shadow.set(value as usize);
        true
    }

    #[inline]
    pub(crate) fn contains(&self, value: u32) -> bool {
        self.set.contains(value)
    }

    pub(crate) fn remove(&mut self, value: u32) -> Result<(), Error> {
        self.set.remove(value)?;
        self.shadow.reset(value as usize);
        Ok(())
    }

    pub(crate) fn clear(&mut self) {
        self.set.clear();
        self.shadow.clear();
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.set.len()
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.set.iter()
    }

    /// The bitset image of this set, usable as an ordered-map key.
    #[inline]
    pub(crate) fn key(&self) -> &BitVec {
        &self.shadow
    }
}
