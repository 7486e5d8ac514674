//! A segmented hash table with fine-grained locking.
//!
//! The table divides its entries between a number of smaller logical hash
//! tables, or segments, each guarded by its own reader-writer lock. Entries are
//! never relocated across segment boundaries. The number of segments is rounded
//! up to the nearest power of two, so selecting the segment for a key is no
//! more than a right shift over the most significant bits of its hash.
//!
//! Threads operating on disjoint segments proceed entirely independently; a
//! compound operation on a single key holds exactly one segment lock for its
//! whole critical section, which is what makes the per-key compare-and-swap
//! style operations in this module atomic.

pub(crate) mod segment;

pub(crate) use segment::SegmentedHashMap;
