//! Stable document partitioning across workers.
//!
//! A document belongs to partition `h % worker_count`, where `h` is the first
//! 32 bits of the MD5 digest of its hyphenated lowercase id. [`PARTITION_SQL`]
//! computes the same value inside PostgreSQL, so the in-memory and database
//! stores agree on ownership.

use uuid::Uuid;

/// SQL expression for the partition hash of `document_id`, as a non-negative bigint.
pub const PARTITION_SQL: &str = "('x' || substr(md5(document_id::text), 1, 8))::bit(32)::bigint";

/// First 32 bits of `md5(document_id)`.
pub fn partition_hash(document_id: &Uuid) -> u32 {
    let digest = md5::compute(document_id.to_string().as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Partition owning `document_id`. A worker count of zero is treated as one.
pub fn partition_of(document_id: &Uuid, worker_count: usize) -> usize {
    let count = worker_count.max(1) as u64;
    (partition_hash(document_id) as u64 % count) as usize
}
