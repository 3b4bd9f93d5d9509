//! Chunking Module Tests
//!
//! ## Test Scopes
//! - **Fixed split**: exact cover, short final chunk, determinism.
//! - **Even split**: remainder distribution and tiny spaces.
//! - **Plan**: on-demand chunk lookup matches the materialized split.

#[cfg(test)]
mod tests {
    use crate::chunking::{Chunk, ChunkPlan, ChunkPolicy, split, split_even};

    fn assert_exact_cover(chunks: &[Chunk], total: u64) {
        let mut expected_offset = 0;
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.id, i as u64, "ids must be sequential");
            assert_eq!(chunk.offset, expected_offset, "chunks must be contiguous");
            assert!(chunk.length > 0, "chunks must not be empty");
            expected_offset = chunk.end();
        }
        assert_eq!(expected_offset, total);
        assert_eq!(chunks.iter().map(|c| c.length).sum::<u64>(), total);
    }

    // ============================================================
    // FIXED SPLIT TESTS
    // ============================================================

    #[test]
    fn test_split_ten_by_three() {
        let chunks = split(10, 3).unwrap();

        let ranges: Vec<(u64, u64)> = chunks.iter().map(|c| (c.offset, c.length)).collect();
        assert_eq!(ranges, vec![(0, 3), (3, 3), (6, 3), (9, 1)]);
    }

    #[test]
    fn test_split_exact_multiple() {
        let chunks = split(12, 4).unwrap();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2], Chunk { id: 2, offset: 8, length: 4 });
    }

    #[test]
    fn test_split_covers_many_shapes() {
        for total in [0u64, 1, 2, 7, 100, 1_001] {
            for chunk_size in [1u64, 2, 3, 10, 1_000, 5_000] {
                let chunks = split(total, chunk_size).unwrap();
                assert_exact_cover(&chunks, total);
            }
        }
    }

    #[test]
    fn test_split_zero_chunk_size_is_rejected() {
        assert!(split(10, 0).is_err());
    }

    #[test]
    fn test_split_is_deterministic() {
        assert_eq!(split(1_000, 7).unwrap(), split(1_000, 7).unwrap());
    }

    // ============================================================
    // EVEN SPLIT TESTS
    // ============================================================

    #[test]
    fn test_split_even_spreads_remainder_first() {
        let chunks = split_even(10, 4).unwrap();

        let lengths: Vec<u64> = chunks.iter().map(|c| c.length).collect();
        assert_eq!(lengths, vec![3, 3, 2, 2]);
        assert_exact_cover(&chunks, 10);
    }

    #[test]
    fn test_split_even_small_space() {
        let chunks = split_even(3, 8).unwrap();

        assert_eq!(chunks.len(), 3);
        assert_exact_cover(&chunks, 3);
    }

    #[test]
    fn test_split_even_zero_workers_is_rejected() {
        assert!(split_even(10, 0).is_err());
    }

    // ============================================================
    // PLAN TESTS
    // ============================================================

    #[test]
    fn test_plan_lookup_matches_split() {
        let plan = ChunkPolicy::Fixed { chunk_size: 3 }.plan(10).unwrap();

        assert_eq!(plan.len(), 4);
        assert_eq!(plan.chunk(3), Some(Chunk { id: 3, offset: 9, length: 1 }));
        assert_eq!(plan.chunk(4), None);
        assert_eq!(plan.iter().collect::<Vec<_>>(), split(10, 3).unwrap());
    }

    #[test]
    fn test_plan_handles_huge_totals_lazily() {
        let total = 62u64.pow(4) + 62u64.pow(5) + 62u64.pow(6) + 62u64.pow(7);
        let plan = ChunkPlan::fixed(total, 1_000_000).unwrap();

        let last = plan.chunk(plan.len() - 1).unwrap();
        assert_eq!(last.end(), total);
        assert!(last.length <= 1_000_000);
    }

    #[test]
    fn test_adaptive_policy_plan() {
        let plan = ChunkPolicy::Adaptive { workers: 3 }.plan(7).unwrap();

        assert_eq!(
            plan.iter().map(|c| c.length).collect::<Vec<_>>(),
            vec![3, 2, 2]
        );
    }
}
