//! First-fit slot allocation over one numeric index space.
//!
//! Candidates are scanned upward from a preferred index; the first start
//! whose range does not intersect anything already placed wins. There is no
//! backtracking, and because the scan only moves upward it always
//! terminates.

use std::ops::Range;

/// Index ranges already taken in one numeric space.
#[derive(Debug, Clone, Default)]
pub struct SlotAllocator {
    used: Vec<Range<u64>>,
}

impl SlotAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `[lo, lo + words)` as taken.
    pub fn reserve(&mut self, lo: u32, words: u32) {
        if words > 0 {
            let lo = u64::from(lo);
            self.used.push(lo..lo + u64::from(words));
        }
    }

    /// The range overlapping `[lo, lo + words)` that ends last, if any.
    fn conflict(&self, lo: u64, words: u32) -> Option<u64> {
        let hi = lo + u64::from(words);
        self.used
            .iter()
            .filter(|r| r.start < hi && lo < r.end)
            .map(|r| r.end)
            .max()
    }

    pub fn is_free(&self, lo: u32, words: u32) -> bool {
        words == 0 || self.conflict(u64::from(lo), words).is_none()
    }

    /// Place `words` words at the first free index at or above `hint` and
    /// reserve them. `None` if the space is exhausted.
    pub fn alloc(&mut self, hint: u32, words: u32) -> Option<u32> {
        let mut lo = u64::from(hint);
        if words > 0 {
            while let Some(end) = self.conflict(lo, words) {
                lo = end;
            }
        }
        if lo + u64::from(words) > u64::from(u32::MAX) + 1 {
            return None;
        }
        let lo = u32::try_from(lo).ok()?;
        self.reserve(lo, words);
        Some(lo)
    }

    /// One past the highest reserved index.
    pub fn end(&self) -> u32 {
        self.used
            .iter()
            .map(|r| r.end)
            .max()
            .map_or(0, |e| u32::try_from(e).unwrap_or(u32::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self) -> u32 {
            self.0 = self
                .0
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (self.0 >> 33) as u32
        }
    }

    #[test]
    fn test_first_fit_skips_taken() {
        let mut a = SlotAllocator::new();
        a.reserve(0, 2);
        a.reserve(3, 1);
        assert_eq!(a.alloc(0, 1), Some(2));
        assert_eq!(a.alloc(0, 2), Some(4));
        assert_eq!(a.alloc(10, 1), Some(10));
        assert_eq!(a.end(), 11);
    }

    #[test]
    fn test_zero_words_takes_nothing() {
        let mut a = SlotAllocator::new();
        a.reserve(0, 4);
        assert_eq!(a.alloc(1, 0), Some(1));
        assert!(a.is_free(4, 1));
    }

    #[test]
    fn test_exhaustion() {
        let mut a = SlotAllocator::new();
        a.reserve(u32::MAX - 1, 2);
        assert_eq!(a.alloc(u32::MAX - 1, 1), None);
        assert_eq!(a.alloc(u32::MAX - 3, 2), Some(u32::MAX - 3));
    }

    #[test]
    fn test_random_allocations_never_overlap() {
        let mut rng = Lcg(0xa110c);
        for _ in 0..50 {
            let mut a = SlotAllocator::new();
            let mut placed: Vec<(u32, u32)> = Vec::new();
            for _ in 0..60 {
                let words = rng.next() % 6;
                let hint = rng.next() % 40;
                let lo = a.alloc(hint, words).unwrap();
                assert!(lo >= hint);
                for &(plo, pw) in &placed {
                    let disjoint = lo + words <= plo || plo + pw <= lo;
                    assert!(disjoint, "[{lo}, +{words}) overlaps [{plo}, +{pw})");
                }
                if words > 0 {
                    placed.push((lo, words));
                }
            }
        }
    }
}
