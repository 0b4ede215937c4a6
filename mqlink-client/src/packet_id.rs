/// Hands out packet identifiers from a wrapping counter.
///
/// Zero is never returned, and neither is an identifier the caller reports
/// as still in use.
#[derive(Debug, Default)]
pub(crate) struct PacketIdAllocator {
    last: u16,
}

impl PacketIdAllocator {
    pub(crate) fn allocate(&mut self, in_use: impl Fn(u16) -> bool) -> Option<u16> {
        let mut candidate = self.last;

        for _ in 0..u16::MAX {
            candidate = candidate.wrapping_add(1);
            if candidate == 0 {
                candidate = 1;
            }

            if !in_use(candidate) {
                self.last = candidate;
                return Some(candidate);
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_counts_up_from_one() {
        let mut ids = PacketIdAllocator::default();

        assert_eq!(ids.allocate(|_| false), Some(1));
        assert_eq!(ids.allocate(|_| false), Some(2));
        assert_eq!(ids.allocate(|_| false), Some(3));
    }

    #[test]
    fn test_wraps_and_skips_zero() {
        let mut ids = PacketIdAllocator { last: u16::MAX - 1 };

        assert_eq!(ids.allocate(|_| false), Some(u16::MAX));
        assert_eq!(ids.allocate(|_| false), Some(1));
    }

    #[test]
    fn test_skips_identifiers_in_use() {
        let mut ids = PacketIdAllocator::default();
        let in_use: HashSet<u16> = [1, 2, 4].into_iter().collect();

        assert_eq!(ids.allocate(|id| in_use.contains(&id)), Some(3));
        assert_eq!(ids.allocate(|id| in_use.contains(&id)), Some(5));
    }

    #[test]
    fn test_exhausted() {
        let mut ids = PacketIdAllocator::default();

        assert_eq!(ids.allocate(|_| true), None);
        assert_eq!(ids.allocate(|id| id != 40_000), Some(40_000));
    }
}
