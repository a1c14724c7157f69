//! Victim selection shared by TLB replacement and page replacement.

use serde::{Deserialize, Serialize};

use super::translate::{EntryFlags, TranslationEntry};

/// How a victim slot is chosen among eligible entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReplacementStrategy {
    /// First entry with `use == false`; otherwise the largest aging count,
    /// ties to the lowest index.
    #[default]
    Lru,
    /// Always the lowest eligible index.
    Fixed,
}

/// Choose a victim among `entries` for which `eligible` holds.
///
/// Returns `None` when no entry is eligible. The chosen entry's aging count
/// is reset.
pub fn select_victim<F>(
    entries: &mut [TranslationEntry],
    strategy: ReplacementStrategy,
    eligible: F,
) -> Option<usize>
where
    F: Fn(usize, &TranslationEntry) -> bool,
{
    let candidates: Vec<usize> = entries
        .iter()
        .enumerate()
        .filter(|&(idx, entry)| eligible(idx, entry))
        .map(|(idx, _)| idx)
        .collect();

    let victim = match strategy {
        ReplacementStrategy::Fixed => candidates.first().copied(),
        ReplacementStrategy::Lru => {
            let unused = candidates
                .iter()
                .copied()
                .find(|&idx| !entries[idx].is_used());
            unused.or_else(|| {
                let mut best: Option<usize> = None;
                for &idx in &candidates {
                    if best.map_or(true, |b| entries[idx].count > entries[b].count) {
                        best = Some(idx);
                    }
                }
                best
            })
        }
    }?;

    entries[victim].count = 0;
    Some(victim)
}

/// Age a table after an access: the hit entry's count resets, every other
/// valid entry's count grows.
pub fn age(entries: &mut [TranslationEntry], hit: Option<usize>) {
    for (idx, entry) in entries.iter_mut().enumerate() {
        if Some(idx) == hit {
            entry.count = 0;
        } else if entry.flags.contains(EntryFlags::VALID) {
            entry.count = entry.count.saturating_add(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(used: bool, count: u32) -> TranslationEntry {
        let mut e = TranslationEntry::mapped(0, 0, false);
        e.flags.set(EntryFlags::USE, used);
        e.count = count;
        e
    }

    #[test]
    fn test_picks_single_unused_entry() {
        let mut tlb = [
            entry(true, 1),
            entry(true, 2),
            entry(false, 0),
            entry(true, 3),
        ];
        let victim = select_victim(&mut tlb, ReplacementStrategy::Lru, |_, _| true);
        assert_eq!(victim, Some(2));
    }

    #[test]
    fn test_all_used_picks_largest_count_lowest_index() {
        let mut tlb = [
            entry(true, 1),
            entry(true, 5),
            entry(true, 5),
            entry(true, 3),
        ];
        let victim = select_victim(&mut tlb, ReplacementStrategy::Lru, |_, _| true);
        assert_eq!(victim, Some(1));
        assert_eq!(tlb[1].count, 0);
    }

    #[test]
    fn test_eligibility_excludes_entries() {
        let mut table = [entry(false, 0), entry(true, 9), entry(true, 4)];
        let victim = select_victim(&mut table, ReplacementStrategy::Lru, |idx, _| idx != 0);
        assert_eq!(victim, Some(1));

        let none = select_victim(&mut table, ReplacementStrategy::Lru, |_, _| false);
        assert_eq!(none, None);
    }

    #[test]
    fn test_fixed_takes_first_eligible() {
        let mut table = [entry(false, 0), entry(true, 9), entry(false, 4)];
        let victim = select_victim(&mut table, ReplacementStrategy::Fixed, |idx, _| idx > 0);
        assert_eq!(victim, Some(1));
    }

    #[test]
    fn test_age_resets_hit_and_skips_invalid() {
        let mut table = [entry(true, 2), entry(true, 2), TranslationEntry::new(2)];
        age(&mut table, Some(1));
        assert_eq!(table[0].count, 3);
        assert_eq!(table[1].count, 0);
        assert_eq!(table[2].count, 0);
    }
}
