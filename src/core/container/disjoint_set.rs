use std::collections::BTreeMap;

/// Disjoint set (union-find) over ordered keys.
///
/// Keys are stored in ordered maps so that the produced groups are deterministic.
#[derive(Debug, Clone)]
pub struct DisjointSet<T>
where
    T: Copy + Ord,
{
    parent: BTreeMap<T, T>,
    rank: BTreeMap<T, usize>,
}

impl<T> DisjointSet<T>
where
    T: Copy + Ord,
{
    pub fn new(xs: &[T]) -> Self {
        let parent = xs.iter().map(|&x| (x, x)).collect::<BTreeMap<_, _>>();
        let rank = xs.iter().map(|&x| (x, 0)).collect::<BTreeMap<_, _>>();
        Self { parent, rank }
    }

    pub fn find(&mut self, x: T) -> Option<T> {
        let parent = *self.parent.get(&x)?;
        if parent == x {
            Some(x)
        } else {
            let root = self.find(parent)?;
            self.parent.insert(x, root);
            Some(root)
        }
    }

    pub fn union(&mut self, x: T, y: T) -> bool {
        let (x_root, y_root) = match (self.find(x), self.find(y)) {
            (Some(x_root), Some(y_root)) => (x_root, y_root),
            _ => return false,
        };

        if x_root == y_root {
            return true;
        }

        match (self.rank.get(&x_root), self.rank.get(&y_root)) {
            (Some(&x_rank), Some(&y_rank)) => {
                if x_rank < y_rank {
                    self.parent.insert(x_root, y_root);
                } else if x_rank > y_rank {
                    self.parent.insert(y_root, x_root);
                } else {
                    self.parent.insert(y_root, x_root);
                    self.rank.insert(x_root, x_rank + 1);
                }
                true
            }
            _ => false,
        }
    }

    pub fn is_same_set(&mut self, x: T, y: T) -> bool {
        match (self.find(x), self.find(y)) {
            (Some(x_root), Some(y_root)) => x_root == y_root,
            _ => false,
        }
    }

    /// Get all sets, each sorted, ordered by their smallest member.
    pub fn get_all_sets(&mut self) -> Vec<Vec<T>> {
        let keys = self.parent.keys().copied().collect::<Vec<_>>();
        let mut sets: BTreeMap<T, Vec<T>> = BTreeMap::new();
        for key in keys {
            if let Some(root) = self.find(key) {
                sets.entry(root).or_default().push(key);
            }
        }
        let mut sets = sets.into_values().collect::<Vec<_>>();
        sets.sort_by_key(|set| set[0]);
        sets
    }
}
