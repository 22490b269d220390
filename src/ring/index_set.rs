use std::collections::BTreeSet;
use std::fmt;

/// Ordered set of prime indices into the modulus chain.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct IndexSet(BTreeSet<usize>);

impl IndexSet {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// The closed interval {lo, ..., hi}; empty when hi < lo.
    pub fn interval(lo: usize, hi: usize) -> Self {
        Self((lo..=hi).collect())
    }

    /// Interval helper for signed bounds, so that {0..lvl-1} at lvl = 0 is empty.
    pub fn interval_signed(lo: i64, hi: i64) -> Self {
        if hi < lo || hi < 0 {
            return Self::new();
        }
        Self::interval(lo.max(0) as usize, hi as usize)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, i: usize) -> bool {
        self.0.contains(&i)
    }

    pub fn insert(&mut self, i: usize) -> bool {
        self.0.insert(i)
    }

    pub fn remove(&mut self, i: usize) -> bool {
        self.0.remove(&i)
    }

    pub fn first(&self) -> Option<usize> {
        self.0.first().copied()
    }

    pub fn last(&self) -> Option<usize> {
        self.0.last().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }

    pub fn union(&self, other: &Self) -> Self {
        Self(self.0.union(&other.0).copied().collect())
    }

    pub fn intersection(&self, other: &Self) -> Self {
        Self(self.0.intersection(&other.0).copied().collect())
    }

    /// Elements of `self` not in `other`.
    pub fn difference(&self, other: &Self) -> Self {
        Self(self.0.difference(&other.0).copied().collect())
    }

    pub fn is_subset(&self, other: &Self) -> bool {
        self.0.is_subset(&other.0)
    }

    pub fn is_disjoint(&self, other: &Self) -> bool {
        self.0.is_disjoint(&other.0)
    }

    /// True for a non-empty run of consecutive indices.
    pub fn is_interval(&self) -> bool {
        match (self.first(), self.last()) {
            (Some(lo), Some(hi)) => hi - lo + 1 == self.len(),
            _ => false,
        }
    }
}

impl FromIterator<usize> for IndexSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for IndexSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (pos, i) in self.iter().enumerate() {
            if pos > 0 {
                write!(f, " ")?;
            }
            write!(f, "{i}")?;
        }
        write!(f, "}}")
    }
}
