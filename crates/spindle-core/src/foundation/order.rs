//! Ordering of pluggable components.
//!
//! Factories, advices and exception handlers carry an `i32` order value
//! (lower runs earlier). Equal values are broken by registration sequence, so
//! the resulting order is total and stable: `(order, sequence)` compared
//! lexicographically.

/// Order value that sorts before everything else.
pub const HIGHEST_PRECEDENCE: i32 = i32::MIN;

/// Order value that sorts after everything else.
pub const LOWEST_PRECEDENCE: i32 = i32::MAX;

/// Order used when a component does not specify one.
pub const DEFAULT_ORDER: i32 = 0;

/// Order of the built-in resolvers, so user components win by default.
pub const FALLBACK_ORDER: i32 = 1000;

/// The total order key of a registered component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Precedence {
    order: i32,
    sequence: usize,
}

impl Precedence {
    /// The declared order value.
    pub fn order(&self) -> i32 {
        self.order
    }

    /// The registration sequence number.
    pub fn sequence(&self) -> usize {
        self.sequence
    }
}

/// A list kept sorted by [`Precedence`].
#[derive(Debug, Clone)]
pub struct OrderedList<T> {
    entries: Vec<(Precedence, T)>,
    next_sequence: usize,
}

impl<T> Default for OrderedList<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            next_sequence: 0,
        }
    }
}

impl<T> OrderedList<T> {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an item after every item with a lower or equal order.
    pub fn push(&mut self, order: i32, item: T) -> Precedence {
        let key = Precedence {
            order,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;
        let at = self.entries.partition_point(|(k, _)| *k <= key);
        self.entries.insert(at, (key, item));
        key
    }

    /// Iterates items in precedence order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|(_, item)| item)
    }

    /// Iterates `(precedence, item)` pairs in precedence order.
    pub fn entries(&self) -> impl Iterator<Item = (Precedence, &T)> {
        self.entries.iter().map(|(key, item)| (*key, item))
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consumes the list, yielding items in precedence order.
    pub fn into_vec(self) -> Vec<T> {
        self.entries.into_iter().map(|(_, item)| item).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ties_keep_registration_order() {
        let mut list = OrderedList::new();
        list.push(DEFAULT_ORDER, "a");
        list.push(-5, "b");
        list.push(DEFAULT_ORDER, "c");
        list.push(LOWEST_PRECEDENCE, "d");
        list.push(HIGHEST_PRECEDENCE, "e");
        list.push(-5, "f");

        let items: Vec<_> = list.iter().copied().collect();
        assert_eq!(items, ["e", "b", "f", "a", "c", "d"]);
    }
}
