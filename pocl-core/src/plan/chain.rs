use std::sync::Arc;

/// Immutable singly-linked list whose tails are shared between plans.
#[derive(Debug)]
pub struct Chain<T> {
    head: Option<Arc<ChainNode<T>>>,
    len: usize,
}

#[derive(Debug)]
struct ChainNode<T> {
    value: T,
    next: Option<Arc<ChainNode<T>>>,
}

impl<T> Clone for Chain<T> {
    fn clone(&self) -> Self {
        Self {
            head: self.head.clone(),
            len: self.len,
        }
    }
}

impl<T> Default for Chain<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Chain<T> {
    pub fn new() -> Self {
        Self { head: None, len: 0 }
    }

    /// New chain with `value` in front of `self`.
    pub fn cons(&self, value: T) -> Self {
        Self {
            head: Some(Arc::new(ChainNode {
                value,
                next: self.head.clone(),
            })),
            len: self.len + 1,
        }
    }

    pub fn head(&self) -> Option<&T> {
        self.head.as_deref().map(|node| &node.value)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Iterates from the most recently added element.
    pub fn iter(&self) -> ChainIter<'_, T> {
        ChainIter {
            node: self.head.as_deref(),
        }
    }
}

impl<T: Clone> Chain<T> {
    /// Chain without the first element matching `pred`. The prefix before it
    /// is copied and the suffix after it is shared.
    pub fn remove_first(&self, mut pred: impl FnMut(&T) -> bool) -> Self {
        let mut prefix = Vec::new();
        let mut node = self.head.as_ref();
        while let Some(current) = node {
            if pred(&current.value) {
                let mut chain = Chain {
                    head: current.next.clone(),
                    len: self.len - prefix.len() - 1,
                };
                for value in prefix.into_iter().rev() {
                    chain = chain.cons(value);
                }
                return chain;
            }
            prefix.push(current.value.clone());
            node = current.next.as_ref();
        }
        self.clone()
    }
}

impl<T> Drop for Chain<T> {
    // unlink uniquely owned nodes one at a time so long chains do not
    // overflow the stack
    fn drop(&mut self) {
        let mut next = self.head.take();
        while let Some(node) = next {
            match Arc::try_unwrap(node) {
                Ok(mut node) => next = node.next.take(),
                Err(_) => break,
            }
        }
    }
}

pub struct ChainIter<'a, T> {
    node: Option<&'a ChainNode<T>>,
}

impl<'a, T> Iterator for ChainIter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.node?;
        self.node = node.next.as_deref();
        Some(&node.value)
    }
}

impl<'a, T> IntoIterator for &'a Chain<T> {
    type Item = &'a T;
    type IntoIter = ChainIter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T> FromIterator<T> for Chain<T> {
    /// The last element of the iterator becomes the head.
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        iter.into_iter().fold(Chain::new(), |chain, value| chain.cons(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cons_shares_tail() {
        let base: Chain<u32> = [1, 2].into_iter().collect();
        let left = base.cons(3);
        let right = base.cons(4);
        assert_eq!(left.iter().copied().collect::<Vec<_>>(), vec![3, 2, 1]);
        assert_eq!(right.iter().copied().collect::<Vec<_>>(), vec![4, 2, 1]);
        assert_eq!(base.len(), 2);
        assert_eq!(left.head(), Some(&3));
    }

    #[test]
    fn remove_first_keeps_other_chains_intact() {
        let chain: Chain<u32> = [1, 2, 3, 2].into_iter().collect();
        let removed = chain.remove_first(|v| *v == 2);
        assert_eq!(removed.iter().copied().collect::<Vec<_>>(), vec![3, 2, 1]);
        assert_eq!(removed.len(), 3);
        assert_eq!(chain.len(), 4);
        assert_eq!(chain.remove_first(|v| *v == 9).len(), 4);
    }

    #[test]
    fn dropping_long_chain_does_not_overflow() {
        let chain: Chain<usize> = (0..200_000).collect();
        assert_eq!(chain.len(), 200_000);
        drop(chain);
    }
}
