//! Ranking comparators over [`DocInfo`] records. "Less" means "ranks first".

use std::fmt;
use std::marker::PhantomData;

use crate::index::inverted::truncate::config::SortPattern;
use crate::index::inverted::truncate::reference::{DocInfo, Reference};
use crate::schema::NativeValue;

pub trait Comparator: Send + Sync + fmt::Debug {
    fn less_than(&self, left: &DocInfo, right: &DocInfo) -> bool;
}

/// Compares one typed field. Nulls and NaNs rank after every value in both
/// orders and are equal to each other, so the order stays total.
pub struct ComparatorTyped<T: NativeValue> {
    reference: Reference,
    desc: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T: NativeValue> ComparatorTyped<T> {
    pub fn new(reference: Reference, pattern: SortPattern) -> Self {
        ComparatorTyped {
            reference,
            desc: pattern == SortPattern::Desc,
            _marker: PhantomData,
        }
    }
}

impl<T: NativeValue> fmt::Debug for ComparatorTyped<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComparatorTyped")
            .field("field", &self.reference.name())
            .field("desc", &self.desc)
            .finish()
    }
}

impl<T: NativeValue> Comparator for ComparatorTyped<T> {
    fn less_than(&self, left: &DocInfo, right: &DocInfo) -> bool {
        let value = |doc: &DocInfo| self.reference.get::<T>(doc).filter(|&v| !v.is_nan());
        match (value(left), value(right)) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(l), Some(r)) => {
                if self.desc {
                    l > r
                } else {
                    l < r
                }
            }
        }
    }
}

pub fn create_comparator(reference: Reference, pattern: SortPattern) -> Box<dyn Comparator> {
    crate::dispatch_field_type!(reference.field_type(), T => {
        Box::new(ComparatorTyped::<T>::new(reference, pattern)) as Box<dyn Comparator>
    })
}

/// Lexicographic combination: the first comparator that tells the two
/// records apart decides.
#[derive(Debug, Default)]
pub struct MultiComparator {
    comparators: Vec<Box<dyn Comparator>>,
}

impl MultiComparator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, comparator: Box<dyn Comparator>) {
        self.comparators.push(comparator);
    }

    pub fn len(&self) -> usize {
        self.comparators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comparators.is_empty()
    }
}

impl Comparator for MultiComparator {
    fn less_than(&self, left: &DocInfo, right: &DocInfo) -> bool {
        for comparator in &self.comparators {
            if comparator.less_than(left, right) {
                return true;
            }
            if comparator.less_than(right, left) {
                return false;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::inverted::truncate::reference::DocInfoAllocator;
    use crate::schema::FieldType;

    #[test]
    fn test_nulls_rank_last() {
        let mut allocator = DocInfoAllocator::new();
        let reference = allocator.declare_reference("v", FieldType::Int32, true).unwrap();
        let mut value = allocator.allocate();
        reference.set(Some(5i32), &mut value);
        let mut null = allocator.allocate();
        reference.set::<i32>(None, &mut null);
        let mut other_null = allocator.allocate();
        reference.set::<i32>(None, &mut other_null);

        for pattern in [SortPattern::Asc, SortPattern::Desc] {
            let comparator = create_comparator(reference.clone(), pattern);
            assert!(comparator.less_than(&value, &null));
            assert!(!comparator.less_than(&null, &value));
            assert!(!comparator.less_than(&null, &other_null));
            assert!(!comparator.less_than(&other_null, &null));
        }
    }

    #[test]
    fn test_asc_desc() {
        let mut allocator = DocInfoAllocator::new();
        let reference = allocator.declare_reference("v", FieldType::Double, false).unwrap();
        let mut small = allocator.allocate();
        reference.set(Some(1.0f64), &mut small);
        let mut large = allocator.allocate();
        reference.set(Some(2.0f64), &mut large);

        let asc = create_comparator(reference.clone(), SortPattern::Asc);
        let desc = create_comparator(reference, SortPattern::Desc);
        assert!(asc.less_than(&small, &large));
        assert!(desc.less_than(&large, &small));
        assert!(!desc.less_than(&small, &small));
    }

    #[test]
    fn test_nan_ranks_with_nulls() {
        let mut allocator = DocInfoAllocator::new();
        let reference = allocator.declare_reference("v", FieldType::Double, true).unwrap();
        let mut value = allocator.allocate();
        reference.set(Some(-1.0f64), &mut value);
        let mut nan = allocator.allocate();
        reference.set(Some(f64::NAN), &mut nan);
        let mut null = allocator.allocate();
        reference.set::<f64>(None, &mut null);

        for pattern in [SortPattern::Asc, SortPattern::Desc] {
            let comparator = create_comparator(reference.clone(), pattern);
            assert!(comparator.less_than(&value, &nan));
            assert!(!comparator.less_than(&nan, &value));
            assert!(!comparator.less_than(&nan, &null));
            assert!(!comparator.less_than(&null, &nan));
            assert!(!comparator.less_than(&nan, &nan));
        }
    }

    #[test]
    fn test_multi_comparator_falls_through_ties() {
        let mut allocator = DocInfoAllocator::new();
        let first = allocator.declare_reference("a", FieldType::Int32, false).unwrap();
        let second = allocator.declare_reference("b", FieldType::Int32, false).unwrap();
        let mut left = allocator.allocate();
        first.set(Some(1i32), &mut left);
        second.set(Some(9i32), &mut left);
        let mut right = allocator.allocate();
        first.set(Some(1i32), &mut right);
        second.set(Some(3i32), &mut right);

        let mut comparator = MultiComparator::new();
        comparator.add(create_comparator(first, SortPattern::Desc));
        comparator.add(create_comparator(second, SortPattern::Desc));
        assert!(comparator.less_than(&left, &right));
        assert!(!comparator.less_than(&right, &left));
        assert!(!comparator.less_than(&left, &left));
    }
}
