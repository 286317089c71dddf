use rayon::iter::{IntoParallelIterator, ParallelIterator as _};

use crate::error::Result;

pub use merge::Merge;

pub fn par_fold_reduce<Acc, T>(
    iter: impl IntoParallelIterator<Item = T>,
    f: impl Fn(&mut Acc, T) -> Result<()> + Send + Sync,
) -> Result<Acc>
where
    Acc: Merge + Default + Send + Sync,
{
    iter.into_par_iter()
        .try_fold(Acc::default, |mut acc, item| -> Result<_> {
            f(&mut acc, item)?;
            Ok(acc)
        })
        .try_reduce(Acc::default, |mut acc, item| {
            Merge::merge(&mut acc, item);
            Ok(acc)
        })
}

mod merge {
    pub trait Merge {
        fn merge(&mut self, other: Self);
    }

    impl Merge for usize {
        fn merge(&mut self, other: Self) {
            *self += other;
        }
    }

    impl<T> Merge for Vec<T> {
        fn merge(&mut self, mut other: Self) {
            if other.len() > self.len() {
                std::mem::swap(self, &mut other);
            }
            self.extend(other);
        }
    }

    impl<T0: Merge, T1: Merge> Merge for (T0, T1) {
        fn merge(&mut self, other: Self) {
            self.0.merge(other.0);
            self.1.merge(other.1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn fold_reduce_collects_everything() {
        let (count, mut items) =
            par_fold_reduce(0..100, |(count, items): &mut (usize, Vec<i32>), i| {
                *count += 1;
                items.push(i);
                Ok(())
            })
            .unwrap();
        items.sort_unstable();
        assert_eq!(count, 100);
        assert_eq!(items, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn fold_reduce_propagates_errors() {
        let result = par_fold_reduce(0..100, |_: &mut Vec<i32>, i| match i {
            42 => Err(Error::Closed),
            _ => Ok(()),
        });
        assert!(matches!(result, Err(Error::Closed)));
    }
}
