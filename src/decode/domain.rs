//! Categorical domains.
//!
//! Every decode unit produces a `LocalCategorical` per categorical column: its
//! own sorted domain plus local codes. After the completion barrier the local
//! domains are folded into one global domain and the codes remapped.

use std::collections::BTreeSet;
use std::sync::Arc;

use arrow::array::{ArrayRef, DictionaryArray, Int32Array, StringArray};
use arrow::datatypes::Int32Type;
use hashbrown::HashMap;

use crate::error::StripeError;

/// One unit's view of a categorical column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalCategorical {
    /// Sorted and de-duplicated.
    pub domain: Vec<String>,
    /// Index into `domain` per row; `None` for a missing value.
    pub codes: Vec<Option<u32>>,
}

impl LocalCategorical {
    pub fn from_values(values: Vec<Option<String>>) -> Self {
        let domain: Vec<String> = values
            .iter()
            .flatten()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let codes = {
            let lookup: HashMap<&str, u32> = domain
                .iter()
                .enumerate()
                .map(|(code, value)| (value.as_str(), code as u32))
                .collect();
            values
                .iter()
                .map(|v| v.as_deref().and_then(|s| lookup.get(s).copied()))
                .collect()
        };
        Self { domain, codes }
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// Folds local domains into the global domain: the sorted union.
///
/// The result does not depend on the order or grouping of the inputs.
pub fn merge_domains<'a, I>(domains: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a [String]>,
{
    domains
        .into_iter()
        .fold(BTreeSet::new(), |mut acc, domain| {
            acc.extend(domain.iter().map(String::as_str));
            acc
        })
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Rewrites a unit's local codes as codes into `global`.
pub fn remap_codes(local: &LocalCategorical, global: &[String]) -> Result<Vec<Option<i32>>, StripeError> {
    let lookup: HashMap<&str, i32> = global
        .iter()
        .enumerate()
        .map(|(code, value)| (value.as_str(), code as i32))
        .collect();

    let translation = local
        .domain
        .iter()
        .map(|value| {
            lookup.get(value.as_str()).copied().ok_or_else(|| {
                StripeError::InternalError(format!(
                    "value '{}' is missing from the merged domain",
                    value
                ))
            })
        })
        .collect::<Result<Vec<i32>, _>>()?;

    local
        .codes
        .iter()
        .map(|code| match code {
            None => Ok(None),
            Some(c) => translation.get(*c as usize).copied().map(Some).ok_or_else(|| {
                StripeError::InternalError(format!("local code {} has no domain entry", c))
            }),
        })
        .collect()
}

/// Merges the pieces of one categorical column, in stripe order, into a
/// single dictionary array whose values are the global domain.
pub fn build_dictionary_column(
    pieces: &[&LocalCategorical],
) -> Result<(ArrayRef, Vec<String>), StripeError> {
    let global = merge_domains(pieces.iter().map(|p| p.domain.as_slice()));

    let mut keys: Vec<Option<i32>> = Vec::with_capacity(pieces.iter().map(|p| p.len()).sum());
    for piece in pieces {
        keys.extend(remap_codes(piece, &global)?);
    }

    let values: ArrayRef = Arc::new(StringArray::from_iter_values(global.iter()));
    let array = DictionaryArray::<Int32Type>::try_new(Int32Array::from(keys), values)?;
    Ok((Arc::new(array), global))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Array;
    use rand::seq::SliceRandom;

    fn local(values: &[Option<&str>]) -> LocalCategorical {
        LocalCategorical::from_values(values.iter().map(|v| v.map(str::to_string)).collect())
    }

    #[test]
    fn test_local_domain_is_sorted() {
        let piece = local(&[Some("zebra"), None, Some("foo"), Some("zebra")]);
        assert_eq!(piece.domain, vec!["foo", "zebra"]);
        assert_eq!(piece.codes, vec![Some(1), None, Some(0), Some(1)]);
    }

    #[test]
    fn test_merge_sorts_and_dedups_across_stripes() {
        let a = local(&[Some("zebra"), Some("foo")]);
        let b = local(&[Some("dog"), Some("cat"), Some("dog")]);
        let c = local(&[Some("bar"), Some("eat"), Some("foo")]);
        let merged = merge_domains([a.domain.as_slice(), b.domain.as_slice(), c.domain.as_slice()]);
        assert_eq!(merged, vec!["bar", "cat", "dog", "eat", "foo", "zebra"]);
    }

    #[test]
    fn test_merge_is_order_and_grouping_independent() {
        let domains: Vec<Vec<String>> = (0..8)
            .map(|i| {
                (0..5)
                    .map(|j| format!("v{:02}", (i * 7 + j * 3) % 23))
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect()
            })
            .collect();
        let expected = merge_domains(domains.iter().map(Vec::as_slice));

        let mut rng = rand::rng();
        for _ in 0..20 {
            let mut shuffled = domains.clone();
            shuffled.shuffle(&mut rng);
            assert_eq!(merge_domains(shuffled.iter().map(Vec::as_slice)), expected);

            // Merge in two halves, then merge the halves.
            let (left, right) = shuffled.split_at(shuffled.len() / 2);
            let left = merge_domains(left.iter().map(Vec::as_slice));
            let right = merge_domains(right.iter().map(Vec::as_slice));
            assert_eq!(merge_domains([right.as_slice(), left.as_slice()]), expected);
        }
    }

    #[test]
    fn test_dictionary_column_uses_global_codes() {
        let a = local(&[Some("zebra"), Some("foo")]);
        let b = local(&[None, Some("bar")]);
        let (array, global) = build_dictionary_column(&[&a, &b]).unwrap();
        assert_eq!(global, vec!["bar", "foo", "zebra"]);

        let dict = array
            .as_any()
            .downcast_ref::<DictionaryArray<Int32Type>>()
            .unwrap();
        let keys: Vec<Option<i32>> = dict.keys().iter().collect();
        assert_eq!(keys, vec![Some(2), Some(1), None, Some(0)]);
        assert_eq!(dict.null_count(), 1);
    }

    #[test]
    fn test_remap_rejects_foreign_values() {
        let piece = local(&[Some("x")]);
        assert!(matches!(
            remap_codes(&piece, &["y".to_string()]),
            Err(StripeError::InternalError(_))
        ));
    }
}
