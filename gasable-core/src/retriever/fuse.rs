//! Step 7 (spec §4.3): Reciprocal Rank Fusion. Deterministic, closed-form —
//! spec §8 invariant 2.

const RRF_K: f64 = 60.0;

/// `score(id) = Σ 1/(K + rank_in_list)` over every list the id appears in,
/// `rank_in_list` 1-based. Lists need not be the same length or contain the
/// same ids. Output is sorted descending by score, ties broken by id
/// ascending so the result is fully deterministic.
pub fn rrf_fuse(lists: &[Vec<String>]) -> Vec<(String, f64)> {
    let mut scores: std::collections::HashMap<String, f64> = std::collections::HashMap::new();
    for list in lists {
        for (idx, id) in list.iter().enumerate() {
            let rank = (idx + 1) as f64;
            *scores.entry(id.clone()).or_insert(0.0) += 1.0 / (RRF_K + rank);
        }
    }
    let mut out: Vec<(String, f64)> = scores.into_iter().collect();
    out.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then_with(|| a.0.cmp(&b.0)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn single_list_matches_closed_form() {
        let lists = vec![vec!["a".to_string(), "b".to_string(), "c".to_string()]];
        let fused = rrf_fuse(&lists);
        assert_eq!(fused[0], ("a".to_string(), 1.0 / 61.0));
        assert_eq!(fused[1], ("b".to_string(), 1.0 / 62.0));
        assert_eq!(fused[2], ("c".to_string(), 1.0 / 63.0));
    }

    #[test]
    fn overlapping_ids_sum_across_lists() {
        let lists = vec![
            vec!["a".to_string(), "b".to_string()],
            vec!["b".to_string(), "a".to_string()],
        ];
        let fused = rrf_fuse(&lists);
        let a = fused.iter().find(|(id, _)| id == "a").unwrap().1;
        let b = fused.iter().find(|(id, _)| id == "b").unwrap().1;
        assert!((a - b).abs() < 1e-12, "symmetric ranks should tie: a={a} b={b}");
    }

    #[test]
    fn deterministic_on_repeated_calls() {
        let lists = vec![vec!["x".to_string(), "y".to_string(), "z".to_string()]];
        assert_eq!(rrf_fuse(&lists), rrf_fuse(&lists));
    }

    proptest! {
        #[test]
        fn matches_closed_form_sum(
            lists in proptest::collection::vec(
                proptest::collection::vec("[a-e]", 0..6),
                0..4,
            )
        ) {
            let lists: Vec<Vec<String>> = lists;
            let fused = rrf_fuse(&lists);
            for (id, score) in &fused {
                let expected: f64 = lists
                    .iter()
                    .flat_map(|list| {
                        list.iter()
                            .enumerate()
                            .filter(move |(_, x)| *x == id)
                            .map(|(idx, _)| 1.0 / (RRF_K + (idx as f64 + 1.0)))
                    })
                    .sum();
                prop_assert!((score - expected).abs() < 1e-9);
            }
            for w in fused.windows(2) {
                prop_assert!(w[0].1 >= w[1].1);
            }
        }
    }
}
