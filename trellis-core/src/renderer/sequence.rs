//! Longest Increasing Subsequence
//!
//! Used by the keyed-children diff to pick the largest set of reused
//! nodes whose relative order already matches the new children, so only
//! nodes outside that set are moved.

/// Indices of one longest strictly increasing subsequence of `arr`.
/// Zero entries are skipped; they stand for children with no previous
/// position (freshly created).
///
/// O(n log n): greedy tails with binary search, then a predecessor
/// backtrack to recover indices.
pub(crate) fn longest_increasing_subsequence(arr: &[usize]) -> Vec<usize> {
    // tails[k] = index of the smallest possible tail of an increasing
    // subsequence of length k + 1.
    let mut tails: Vec<usize> = Vec::new();
    let mut prev: Vec<usize> = vec![0; arr.len()];

    for (i, &val) in arr.iter().enumerate() {
        if val == 0 {
            continue;
        }
        if let Some(&last) = tails.last() {
            if arr[last] < val {
                prev[i] = last;
                tails.push(i);
                continue;
            }
        } else {
            tails.push(i);
            continue;
        }

        // First tail whose value is >= val.
        let mut lo = 0;
        let mut hi = tails.len() - 1;
        while lo < hi {
            let mid = (lo + hi) / 2;
            if arr[tails[mid]] < val {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        if val < arr[tails[lo]] {
            if lo > 0 {
                prev[i] = tails[lo - 1];
            }
            tails[lo] = i;
        }
    }

    if tails.is_empty() {
        return tails;
    }
    let mut k = tails.len();
    let mut idx = tails[k - 1];
    while k > 0 {
        k -= 1;
        tails[k] = idx;
        idx = prev[idx];
    }
    tails
}
