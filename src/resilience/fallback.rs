//! Fallback Composer (spec §4.1 "Fallback Composer").

use std::future::Future;

use tracing::debug;

use crate::error::ClassifiedFailure;

/// Runs `primary`. If it fails, runs `fallback`. If it succeeds but
/// `sufficiency_predicate` is false, runs `fallback` too and merges the two
/// results with `merge`.
pub async fn execute_with_fallback<T, P, PFut, FB, FBFut, Suff, Merge>(
    op_name: &str,
    primary: P,
    fallback: FB,
    sufficiency_predicate: Suff,
    merge: Merge,
) -> Result<T, ClassifiedFailure>
where
    P: FnOnce() -> PFut,
    PFut: Future<Output = Result<T, ClassifiedFailure>>,
    FB: FnOnce() -> FBFut,
    FBFut: Future<Output = Result<T, ClassifiedFailure>>,
    Suff: FnOnce(&T) -> bool,
    Merge: FnOnce(T, T) -> T,
{
    match primary().await {
        Ok(value) => {
            if sufficiency_predicate(&value) {
                Ok(value)
            } else {
                debug!(op = op_name, "primary result insufficient, invoking fallback");
                match fallback().await {
                    Ok(fb_value) => Ok(merge(value, fb_value)),
                    Err(_) => Ok(value),
                }
            }
        }
        Err(primary_failure) => {
            debug!(op = op_name, kind = ?primary_failure.kind, "primary failed, invoking fallback");
            fallback().await
        }
    }
}

/// Default merge: list concatenation with deduplication by a caller-supplied
/// identity key (e.g. an external id or url), per spec §4.1's default.
pub fn concat_dedup_by<T, K, F>(mut primary: Vec<T>, fallback: Vec<T>, key: F) -> Vec<T>
where
    K: PartialEq,
    F: Fn(&T) -> K,
{
    for item in fallback {
        if !primary.iter().any(|existing| key(existing) == key(&item)) {
            primary.push(item);
        }
    }
    primary
}
