// SPDX-License-Identifier: MIT

//! Fault barrier around collaborator calls
//!
//! Every retriever, grader, generator, search and memory call made by a
//! node goes through `safe_invoke`. A failure is logged and replaced with
//! the caller's default; callers detect degradation only by comparing the
//! result against that default.

use crate::error::CollabError;
use std::fmt::Debug;
use std::future::Future;

pub async fn safe_invoke<T, F>(label: &str, default: T, call: F) -> T
where
    T: Debug,
    F: Future<Output = Result<T, CollabError>>,
{
    log::debug!("Invoking {}", label);
    match call.await {
        Ok(result) => {
            log::debug!("{} returned: {:?}", label, result);
            result
        }
        Err(e) => {
            log::error!("Error in {}: {}", label, e);
            log::debug!("{} falling back to default: {:?}", label, default);
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_success_passes_through() {
        let result = safe_invoke("retriever", vec![], async { Ok(vec!["doc"]) }).await;
        assert_eq!(result, vec!["doc"]);
    }

    #[tokio::test]
    async fn test_failure_returns_default_verbatim() {
        let result = safe_invoke("generator", "fallback".to_string(), async {
            Err(CollabError::backend("generator", "timeout"))
        })
        .await;
        assert_eq!(result, "fallback");
    }

    #[tokio::test]
    async fn test_unit_default_swallows_failure() {
        safe_invoke("memory_append", (), async {
            Err(CollabError::EmptyResult("memory".to_string()))
        })
        .await;
    }
}
