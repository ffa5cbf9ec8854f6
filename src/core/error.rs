use thiserror::Error;

/// Failure taxonomy for the analytics fetch pipeline.
///
/// Only the cache gate decides user-visible behavior: any of these is
/// downgraded to a stale-serve when a prior snapshot exists.
#[derive(Debug, Error)]
pub enum FetchError {
    /// No session cookie configured — fatal, never retried.
    #[error("session cookie required for browser automation")]
    MissingCredential,

    /// Both the primary and the minimal-config launch attempt failed.
    /// The process is not marked dead; a later request may retry.
    #[error("browser launch failed: {0}")]
    BrowserLaunchFailed(String),

    /// Navigation did not settle within the bound. No partial-result salvage.
    #[error("navigation timed out after {0}s")]
    NavigationTimeout(u64),

    /// Every scrape source (intercepted responses, page globals, same-page
    /// API calls) came up empty.
    #[error("could not extract revenue data from page")]
    NoRevenueDataFound,

    /// The fallback REST prober exhausted its endpoint list.
    #[error("all fallback endpoints failed")]
    AllEndpointsFailed,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_describe_the_failure() {
        assert!(FetchError::MissingCredential.to_string().contains("cookie"));
        assert!(FetchError::BrowserLaunchFailed("spawn failed".into())
            .to_string()
            .contains("spawn failed"));
        assert_eq!(
            FetchError::NavigationTimeout(30).to_string(),
            "navigation timed out after 30s"
        );
        assert!(FetchError::NoRevenueDataFound.to_string().contains("revenue"));
        assert!(FetchError::AllEndpointsFailed.to_string().contains("endpoints"));
    }

    #[test]
    fn anyhow_context_passes_through() {
        let err: FetchError = anyhow::anyhow!("listener setup failed").into();
        assert!(err.to_string().contains("listener setup failed"));
    }
}
