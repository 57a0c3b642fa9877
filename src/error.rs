use thiserror::Error;

/// Failures the domain commands report to their caller.
///
/// An empty query result is not an error: queries warn through the report
/// and return an empty list. URLs that fail to parse never surface here
/// either, they only show up in the index's aggregate counts.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("no bookmark data loaded yet, build the index first")]
    NoDataLoaded,

    #[error("invalid delete mode '{0}', use 'exact', 'tree' or 'loose'")]
    InvalidMode(String),

    #[error("bookmark store rejected {op}")]
    HostCall {
        op: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("bookmark store unavailable")]
    StoreUnavailable(#[source] anyhow::Error),
}

impl DomainError {
    pub fn host_call(op: impl Into<String>, source: anyhow::Error) -> Self {
        DomainError::HostCall {
            op: op.into(),
            source,
        }
    }
}
