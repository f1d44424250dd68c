use thiserror::Error;

/// Failures surfaced by the purchase and renewal workflows.
#[derive(Debug, Error)]
pub enum MembershipError {
    /// Card fields failed the local format check. Nothing was sent upstream.
    #[error("{0}")]
    Validation(String),

    /// Purchase attempted while the user already holds a live gold membership.
    #[error("You already have an active gold membership")]
    AlreadyGold,

    /// Renewal attempted without a live gold membership to extend.
    #[error("No active gold membership to renew")]
    NotGold,

    /// Another purchase or renewal for this user has not finished yet.
    #[error("A membership request is already in progress")]
    WorkflowInFlight,

    #[error("User profile not found")]
    ProfileNotFound,

    /// The subscription store rejected or failed a create/update call.
    #[error("{message}")]
    RemoteWrite {
        message: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// Reading the profile from the subscription store failed.
    #[error("Failed to load membership")]
    RemoteRead(#[source] anyhow::Error),
}

impl MembershipError {
    pub fn remote_write(message: &'static str, source: anyhow::Error) -> Self {
        MembershipError::RemoteWrite { message, source }
    }
}

/// Store-level failure distinguishing a missing profile from transport errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("profile not found for {0}")]
    NotFound(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::Other(err.into())
    }
}

impl From<StoreError> for MembershipError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => MembershipError::ProfileNotFound,
            StoreError::Other(source) => MembershipError::RemoteRead(source),
        }
    }
}
