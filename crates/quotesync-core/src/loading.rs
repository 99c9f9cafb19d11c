use serde::Serialize;

use crate::{FetchError, FetchErrorKind};

/// Presentable error carried in a [`LoadingState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadingError {
    pub kind: FetchErrorKind,
    pub message: String,
    pub retry_after_ms: Option<u64>,
}

impl From<&FetchError> for LoadingError {
    fn from(error: &FetchError) -> Self {
        Self {
            kind: error.kind(),
            message: error.user_message(),
            retry_after_ms: error
                .retry_after()
                .map(|wait| u64::try_from(wait.as_millis()).unwrap_or(u64::MAX)),
        }
    }
}

/// Loading/error state of one logical fetch operation.
///
/// `Idle → Loading → {Success, Error}`; `Error → Loading` clears the error
/// but keeps `retry_count` until a success resets it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadingState {
    pub is_loading: bool,
    pub error: Option<LoadingError>,
    pub retry_count: u32,
}

impl LoadingState {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn begin(&mut self) {
        self.is_loading = true;
        self.error = None;
    }

    pub fn succeed(&mut self) {
        self.is_loading = false;
        self.error = None;
        self.retry_count = 0;
    }

    pub fn fail(&mut self, error: &FetchError) {
        self.is_loading = false;
        self.error = Some(LoadingError::from(error));
        self.retry_count = self.retry_count.saturating_add(error.retries());
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn transitions_through_error_and_recovery() {
        let mut state = LoadingState::idle();
        assert!(!state.is_loading);

        state.begin();
        assert!(state.is_loading);

        let error = FetchError::timeout("slow").with_retries(3);
        state.fail(&error);
        assert!(!state.is_loading);
        assert!(state.is_error());
        assert_eq!(state.retry_count, 3);

        state.begin();
        assert!(state.is_loading);
        assert!(!state.is_error(), "retry clears the error");
        assert_eq!(state.retry_count, 3, "retry keeps the count");

        state.succeed();
        assert_eq!(state, LoadingState::idle());
    }

    #[test]
    fn error_carries_user_message_and_retry_hint() {
        let mut state = LoadingState::idle();
        state.fail(&FetchError::rate_limited(Duration::from_millis(1_500), "denied"));

        let error = state.error.expect("error set");
        assert_eq!(error.kind, FetchErrorKind::RateLimited);
        assert_eq!(error.retry_after_ms, Some(1_500));
        assert!(error.message.contains("2s"));
    }
}
