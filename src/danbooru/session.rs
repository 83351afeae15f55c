use thiserror::Error;

use crate::danbooru::sender::RequestSender;

/// Fatal startup failures from the credential check.
#[derive(Error, Debug)]
pub(crate) enum AuthError {
    #[error("the server rejected the supplied credentials (status {status})")]
    Rejected { status: reqwest::StatusCode },

    #[error("could not reach the authentication endpoint: {0}")]
    Unreachable(#[from] reqwest::Error),
}

/// Result type for the credential check.
pub(crate) type AuthResult<T> = Result<T, AuthError>;

/// Credential pair that lives exactly long enough to be checked once.
pub(crate) struct Session {
    username: String,
    api_key: String,
}

impl Session {
    pub(crate) fn new(username: String, api_key: String) -> Self {
        Session { username, api_key }
    }

    /// Checks the credentials against the user endpoint and consumes them.
    ///
    /// The session is gone after this call either way; both credential
    /// buffers are overwritten before they are freed.
    pub(crate) fn validate(self, request_sender: &RequestSender) -> AuthResult<()> {
        trace!("Validating the login of {}...", self.username);
        let url = format!("{}/users.json", request_sender.base_url());
        let query = [
            ("login", self.username.as_str()),
            ("api_key", self.api_key.as_str()),
        ];
        let result = match request_sender.get_status(&url, &query) {
            Ok(status) if status.is_success() => Ok(()),
            Ok(status) => Err(AuthError::Rejected { status }),
            // The transport error carries the request url, credentials
            // included; strip it before the error can reach a log line.
            Err(source) => Err(AuthError::Unreachable(source.without_url())),
        };
        self.scrub();
        result
    }

    fn scrub(self) {
        let Session { username, api_key } = self;
        for mut buffer in [username.into_bytes(), api_key.into_bytes()] {
            buffer.fill(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn an_unreachable_endpoint_reports_without_the_credentials() {
        // Nothing listens on port 1, so the request fails in transport.
        let sender = RequestSender::new("http://127.0.0.1:1").unwrap();
        let session = Session::new("someone".to_string(), "TOPSECRETKEY".to_string());

        let error = session.validate(&sender).unwrap_err();
        assert!(matches!(error, AuthError::Unreachable(_)));

        let chain = format!("{:#}", anyhow::Error::new(error));
        assert!(chain.contains("could not reach the authentication endpoint"));
        assert!(!chain.contains("TOPSECRETKEY"));
    }
}
