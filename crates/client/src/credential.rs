//! Bearer credential sources.

use crate::error::ClientError;

/// Supplies the bearer token attached to every request.
///
/// Looked up per request, so rotating sources are picked up without
/// rebuilding the client.
pub trait CredentialProvider: Send + Sync {
    fn bearer_token(&self) -> Result<String, ClientError>;
}

/// A fixed token.
#[derive(Debug, Clone)]
pub struct StaticCredential {
    token: String,
}

impl StaticCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl CredentialProvider for StaticCredential {
    fn bearer_token(&self) -> Result<String, ClientError> {
        let token = self.token.trim();
        if token.is_empty() {
            return Err(ClientError::Credential("token is empty".to_string()));
        }
        Ok(token.to_string())
    }
}

/// Token read from an environment variable on each request.
#[derive(Debug, Clone)]
pub struct EnvCredential {
    var: String,
}

impl EnvCredential {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl CredentialProvider for EnvCredential {
    fn bearer_token(&self) -> Result<String, ClientError> {
        let raw = std::env::var(&self.var)
            .map_err(|_| ClientError::Credential(format!("{} is not set", self.var)))?;
        StaticCredential::new(raw).bearer_token()
    }
}

impl<T: CredentialProvider + ?Sized> CredentialProvider for std::sync::Arc<T> {
    fn bearer_token(&self) -> Result<String, ClientError> {
        (**self).bearer_token()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_token_is_trimmed() {
        assert_eq!(StaticCredential::new(" abc ").bearer_token().unwrap(), "abc");
    }

    #[test]
    fn blank_token_is_refused() {
        assert!(matches!(
            StaticCredential::new("  ").bearer_token(),
            Err(ClientError::Credential(_))
        ));
    }

    #[test]
    fn missing_env_var_is_refused() {
        let provider = EnvCredential::new("DEFERRED_CLIENT_TEST_TOKEN_THAT_IS_NEVER_SET");
        assert!(matches!(provider.bearer_token(), Err(ClientError::Credential(_))));
    }
}
