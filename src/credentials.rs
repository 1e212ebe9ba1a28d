use anyhow::{Context, Result};
use std::env;
use std::fmt;
use std::str::FromStr;

const KEYRING_SERVICE: &str = "mailflow";

/// Secrets the pipeline needs at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Secret {
    /// IMAP account password
    ImapPassword,
    /// OpenRouter API key
    AiApiKey,
    /// Bearer token for the to-do backend (optional)
    TodoToken,
}

impl Secret {
    pub const ALL: [Secret; 3] = [Secret::ImapPassword, Secret::AiApiKey, Secret::TodoToken];

    pub fn env_var(self) -> &'static str {
        match self {
            Secret::ImapPassword => "MAILFLOW_IMAP_PASSWORD",
            Secret::AiApiKey => "MAILFLOW_AI_API_KEY",
            Secret::TodoToken => "MAILFLOW_TODO_TOKEN",
        }
    }

    fn keyring_prefix(self) -> &'static str {
        match self {
            Secret::ImapPassword => "imap",
            Secret::AiApiKey => "ai",
            Secret::TodoToken => "todo",
        }
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyring_prefix())
    }
}

impl FromStr for Secret {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "imap" => Ok(Secret::ImapPassword),
            "ai" => Ok(Secret::AiApiKey),
            "todo" => Ok(Secret::TodoToken),
            other => anyhow::bail!("Unknown secret '{}'. Expected one of: imap, ai, todo", other),
        }
    }
}

/// Where a secret was found, for `mailflow status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretSource {
    Environment,
    Keyring,
    Missing,
}

impl fmt::Display for SecretSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SecretSource::Environment => "environment",
            SecretSource::Keyring => "keyring",
            SecretSource::Missing => "not set",
        })
    }
}

/// Secret lookup scoped to one mail account: environment first, then the OS keyring.
pub struct CredentialStore {
    account: String,
}

impl CredentialStore {
    pub fn new(account: &str) -> Self {
        Self {
            account: account.to_string(),
        }
    }

    fn keyring_key(&self, secret: Secret) -> String {
        format!("{}:{}", secret.keyring_prefix(), self.account)
    }

    fn env_get(secret: Secret) -> Option<String> {
        env::var(secret.env_var())
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// Try to get a secret from the keyring
    fn keyring_get(&self, secret: Secret) -> Option<String> {
        let entry = keyring::Entry::new(KEYRING_SERVICE, &self.keyring_key(secret)).ok()?;
        entry.get_password().ok().filter(|s| !s.is_empty())
    }

    /// Look up a secret. `None` when neither backend has it.
    pub fn get(&self, secret: Secret) -> Option<String> {
        Self::env_get(secret).or_else(|| self.keyring_get(secret))
    }

    pub fn source(&self, secret: Secret) -> SecretSource {
        if Self::env_get(secret).is_some() {
            SecretSource::Environment
        } else if self.keyring_get(secret).is_some() {
            SecretSource::Keyring
        } else {
            SecretSource::Missing
        }
    }

    /// Store a secret in the keyring and read it back.
    pub fn set(&self, secret: Secret, value: &str) -> Result<()> {
        let value = value.trim();
        if value.is_empty() {
            anyhow::bail!("Refusing to store an empty {} secret", secret);
        }

        let entry = keyring::Entry::new(KEYRING_SERVICE, &self.keyring_key(secret))
            .context("Keyring unavailable")?;
        entry
            .set_password(value)
            .with_context(|| format!("Failed to store {} secret in keyring", secret))?;

        if self.keyring_get(secret).is_none() {
            anyhow::bail!(
                "Keyring accepted the {} secret but did not return it. Set {} instead.",
                secret,
                secret.env_var()
            );
        }
        Ok(())
    }
}
