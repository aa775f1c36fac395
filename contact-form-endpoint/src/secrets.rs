use async_trait::async_trait;
use aws_config::BehaviorVersion;
use serde::de::DeserializeOwned;
use std::fmt::Display;

#[async_trait]
pub trait SecretRepository: Send + Sync {
    async fn open() -> Self;

    async fn get_secret<T: DeserializeOwned>(&self, name: &'static str) -> Result<T, SecretError>;
}

#[derive(Debug)]
pub enum SecretError {
    Unavailable {
        name: &'static str,
        description: String,
    },
    Missing(&'static str),
    Malformed {
        name: &'static str,
        error: serde_json::Error,
    },
}

impl Display for SecretError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretError::Unavailable { name, description } => {
                write!(f, "Unable to retrieve secret {name}: {description}")
            }
            SecretError::Missing(name) => write!(f, "Missing secret {name}"),
            SecretError::Malformed { name, error } => write!(f, "Malformed secret {name}: {error}"),
        }
    }
}

impl std::error::Error for SecretError {}

fn parse_secret<T: DeserializeOwned>(name: &'static str, value: &str) -> Result<T, SecretError> {
    serde_json::from_str(value).map_err(|error| SecretError::Malformed { name, error })
}

pub struct AwsSecretsManagerSecretRepository(aws_sdk_secretsmanager::Client);

#[async_trait]
impl SecretRepository for AwsSecretsManagerSecretRepository {
    async fn open() -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Ok(url) = std::env::var("AWS_ENDPOINT_URL") {
            loader = loader.endpoint_url(url);
        }
        let config = loader.load().await;
        Self(aws_sdk_secretsmanager::Client::new(&config))
    }

    async fn get_secret<T: DeserializeOwned>(&self, name: &'static str) -> Result<T, SecretError> {
        let secret = self
            .0
            .get_secret_value()
            .secret_id(name)
            .send()
            .await
            .map_err(|error| SecretError::Unavailable {
                name,
                description: error.to_string(),
            })?;
        let Some(secret_value) = secret.secret_string() else {
            return Err(SecretError::Missing(name));
        };
        parse_secret(name, secret_value)
    }
}

#[cfg(test)]
pub mod test_support {
    use super::{parse_secret, SecretError, SecretRepository};
    use crate::mailer::SMTP_CREDENTIALS_NAME;
    use async_trait::async_trait;
    use serde::de::DeserializeOwned;
    use std::collections::HashMap;

    pub struct FakeSecretRepository(HashMap<&'static str, String>);

    impl FakeSecretRepository {
        pub fn remove_secret(&mut self, name: &'static str) {
            self.0.remove(name);
        }

        pub fn add_secret(&mut self, name: &'static str, value: impl Into<String>) {
            self.0.insert(name, value.into());
        }
    }

    #[async_trait]
    impl SecretRepository for FakeSecretRepository {
        async fn open() -> Self {
            Self(HashMap::from([(
                SMTP_CREDENTIALS_NAME,
                r#"{
                    "SMTP_USERNAME": "fake SMTP username",
                    "SMTP_PASSWORD": "fake SMTP password"
                }"#
                .into(),
            )]))
        }

        async fn get_secret<T: DeserializeOwned>(
            &self,
            name: &'static str,
        ) -> Result<T, SecretError> {
            let value = self.0.get(name).ok_or(SecretError::Missing(name))?;
            parse_secret(name, value)
        }
    }
}
