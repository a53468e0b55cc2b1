use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthMode {
    Basic,
    Token,
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMode::Basic => write!(f, "Basic"),
            AuthMode::Token => write!(f, "Token"),
        }
    }
}

/// How the client authenticates against the job-execution endpoint.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Credential {
    Basic {
        username: String,
        #[serde(default)]
        password: String,
    },
    Token {
        #[serde(default)]
        token: String,
    },
}

impl Credential {
    pub fn mode(&self) -> AuthMode {
        match self {
            Credential::Basic { .. } => AuthMode::Basic,
            Credential::Token { .. } => AuthMode::Token,
        }
    }

    pub fn secret(&self) -> &str {
        match self {
            Credential::Basic { password, .. } => password,
            Credential::Token { token } => token,
        }
    }

    /// Replaces the password or token, keeping the mode.
    pub fn with_secret(self, secret: impl Into<String>) -> Self {
        match self {
            Credential::Basic { username, .. } => Credential::Basic {
                username,
                password: secret.into(),
            },
            Credential::Token { .. } => Credential::Token {
                token: secret.into(),
            },
        }
    }

    pub fn username(&self) -> Option<&str> {
        match self {
            Credential::Basic { username, .. } => Some(username),
            Credential::Token { .. } => None,
        }
    }
}

impl Default for Credential {
    fn default() -> Self {
        Credential::Basic {
            username: crate::DEFAULT_USERNAME.to_string(),
            password: String::new(),
        }
    }
}

// Secrets stay out of logs
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Credential::Token { .. } => f
                .debug_struct("Token")
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerConnection {
    pub base_url: String,
    pub cms_system: String,
    #[serde(default)]
    pub credential: Credential,
}

impl ServerConnection {
    pub fn auth_mode(&self) -> AuthMode {
        self.credential.mode()
    }

    /// Names of the fields a real (non-simulated) call cannot do without.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.base_url.trim().is_empty() {
            missing.push("base_url");
        }
        if self.cms_system.trim().is_empty() {
            missing.push("cms_system");
        }
        match &self.credential {
            Credential::Basic { username, password } => {
                if username.trim().is_empty() {
                    missing.push("username");
                }
                if password.is_empty() {
                    missing.push("password");
                }
            }
            Credential::Token { token } => {
                if token.is_empty() {
                    missing.push("token");
                }
            }
        }
        missing
    }
}

impl Default for ServerConnection {
    fn default() -> Self {
        Self {
            base_url: crate::DEFAULT_BASE_URL.to_string(),
            cms_system: crate::DEFAULT_CMS_SYSTEM.to_string(),
            credential: Credential::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secret() {
        let cred = Credential::Basic {
            username: "admin".to_string(),
            password: "hunter2".to_string(),
        };
        let shown = format!("{:?}", cred);
        assert!(shown.contains("admin"));
        assert!(!shown.contains("hunter2"));

        let token = Credential::Token { token: "abc123".to_string() };
        assert!(!format!("{:?}", token).contains("abc123"));
    }

    #[test]
    fn test_with_secret_keeps_mode() {
        let cred = Credential::default().with_secret("pw");
        assert_eq!(cred.mode(), AuthMode::Basic);
        assert_eq!(cred.secret(), "pw");
        assert_eq!(cred.username(), Some(crate::DEFAULT_USERNAME));

        let token = Credential::Token { token: String::new() }.with_secret("tok");
        assert_eq!(token.mode(), AuthMode::Token);
        assert_eq!(token.secret(), "tok");
    }

    #[test]
    fn test_missing_fields() {
        let conn = ServerConnection::default();
        assert_eq!(conn.missing_fields(), vec!["password"]);

        let conn = ServerConnection {
            base_url: String::new(),
            cms_system: "cms".to_string(),
            credential: Credential::Token { token: String::new() },
        };
        assert_eq!(conn.missing_fields(), vec!["base_url", "token"]);
    }

    #[test]
    fn test_credential_serde_tagged() {
        let conn: ServerConnection = serde_json::from_str(
            r#"{"base_url":"https://h","cms_system":"c","credential":{"mode":"token","token":"t"}}"#,
        )
        .unwrap();
        assert_eq!(conn.auth_mode(), AuthMode::Token);
        assert_eq!(conn.credential.secret(), "t");
    }
}
