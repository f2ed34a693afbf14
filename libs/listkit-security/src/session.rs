use secrecy::SecretString;
use serde_json::{Map, Value};

/// `Session` is the opaque caller identity attached to a request.
///
/// Built by whatever authenticates the caller and passed to `Stack::context`.
/// An anonymous request carries no session at all (`Option<Session>::None`),
/// so access rules can distinguish "nobody" from "somebody without claims".
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Session {
    /// Subject ID: the authenticated user, service, or system making the request.
    subject_id: String,
    /// Subject type classification (e.g., "user", "service").
    subject_type: Option<String>,
    /// Free-form claims (role, tenant, feature flags) read by access rules and hooks.
    #[serde(default)]
    claims: Map<String, Value>,
    /// Original bearer token, forwarded to hooks that call external APIs.
    /// Never serialized; `Debug` redacts it.
    #[serde(skip)]
    bearer_token: Option<SecretString>,
}

impl Session {
    #[must_use]
    pub fn builder(subject_id: impl Into<String>) -> SessionBuilder {
        SessionBuilder {
            subject_id: subject_id.into(),
            subject_type: None,
            claims: Map::new(),
            bearer_token: None,
        }
    }

    /// Shorthand for a session with only a subject id.
    #[must_use]
    pub fn for_subject(subject_id: impl Into<String>) -> Self {
        Self::builder(subject_id).build()
    }

    #[must_use]
    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    #[must_use]
    pub fn subject_type(&self) -> Option<&str> {
        self.subject_type.as_deref()
    }

    #[must_use]
    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    /// Look up a single claim by name.
    #[must_use]
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    /// Returns `true` if the claim exists and equals the given string.
    #[must_use]
    pub fn has_claim(&self, name: &str, expected: &str) -> bool {
        self.claim(name).and_then(Value::as_str) == Some(expected)
    }

    #[must_use]
    pub fn bearer_token(&self) -> Option<&SecretString> {
        self.bearer_token.as_ref()
    }
}

pub struct SessionBuilder {
    subject_id: String,
    subject_type: Option<String>,
    claims: Map<String, Value>,
    bearer_token: Option<SecretString>,
}

impl SessionBuilder {
    #[must_use]
    pub fn subject_type(mut self, subject_type: &str) -> Self {
        self.subject_type = Some(subject_type.to_owned());
        self
    }

    #[must_use]
    pub fn claim(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.claims.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn bearer_token(mut self, token: impl Into<SecretString>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn build(self) -> Session {
        Session {
            subject_id: self.subject_id,
            subject_type: self.subject_type,
            claims: self.claims,
            bearer_token: self.bearer_token,
        }
    }
}
