//! Request validation adapter.
//!
//! Turns heterogeneous request input into a [`ValidatedRequest`] or a
//! [`ValidationError`]:
//!
//! ```text
//! received ──merge──▶ merged ──schema──▶ validated | rejected
//! ```
//!
//! The adapter never panics on bad input and never converts a rejection into
//! anything but the `Err` variant of its outcome.

pub mod extract;
pub mod normalize;
pub mod schema;

pub use normalize::{RequestInput, parse_query};
pub use schema::{FieldIssue, FnSchema, Schema, TypedSchema, ValidationError};

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// The operation a validation run is performed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CrudOperation {
    Create,
    Read,
    Update,
    Delete,
}

impl fmt::Display for CrudOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "CREATE"),
            Self::Read => write!(f, "READ"),
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

/// One entry of an adapter's security declaration.
///
/// Stored for an external permission enforcer; the adapter itself does not
/// consult it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityRule {
    pub securable: String,
    pub permission: CrudOperation,
}

impl SecurityRule {
    pub fn new(securable: impl Into<String>, permission: CrudOperation) -> Self {
        Self {
            securable: securable.into(),
            permission,
        }
    }
}

/// Caller identity attached to every validated request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(rename = "idAccount")]
    pub account_id: i64,
    #[serde(rename = "idUser")]
    pub user_id: i64,
}

/// Resolves the caller of a request.
pub trait CredentialResolver: Send + Sync {
    fn resolve(&self, input: &RequestInput) -> Credential;
}

/// Stand-in resolver returning the same credential for every request.
#[derive(Debug, Clone, Copy)]
pub struct FixedCredential(pub Credential);

impl Default for FixedCredential {
    fn default() -> Self {
        Self(Credential {
            account_id: 1,
            user_id: 1,
        })
    }
}

impl CredentialResolver for FixedCredential {
    fn resolve(&self, _input: &RequestInput) -> Credential {
        self.0
    }
}

impl<F> CredentialResolver for F
where
    F: Fn(&RequestInput) -> Credential + Send + Sync,
{
    fn resolve(&self, input: &RequestInput) -> Credential {
        self(input)
    }
}

/// A request that passed validation. Only the adapter constructs one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedRequest<T> {
    credential: Credential,
    params: T,
    operation: CrudOperation,
}

impl<T> ValidatedRequest<T> {
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn params(&self) -> &T {
        &self.params
    }

    pub fn operation(&self) -> CrudOperation {
        self.operation
    }

    pub fn into_params(self) -> T {
        self.params
    }

    pub fn into_parts(self) -> (Credential, T) {
        (self.credential, self.params)
    }
}

/// Validates requests against one schema.
pub struct RequestAdapter<S, R = FixedCredential> {
    schema: S,
    resolver: R,
    security: Vec<SecurityRule>,
}

impl<S: Schema> RequestAdapter<S, FixedCredential> {
    pub fn new(schema: S) -> Self {
        Self::with_resolver(schema, FixedCredential::default())
    }
}

impl<S: Schema, R: CredentialResolver> RequestAdapter<S, R> {
    pub fn with_resolver(schema: S, resolver: R) -> Self {
        Self {
            schema,
            resolver,
            security: Vec::new(),
        }
    }

    /// Attach a security declaration.
    pub fn with_security(mut self, rules: impl IntoIterator<Item = SecurityRule>) -> Self {
        self.security.extend(rules);
        self
    }

    pub fn security(&self) -> &[SecurityRule] {
        &self.security
    }

    /// Whether the declaration lists `permission` on `securable`.
    pub fn permits(&self, securable: &str, permission: CrudOperation) -> bool {
        self.security
            .iter()
            .any(|r| r.securable == securable && r.permission == permission)
    }

    pub async fn create(&self, input: &RequestInput) -> Result<ValidatedRequest<S::Output>, ValidationError> {
        self.run(CrudOperation::Create, input).await
    }

    pub async fn read(&self, input: &RequestInput) -> Result<ValidatedRequest<S::Output>, ValidationError> {
        self.run(CrudOperation::Read, input).await
    }

    pub async fn update(&self, input: &RequestInput) -> Result<ValidatedRequest<S::Output>, ValidationError> {
        self.run(CrudOperation::Update, input).await
    }

    pub async fn delete(&self, input: &RequestInput) -> Result<ValidatedRequest<S::Output>, ValidationError> {
        self.run(CrudOperation::Delete, input).await
    }

    async fn run(
        &self,
        operation: CrudOperation,
        input: &RequestInput,
    ) -> Result<ValidatedRequest<S::Output>, ValidationError> {
        let raw = input.merge();
        debug!(%operation, params = raw.len(), "Validating request");

        let params = match self.schema.validate(&raw).await {
            Ok(params) => params,
            Err(err) => {
                debug!(%operation, issues = err.issues.len(), "Request rejected");
                return Err(err);
            }
        };

        let credential = self.resolver.resolve(input);
        debug!(
            %operation,
            account_id = credential.account_id,
            user_id = credential.user_id,
            "Request validated"
        );
        Ok(ValidatedRequest {
            credential,
            params,
            operation,
        })
    }
}
