//! Schema validation of normalized request parameters.
//!
//! A [`Schema`] turns a raw [`ParameterBag`] into a typed, coerced value or a
//! list of field-level issues. Validation never panics and never raises: a
//! rejected input is an ordinary `Err(ValidationError)`.

use crate::models::ParameterBag;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::marker::PhantomData;
use thiserror::Error;
use validator::Validate;

/// Field name used for issues that concern the input as a whole.
pub const ROOT_FIELD: &str = "";

/// One problem found in one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldIssue {
    pub field: String,
    /// Machine-readable kind, e.g. `missing_field`, `invalid_type`, `range`
    pub code: String,
    pub message: String,
}

impl FieldIssue {
    pub fn new(
        field: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}

/// A rejected request: every issue the schema reported.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("Validation failed: {}", summary(.issues))]
pub struct ValidationError {
    pub issues: Vec<FieldIssue>,
}

fn summary(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(|i| {
            if i.field.is_empty() {
                i.message.clone()
            } else {
                format!("{}: {}", i.field, i.message)
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationError {
    pub fn new(issues: Vec<FieldIssue>) -> Self {
        Self { issues }
    }

    pub fn single(
        field: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(vec![FieldIssue::new(field, code, message)])
    }

    /// Whether any issue concerns `field`.
    pub fn cites(&self, field: &str) -> bool {
        self.issues.iter().any(|i| i.field == field)
    }

    /// Issues from a failed deserialization, attributed to the failing field.
    pub fn from_deserialize(err: serde_path_to_error::Error<serde_json::Error>) -> Self {
        let message = err.inner().to_string();
        let path = err.path().to_string();
        let (code, field) = classify_serde_message(&message);

        let field = match field {
            Some(named) if path == "." => named,
            Some(named) if path == named || path.ends_with(&format!(".{}", named)) => path,
            Some(named) => format!("{}.{}", path, named),
            None if path == "." => ROOT_FIELD.to_string(),
            None => path,
        };
        Self::single(field, code, strip_position(&message))
    }
}

impl From<validator::ValidationErrors> for ValidationError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
        fields.sort_by(|a, b| a.0.cmp(&b.0));

        let issues = fields
            .into_iter()
            .flat_map(|(field, errs)| {
                let field = if field == "__all__" {
                    ROOT_FIELD.to_string()
                } else {
                    field.to_string()
                };
                errs.iter().map(move |e| {
                    let message = e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("failed the '{}' check", e.code));
                    FieldIssue::new(field.clone(), e.code.to_string(), message)
                })
            })
            .collect();
        Self::new(issues)
    }
}

/// Map serde's message text to an issue code, plus the field it names if any.
fn classify_serde_message(message: &str) -> (&'static str, Option<String>) {
    let backticked = || {
        message
            .split('`')
            .nth(1)
            .map(String::from)
    };
    if message.starts_with("missing field") {
        ("missing_field", backticked())
    } else if message.starts_with("unknown field") {
        ("unknown_field", backticked())
    } else if message.starts_with("invalid type") {
        ("invalid_type", None)
    } else {
        ("invalid_value", None)
    }
}

/// serde_json appends " at line L column C", meaningless for in-memory values.
fn strip_position(message: &str) -> String {
    match message.rfind(" at line ") {
        Some(idx) => message[..idx].to_string(),
        None => message.to_string(),
    }
}

/// Validates raw parameters into a typed value.
///
/// Implementations may suspend, e.g. to check uniqueness against a store.
#[async_trait]
pub trait Schema: Send + Sync {
    type Output: Send;

    async fn validate(&self, raw: &ParameterBag) -> Result<Self::Output, ValidationError>;
}

/// Schema backed by a `Deserialize + Validate` type.
///
/// Deserialization performs coercion (annotate fields with `serde_with`, e.g.
/// `PickFirst<(_, DisplayFromStr)>`, to accept `"5"` where a number is
/// expected); `validator` rules then apply refinements.
pub struct TypedSchema<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedSchema<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for TypedSchema<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TypedSchema<T>
where
    T: DeserializeOwned + Validate,
{
    /// Synchronous validation; the async trait method delegates here.
    pub fn check(&self, raw: &ParameterBag) -> Result<T, ValidationError> {
        let value: T = serde_path_to_error::deserialize(raw.to_json())
            .map_err(ValidationError::from_deserialize)?;
        value.validate()?;
        Ok(value)
    }
}

#[async_trait]
impl<T> Schema for TypedSchema<T>
where
    T: DeserializeOwned + Validate + Send,
{
    type Output = T;

    async fn validate(&self, raw: &ParameterBag) -> Result<T, ValidationError> {
        self.check(raw)
    }
}

/// Schema backed by an async closure over an owned copy of the bag.
pub struct FnSchema<F> {
    f: F,
}

impl<F> FnSchema<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut, O> Schema for FnSchema<F>
where
    F: Fn(ParameterBag) -> Fut + Send + Sync,
    Fut: Future<Output = Result<O, ValidationError>> + Send,
    O: Send,
{
    type Output = O;

    async fn validate(&self, raw: &ParameterBag) -> Result<O, ValidationError> {
        (self.f)(raw.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_with::{DisplayFromStr, PickFirst, serde_as};

    #[serde_as]
    #[derive(Debug, Deserialize, Validate, PartialEq)]
    struct UserPath {
        #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
        #[validate(range(min = 1, message = "must be a positive integer"))]
        id: i64,
    }

    #[serde_as]
    #[derive(Debug, Deserialize, Validate)]
    #[serde(deny_unknown_fields)]
    struct NewUser {
        #[validate(length(min = 1, max = 200))]
        name: String,
        #[validate(email)]
        email: String,
        #[serde(default)]
        #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
        id_manager: Option<i64>,
    }

    #[tokio::test]
    async fn test_string_path_id_is_coerced() {
        let bag = ParameterBag::new().with("id", "5");
        let out = TypedSchema::<UserPath>::new().validate(&bag).await.unwrap();
        assert_eq!(out, UserPath { id: 5 });

        let bag = ParameterBag::new().with("id", 12);
        let out = TypedSchema::<UserPath>::new().validate(&bag).await.unwrap();
        assert_eq!(out.id, 12);
    }

    #[tokio::test]
    async fn test_non_numeric_id_cites_field() {
        let bag = ParameterBag::new().with("id", "abc");
        let err = TypedSchema::<UserPath>::new().validate(&bag).await.unwrap_err();
        assert!(err.cites("id"), "{err:?}");
        assert!(!err.to_string().contains("at line"));
    }

    #[tokio::test]
    async fn test_refinement_failure_is_reported() {
        let bag = ParameterBag::new().with("id", "0");
        let err = TypedSchema::<UserPath>::new().validate(&bag).await.unwrap_err();
        assert_eq!(
            err.issues,
            vec![FieldIssue::new("id", "range", "must be a positive integer")]
        );
    }

    #[test]
    fn test_missing_and_unknown_fields() {
        let schema = TypedSchema::<NewUser>::new();

        let err = schema
            .check(&ParameterBag::new().with("name", "Ann"))
            .unwrap_err();
        assert_eq!(err.issues[0].field, "email");
        assert_eq!(err.issues[0].code, "missing_field");

        let err = schema
            .check(
                &ParameterBag::new()
                    .with("name", "Ann")
                    .with("email", "ann@example.com")
                    .with("color", "red"),
            )
            .unwrap_err();
        assert_eq!(err.issues[0].field, "color");
        assert_eq!(err.issues[0].code, "unknown_field");
    }

    #[test]
    fn test_multiple_refinement_failures_are_sorted() {
        let err = TypedSchema::<NewUser>::new()
            .check(
                &ParameterBag::new()
                    .with("name", "")
                    .with("email", "not-an-email"),
            )
            .unwrap_err();
        let fields: Vec<&str> = err.issues.iter().map(|i| i.field.as_str()).collect();
        assert_eq!(fields, vec!["email", "name"]);
        assert_eq!(err.issues[0].code, "email");
    }

    #[derive(Debug, Deserialize, Validate)]
    struct Account {
        user_id: AccountRef,
    }

    #[derive(Debug, Deserialize, Validate)]
    struct AccountRef {
        #[allow(dead_code)]
        id: i64,
    }

    #[test]
    fn test_nested_missing_field_keeps_full_path() {
        let bag = ParameterBag::new().with("user_id", serde_json::json!({}));
        let err = TypedSchema::<Account>::new().check(&bag).unwrap_err();
        assert_eq!(err.issues[0].code, "missing_field");
        assert_eq!(err.issues[0].field, "user_id.id");
    }

    #[tokio::test]
    async fn test_fn_schema_can_await() {
        let schema = FnSchema::new(|bag: ParameterBag| async move {
            tokio::task::yield_now().await;
            match bag.get("code") {
                Some(_) => Ok(bag.len()),
                None => Err(ValidationError::single("code", "required", "code is required")),
            }
        });

        assert_eq!(
            schema
                .validate(&ParameterBag::new().with("code", "x"))
                .await
                .unwrap(),
            1
        );
        let err = schema.validate(&ParameterBag::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "Validation failed: code: code is required");
    }
}
