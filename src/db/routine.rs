//! Routine names, declared signatures and call statements.
//!
//! MySQL has no named-argument call syntax, so arguments are placed by the
//! routine's declared parameter order. PostgreSQL calls use named notation
//! with each placeholder cast to the declared type, which keeps overload
//! resolution independent of the bound Rust type.

use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, ParamValue, ParameterBag};
use std::fmt;

const MAX_IDENTIFIER_LEN: usize = 64;

static NULL_PARAM: ParamValue = ParamValue::Null;

/// Catalog lookup for a MySQL procedure's parameters, in declared order.
///
/// Returns no rows when the procedure does not exist and a single NULL row
/// when it takes no parameters.
pub const MYSQL_SIGNATURE_SQL: &str = "\
SELECT CAST(p.PARAMETER_NAME AS CHAR) \
FROM information_schema.ROUTINES r \
LEFT JOIN information_schema.PARAMETERS p \
  ON p.SPECIFIC_SCHEMA = r.ROUTINE_SCHEMA \
 AND p.SPECIFIC_NAME = r.SPECIFIC_NAME \
 AND p.ORDINAL_POSITION > 0 \
WHERE r.ROUTINE_SCHEMA = COALESCE(?, DATABASE()) \
  AND r.ROUTINE_NAME = ? \
  AND r.ROUTINE_TYPE = 'PROCEDURE' \
ORDER BY p.ORDINAL_POSITION";

/// Catalog lookup for a PostgreSQL function's input parameters.
///
/// Unqualified names resolve along `search_path`, first matching schema first.
/// Rows are grouped by overload (`specific_name`); only the first overload is used.
pub const POSTGRES_SIGNATURE_SQL: &str = "\
SELECT r.specific_name::text, p.parameter_name::text, p.udt_schema::text, p.udt_name::text \
FROM information_schema.routines r \
LEFT JOIN information_schema.parameters p \
  ON p.specific_schema = r.specific_schema \
 AND p.specific_name = r.specific_name \
 AND p.parameter_mode IN ('IN', 'INOUT') \
WHERE r.routine_type = 'FUNCTION' \
  AND r.routine_name = lower($2) \
  AND (r.routine_schema = lower($1) \
       OR ($1::text IS NULL AND r.routine_schema = ANY(current_schemas(false)))) \
ORDER BY array_position(current_schemas(false), r.routine_schema::name), \
  r.specific_name, p.ordinal_position";

/// A validated `[schema.]name` routine identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoutineName {
    schema: Option<String>,
    name: String,
}

impl RoutineName {
    pub fn parse(s: &str) -> DbResult<Self> {
        let s = s.trim();
        let (schema, name) = match s.split_once('.') {
            Some((schema, name)) => (Some(schema), name),
            None => (None, s),
        };

        for part in schema.iter().chain(std::iter::once(&name)) {
            if !is_identifier(part) {
                return Err(DbError::invalid_input(format!(
                    "Invalid routine name '{}': expected [schema.]name made of letters, digits, '_' or '$'",
                    s
                )));
            }
        }

        Ok(Self {
            schema: schema.map(String::from),
            name: name.to_string(),
        })
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The name as spliced into a call statement.
    ///
    /// PostgreSQL names stay bare so they fold to lower case like any
    /// unquoted identifier; MySQL routine names are case-insensitive.
    pub fn to_sql(&self, db_type: DatabaseType) -> String {
        match db_type {
            DatabaseType::MySQL => match &self.schema {
                Some(schema) => format!("`{}`.`{}`", schema, self.name),
                None => format!("`{}`", self.name),
            },
            DatabaseType::PostgreSQL => self.to_string(),
        }
    }

    /// Key for the per-gateway signature cache.
    pub fn cache_key(&self) -> String {
        self.to_string().to_lowercase()
    }
}

impl fmt::Display for RoutineName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    s.len() <= MAX_IDENTIFIER_LEN
        && (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn quote_pg(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// One declared input parameter of a routine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredParam {
    pub name: String,
    /// Fully qualified type, PostgreSQL only
    pub type_name: Option<String>,
}

impl DeclaredParam {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: None,
        }
    }

    pub fn typed(name: impl Into<String>, udt_schema: &str, udt_name: &str) -> Self {
        Self {
            name: name.into(),
            type_name: Some(format!("{}.{}", quote_pg(udt_schema), quote_pg(udt_name))),
        }
    }
}

/// Collapse MySQL catalog rows into a signature; `None` when the routine is unknown.
pub fn mysql_signature(rows: Vec<Option<String>>) -> Option<Vec<DeclaredParam>> {
    if rows.is_empty() {
        return None;
    }
    Some(rows.into_iter().flatten().map(DeclaredParam::new).collect())
}

/// Row shape of [`POSTGRES_SIGNATURE_SQL`].
pub type PgSignatureRow = (String, Option<String>, Option<String>, Option<String>);

/// Collapse PostgreSQL catalog rows into the first overload's signature.
///
/// Unnamed parameters cannot be bound by name and are skipped.
pub fn postgres_signature(rows: Vec<PgSignatureRow>) -> Option<Vec<DeclaredParam>> {
    let first = rows.first()?.0.clone();
    Some(
        rows.into_iter()
            .take_while(|(specific, ..)| *specific == first)
            .filter_map(|(_, name, schema, udt)| match (name, schema, udt) {
                (Some(name), Some(schema), Some(udt)) if !name.is_empty() => {
                    Some(DeclaredParam::typed(name, &schema, &udt))
                }
                _ => None,
            })
            .collect(),
    )
}

/// A call statement with its arguments in placeholder order.
#[derive(Debug, PartialEq)]
pub struct RoutineCall<'a> {
    pub sql: String,
    pub args: Vec<&'a ParamValue>,
}

fn reject_unknown(routine: &RoutineName, declared: &[DeclaredParam], params: &ParameterBag) -> DbResult<()> {
    if let Some(unknown) = params
        .keys()
        .find(|key| !declared.iter().any(|d| d.name.eq_ignore_ascii_case(key)))
    {
        return Err(DbError::invalid_input(format!(
            "Routine {} has no parameter named '{}'",
            routine, unknown
        )));
    }
    Ok(())
}

fn lookup<'a>(params: &'a ParameterBag, name: &str) -> Option<&'a ParamValue> {
    params
        .get(name)
        .or_else(|| params.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v))
}

/// Build `CALL routine(?, ...)` with one placeholder per declared parameter.
///
/// Declared parameters missing from the bag are passed as NULL.
pub fn mysql_call<'a>(
    routine: &RoutineName,
    declared: &[DeclaredParam],
    params: &'a ParameterBag,
) -> DbResult<RoutineCall<'a>> {
    reject_unknown(routine, declared, params)?;

    let args: Vec<&ParamValue> = declared
        .iter()
        .map(|d| lookup(params, &d.name).unwrap_or(&NULL_PARAM))
        .collect();
    let placeholders = vec!["?"; args.len()].join(", ");

    Ok(RoutineCall {
        sql: format!("CALL {}({})", routine.to_sql(DatabaseType::MySQL), placeholders),
        args,
    })
}

/// Build `SELECT * FROM routine(name => $1::type, ...)` for the supplied parameters.
///
/// Parameters missing from the bag are omitted so their declared defaults apply.
fn is_json_type(type_name: &str) -> bool {
    type_name.ends_with("\"json\"") || type_name.ends_with("\"jsonb\"")
}

pub fn postgres_call<'a>(
    routine: &RoutineName,
    declared: &[DeclaredParam],
    params: &'a ParameterBag,
) -> DbResult<RoutineCall<'a>> {
    reject_unknown(routine, declared, params)?;

    let mut args = Vec::with_capacity(params.len());
    let mut named = Vec::with_capacity(params.len());
    for d in declared {
        if let Some(value) = lookup(params, &d.name) {
            args.push(value);
            // JSON values bind as jsonb, which casts to nothing but json types
            let cast = d
                .type_name
                .as_deref()
                .filter(|t| !matches!(value, ParamValue::Json(_)) || is_json_type(t))
                .map(|t| format!("::{}", t))
                .unwrap_or_default();
            named.push(format!("{} => ${}{}", quote_pg(&d.name), args.len(), cast));
        }
    }

    Ok(RoutineCall {
        sql: format!(
            "SELECT * FROM {}({})",
            routine.to_sql(DatabaseType::PostgreSQL),
            named.join(", ")
        ),
        args,
    })
}
