//! Routine execution engine.
//!
//! This module runs named routines and collects every result set they return:
//! - Parameters are bound by name against the routine's declared signature
//! - Statements run on a caller's transaction or on the gateway's pool
//! - Raw output is shaped by the caller's declared return kind
//!
//! # Architecture
//!
//! The executor uses database-specific implementations organized in submodules:
//! - `mysql`: `CALL` with positional arguments in declared order
//! - `postgres`: `SELECT * FROM fn(...)` with named arguments
//!
//! Both stream the driver's output through [`collect_results`].

use crate::db::gateway::ConnectionGateway;
use crate::db::pool::{DbPool, PoolConnector, SqlxConnector};
use crate::db::routine::{DeclaredParam, RoutineName};
use crate::db::transaction::{DbTransaction, Transaction};
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult};
use crate::models::{ExpectedReturn, ParameterBag, RawResult, RawResultBuilder, RoutineOutput};
use futures_util::{Stream, TryStreamExt};
use sqlx::Either;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Executes routines through a gateway.
pub struct RoutineExecutor<'g, C: PoolConnector = SqlxConnector> {
    gateway: &'g ConnectionGateway<C>,
}

impl<C: PoolConnector> ConnectionGateway<C> {
    pub fn executor(&self) -> RoutineExecutor<'_, C> {
        RoutineExecutor::new(self)
    }
}

impl<'g, C: PoolConnector> RoutineExecutor<'g, C> {
    pub fn new(gateway: &'g ConnectionGateway<C>) -> Self {
        Self { gateway }
    }

    /// Execute `routine` with `params` and shape the output by `returns`.
    ///
    /// Runs on `transaction` when supplied, otherwise on a pooled connection.
    /// `names` labels the result sets of a `Multi` call.
    pub async fn execute(
        &self,
        routine: &str,
        params: &ParameterBag,
        returns: ExpectedReturn,
        transaction: Option<&mut Transaction>,
        names: Option<&[String]>,
    ) -> DbResult<RoutineOutput> {
        let name = RoutineName::parse(routine)?;
        let start = Instant::now();
        let transaction_id = transaction.as_ref().map(|tx| tx.id().to_string());

        debug!(
            routine = %name,
            params = params.len(),
            returns = %returns,
            transaction_id = ?transaction_id,
            "Executing routine"
        );

        let raw = match transaction {
            Some(tx) => match tx.connection("execute")? {
                DbTransaction::MySql(conn) => mysql::call(self, &mut **conn, &name, params).await?,
                DbTransaction::Postgres(conn) => {
                    postgres::call(self, &mut **conn, &name, params).await?
                }
            },
            None => match self.gateway.get_connection().await? {
                DbPool::MySql(pool) => mysql::call(self, &pool, &name, params).await?,
                DbPool::Postgres(pool) => postgres::call(self, &pool, &name, params).await?,
            },
        };

        debug!(
            routine = %name,
            result_sets = raw.result_sets.len(),
            statements = raw.rows_affected.len(),
            execution_time_ms = start.elapsed().as_millis() as u64,
            "Routine completed"
        );

        Ok(raw.shape(returns, names))
    }

    async fn cached_signature(&self, name: &RoutineName) -> Option<Arc<[DeclaredParam]>> {
        self.gateway
            .signatures
            .read()
            .await
            .get(&name.cache_key())
            .cloned()
    }

    async fn remember_signature(
        &self,
        name: &RoutineName,
        declared: Option<Vec<DeclaredParam>>,
    ) -> DbResult<Arc<[DeclaredParam]>> {
        let declared: Arc<[DeclaredParam]> = declared
            .ok_or_else(|| {
                DbError::execution(
                    format!("Routine {} does not exist", name),
                    None,
                    "Check the routine name and the target database",
                )
            })?
            .into();
        self.gateway
            .signatures
            .write()
            .await
            .insert(name.cache_key(), Arc::clone(&declared));
        Ok(declared)
    }
}

/// Split a driver result stream into result sets and affected-row counts.
pub(crate) async fn collect_results<Q, R, S>(
    mut stream: S,
    mut builder: RawResultBuilder,
    rows_affected: impl Fn(&Q) -> u64,
) -> DbResult<RawResult>
where
    S: Stream<Item = Result<Either<Q, R>, sqlx::Error>> + Unpin,
    R: RowToJson,
{
    while let Some(item) = stream.try_next().await? {
        match item {
            Either::Left(done) => builder.end_statement(rows_affected(&done)),
            Either::Right(row) => builder.push_row(row.to_json_map()),
        }
    }
    Ok(builder.finish())
}

mod mysql {
    use super::*;
    use crate::db::params::bind_mysql_param;
    use crate::db::routine::{MYSQL_SIGNATURE_SQL, mysql_call, mysql_signature};
    use sqlx::mysql::MySqlQueryResult;
    use sqlx::{Acquire, Executor, MySql, MySqlConnection};

    pub async fn call<'a, C, A>(
        executor: &RoutineExecutor<'_, C>,
        acquire: A,
        name: &RoutineName,
        params: &ParameterBag,
    ) -> DbResult<RawResult>
    where
        C: PoolConnector,
        A: Acquire<'a, Database = MySql>,
    {
        let mut conn = acquire.acquire().await?;
        let declared = signature(executor, &mut *conn, name).await?;
        let call = mysql_call(name, &declared, params)?;

        let mut query = sqlx::query(&call.sql);
        for arg in &call.args {
            query = bind_mysql_param(query, arg);
        }

        let stream = Executor::fetch_many(&mut *conn, query);
        collect_results(
            stream,
            RawResultBuilder::with_trailing_status(),
            |r: &MySqlQueryResult| r.rows_affected(),
        )
        .await
    }

    async fn signature<C: PoolConnector>(
        executor: &RoutineExecutor<'_, C>,
        conn: &mut MySqlConnection,
        name: &RoutineName,
    ) -> DbResult<Arc<[DeclaredParam]>> {
        if let Some(declared) = executor.cached_signature(name).await {
            return Ok(declared);
        }
        let rows: Vec<Option<String>> = sqlx::query_scalar(MYSQL_SIGNATURE_SQL)
            .bind(name.schema())
            .bind(name.name())
            .fetch_all(&mut *conn)
            .await?;
        executor.remember_signature(name, mysql_signature(rows)).await
    }
}

mod postgres {
    use super::*;
    use crate::db::params::bind_postgres_param;
    use crate::db::routine::{
        POSTGRES_SIGNATURE_SQL, PgSignatureRow, postgres_call, postgres_signature,
    };
    use sqlx::postgres::PgQueryResult;
    use sqlx::{Acquire, Executor, PgConnection, Postgres};

    pub async fn call<'a, C, A>(
        executor: &RoutineExecutor<'_, C>,
        acquire: A,
        name: &RoutineName,
        params: &ParameterBag,
    ) -> DbResult<RawResult>
    where
        C: PoolConnector,
        A: Acquire<'a, Database = Postgres>,
    {
        let mut conn = acquire.acquire().await?;
        let declared = signature(executor, &mut *conn, name).await?;
        let call = postgres_call(name, &declared, params)?;

        let mut query = sqlx::query(&call.sql);
        for arg in &call.args {
            query = bind_postgres_param(query, arg);
        }

        let stream = Executor::fetch_many(&mut *conn, query);
        collect_results(stream, RawResultBuilder::new(), |r: &PgQueryResult| {
            r.rows_affected()
        })
        .await
    }

    async fn signature<C: PoolConnector>(
        executor: &RoutineExecutor<'_, C>,
        conn: &mut PgConnection,
        name: &RoutineName,
    ) -> DbResult<Arc<[DeclaredParam]>> {
        if let Some(declared) = executor.cached_signature(name).await {
            return Ok(declared);
        }
        let rows: Vec<PgSignatureRow> = sqlx::query_as(POSTGRES_SIGNATURE_SQL)
            .bind(name.schema())
            .bind(name.name())
            .fetch_all(&mut *conn)
            .await?;
        executor.remember_signature(name, postgres_signature(rows)).await
    }
}
