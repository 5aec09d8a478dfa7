//! Routine Gateway - command line entry point.
//!
//! Runs one stored routine through the connection gateway and prints the
//! response envelope as JSON.

use clap::Parser;
use routine_gateway::config::Config;
use routine_gateway::db::ConnectionGateway;
use routine_gateway::envelope::Envelope;
use routine_gateway::error::{DbError, DbResult};
use routine_gateway::models::{ExpectedReturn, ParameterBag, RoutineOutput};
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Parser)]
#[command(name = "routine-gateway", version, about = "Execute a stored routine")]
struct Cli {
    #[command(flatten)]
    config: Config,

    /// Routine to execute, optionally schema-qualified (schema.name)
    routine: String,

    /// Routine parameter, passed as a string (repeatable)
    #[arg(short = 'p', long = "param", value_name = "NAME=VALUE", value_parser = parse_param)]
    params: Vec<(String, String)>,

    /// Routine parameters as a JSON object; --param entries override it
    #[arg(long, value_name = "JSON")]
    json: Option<String>,

    /// How to shape the routine output
    #[arg(long, value_enum, default_value_t = ExpectedReturn::Multi)]
    returns: ExpectedReturn,

    /// Labels for the result sets of a multi call
    #[arg(long, value_delimiter = ',')]
    names: Vec<String>,

    /// Run the routine inside an explicit transaction
    #[arg(long)]
    in_transaction: bool,

    /// Roll the transaction back instead of committing it
    #[arg(long, requires = "in_transaction")]
    rollback: bool,
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got '{}'", raw)),
    }
}

impl Cli {
    fn parameter_bag(&self) -> DbResult<ParameterBag> {
        let mut bag = match &self.json {
            Some(raw) => {
                let value: serde_json::Value = serde_json::from_str(raw)
                    .map_err(|e| DbError::invalid_input(format!("--json is not valid JSON: {}", e)))?;
                if !value.is_object() {
                    return Err(DbError::invalid_input("--json must be a JSON object"));
                }
                ParameterBag::from_json_fields(value)
            }
            None => ParameterBag::new(),
        };
        bag.overlay(self.params.iter().cloned().collect());
        Ok(bag)
    }

    fn names(&self) -> Option<&[String]> {
        (!self.names.is_empty()).then_some(self.names.as_slice())
    }
}

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so stdout carries only the envelope
    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

async fn run(gateway: &ConnectionGateway, cli: &Cli) -> DbResult<RoutineOutput> {
    let params = cli.parameter_bag()?;
    let executor = gateway.executor();

    if !cli.in_transaction {
        return executor
            .execute(&cli.routine, &params, cli.returns, None, cli.names())
            .await;
    }

    let mut tx = gateway.begin().await?;
    let result = executor
        .execute(&cli.routine, &params, cli.returns, Some(&mut tx), cli.names())
        .await;

    match result {
        Ok(output) if cli.rollback => {
            tx.rollback().await?;
            Ok(output)
        }
        Ok(output) => {
            tx.commit().await?;
            Ok(output)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "Rollback after failed execution also failed");
            }
            Err(e)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.config);

    info!(
        routine = %cli.routine,
        returns = %cli.returns,
        "Starting Routine Gateway v{}",
        env!("CARGO_PKG_VERSION")
    );

    let envelope: Envelope<RoutineOutput> = match ConnectionGateway::install(cli.config.clone()) {
        Ok(gateway) => {
            let envelope: Envelope<RoutineOutput> = run(gateway, &cli).await.into();
            if let Err(e) = gateway.close_connection().await {
                warn!(error = %e, "Failed to close the connection pool");
            }
            envelope
        }
        Err(e) => e.into(),
    };

    match serde_json::to_string_pretty(&envelope) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error: failed to render response: {}", e);
            return ExitCode::FAILURE;
        }
    }

    if envelope.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use routine_gateway::models::ParamValue;

    #[test]
    fn test_cli_parses_routine_call() {
        let cli = Cli::try_parse_from([
            "routine-gateway",
            "--database-url",
            "mysql://app@localhost/sales",
            "sp_ListOrdersAndItems",
            "--param",
            "id=7",
            "--returns",
            "multi",
            "--names",
            "orders,items",
        ])
        .unwrap();

        assert_eq!(cli.routine, "sp_ListOrdersAndItems");
        assert_eq!(cli.returns, ExpectedReturn::Multi);
        assert_eq!(cli.names(), Some(&["orders".to_string(), "items".to_string()][..]));
        assert_eq!(
            cli.parameter_bag().unwrap().get("id"),
            Some(&ParamValue::from("7"))
        );
    }

    #[test]
    fn test_param_overrides_json() {
        let cli = Cli::try_parse_from([
            "routine-gateway",
            "sp_GetUser",
            "--json",
            r#"{"id": 7, "active": true}"#,
            "-p",
            "active=no",
        ])
        .unwrap();

        let bag = cli.parameter_bag().unwrap();
        assert_eq!(bag.get("id"), Some(&ParamValue::Int(7)));
        assert_eq!(bag.get("active"), Some(&ParamValue::from("no")));
        assert_eq!(cli.names(), None);
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=x").is_err());
        assert_eq!(parse_param("a=b=c").unwrap(), ("a".into(), "b=c".into()));

        assert!(Cli::try_parse_from(["routine-gateway", "sp_x", "--rollback"]).is_err());

        let cli = Cli::try_parse_from(["routine-gateway", "sp_x", "--json", "[1]"]).unwrap();
        assert_eq!(cli.parameter_bag().unwrap_err().code(), "INVALID_INPUT");
    }
}
