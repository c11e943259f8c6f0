mod client;
mod parse;
mod report;

use std::env;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use client::Session;
use parse::Response;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 9999;
const READ_TIMEOUT: Duration = Duration::from_secs(5);

const USAGE: &str = "usage: irrigation-ctl [--host HOST] [--port PORT] [--json] [COMMAND]

commands: STATUS (default), HISTORIAL_RECIENTE, HISTORIAL, ESTADISTICAS,
          BOMBA1_ON, BOMBA1_OFF, BOMBA2_ON, BOMBA2_OFF, AUTO, EVENTOS, PING";

#[derive(Debug, PartialEq)]
struct Args {
    host: String,
    port: u16,
    json: bool,
    command: String,
}

/// Env supplies the defaults; flags win.
fn parse_args(
    argv: impl IntoIterator<Item = String>,
    env_host: Option<String>,
    env_port: Option<String>,
) -> Result<Args> {
    let mut args = Args {
        host: env_host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
        port: match env_port {
            Some(p) => p
                .parse()
                .with_context(|| format!("IRRIGATION_PORT is not a valid port: {p:?}"))?,
            None => DEFAULT_PORT,
        },
        json: false,
        command: "STATUS".to_string(),
    };

    let mut command: Vec<String> = Vec::new();
    let mut argv = argv.into_iter();
    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "--host" => {
                args.host = argv.next().context("--host needs a value")?;
            }
            "--port" => {
                let p = argv.next().context("--port needs a value")?;
                args.port = p
                    .parse()
                    .with_context(|| format!("--port is not a valid port: {p:?}"))?;
            }
            "--json" => args.json = true,
            "-h" | "--help" => bail!("{USAGE}"),
            flag if flag.starts_with("--") => bail!("unknown flag {flag}\n\n{USAGE}"),
            _ => command.push(arg),
        }
    }
    if !command.is_empty() {
        args.command = command.join(" ");
    }
    Ok(args)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args(
        env::args().skip(1),
        env::var("IRRIGATION_HOST").ok(),
        env::var("IRRIGATION_PORT").ok(),
    )?;
    let addr = format!("{}:{}", args.host, args.port);

    let (mut session, _greeting) = Session::connect(&addr, READ_TIMEOUT).await?;
    let lines = session.request(&args.command).await?;

    let response = match parse::parse_response(&lines) {
        Ok(r) => r,
        Err(e) => {
            warn!(command = %args.command, "unparseable response: {e}");
            Response::Reply(lines.join("\n"))
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        println!("{}", report::render(&response));
    }
    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(s: &[&str]) -> Vec<String> {
        s.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn defaults() {
        let a = parse_args(argv(&[]), None, None).unwrap();
        assert_eq!(
            a,
            Args {
                host: "127.0.0.1".into(),
                port: 9999,
                json: false,
                command: "STATUS".into(),
            }
        );
    }

    #[test]
    fn env_then_flags() {
        let a = parse_args(
            argv(&["--port", "7000", "--json", "ESTADISTICAS"]),
            Some("10.0.0.5".into()),
            Some("8000".into()),
        )
        .unwrap();
        assert_eq!(a.host, "10.0.0.5");
        assert_eq!(a.port, 7000);
        assert!(a.json);
        assert_eq!(a.command, "ESTADISTICAS");
    }

    #[test]
    fn bad_values_are_errors() {
        assert!(parse_args(argv(&["--port", "x"]), None, None).is_err());
        assert!(parse_args(argv(&["--host"]), None, None).is_err());
        assert!(parse_args(argv(&[]), None, Some("99999".into())).is_err());
        assert!(parse_args(argv(&["--verbose"]), None, None).is_err());
    }
}
