//!
//! sexyguard CLI
//! -------------
//! Command-line front end for the SexyGuard REST API. The session token is kept in the
//! configured token storage (local file storage by default), so `login` persists across runs.

use std::env;

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};

use sexyguard::cli::render_outcome;
use sexyguard::client::{ChangePasswordRequest, Credentials, RegisterRequest};
use sexyguard::{ApiOutcome, ClientConfig, Session, TokenStorage};

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} [--url <base>] [--storage local|cookie|memory] [--storage-dir <dir>] [--json] <command> [args]\n\nCommands:\n  login <user> <password>              log in and store the session token\n  register <user> <password> [email]   create an account (stores the token if one is returned)\n  logout                               forget the stored token\n  token                                print the stored token state\n  profile                              show the current profile\n  password <current> <new>             change password\n  ram <value>                          set the profile memory value\n  keys generate [json-params]          generate a key\n  keys activate <key>                  activate a key\n  info | market | version | health     public endpoints\n\nEnvironment:\n  SEXYGUARD_API_URL, SEXYGUARD_TOKEN_KEY, SEXYGUARD_TOKEN_STORAGE, SEXYGUARD_STORAGE_DIR,\n  SEXYGUARD_REQUEST_TIMEOUT_MS, RUST_LOG"
    );
}

fn arg<'a>(rest: &'a [String], i: usize, what: &str) -> Result<&'a str> {
    rest.get(i).map(String::as_str).with_context(|| format!("missing {}", what))
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let mut args: Vec<String> = env::args().collect();
    let program = args.remove(0);

    let mut cfg = ClientConfig::from_env();
    let mut raw_json = false;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--url" => {
                let v = args.get(i + 1).context("--url requires a value")?;
                cfg = cfg.with_base_url(v.clone());
                i += 2;
            }
            "--storage" => {
                let v = args.get(i + 1).context("--storage requires a value")?;
                let kind: TokenStorage = v.parse().map_err(anyhow::Error::msg)?;
                cfg = cfg.with_storage(kind);
                i += 2;
            }
            "--storage-dir" => {
                let v = args.get(i + 1).context("--storage-dir requires a value")?;
                cfg = cfg.with_storage_dir(v.clone());
                i += 2;
            }
            "--json" => { raw_json = true; i += 1; }
            "-h" | "--help" => { print_usage(&program); return Ok(()); }
            _ => break,
        }
    }
    let rest = &args[i..];
    let Some(command) = rest.first() else {
        print_usage(&program);
        std::process::exit(2);
    };

    let session = Session::new(cfg)?;
    let api = session.api();

    let result = match command.as_str() {
        "login" => {
            let creds = Credentials::new(arg(rest, 1, "user")?, arg(rest, 2, "password")?);
            session.login(&creds).await
        }
        "register" => {
            let req = RegisterRequest {
                username: arg(rest, 1, "user")?.to_string(),
                password: arg(rest, 2, "password")?.to_string(),
                email: rest.get(3).cloned(),
            };
            api.register(&req).await
        }
        "logout" => {
            session.logout();
            Ok(ApiOutcome::Success(json!({"loggedOut": true})))
        }
        "token" => Ok(ApiOutcome::Success(json!({
            "authenticated": session.is_authenticated(),
            "storage": session.config().storage.to_string(),
        }))),
        "profile" => api.profile().await,
        "password" => {
            let req = ChangePasswordRequest {
                current_password: arg(rest, 1, "current password")?.to_string(),
                new_password: arg(rest, 2, "new password")?.to_string(),
            };
            api.change_password(&req).await
        }
        "ram" => {
            let value: u64 = arg(rest, 1, "value")?.parse().context("ram value must be a non-negative integer")?;
            api.set_memory(value).await
        }
        "keys" => match arg(rest, 1, "keys subcommand")? {
            "generate" => {
                let params: Value = match rest.get(2) {
                    Some(raw) => serde_json::from_str(raw).context("generate params must be JSON")?,
                    None => Value::Null,
                };
                api.generate_key(params).await
            }
            "activate" => api.activate_key(arg(rest, 2, "key")?).await,
            other => bail!("unknown keys subcommand '{}'", other),
        },
        "info" => api.public_info().await,
        "market" => api.market().await,
        "version" => api.version().await,
        "health" => api.health().await,
        other => {
            eprintln!("unknown command '{}'", other);
            print_usage(&program);
            std::process::exit(2);
        }
    };

    match result {
        Ok(out) => {
            if raw_json {
                println!("{}", serde_json::to_string_pretty(&out.to_json())?);
            } else {
                println!("{}", render_outcome(&out));
            }
            if !out.is_success() { std::process::exit(1); }
            Ok(())
        }
        Err(e) => {
            eprintln!("request did not complete: {}", e);
            std::process::exit(2);
        }
    }
}
