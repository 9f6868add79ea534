//! kvlock CLI
//!
//! Command-line interface for the value operations and distributed locks.
//! Connection settings come from `REDIS_*` environment variables; flags
//! override them.

use std::process::{Command, ExitCode};
use std::time::Duration;

use clap::{Parser, Subcommand};
use kvlock::config::{ENV_DB_INDEX, ENV_HOSTS, ENV_LOG_LEVEL, ENV_PASSWORD};
use kvlock::{Config, Context, LockError};
use tracing_subscriber::{fmt, EnvFilter};

/// Exit code when the lock is held elsewhere (EX_TEMPFAIL)
const EXIT_LOCK_NOT_ACQUIRED: u8 = 75;

/// kvlock CLI
#[derive(Parser, Debug)]
#[command(name = "kvlock-cli")]
#[command(about = "CLI for Redis values and distributed locks")]
#[command(version)]
struct Args {
    /// Comma-separated host:port list (overrides REDIS_HOSTS)
    #[arg(long)]
    hosts: Option<String>,

    /// Credential (overrides REDIS_PASSWORD)
    #[arg(long)]
    password: Option<String>,

    /// Database index (overrides REDIS_DB_INDEX)
    #[arg(long)]
    db: Option<String>,

    /// Log level: DEBUG, INFO, WARNING, ERROR (overrides REDIS_LOG_LEVEL)
    #[arg(long)]
    log_level: Option<String>,

    /// Lease TTL of distributed locks in milliseconds
    #[arg(long, default_value = "8000")]
    lock_ttl_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,

        /// Expiry in seconds (default 24 hours)
        #[arg(long)]
        ttl: Option<u64>,
    },

    /// Atomically increment an integer
    Incr {
        key: String,
    },

    /// Atomically decrement an integer
    Decr {
        key: String,
    },

    /// Atomically add a float (may be negative)
    IncrFloat {
        key: String,

        #[arg(allow_hyphen_values = true)]
        delta: f64,
    },

    /// Run a command while holding a distributed lock
    Lock {
        /// Lock name (stored as mutex.<key>)
        key: String,

        /// Command and arguments to run under the lock
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },

    /// Ping the store
    Ping,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = Config::from_lookup(|name| {
        let flag = match name {
            ENV_HOSTS => args.hosts.clone(),
            ENV_PASSWORD => args.password.clone(),
            ENV_DB_INDEX => args.db.clone(),
            ENV_LOG_LEVEL => args.log_level.clone(),
            _ => None,
        };
        flag.or_else(|| std::env::var(name).ok())
    });

    let mut config = match config {
        Ok(config) => config,
        Err(e) => {
            init_tracing("info");
            tracing::error!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    config.lock_ttl = Duration::from_millis(args.lock_ttl_ms);

    init_tracing(config.log_directive());

    let context = match Context::connect(&config) {
        Ok(context) => context,
        Err(e) => {
            tracing::error!("Failed to initialize: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(&context, args.command) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(context: &Context, command: Commands) -> kvlock::Result<ExitCode> {
    match command {
        Commands::Get { key } => println!("{}", context.get(&key)?),
        Commands::Set { key, value, ttl } => {
            context.set(&key, value, ttl.map(Duration::from_secs))?;
            println!("OK");
        }
        Commands::Incr { key } => println!("{}", context.increment(&key)?),
        Commands::Decr { key } => println!("{}", context.decrement(&key)?),
        Commands::IncrFloat { key, delta } => {
            println!("{}", context.increment_by_float(&key, delta)?)
        }
        Commands::Ping => println!("{}", context.store().ping()?),
        Commands::Lock { key, command } => return Ok(run_locked(context, &key, &command)),
    }
    Ok(ExitCode::SUCCESS)
}

/// Run `command` under the lock and exit with its status
fn run_locked(context: &Context, key: &str, command: &[String]) -> ExitCode {
    let Some((program, program_args)) = command.split_first() else {
        return ExitCode::FAILURE;
    };

    let status = context.with_lock(key, || Command::new(program).args(program_args).status());

    match status {
        Ok(status) => {
            let code = status.code().unwrap_or(1);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
        Err(LockError::NotAcquired(e)) => {
            tracing::error!("{}", e);
            ExitCode::from(EXIT_LOCK_NOT_ACQUIRED)
        }
        Err(e) => {
            tracing::error!("Failed to run {}: {}", program, e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();
}
