/*!
 * Rampart CLI - runs the resilience primitives against a simulated dependency
 *
 * Each subcommand plays one scenario on real timers and logs what the
 * primitives decide. `--config` points at a TOML resilience profile; without
 * it the defaults apply.
 */

use anyhow::Context;
use clap::{Parser, Subcommand};
use rampart::{
    logging, CircuitBreaker, CircuitBreakerConfig, ErrorKind, RateLimiter, RateLimiterConfig,
    ResilienceError, ResilienceProfile, RetryHandler,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "rampart")]
#[command(version, about = "Circuit breaker, rate limiter and retry scenarios", long_about = None)]
struct Cli {
    /// Resilience profile (TOML)
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Trip a breaker, get rejected, then recover with one probe
    Breaker,

    /// Drain a token bucket and watch it refill
    Limiter,

    /// Retry a dependency that fails a few times before answering
    Retry {
        /// Failures before the dependency recovers
        #[arg(long, default_value_t = 2)]
        failures: u32,
    },

    /// Retry wrapping rate limiter wrapping circuit breaker
    Stack {
        /// Number of top-level calls to make
        #[arg(long, default_value_t = 10)]
        calls: u32,

        /// Failures before the dependency recovers
        #[arg(long, default_value_t = 6)]
        failures: u32,
    },

    /// Print the effective profile as TOML
    ShowConfig,
}

#[derive(Debug, Error)]
#[error("dependency unavailable (call #{0})")]
struct DependencyError(u32);

/// Fails its first `failures` calls, then answers with the call number
struct FlakyDependency {
    calls: AtomicU32,
    failures: u32,
}

impl FlakyDependency {
    fn new(failures: u32) -> Self {
        Self {
            calls: AtomicU32::new(0),
            failures,
        }
    }

    async fn call(&self) -> Result<u32, DependencyError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= self.failures {
            Err(DependencyError(n))
        } else {
            Ok(n)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut profile = match cli.config {
        Some(ref path) => ResilienceProfile::from_file(path)
            .with_context(|| format!("loading profile {}", path.display()))?,
        None => ResilienceProfile::default(),
    };
    profile.logging.verbose |= cli.verbose;

    logging::init_logging(&profile.logging)?;

    match cli.command {
        Command::Breaker => run_breaker().await,
        Command::Limiter => run_limiter().await,
        Command::Retry { failures } => run_retry(&profile, failures).await,
        Command::Stack { calls, failures } => run_stack(&profile, calls, failures).await,
        Command::ShowConfig => {
            print!("{}", profile.to_toml_string()?);
            Ok(())
        }
    }
}

async fn run_breaker() -> anyhow::Result<()> {
    let breaker = CircuitBreaker::new(CircuitBreakerConfig {
        failure_threshold: 1,
        success_threshold: 1,
        reset_timeout: Duration::from_millis(50),
        ..Default::default()
    })
    .with_state_listener(|from, to| info!(%from, %to, "Circuit state changed"));

    let down = breaker
        .execute(|| async { Err::<(), _>(DependencyError(1)) })
        .await;
    println!("first call:  {:?}", down.map_err(|e| e.kind()));

    let rejected = breaker.execute(|| async { Ok::<_, DependencyError>(()) }).await;
    println!("immediately: {:?}", rejected.map_err(|e| e.kind()));

    tokio::time::sleep(Duration::from_millis(60)).await;

    let probe = breaker.execute(|| async { Ok::<_, DependencyError>("recovered") }).await;
    println!("after 60ms:  {:?}", probe.map_err(|e| e.kind()));
    println!("state:       {}", breaker.get_state().await);
    Ok(())
}

async fn run_limiter() -> anyhow::Result<()> {
    let limiter = RateLimiter::new(RateLimiterConfig::new(5, 10.0));

    println!("take 5:          {}", limiter.try_acquire(5));
    println!("take 1:          {}", limiter.try_acquire(1));

    tokio::time::sleep(Duration::from_millis(100)).await;
    println!("after 100ms:     {} token(s)", limiter.get_available_tokens());
    println!("take 1:          {}", limiter.try_acquire(1));

    let started = tokio::time::Instant::now();
    limiter.acquire(3).await;
    println!("waited for 3:    {:?}", started.elapsed());
    Ok(())
}

async fn run_retry(profile: &ResilienceProfile, failures: u32) -> anyhow::Result<()> {
    let dependency = FlakyDependency::new(failures);
    let retry = RetryHandler::new(profile.retry_config()).with_on_retry(
        |attempt, e: &DependencyError| warn!(attempt, error = %e, "Attempt failed, backing off"),
    );

    let started = tokio::time::Instant::now();
    match retry.execute(|| dependency.call()).await {
        Ok(n) => println!("succeeded on call #{} after {:?}", n, started.elapsed()),
        Err(e) => println!("gave up: {} after {:?}", e, started.elapsed()),
    }
    Ok(())
}

async fn run_stack(profile: &ResilienceProfile, calls: u32, failures: u32) -> anyhow::Result<()> {
    let breaker = CircuitBreaker::try_new(profile.circuit_breaker_config())?
        .with_state_listener(|from, to| info!(%from, %to, "Circuit state changed"));
    let limiter = RateLimiter::new(
        profile
            .rate_limiter_config()
            .unwrap_or_else(|| RateLimiterConfig::new(5, 10.0)),
    );
    let auto_refill = profile
        .rate_limiter
        .as_ref()
        .is_some_and(|settings| settings.auto_refill);
    let refill_task = if auto_refill {
        limiter.start_auto_refill()
    } else {
        None
    };

    // An open circuit will not heal within one backoff window worth waiting for
    let retry = RetryHandler::new(profile.retry_config())
        .with_should_retry(|e: &ResilienceError<DependencyError>| !e.is_circuit_open())
        .with_on_retry(|attempt, e: &ResilienceError<DependencyError>| {
            warn!(attempt, error = %e, "Stack call failed, retrying")
        });

    let dependency = FlakyDependency::new(failures);

    for call in 1..=calls {
        let outcome = retry
            .execute(|| limiter.execute(|| breaker.execute(|| dependency.call())))
            .await;

        match outcome {
            Ok(n) => println!("call {:>2}: ok (dependency call #{})", call, n),
            Err(e) => match e.kind() {
                ErrorKind::CircuitOpen => println!("call {:>2}: rejected, circuit open", call),
                ErrorKind::Timeout => println!("call {:>2}: timed out", call),
                ErrorKind::Operation => println!("call {:>2}: failed: {}", call, e),
            },
        }
    }

    println!(
        "final state: {} (failures={}, tokens={})",
        breaker.get_state().await,
        breaker.get_failure_count().await,
        limiter.get_available_tokens()
    );

    if let Some(task) = refill_task {
        task.stop();
    }
    Ok(())
}
