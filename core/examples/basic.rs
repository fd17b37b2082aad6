//! Basic circuit breaker usage example
//!
//! Run with `RUST_LOG=debug` to see the transition events.

use circuit_guard::{CircuitBreaker, CircuitError};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Circuit Breaker Basic Example ===\n");

    let circuit = match CircuitBreaker::builder("payment_api")
        .failure_threshold(3)
        .timeout(Duration::from_millis(200))
        .success_threshold(2)
        .on_open(|name| println!("🔴 Circuit '{}' opened!", name))
        .on_close(|name| println!("🟢 Circuit '{}' closed!", name))
        .on_half_open(|name| println!("🟡 Circuit '{}' half-open, testing...", name))
        .build()
    {
        Ok(circuit) => circuit,
        Err(e) => {
            eprintln!("invalid configuration: {}", e);
            return;
        }
    };

    println!("Initial state: {}\n", circuit);

    println!("--- Successful calls ---");
    for i in 1..=2 {
        match circuit.call(move || Ok::<_, String>(format!("Payment {}", i))) {
            Ok(result) => println!("✓ {}", result),
            Err(e) => println!("✗ Error: {}", e),
        }
    }
    println!("{}\n", circuit);

    println!("--- Triggering failures ---");
    for i in 1..=3 {
        match circuit.call(move || Err::<String, _>(format!("Payment failed {}", i))) {
            Ok(_) => println!("✓ Success"),
            Err(e) => println!("✗ {}", e),
        }
    }
    println!("{}\n", circuit);

    println!("--- Attempting call while open ---");
    match circuit.call(|| Ok::<_, String>("Should be rejected")) {
        Ok(_) => println!("✓ Success"),
        Err(CircuitError::Open { retry_after, .. }) => {
            println!("✗ Rejected, falling back to cached data (retry in {:?})", retry_after)
        }
        Err(e) => println!("✗ {}", e),
    }
    println!();

    println!("--- Waiting out the timeout ---");
    std::thread::sleep(Duration::from_millis(250));
    for i in 1..=2 {
        match circuit.call(move || Ok::<_, String>(format!("Probe {}", i))) {
            Ok(result) => println!("✓ {} ({})", result, circuit.state()),
            Err(e) => println!("✗ {}", e),
        }
    }
    println!("{}\n", circuit);

    println!("--- Resetting circuit ---");
    let _ = circuit.call(|| Err::<(), _>("one more failure"));
    circuit.reset();
    println!("State after reset: {}", circuit);
}
