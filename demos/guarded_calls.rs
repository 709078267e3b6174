//! One registry, every work shape: breaker-guarded promise, retried future, limited call.
use shapeguard::prelude::*;
use shapeguard::ResilienceConfig;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const CONFIG: &str = r#"{
    "circuit_breakers": { "catalog": { "failure_threshold": 2, "wait_in_open_ms": 10000 } },
    "rate_limiters": { "checkout": { "limit_for_period": 2, "limit_refresh_period_ms": 1000, "timeout_ms": 0 } },
    "retries": { "pricing": { "max_attempts": 4, "wait_ms": 50, "multiplier": 2.0, "max_wait_ms": 200 } }
}"#;

fn transient() -> ResilienceError<io::Error> {
    ResilienceError::Inner(io::Error::new(io::ErrorKind::Other, "transient"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    let registry = Arc::new(ResilienceConfig::from_json_str(CONFIG)?.build_registry()?);
    let interceptor = Interceptor::new(Arc::clone(&registry));

    // Deferred source behind the catalog breaker: two failures open it.
    let catalog = PolicyBinding::<&str, io::Error>::circuit_breaker("catalog")
        .recover(|err| if err.is_circuit_open() { Ok("cached catalog") } else { Err(err) });
    for round in 0..3 {
        let guarded = interceptor
            .invoke(&catalog, Work::deferred(Promise::from_fn(|| Err(transient()))))
            .into_deferred()
            .ok_or("deferred work keeps its shape")?;
        println!("catalog round {round}: {:?}", guarded.await.map_err(|e| e.to_string()));
    }

    // Future rebuilt per attempt by the pricing retry.
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let price = interceptor
        .invoke(
            &PolicyBinding::<u32, io::Error>::retry("pricing"),
            Work::future(move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move { if n < 2 { Err(transient()) } else { Ok(1999) } }
            }),
        )
        .into_boxed_future()
        .ok_or("future work keeps its shape")?
        .await?;
    println!("price {price} after {} attempts", attempts.load(Ordering::SeqCst));

    // Plain calls against the checkout limiter: the third in a window is rejected.
    let checkout = PolicyBinding::<&str, io::Error>::rate_limiter("checkout");
    for order in 0..3 {
        let out = interceptor.call(&checkout, || Ok("accepted"));
        println!("order {order}: {:?}", out.map_err(|e| e.to_string()));
    }

    Ok(())
}
