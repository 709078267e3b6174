mod common;

use common::{Answer, CountingBreaker, CountingLimiter};
use shapeguard::prelude::*;
use shapeguard::PolicyHandle;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::{service_fn, ServiceBuilder, ServiceExt};

#[tokio::test]
async fn breaker_layer_records_each_response() {
    let breaker = CountingBreaker::closed("users");
    let svc = ServiceBuilder::new()
        .layer(GuardLayer::circuit_breaker(breaker.clone()))
        .service(service_fn(|id: u32| async move {
            if id == 0 {
                Err(io::Error::new(io::ErrorKind::NotFound, "no such user"))
            } else {
                Ok(format!("user-{id}"))
            }
        }));

    assert_eq!(svc.clone().oneshot(7).await.unwrap(), "user-7");
    let err = svc.oneshot(0).await.unwrap_err();
    assert_eq!(err.as_inner().map(io::Error::kind), Some(io::ErrorKind::NotFound));
    assert_eq!((breaker.successes(), breaker.errors()), (1, 1));
}

#[tokio::test]
async fn exhausted_limiter_rejects_before_the_service_runs() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let limiter = CountingLimiter::new("ingest", Answer::Exhausted);
    let layer = GuardLayer::from_handle(&PolicyHandle::RateLimiter(limiter.clone())).unwrap();

    let svc = ServiceBuilder::new().layer(layer).service(service_fn(move |_: ()| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok::<_, io::Error>("stored") }
    }));

    let err = svc.oneshot(()).await.unwrap_err();
    assert!(err.is_not_permitted());
    assert_eq!(err.policy_name(), Some("ingest"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(limiter.requests(), 1);
}
