use std::future::Future;

use tracing::warn;

use crate::error::ErrorKind;

/// Server node handed out by discovery, which owns its health state.
pub trait Endpoint: Send + Sync {
    fn address(&self) -> &str;

    /// Signals discovery that the endpoint looks unhealthy.
    fn pessimize(&self);
}

/// A value bound to the endpoint its calls are sent to.
pub trait Pessimizable {
    fn endpoint(&self) -> &dyn Endpoint;
}

/// Awaits `call` and pessimizes `endpoint` if it fails for any reason other
/// than `NotFound`. The outcome is returned unchanged.
pub async fn with_endpoint_feedback<T, Fut>(endpoint: &dyn Endpoint, call: Fut) -> crate::Result<T>
where
    Fut: Future<Output = crate::Result<T>>,
{
    let result = call.await;
    if let Err(error) = &result {
        let kind = error.kind();
        if kind != ErrorKind::NotFound {
            warn!(
                endpoint = endpoint.address(),
                kind = %kind,
                "pessimizing endpoint after failed call: {error}"
            );
            endpoint.pessimize();
        }
    }
    result
}

pub async fn pessimizable<P, T, Fut>(target: &P, call: Fut) -> crate::Result<T>
where
    P: Pessimizable + ?Sized,
    Fut: Future<Output = crate::Result<T>>,
{
    with_endpoint_feedback(target.endpoint(), call).await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::{Endpoint, Pessimizable, pessimizable, with_endpoint_feedback};
    use crate::error::{Error, StatusCode};

    #[derive(Default)]
    struct CountingEndpoint {
        pessimized: AtomicUsize,
    }

    impl Endpoint for CountingEndpoint {
        fn address(&self) -> &str {
            "node-1:2135"
        }

        fn pessimize(&self) {
            self.pessimized.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Session {
        endpoint: CountingEndpoint,
    }

    impl Pessimizable for Session {
        fn endpoint(&self) -> &dyn Endpoint {
            &self.endpoint
        }
    }

    #[tokio::test]
    async fn not_found_does_not_pessimize() {
        let endpoint = CountingEndpoint::default();
        let error = with_endpoint_feedback(&endpoint, async {
            Err::<(), _>(Error::from_status(StatusCode::NotFound, Vec::new()))
        })
        .await
        .expect_err("not found should propagate");

        assert_eq!(error.status(), StatusCode::NotFound);
        assert_eq!(endpoint.pessimized.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn other_failures_pessimize_once_and_propagate() {
        let session = Session {
            endpoint: CountingEndpoint::default(),
        };
        let error = pessimizable(&session, async {
            Err::<(), _>(Error::from_status(StatusCode::Unavailable, Vec::new()))
        })
        .await
        .expect_err("unavailable should propagate");

        assert_eq!(error.status(), StatusCode::Unavailable);
        assert_eq!(session.endpoint.pessimized.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn success_is_a_no_op() {
        let session = Session {
            endpoint: CountingEndpoint::default(),
        };
        let value = pessimizable(&session, async { Ok(7) })
            .await
            .expect("call should succeed");

        assert_eq!(value, 7);
        assert_eq!(session.endpoint.pessimized.load(Ordering::SeqCst), 0);
    }
}
