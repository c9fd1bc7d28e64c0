// Single-flight request - a new call aborts the one still outstanding
use crate::application::scalar_api::{ApiError, ApiResponse};
use futures::future::{AbortHandle, Abortable};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("superseded by a newer request")]
pub struct Superseded;

#[derive(Debug, Default)]
struct Slot {
    generation: u64,
    in_flight: Option<AbortHandle>,
}

/// At most one outstanding call of a kind. Only the most recently issued
/// call can ever deliver a result.
#[derive(Debug, Clone, Default)]
pub struct SingleFlight {
    name: &'static str,
    slot: Arc<Mutex<Slot>>,
}

impl SingleFlight {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slot: Arc::new(Mutex::new(Slot::default())),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `call`, aborting whatever call of this kind is still pending.
    /// Transport failures come back as a `result: false` envelope; being
    /// overtaken comes back as `Superseded`.
    pub async fn call<T, F>(&self, call: F) -> Result<ApiResponse<T>, Superseded>
    where
        F: Future<Output = Result<ApiResponse<T>, ApiError>>,
    {
        let (handle, registration) = AbortHandle::new_pair();
        let generation = {
            let mut slot = self.slot();
            if let Some(previous) = slot.in_flight.replace(handle) {
                previous.abort();
            }
            slot.generation += 1;
            slot.generation
        };

        let outcome = Abortable::new(call, registration).await;

        {
            let mut slot = self.slot();
            if slot.generation != generation {
                tracing::debug!("{} request {} superseded", self.name, generation);
                return Err(Superseded);
            }
            slot.in_flight = None;
        }

        match outcome {
            Ok(result) => Ok(ApiResponse::from_outcome(result)),
            Err(_aborted) => Err(Superseded),
        }
    }

    /// Aborts the outstanding call, if any.
    pub fn cancel(&self) {
        let mut slot = self.slot();
        slot.generation += 1;
        if let Some(previous) = slot.in_flight.take() {
            previous.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_newer_call_supersedes_older() {
        let flight = SingleFlight::new("chart");
        let (release_first, first_gate) = oneshot::channel::<()>();

        let first = {
            let flight = flight.clone();
            tokio::spawn(async move {
                flight
                    .call(async move {
                        let _ = first_gate.await;
                        Ok::<_, ApiError>(ApiResponse::success(1))
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let second = flight.call(async { Ok::<_, ApiError>(ApiResponse::success(2)) }).await;
        let _ = release_first.send(());

        assert_eq!(first.await.unwrap(), Err(Superseded));
        assert_eq!(second.unwrap().body, Some(2));
    }

    #[tokio::test]
    async fn test_failure_maps_to_envelope() {
        let flight = SingleFlight::new("chart");
        let response = flight
            .call(async {
                Err::<ApiResponse<()>, _>(ApiError::NoBaseUrl {
                    endpoint: "/ScalarVisually/GetScalarData".into(),
                })
            })
            .await
            .unwrap();
        assert!(!response.result);
        assert_eq!(response.message(), "request failed: /ScalarVisually/GetScalarData");
    }

    #[tokio::test]
    async fn test_cancel_aborts_pending_call() {
        let flight = SingleFlight::new("chart");
        let pending = {
            let flight = flight.clone();
            tokio::spawn(async move {
                flight
                    .call(std::future::pending::<Result<ApiResponse<()>, ApiError>>())
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        flight.cancel();

        assert_eq!(pending.await.unwrap(), Err(Superseded));
    }
}
