//! Single-flight token refresh.
//!
//! The first caller becomes the leader and runs the refresh; callers that
//! arrive while it is in flight park a oneshot receiver and get a clone of the
//! leader's result. The state mutex is never held across an await.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::oneshot;

use super::RefreshError;

type Waiter<T> = oneshot::Sender<Result<T, RefreshError>>;

struct FlightState<T> {
    in_flight: bool,
    waiters: Vec<Waiter<T>>,
}

pub struct RefreshCoordinator<T = String> {
    state: Mutex<FlightState<T>>,
    flights: AtomicUsize,
}

impl<T: Clone> Default for RefreshCoordinator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> RefreshCoordinator<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FlightState {
                in_flight: false,
                waiters: Vec::new(),
            }),
            flights: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FlightState<T>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_in_flight(&self) -> bool {
        self.lock().in_flight
    }

    /// Number of refresh operations actually started
    pub fn flights(&self) -> usize {
        self.flights.load(Ordering::SeqCst)
    }

    /// Run `op` unless a refresh is already in flight, in which case wait for its result
    pub async fn run<F, Fut>(&self, op: F) -> Result<T, RefreshError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, RefreshError>>,
    {
        let waiter = {
            let mut state = self.lock();
            if state.in_flight {
                let (tx, rx) = oneshot::channel();
                state.waiters.push(tx);
                Some(rx)
            } else {
                state.in_flight = true;
                None
            }
        };

        if let Some(rx) = waiter {
            return rx.await.unwrap_or(Err(RefreshError::Abandoned));
        }

        self.flights.fetch_add(1, Ordering::SeqCst);
        let mut flight = Flight {
            coordinator: self,
            settled: false,
        };
        let result = op().await;
        flight.settle(&result);
        result
    }

    fn settle(&self, result: &Result<T, RefreshError>) {
        let waiters = {
            let mut state = self.lock();
            state.in_flight = false;
            std::mem::take(&mut state.waiters)
        };
        for waiter in waiters {
            // A waiter that gave up has dropped its receiver
            let _ = waiter.send(result.clone());
        }
    }
}

/// Resolves the waiters even when the leader's future is dropped mid-refresh
struct Flight<'a, T: Clone> {
    coordinator: &'a RefreshCoordinator<T>,
    settled: bool,
}

impl<T: Clone> Flight<'_, T> {
    fn settle(&mut self, result: &Result<T, RefreshError>) {
        self.settled = true;
        self.coordinator.settle(result);
    }
}

impl<T: Clone> Drop for Flight<'_, T> {
    fn drop(&mut self) {
        if !self.settled {
            self.coordinator.settle(&Err(RefreshError::Abandoned));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn concurrent_callers_share_one_flight() {
        let coordinator = Arc::new(RefreshCoordinator::<String>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let coordinator = coordinator.clone();
                let calls = calls.clone();
                tokio::spawn(async move {
                    coordinator
                        .run(|| async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok("fresh".to_string())
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap(), Ok("fresh".to_string()));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.flights(), 1);
        assert!(!coordinator.is_in_flight());
    }

    #[tokio::test]
    async fn every_waiter_gets_the_same_error() {
        let coordinator = Arc::new(RefreshCoordinator::<String>::new());
        let rejected = RefreshError::Rejected {
            status: 401,
            message: "Token is blacklisted".into(),
        };

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let coordinator = coordinator.clone();
                let rejected = rejected.clone();
                tokio::spawn(async move {
                    coordinator
                        .run(|| async move {
                            tokio::time::sleep(Duration::from_millis(30)).await;
                            Err(rejected)
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap(), Err(rejected.clone()));
        }
        assert_eq!(coordinator.flights(), 1);
    }

    #[tokio::test]
    async fn dropped_leader_releases_waiters() {
        let coordinator = Arc::new(RefreshCoordinator::<String>::new());

        let leader = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .run(|| async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        Ok("never".to_string())
                    })
                    .await
            })
        };
        while !coordinator.is_in_flight() {
            tokio::task::yield_now().await;
        }

        let waiter = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.run(|| async { Ok("unused".to_string()) }).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        leader.abort();

        assert_eq!(waiter.await.unwrap(), Err(RefreshError::Abandoned));
        assert!(!coordinator.is_in_flight());

        // The next caller starts a new flight
        let again = coordinator.run(|| async { Ok("second".to_string()) }).await;
        assert_eq!(again, Ok("second".to_string()));
        assert_eq!(coordinator.flights(), 2);
    }
}
