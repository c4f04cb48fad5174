//! Bridges [`HealthCheck`] into the gRPC health service.

use tokio::sync::watch;
use tonic_health::server::HealthReporter;
use tonic_health::ServingStatus;

use crate::health::{HealthCheck, HealthStatus};
use crate::lifecycle::shutdown::wait_for_shutdown;

fn serving_status(status: HealthStatus) -> ServingStatus {
    match status {
        HealthStatus::Ready => ServingStatus::Serving,
        HealthStatus::Unavailable | HealthStatus::Broken => ServingStatus::NotServing,
    }
}

/// Mirror `health` into `reporter` for the overall server (`""`) and each
/// named service until shutdown.
pub async fn forward(
    health: HealthCheck,
    reporter: HealthReporter,
    services: Vec<&'static str>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut status_rx = health.subscribe();

    loop {
        let status = serving_status(*status_rx.borrow_and_update());
        publish(&reporter, &services, status).await;

        tokio::select! {
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = wait_for_shutdown(&mut shutdown) => break,
        }
    }

    publish(&reporter, &services, ServingStatus::NotServing).await;
}

async fn publish(reporter: &HealthReporter, services: &[&'static str], status: ServingStatus) {
    reporter.set_service_status("", status).await;
    for service in services {
        reporter.set_service_status(*service, status).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_ready_is_serving() {
        assert_eq!(serving_status(HealthStatus::Ready), ServingStatus::Serving);
        assert_eq!(serving_status(HealthStatus::Unavailable), ServingStatus::NotServing);
        assert_eq!(serving_status(HealthStatus::Broken), ServingStatus::NotServing);
    }
}
