//! Periodic harvesting.
//!
//! [`watch`] runs one cycle immediately and then one per configured check interval.
//! Cycles run one after another on the calling task, so they never overlap; a cycle
//! that outlasts the interval delays the next tick instead of queueing extra ones.

use std::future::Future;

use tokio::time::{self, MissedTickBehavior};

use super::*;

/// What a [`watch`] loop did before it was stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchReport {
  /// Cycles started
  pub cycles:   usize,
  /// Cycles that ended in an error
  pub failures: usize,
}

/// Harvests into `store_path` until `shutdown` completes.
///
/// Each cycle harvests up to [`today`]. A failed cycle is logged and the loop carries on
/// with the next tick; retrying sooner than the interval would break the endpoint's rate
/// limit.
pub async fn watch<F>(harvester: &Harvester, store_path: &Path, shutdown: F) -> WatchReport
where F: Future<Output = ()> {
  let period = harvester.config().check_interval();
  let mut ticks = time::interval(period);
  ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
  tokio::pin!(shutdown);

  info!("Harvesting set {} every {} minutes", harvester.config().set(), period.as_secs() / 60);

  let mut report = WatchReport::default();
  loop {
    tokio::select! {
      biased;
      _ = ticks.tick() => {
        report.cycles += 1;
        match harvest_into(harvester, store_path, Some(today()), None).await {
          Ok(summary) => info!("Cycle {} complete: {summary}", report.cycles),
          Err(e) if e.is_upstream() => {
            report.failures += 1;
            warn!("Cycle {} failed at the endpoint, retrying next interval: {e}", report.cycles);
          },
          Err(e) => {
            report.failures += 1;
            error!("Cycle {} failed: {e}", report.cycles);
          },
        }
      },
      () = &mut shutdown => {
        info!("Stopping after {} cycles", report.cycles);
        break;
      },
    }
  }
  report
}

#[cfg(test)]
mod tests {
  use harvester::config::HarvestConfig;
  use mockito::{Matcher, Server};
  use tempfile::tempdir;

  use super::*;

  #[tokio::test]
  async fn test_first_cycle_runs_immediately() {
    let mut server = Server::new_async().await;
    let mock = server
      .mock("GET", "/oai2")
      .match_query(Matcher::UrlEncoded("until".into(), today().to_string()))
      .with_status(200)
      .with_body("<OAI-PMH><ListRecords/></OAI-PMH>")
      .expect(1)
      .create_async()
      .await;

    let harvester =
      Harvester::new(HarvestConfig::new(format!("{}/oai2", server.url()), "cs", 120, 5).unwrap());
    let dir = tempdir().unwrap();

    let report = watch(&harvester, &dir.path().join("records.db"), std::future::ready(())).await;

    assert_eq!(report, WatchReport { cycles: 1, failures: 0 });
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn test_failed_cycle_does_not_stop_loop() {
    let harvester =
      Harvester::new(HarvestConfig::new("http://127.0.0.1:1/oai2", "cs", 120, 5).unwrap());
    let dir = tempdir().unwrap();

    let report = watch(&harvester, &dir.path().join("records.db"), std::future::ready(())).await;

    assert_eq!(report, WatchReport { cycles: 1, failures: 1 });
  }
}
