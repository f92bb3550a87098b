//! Joining background tasks on shutdown.

use tokio::task::JoinHandle;

/// Wait for every task, logging the ones that panicked or were aborted.
/// Returns how many failed.
pub async fn join_tasks(tasks: Vec<JoinHandle<()>>, role: &str) -> usize {
    let mut failed = 0;
    for task in tasks {
        if let Err(e) = task.await {
            tracing::warn!(role, error = %e, panicked = e.is_panic(), "background task failed");
            failed += 1;
        }
    }
    failed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failed_tasks_are_counted() {
        let ok = tokio::spawn(async {});
        let panicked = tokio::spawn(async { panic!("worker bug") });
        let aborted = tokio::spawn(std::future::pending::<()>());
        aborted.abort();

        assert_eq!(join_tasks(vec![ok, panicked, aborted], "test").await, 2);
    }

    #[tokio::test]
    async fn clean_tasks_report_nothing() {
        let tasks = (0..3).map(|_| tokio::spawn(async {})).collect();
        assert_eq!(join_tasks(tasks, "test").await, 0);
    }
}
