//! Unit tests for the debounce module

#[cfg(test)]
mod tests {
    use crate::debounce::Debouncer;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn recording() -> (Arc<Mutex<Vec<f32>>>, impl FnMut(f32) + Send + 'static) {
        let commits = Arc::new(Mutex::new(Vec::new()));
        let sink = commits.clone();
        (commits, move |value| sink.lock().unwrap().push(value))
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_commits_only_final_value() {
        let (commits, commit) = recording();
        let debouncer = Debouncer::new(Duration::from_millis(100), commit);

        for value in [0.1, 0.2, 0.3, 0.4, 0.5] {
            debouncer.push(value);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(commits.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(*commits.lock().unwrap(), vec![0.5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_bursts_commit_separately() {
        let (commits, commit) = recording();
        let debouncer = Debouncer::new(Duration::from_millis(100), commit);

        debouncer.push(0.3);
        tokio::time::sleep(Duration::from_millis(200)).await;
        debouncer.push(0.6);
        debouncer.push(0.7);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(*commits.lock().unwrap(), vec![0.3, 0.7]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_value_flushed_on_drop() {
        let (commits, commit) = recording();
        let debouncer = Debouncer::new(Duration::from_secs(10), commit);

        debouncer.push(0.9);
        tokio::time::sleep(Duration::from_millis(1)).await;
        drop(debouncer);
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(*commits.lock().unwrap(), vec![0.9]);
    }
}
