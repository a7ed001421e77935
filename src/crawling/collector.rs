//! # Result Collector
//!
//! Single consumer of the result queue. Appends every record to the shared
//! collection and signals once the queue is closed and drained.

use std::sync::Arc;

use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::crawling::queues::BoundedQueue;
use crate::domain::Recipe;

pub type RecipeCollection = Arc<Mutex<Vec<Recipe>>>;

pub struct ResultCollector {
    queue: Arc<BoundedQueue<Recipe>>,
    records: RecipeCollection,
}

impl ResultCollector {
    pub fn new(queue: Arc<BoundedQueue<Recipe>>, records: RecipeCollection) -> Self {
        Self { queue, records }
    }

    /// Start draining; the receiver yields the number of records collected
    pub fn spawn(self) -> (JoinHandle<()>, oneshot::Receiver<usize>) {
        let (done_tx, done_rx) = oneshot::channel();
        let handle = tokio::spawn(self.run(done_tx));
        (handle, done_rx)
    }

    async fn run(self, done: oneshot::Sender<usize>) {
        let mut collected = 0usize;
        while let Some(recipe) = self.queue.dequeue().await {
            debug!("📥 Collected '{}'", recipe.name);
            self.records.lock().await.push(recipe);
            collected += 1;
        }

        info!("✅ Result collector drained {} records", collected);
        if done.send(collected).is_err() {
            debug!("Drain signal receiver already dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DiscoveredItem;

    fn recipe(n: u32) -> Recipe {
        Recipe::from_item(&DiscoveredItem::new(format!("https://s/{n}"), format!("R{n}"), ""))
    }

    #[tokio::test]
    async fn test_signals_only_after_queue_closed_and_drained() {
        let queue = Arc::new(BoundedQueue::new("results", 10));
        let records: RecipeCollection = Arc::default();
        let (handle, mut done) = ResultCollector::new(Arc::clone(&queue), Arc::clone(&records)).spawn();

        queue.enqueue(recipe(1)).await.unwrap();
        queue.enqueue(recipe(2)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(done.try_recv().is_err());

        queue.close();
        assert_eq!(done.await.unwrap(), 2);
        handle.await.unwrap();

        let records = records.lock().await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "R1");
    }
}
