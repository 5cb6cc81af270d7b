//! Task queue and its single consumer loop

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use super::messages::{DispatchOutcome, TopologyCommand};
use crate::domain::{NodeId, Payload, TaskItem};

/// Returned when the consumer side of the queue is gone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueClosed;

#[derive(Debug, Clone)]
enum QueueSender {
    Bounded(mpsc::Sender<TaskItem>),
    Unbounded(mpsc::UnboundedSender<TaskItem>),
}

#[derive(Debug)]
enum QueueReceiver {
    Bounded(mpsc::Receiver<TaskItem>),
    Unbounded(mpsc::UnboundedReceiver<TaskItem>),
}

/// Producer side of the FIFO task queue; cheap to clone
#[derive(Debug, Clone)]
pub struct TaskQueue {
    tx: QueueSender,
    /// Next sequence number; held across the send so numbers follow queue order
    sequence: Arc<Mutex<u64>>,
    depth: Arc<AtomicUsize>,
}

/// Consumer side of the task queue
#[derive(Debug)]
pub struct TaskReceiver {
    rx: QueueReceiver,
    depth: Arc<AtomicUsize>,
}

impl TaskQueue {
    /// Create a queue; `None` capacity means unbounded
    pub fn new(capacity: Option<usize>) -> (Self, TaskReceiver) {
        debug!(?capacity, "TaskQueue::new: called");
        let depth = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = match capacity {
            Some(capacity) => {
                let (tx, rx) = mpsc::channel(capacity.max(1));
                (QueueSender::Bounded(tx), QueueReceiver::Bounded(rx))
            }
            None => {
                let (tx, rx) = mpsc::unbounded_channel();
                (QueueSender::Unbounded(tx), QueueReceiver::Unbounded(rx))
            }
        };
        (
            Self {
                tx,
                sequence: Arc::new(Mutex::new(1)),
                depth: depth.clone(),
            },
            TaskReceiver { rx, depth },
        )
    }

    /// Append a task; waits for room when the queue is bounded and full
    ///
    /// Sequence numbers are contiguous and match the order items enter the
    /// queue, also across concurrent producers.
    pub async fn submit(&self, target: NodeId, payload: Payload) -> Result<u64, QueueClosed> {
        let mut next = self.sequence.lock().await;
        let sequence = *next;
        debug!(sequence, %target, "TaskQueue::submit: called");
        let item = TaskItem::new(sequence, target, payload);

        self.depth.fetch_add(1, Ordering::Relaxed);
        let sent = match &self.tx {
            QueueSender::Bounded(tx) => tx.send(item).await.is_ok(),
            QueueSender::Unbounded(tx) => tx.send(item).is_ok(),
        };
        if !sent {
            self.depth.fetch_sub(1, Ordering::Relaxed);
            return Err(QueueClosed);
        }
        *next += 1;
        Ok(sequence)
    }

    /// Items submitted but not yet taken by the consumer
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }
}

impl TaskReceiver {
    pub async fn recv(&mut self) -> Option<TaskItem> {
        let item = match &mut self.rx {
            QueueReceiver::Bounded(rx) => rx.recv().await,
            QueueReceiver::Unbounded(rx) => rx.recv().await,
        };
        if item.is_some() {
            self.depth.fetch_sub(1, Ordering::Relaxed);
        }
        item
    }
}

/// Take items one at a time, in order, and hand each to the topology actor
///
/// A failing item is logged by the actor and the loop moves on. The loop ends
/// when the queue closes, the actor goes away, or shutdown is signalled.
pub(crate) async fn run_consumer(
    mut tasks: TaskReceiver,
    topology_tx: mpsc::Sender<TopologyCommand>,
    pacing: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(pacing_ms = pacing.as_millis() as u64, "Task consumer started");

    loop {
        let item = tokio::select! {
            biased;
            _ = shutdown.changed() => {
                debug!("run_consumer: shutdown signalled");
                break;
            }
            item = tasks.recv() => match item {
                Some(item) => item,
                None => {
                    info!("Task queue closed");
                    break;
                }
            },
        };

        let sequence = item.sequence;
        let (reply_tx, reply_rx) = oneshot::channel();
        if topology_tx
            .send(TopologyCommand::Dispatch { item, reply: reply_tx })
            .await
            .is_err()
        {
            warn!(sequence, "Topology actor gone, stopping consumer");
            break;
        }

        match reply_rx.await {
            Ok(DispatchOutcome::Processed) => debug!(sequence, "run_consumer: processed"),
            Ok(outcome) => debug!(sequence, ?outcome, "run_consumer: not processed"),
            Err(_) => {
                warn!(sequence, "Topology actor dropped dispatch reply, stopping consumer");
                break;
            }
        }

        if pacing.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(pacing).await;
        }
    }

    info!("Task consumer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_unbounded_fifo_and_depth() {
        let (queue, mut rx) = TaskQueue::new(None);
        for n in 0..5u32 {
            let mut payload = Payload::new();
            payload.insert("n".to_string(), json!(n));
            queue.submit(NodeId::Index(1), payload).await.unwrap();
        }
        assert_eq!(queue.depth(), 5);

        for n in 0..5u32 {
            let item = rx.recv().await.unwrap();
            assert_eq!(item.payload["n"], json!(n));
            assert_eq!(item.sequence, n as u64 + 1);
        }
        assert_eq!(queue.depth(), 0);
    }

    #[tokio::test]
    async fn test_bounded_zero_capacity_is_clamped() {
        let (queue, mut rx) = TaskQueue::new(Some(0));
        queue.submit(NodeId::Index(2), Payload::new()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().target, NodeId::Index(2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_producers_get_sequence_in_queue_order() {
        let (queue, mut rx) = TaskQueue::new(Some(1));
        let producers: Vec<_> = (0..4)
            .map(|_| {
                let queue = queue.clone();
                tokio::spawn(async move {
                    for _ in 0..25 {
                        queue.submit(NodeId::Index(4), Payload::new()).await.unwrap();
                    }
                })
            })
            .collect();

        let mut sequences = Vec::new();
        for _ in 0..100 {
            sequences.push(rx.recv().await.unwrap().sequence);
        }
        for producer in producers {
            producer.await.unwrap();
        }
        assert_eq!(sequences, (1..=100).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_submit_after_receiver_dropped() {
        let (queue, rx) = TaskQueue::new(Some(4));
        drop(rx);
        assert_eq!(queue.submit(NodeId::Index(1), Payload::new()).await, Err(QueueClosed));
        assert_eq!(queue.depth(), 0);
    }

    #[tokio::test]
    async fn test_consumer_forwards_in_order() {
        let (queue, rx) = TaskQueue::new(None);
        let (topology_tx, mut topology_rx) = mpsc::channel(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let consumer = tokio::spawn(run_consumer(rx, topology_tx, Duration::ZERO, shutdown_rx));

        for target in [3u32, 1, 2] {
            queue.submit(NodeId::Index(target), Payload::new()).await.unwrap();
        }

        let mut seen = Vec::new();
        while seen.len() < 3 {
            match topology_rx.recv().await {
                Some(TopologyCommand::Dispatch { item, reply }) => {
                    seen.push(item.target);
                    let _ = reply.send(DispatchOutcome::Processed);
                }
                other => panic!("unexpected command: {:?}", other),
            }
        }
        assert_eq!(seen, vec![NodeId::Index(3), NodeId::Index(1), NodeId::Index(2)]);

        drop(queue);
        consumer.await.unwrap();
    }

    #[tokio::test]
    async fn test_consumer_stops_on_shutdown() {
        let (_queue, rx) = TaskQueue::new(None);
        let (topology_tx, _topology_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let consumer = tokio::spawn(run_consumer(rx, topology_tx, Duration::from_millis(10), shutdown_rx));

        shutdown_tx.send_replace(true);
        tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .expect("consumer did not stop")
            .unwrap();
    }
}
