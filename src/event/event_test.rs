use std::time::Duration;

use super::*;
use crate::error::Result;

#[test]
fn test_event_connect_direct() {
    let producer = MediaEventProducer::<u32>::new();
    let seen = Arc::new(Mutex::new(vec![]));

    let seen2 = Arc::clone(&seen);
    let mut listener = producer.connect_direct(move |v| seen2.lock().push(v));
    assert_eq!(producer.listener_count(), 1);

    producer.notify(1);
    producer.notify(2);
    assert_eq!(*seen.lock(), vec![1, 2]);

    listener.disconnect();
    assert!(!listener.is_connected());
    assert_eq!(producer.listener_count(), 0);
    producer.notify(3);
    assert_eq!(*seen.lock(), vec![1, 2]);

    // disconnecting twice is harmless
    listener.disconnect();
}

#[test]
fn test_event_listener_drop_disconnects() {
    let producer = MediaEventProducer::<u32>::new();
    let count = Arc::new(AtomicU64::new(0));
    {
        let count2 = Arc::clone(&count);
        let _listener = producer.connect_direct(move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        producer.notify(0);
    }
    producer.notify(0);
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(producer.listener_count(), 0);
}

#[tokio::test]
async fn test_event_connect_on_queue() -> Result<()> {
    let queue = TaskQueue::new("listener");
    let producer = MediaEventProducer::<String>::new();
    let seen = Arc::new(Mutex::new(vec![]));

    let (seen2, queue2) = (Arc::clone(&seen), queue.clone());
    let _listener = producer.connect(&queue, move |v| {
        assert!(queue2.is_current());
        seen2.lock().push(v);
    });

    producer.notify("a".to_owned());
    producer.notify("b".to_owned());
    queue.flush().await?;

    assert_eq!(*seen.lock(), vec!["a".to_owned(), "b".to_owned()]);
    Ok(())
}

#[tokio::test]
async fn test_event_revoked_listener_skips_queued_delivery() -> Result<()> {
    let queue = TaskQueue::new("revoke");
    let producer = MediaEventProducer::<u32>::new();
    let count = Arc::new(AtomicU64::new(0));

    // hold the queue so the delivery stays pending
    let (gate_tx, gate_rx) = std::sync::mpsc::channel::<()>();
    queue.post(move || {
        let _ = gate_rx.recv_timeout(Duration::from_secs(5));
    })?;

    let count2 = Arc::clone(&count);
    let mut listener = producer.connect(&queue, move |_| {
        count2.fetch_add(1, Ordering::SeqCst);
    });
    producer.notify(7);
    listener.disconnect();
    let _ = gate_tx.send(());

    queue.flush().await?;
    assert_eq!(count.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn test_event_disconnect_all() {
    let producer = MediaEventProducer::<u32>::new();
    let a = producer.connect_direct(|_| {});
    let b = producer.connect_direct(|_| {});
    producer.disconnect_all();
    assert!(!a.is_connected());
    assert!(!b.is_connected());
    assert_eq!(producer.listener_count(), 0);
}
