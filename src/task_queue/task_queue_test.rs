use std::sync::Arc;

use parking_lot::Mutex;

use super::*;

#[tokio::test]
async fn test_task_queue_runs_in_order() -> Result<()> {
    let queue = TaskQueue::new("order");
    let seen = Arc::new(Mutex::new(vec![]));

    for i in 0..50 {
        let seen2 = Arc::clone(&seen);
        queue.post(move || seen2.lock().push(i))?;
    }
    queue.flush().await?;

    assert_eq!(*seen.lock(), (0..50).collect::<Vec<_>>());
    Ok(())
}

#[tokio::test]
async fn test_task_queue_is_current() -> Result<()> {
    let a = TaskQueue::new("a");
    let b = TaskQueue::new("b");
    assert!(!a.is_current());

    let (a2, b2) = (a.clone(), b.clone());
    let (on_a, on_b) = a.invoke(move || (a2.is_current(), b2.is_current())).await?;
    assert!(on_a);
    assert!(!on_b);

    Ok(())
}

#[tokio::test]
async fn test_task_queue_invoke_returns_value() -> Result<()> {
    let queue = TaskQueue::new("invoke");
    let v = queue.invoke(|| 40 + 2).await?;
    assert_eq!(v, 42);
    Ok(())
}

#[tokio::test]
async fn test_task_queue_close_rejects_posts() -> Result<()> {
    let queue = TaskQueue::new("close");
    let ran = Arc::new(Mutex::new(false));
    let ran2 = Arc::clone(&ran);
    queue.post(move || *ran2.lock() = true)?;

    queue.close();
    assert!(queue.is_closed());
    assert_eq!(queue.post(|| {}), Err(Error::ErrTaskQueueClosed));
    assert_eq!(queue.flush().await, Err(Error::ErrTaskQueueClosed));

    // work queued before close still ran
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(*ran.lock());

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_task_queue_flush_timeout() -> Result<()> {
    let queue = TaskQueue::new("slow");
    queue.post(|| std::thread::sleep(Duration::from_millis(200)))?;

    let result = queue.flush_timeout(Duration::from_millis(10)).await;
    assert_eq!(result, Err(Error::ErrFlushTimeout));

    queue.flush_timeout(Duration::from_secs(5)).await?;
    Ok(())
}
