use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tablekv::cluster::LoopbackTransport;
use tablekv::{DmapError, DmapService, Member, PutEnv, SingleNodeRouter};
use tokio::time::sleep;

fn single_node_service() -> Arc<DmapService> {
    let member = Member::new("node-a");
    Arc::new(DmapService::new(
        Arc::new(SingleNodeRouter::new(member)),
        Arc::new(LoopbackTransport::new()),
    ))
}

#[tokio::test(start_paused = true)]
async fn contenders_hold_the_lock_one_at_a_time() {
    let service = single_node_service();
    let dm = service.get_or_create_dmap("locks");

    let inside = Arc::new(AtomicUsize::new(0));
    let acquired = Arc::new(AtomicUsize::new(0));

    let mut contenders = Vec::new();
    for _ in 0..10 {
        let dm = dm.clone();
        let inside = inside.clone();
        let acquired = acquired.clone();
        contenders.push(tokio::spawn(async move {
            let ctx = dm.lock("shared", Duration::from_secs(60)).await.unwrap();
            assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0, "two holders");
            acquired.fetch_add(1, Ordering::SeqCst);
            sleep(Duration::from_millis(7)).await;
            inside.fetch_sub(1, Ordering::SeqCst);
            ctx.unlock().await.unwrap();
        }));
    }

    for contender in contenders {
        contender.await.unwrap();
    }
    assert_eq!(acquired.load(Ordering::SeqCst), 10);
}

#[tokio::test(start_paused = true)]
async fn exactly_one_of_two_simultaneous_acquires_wins() {
    let service = single_node_service();
    let dm = service.get_or_create_dmap("locks");

    let a = {
        let dm = dm.clone();
        tokio::spawn(async move { dm.lock("contested", Duration::from_millis(500)).await })
    };
    let b = {
        let dm = dm.clone();
        tokio::spawn(async move { dm.lock("contested", Duration::from_millis(500)).await })
    };

    let (a, b) = tokio::join!(a, b);
    let (a, b) = (a.unwrap(), b.unwrap());

    let winners = [a.is_ok(), b.is_ok()].iter().filter(|&&won| won).count();
    assert_eq!(winners, 1, "exactly one acquire may succeed");
    let loser = if a.is_ok() { b } else { a };
    assert!(matches!(loser.unwrap_err(), DmapError::LockNotAcquired));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reads_run_concurrently_with_writes() {
    let service = single_node_service();
    let dm = service.get_or_create_dmap("traffic");

    let writer = {
        let dm = dm.clone();
        tokio::spawn(async move {
            for i in 0..50u32 {
                let key = format!("key-{}", i % 10);
                dm.put(PutEnv::new("traffic", &key, i.to_le_bytes().to_vec()))
                    .unwrap();
                if i % 10 == 0 {
                    sleep(Duration::from_millis(1)).await;
                }
            }
        })
    };

    let mut readers = Vec::new();
    for _ in 0..4 {
        let dm = dm.clone();
        readers.push(tokio::spawn(async move {
            for i in 0..50u32 {
                let key = format!("key-{}", i % 10);
                match dm.get(&key) {
                    Ok(found) => assert_eq!(found.key(), key),
                    Err(DmapError::KeyNotFound) => {}
                    Err(other) => panic!("unexpected read failure: {other}"),
                }
            }
        }));
    }

    writer.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }

    // Every key holds the last value the writer put.
    for i in 40..50u32 {
        let key = format!("key-{}", i % 10);
        assert_eq!(dm.get(&key).unwrap().value(), i.to_le_bytes().as_slice());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn lock_cycles_by_many_tasks_leave_the_key_free() {
    let service = single_node_service();
    let dm = service.get_or_create_dmap("cycles");

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let dm = dm.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..5 {
                let ctx = dm.lock("spin", Duration::from_secs(10)).await.unwrap();
                ctx.unlock().await.unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert!(matches!(
        dm.get("spin").unwrap_err(),
        DmapError::KeyNotFound
    ));
}
