//! Concurrency stress tests
//!
//! Bulk RAN teardown racing individual RanUe removal, and concurrent UE
//! attach/detach churn.

mod common;

use common::{conn, test_context};
use ogs_amf_context::{AccessType, AmfConfig, AmfContext, AmfError, MaxConf};
use std::sync::{Arc, Barrier};
use std::thread;

const NUM_RAN_UE: usize = 10_000;
const NUM_WORKERS: usize = 1_000;

/// 10,000 individual removals race one RemoveAllRanUe
#[test]
fn test_remove_all_races_individual_removes() {
    common::init_logging();
    let ctx = Arc::new(AmfContext::new(AmfConfig {
        max: MaxConf {
            ran_ue_per_ran: NUM_RAN_UE,
            ..Default::default()
        },
        ..Default::default()
    }));
    let ran = ctx.new_amf_ran(conn(1)).unwrap();
    let ran_ues: Vec<_> = (0..NUM_RAN_UE)
        .map(|i| ctx.new_ran_ue(&ran, i as i64).unwrap())
        .collect();
    assert_eq!(ran.ran_ue_count(), NUM_RAN_UE);

    let barrier = Arc::new(Barrier::new(NUM_WORKERS + 1));
    let mut handles = Vec::with_capacity(NUM_WORKERS + 1);

    for worker in 0..NUM_WORKERS {
        let ctx = Arc::clone(&ctx);
        let barrier = Arc::clone(&barrier);
        // strided over the whole key space, every other worker walking backwards
        let mut chunk: Vec<_> = ran_ues
            .iter()
            .skip(worker)
            .step_by(NUM_WORKERS)
            .cloned()
            .collect();
        if worker % 2 == 1 {
            chunk.reverse();
        }
        handles.push(thread::spawn(move || {
            barrier.wait();
            for ran_ue in chunk {
                match ctx.ran_ue_remove(&ran_ue) {
                    Ok(()) | Err(AmfError::RanUeNotFound(_)) => {}
                    Err(e) => panic!("unexpected error: {}", e),
                }
            }
        }));
    }
    {
        let ctx = Arc::clone(&ctx);
        let ran = Arc::clone(&ran);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            ctx.amf_ran_remove_all_ran_ue(&ran, false);
        }));
    }

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(ran.ran_ue_count(), 0);
    assert_eq!(ctx.ran_ue_count(), 0);
}

/// Threads attach, detach and remove on their own UE while sharing one RAN
#[test]
fn test_concurrent_amf_ue_churn() {
    let ctx = Arc::new(test_context());
    let ran = ctx.new_amf_ran(conn(1)).unwrap();

    let handles: Vec<_> = (0..16)
        .map(|t| {
            let ctx = Arc::clone(&ctx);
            let ran = Arc::clone(&ran);
            thread::spawn(move || {
                for i in 0..200i64 {
                    let supi = format!("imsi-0010100000{:02}{:03}", t, i % 10);
                    let ue = ctx.new_amf_ue(&supi);
                    let ran_ue = ctx.new_ran_ue(&ran, t * 1000 + i).unwrap();
                    ctx.attach_ran_ue(&ue, &ran_ue).unwrap();
                    assert_ne!(ue.cm_idle(AccessType::ThreeGpp), ue.cm_connect(AccessType::ThreeGpp));

                    if i % 2 == 0 {
                        ctx.detach_ran_ue(&ue, AccessType::ThreeGpp);
                        assert!(ue.cm_idle(AccessType::ThreeGpp));
                    }
                    ctx.ran_ue_remove(&ran_ue).unwrap();
                    assert!(ue.cm_idle(AccessType::ThreeGpp));
                    if i % 3 == 0 {
                        ctx.amf_ue_remove(&ue);
                    }
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(ran.ran_ue_count(), 0);
    assert_eq!(ctx.ran_ue_count(), 0);
    assert!(ctx.amf_ue_count() <= 16 * 10);
}

/// A RAN-wide teardown racing attach keeps every UE consistent
#[test]
fn test_remove_all_races_attach() {
    let ctx = Arc::new(test_context());
    let ran = ctx.new_amf_ran(conn(1)).unwrap();
    let pairs: Vec<_> = (0..500i64)
        .map(|i| {
            let ue = ctx.new_amf_ue(&format!("imsi-00101000000{:04}", i));
            let ran_ue = ctx.new_ran_ue(&ran, i).unwrap();
            (ue, ran_ue)
        })
        .collect();

    let attacher = {
        let ctx = Arc::clone(&ctx);
        let pairs = pairs.clone();
        thread::spawn(move || {
            for (ue, ran_ue) in &pairs {
                let _ = ctx.attach_ran_ue(ue, ran_ue);
            }
        })
    };
    let remover = {
        let ctx = Arc::clone(&ctx);
        let ran = Arc::clone(&ran);
        thread::spawn(move || ctx.amf_ran_remove_all_ran_ue(&ran, false))
    };
    attacher.join().unwrap();
    remover.join().unwrap();

    // whatever was not reached by the teardown is removed now
    ctx.amf_ran_remove_all_ran_ue(&ran, false);
    for (ue, ran_ue) in &pairs {
        assert!(ran_ue.is_removed());
        assert!(ue.cm_idle(AccessType::ThreeGpp));
    }
    assert_eq!(ctx.ran_ue_count(), 0);
}

/// RanUe creation racing the teardown of its AmfRan leaves nothing behind
#[test]
fn test_new_ran_ue_races_amf_ran_remove() {
    let ctx = Arc::new(test_context());
    let ran = ctx.new_amf_ran(conn(1)).unwrap();
    let barrier = Arc::new(Barrier::new(9));

    let creators: Vec<_> = (0..8i64)
        .map(|t| {
            let ctx = Arc::clone(&ctx);
            let ran = Arc::clone(&ran);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..500i64 {
                    match ctx.new_ran_ue(&ran, t * 1000 + i) {
                        Ok(_) | Err(AmfError::AmfRanNotFound(_)) => {}
                        Err(e) => panic!("unexpected error: {}", e),
                    }
                }
            })
        })
        .collect();
    let remover = {
        let ctx = Arc::clone(&ctx);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            ctx.amf_ran_remove(conn(1)).unwrap();
        })
    };

    for h in creators {
        h.join().unwrap();
    }
    remover.join().unwrap();

    assert_eq!(ctx.amf_ran_count(), 0);
    assert_eq!(ctx.ran_ue_count(), 0);
    assert_eq!(ran.ran_ue_count(), 0);
}
