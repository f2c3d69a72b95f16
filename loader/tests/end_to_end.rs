//! End-to-end scenarios against a real `LoaderState`, driven one
//! reader/responder step at a time instead of via the infinite `run`
//! loops, so each scenario can assert intermediate state (spec.md §8).

use std::io::Write;

use loader::{reader, responder, LoaderConfig, LoaderState};
use shmqueue::{Attached, WorkerQueueShm};

fn config(n_workers: u32, queue_depth: u32) -> LoaderConfig {
    LoaderConfig {
        queue_depth,
        max_file_size: 1 << 30,
        n_workers,
        dispatch_n: 32,
        max_idle_iters: 16,
        reorder: false,
        direct_io: false,
        ring_entries: 64,
        shm_namespace: Some(format!("t{}", std::process::id())),
        log_level: "error".to_string(),
    }
}

fn write_temp(contents: &[u8]) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(contents).unwrap();
    f.flush().unwrap();
    f
}

/// Drive one ready request for `worker_id` all the way through submission
/// and completion.
fn drive_one(state: &LoaderState, worker_id: u32) {
    assert!(reader::visit_one(state, worker_id));
    responder::wait_and_route(state);
}

#[test]
fn single_worker_four_files() {
    let state = LoaderState::new(config(1, 4)).unwrap();
    let files: Vec<_> = (0..4).map(|i| write_temp(format!("file-{i}").as_bytes())).collect();

    let attached = WorkerQueueShm::<Attached>::attach(state.queues[0].name()).unwrap();
    for f in &files {
        let idx = attached.free().pop(attached.entries()).unwrap();
        attached.entries()[idx as usize].set_path(f.path().to_str().unwrap().as_bytes());
        attached.ready().push(attached.entries(), idx);
    }

    for _ in 0..4 {
        drive_one(&state, 0);
    }

    let mut released = 0;
    while let Some(idx) = attached.completed().pop(attached.entries()) {
        let entry = &attached.entries()[idx as usize];
        assert!(entry.size.load(std::sync::atomic::Ordering::Relaxed) >= 4096);
        attached.free().push(attached.entries(), idx);
        released += 1;
    }
    assert_eq!(released, 4);
}

#[test]
fn missing_file_is_requeued_not_completed() {
    let state = LoaderState::new(config(1, 2)).unwrap();
    let attached = WorkerQueueShm::<Attached>::attach(state.queues[0].name()).unwrap();

    let idx = attached.free().pop(attached.entries()).unwrap();
    attached.entries()[idx as usize].set_path(b"/does/not/exist.xyz");
    attached.ready().push(attached.entries(), idx);

    assert!(reader::visit_one(&state, 0));

    assert!(attached.completed().pop(attached.entries()).is_none());
    assert_eq!(attached.ready().pop(attached.entries()), Some(idx));
}

#[test]
fn queue_saturation_then_release_unblocks() {
    let state = LoaderState::new(config(1, 2)).unwrap();
    let attached = WorkerQueueShm::<Attached>::attach(state.queues[0].name()).unwrap();

    let results: Vec<bool> = (0..3)
        .map(|_| match attached.free().pop(attached.entries()) {
            Some(idx) => {
                attached.entries()[idx as usize].set_path(b"/tmp/whatever");
                attached.ready().push(attached.entries(), idx);
                true
            }
            None => false,
        })
        .collect();
    assert_eq!(results, vec![true, true, false]);

    // Draining one ready request back to completed, then releasing it,
    // frees a slot for a subsequent request.
    drive_one(&state, 0);
    let idx = attached.completed().pop(attached.entries()).unwrap();
    attached.free().push(attached.entries(), idx);

    let idx2 = attached.free().pop(attached.entries());
    assert!(idx2.is_some());
}

#[test]
fn zero_byte_file_rounds_up_to_one_page() {
    let state = LoaderState::new(config(1, 1)).unwrap();
    let f = write_temp(b"");
    let attached = WorkerQueueShm::<Attached>::attach(state.queues[0].name()).unwrap();

    let idx = attached.free().pop(attached.entries()).unwrap();
    attached.entries()[idx as usize].set_path(f.path().to_str().unwrap().as_bytes());
    attached.ready().push(attached.entries(), idx);

    drive_one(&state, 0);

    let completed_idx = attached.completed().pop(attached.entries()).unwrap();
    assert_eq!(
        attached.entries()[completed_idx as usize]
            .size
            .load(std::sync::atomic::Ordering::Relaxed),
        4096
    );
}

#[test]
fn reorder_batch_submits_in_ascending_lba_order() {
    let mut cfg = config(1, 8);
    cfg.reorder = true;
    cfg.dispatch_n = 8;
    let state = LoaderState::new(cfg).unwrap();

    let files: Vec<_> = (0..8).map(|i| write_temp(format!("payload-{i}").as_bytes())).collect();
    let attached = WorkerQueueShm::<Attached>::attach(state.queues[0].name()).unwrap();

    for f in &files {
        let idx = attached.free().pop(attached.entries()).unwrap();
        attached.entries()[idx as usize].set_path(f.path().to_str().unwrap().as_bytes());
        attached.ready().push(attached.entries(), idx);
    }

    // Staging all 8 ready entries triggers the dispatch_n=8 batch on the
    // last visit; only one explicit dispatch should be needed.
    for _ in 0..8 {
        reader::visit_one(&state, 0);
    }
    for _ in 0..8 {
        responder::wait_and_route(&state);
    }

    let mut completed = 0;
    while attached.completed().pop(attached.entries()).is_some() {
        completed += 1;
    }
    assert_eq!(completed, 8);
}
