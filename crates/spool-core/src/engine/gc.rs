//! RT-safe deferred deallocation for clip buffers
//!
//! Replacing the tape on the audio thread drops the previous clip, and a
//! multi-minute stereo clip plus its reversed copy is tens of megabytes.
//! Freeing that inside the callback risks an xrun, so clips are held in
//! `basedrop::Shared` pointers: dropping one on the audio thread only
//! enqueues it, and a background GC thread does the actual free.

use basedrop::{Collector, Handle};
use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

/// Initialize the global collector and return a handle
fn init_gc() -> Handle {
    let (tx, rx) = mpsc::channel();

    thread::Builder::new()
        .name("spool-gc".to_string())
        .spawn(move || {
            // Collector is !Sync, so it lives on this thread
            let mut collector = Collector::new();
            let handle = collector.handle();
            tx.send(handle).expect("Failed to send GC handle");

            log::info!("Clip GC thread started");

            loop {
                collector.collect();
                thread::sleep(Duration::from_millis(100));
            }
        })
        .expect("Failed to spawn clip GC thread");

    rx.recv().expect("Failed to receive GC handle")
}

/// Get a handle for creating `Shared<T>` allocations
///
/// The first call spawns the GC thread; the handle is cheap to clone.
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(init_gc).clone()
}
