// src/par.rs
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

/// Parallel map over a slice, keeping output order deterministic.
/// Spawns `threads` scoped workers pulling indices from a shared counter;
/// with `threads <= 1` it runs serially on the caller's thread.
///
/// Fallible work should return `Result` as `T` so one failed item does not
/// stop the others.
pub fn parallel_map_indexed<I, T, F>(items: &[I], threads: usize, f: F) -> Vec<T>
where
    I: Sync,
    T: Send,
    F: Fn(&I, usize) -> T + Sync,
{
    let n = items.len();
    if n == 0 || threads <= 1 {
        return items.iter().enumerate().map(|(i, item)| f(item, i)).collect();
    }

    let next = AtomicUsize::new(0);
    let workers = threads.min(n);

    // Each worker keeps its own (index, result) buffer; no shared output lock.
    let parts: Vec<Vec<(usize, T)>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                scope.spawn(|| {
                    let mut local = Vec::new();
                    loop {
                        let i = next.fetch_add(1, Ordering::Relaxed);
                        if i >= n {
                            break;
                        }
                        local.push((i, f(&items[i], i)));
                    }
                    local
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|payload| std::panic::resume_unwind(payload)))
            .collect()
    });

    let mut slots: Vec<Option<T>> = Vec::with_capacity(n);
    slots.resize_with(n, || None);
    for (i, res) in parts.into_iter().flatten() {
        slots[i] = Some(res);
    }
    slots.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_order_matches_input_for_any_thread_count() {
        let items: Vec<u64> = (0..257).collect();
        let serial = parallel_map_indexed(&items, 1, |x, i| x * 2 + i as u64);
        for threads in [2, 4, 16, 1000] {
            assert_eq!(parallel_map_indexed(&items, threads, |x, i| x * 2 + i as u64), serial);
        }
    }

    #[test]
    fn failures_stay_per_item() {
        let items = vec![1i32, -1, 2];
        let out: Vec<Result<i32, String>> =
            parallel_map_indexed(&items, 3, |x, _| if *x < 0 { Err("neg".into()) } else { Ok(*x) });
        assert_eq!(out, vec![Ok(1), Err("neg".to_string()), Ok(2)]);
    }

    #[test]
    fn empty_input() {
        let items: Vec<u8> = Vec::new();
        assert!(parallel_map_indexed(&items, 4, |x, _| *x).is_empty());
    }
}
