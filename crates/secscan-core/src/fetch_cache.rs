use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::debug;

use crate::error::PluginError;

type Fetcher<T> = Box<dyn Fn() -> Result<T, PluginError> + Send + Sync>;

/// Lazily fetched value shared by every artifact of one run.
///
/// The fetcher runs at most once successfully. Concurrent callers block on the
/// first initializer instead of racing it. A failed fetch is not memoized, so a
/// later caller tries again.
pub struct FetchCache<T> {
    cell: OnceCell<Arc<T>>,
    fetcher: Fetcher<T>,
    fetches: AtomicUsize,
}

impl<T> FetchCache<T> {
    pub fn new<F>(fetcher: F) -> Self
    where
        F: Fn() -> Result<T, PluginError> + Send + Sync + 'static,
    {
        Self {
            cell: OnceCell::new(),
            fetcher: Box::new(fetcher),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn get(&self) -> Result<Arc<T>, PluginError> {
        self.cell
            .get_or_try_init(|| {
                let attempt = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
                debug!(attempt, "populating shared fetch cache");
                (self.fetcher)().map(Arc::new)
            })
            .cloned()
    }

    pub fn is_populated(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Number of times the underlying fetcher has been invoked.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl<T> std::fmt::Debug for FetchCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchCache")
            .field("populated", &self.is_populated())
            .field("fetches", &self.fetch_count())
            .finish()
    }
}
