use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

struct State<T> {
    items: Vec<T>,
    sealed: bool,
}

/// Append-only collection shared by every stream of one job.
///
/// Order across streams is whatever order the appends happened in. Once sealed,
/// further appends are rejected.
pub struct ResultAccumulator<T> {
    state: Arc<Mutex<State<T>>>,
}

impl<T> Clone for ResultAccumulator<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> Default for ResultAccumulator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ResultAccumulator<T> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                items: Vec::new(),
                sealed: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `false` if the accumulator is already sealed.
    pub fn append(&self, item: T) -> bool {
        let mut state = self.lock();
        if state.sealed {
            return false;
        }
        state.items.push(item);
        true
    }

    /// Append a batch atomically. Returns `false` if the accumulator is sealed.
    pub fn extend<I: IntoIterator<Item = T>>(&self, items: I) -> bool {
        let mut state = self.lock();
        if state.sealed {
            return false;
        }
        state.items.extend(items);
        true
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Seal and hand over everything appended so far. Later calls return nothing.
    pub fn seal_and_take(&self) -> Vec<T> {
        let mut state = self.lock();
        state.sealed = true;
        std::mem::take(&mut state.items)
    }
}
