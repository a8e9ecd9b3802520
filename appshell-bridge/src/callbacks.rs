use std::collections::HashMap;

/// Identifies one page lifetime. A reload or navigation starts a new context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(pub u64);

impl ContextId {
    pub fn next(self) -> Self {
        ContextId(self.0 + 1)
    }
}

/// Pending callbacks for calls that wait on an answer from the other side.
///
/// Each entry resolves at most once: `take` removes it, and a second
/// answer for the same id finds nothing. Releasing a context purges every
/// entry registered under it so nothing is delivered into a torn-down page.
#[derive(Debug)]
pub struct CallbackRegistry<T> {
    next_id: i64,
    entries: HashMap<i64, (ContextId, T)>,
}

impl<T> Default for CallbackRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CallbackRegistry<T> {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            entries: HashMap::new(),
        }
    }

    /// Store `callback` and return its id (always positive).
    pub fn register(&mut self, context: ContextId, callback: T) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(id, (context, callback));
        id
    }

    /// Remove and return the callback for `id`, if it is still pending.
    pub fn take(&mut self, id: i64) -> Option<T> {
        self.entries.remove(&id).map(|(_, callback)| callback)
    }

    /// Purge all callbacks of `context`, returning them in registration order.
    pub fn release_context(&mut self, context: ContextId) -> Vec<T> {
        let mut ids: Vec<i64> = self
            .entries
            .iter()
            .filter(|(_, (ctx, _))| *ctx == context)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids.into_iter().filter_map(|id| self.take(id)).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
