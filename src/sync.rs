/// A mutex that recovers from poisoning instead of propagating the panic.
///
/// Only used for short, non-blocking critical sections (ledger bookkeeping,
/// the in-memory store); session state itself is owned by its actor.
#[derive(Debug, Default)]
pub struct Mutex<T>(std::sync::Mutex<T>);

impl<T> Mutex<T> {
    pub const fn new(value: T) -> Self {
        Self(std::sync::Mutex::new(value))
    }

    pub fn lock(&self) -> std::sync::MutexGuard<'_, T> {
        self.0
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
