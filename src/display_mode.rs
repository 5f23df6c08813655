//! Display-mode boost provider interface
//!
//! Refresh-rate and brightness negotiation happens elsewhere; the sequencer
//! only asks for the boost and waits for it to be ready.

pub type ModeCallback = Box<dyn FnOnce() + Send + 'static>;

pub trait DisplayModeProvider: Send + Sync {
    /// Request the boost; `on_ready` runs once it is in effect
    fn enable(&self, on_ready: ModeCallback);

    fn disable(&self, on_done: Option<ModeCallback>);
}
