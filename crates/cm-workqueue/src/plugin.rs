//! Worker plugin ABI (mirrors `worker-plugin-interface.h`'s
//! `new`/`delete`/`set_args`/`exec`/`cancel` surface) and its compile-time
//! registry.
//!
//! The original loads plugins with `dlopen`; §9's redesign note #5 replaces
//! that with `inventory::submit!` compile-time registration — the set of
//! plugins is closed and known at build time, so there's no reason to pay
//! for runtime dynamic loading.

use cm_shared::CmResult;
use std::sync::atomic::AtomicBool;

/// One worker plugin instance. `exec` runs on a dedicated worker thread (not
/// the reactor) and must poll `cancel` at least every 100ms so a cancelled
/// slot doesn't block shutdown indefinitely.
pub trait WorkerPlugin: Send {
    fn name(&self) -> &'static str;
    fn set_args(&mut self, arg_str: &str) -> CmResult<()>;
    fn exec(&mut self, cancel: &AtomicBool) -> CmResult<()>;
}

pub struct PluginFactory {
    pub name: &'static str,
    pub create: fn() -> Box<dyn WorkerPlugin>,
}

inventory::collect!(PluginFactory);

pub fn lookup(name: &str) -> Option<Box<dyn WorkerPlugin>> {
    inventory::iter::<PluginFactory>()
        .find(|f| f.name == name)
        .map(|f| (f.create)())
}

pub fn registered_names() -> Vec<&'static str> {
    inventory::iter::<PluginFactory>().map(|f| f.name).collect()
}
