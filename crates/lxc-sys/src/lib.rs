//! Raw FFI bindings to the subset of `liblxc`'s public API
//! (`lxc/lxccontainer.h`) this daemon's runtime adapter needs.
//!
//! `struct lxc_container` is a large C vtable-style struct; we only declare
//! the prefix of fields up through the last method we call
//! (`set_cgroup_item`), in the same order the real header declares them, so
//! the offsets of every field we *do* read line up. Anything after that
//! point in the real struct is never touched through this binding.

#![allow(non_camel_case_types)]

use libc::{c_char, c_int, pid_t};

#[repr(C)]
pub struct lxc_container {
    pub name: *mut c_char,
    pub configfile: *mut c_char,
    pub config_path: *mut c_char,
    pub daemonize: bool,
    pub pidfile: *mut c_char,
    pub lxc_conf: *mut std::ffi::c_void,
    pub numthreads: c_int,

    pub is_defined: Option<unsafe extern "C" fn(c: *mut lxc_container) -> bool>,
    pub state: Option<unsafe extern "C" fn(c: *mut lxc_container) -> *const c_char>,
    pub is_running: Option<unsafe extern "C" fn(c: *mut lxc_container) -> bool>,
    pub freeze: Option<unsafe extern "C" fn(c: *mut lxc_container) -> bool>,
    pub unfreeze: Option<unsafe extern "C" fn(c: *mut lxc_container) -> bool>,
    pub init_pid: Option<unsafe extern "C" fn(c: *mut lxc_container) -> pid_t>,
    pub load_config:
        Option<unsafe extern "C" fn(c: *mut lxc_container, alt_file: *const c_char) -> bool>,
    pub start: Option<
        unsafe extern "C" fn(
            c: *mut lxc_container,
            useinit: c_int,
            argv: *const *const c_char,
        ) -> bool,
    >,
    pub stop: Option<unsafe extern "C" fn(c: *mut lxc_container) -> bool>,
    pub want_daemonize:
        Option<unsafe extern "C" fn(c: *mut lxc_container, state: bool) -> bool>,
    pub want_close_all_fds:
        Option<unsafe extern "C" fn(c: *mut lxc_container, state: bool) -> bool>,
    pub shutdown: Option<unsafe extern "C" fn(c: *mut lxc_container, timeout: c_int) -> bool>,
    pub destroy: Option<unsafe extern "C" fn(c: *mut lxc_container) -> bool>,
    pub create: Option<
        unsafe extern "C" fn(
            c: *mut lxc_container,
            t: *const c_char,
            bdevtype: *const c_char,
            specs: *mut std::ffi::c_void,
            flags: c_int,
            argv: *const *const c_char,
        ) -> bool,
    >,
    pub set_cgroup_item: Option<
        unsafe extern "C" fn(
            c: *mut lxc_container,
            subsys: *const c_char,
            value: *const c_char,
        ) -> bool,
    >,
}

#[link(name = "lxc")]
extern "C" {
    pub fn lxc_container_new(name: *const c_char, configpath: *const c_char) -> *mut lxc_container;
    pub fn lxc_container_get(c: *mut lxc_container) -> c_int;
    pub fn lxc_container_put(c: *mut lxc_container) -> c_int;
}
