#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod app;
pub mod bitmap;
pub mod config;
pub mod cover_cache;
pub mod display;
pub mod document;
pub mod framebuffer;
pub mod fs;
pub mod input;
pub mod recent;
pub mod render_sync;
pub mod ui;

#[cfg(test)]
mod testing;
