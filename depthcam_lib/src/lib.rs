//! A library to drive firmware updates for depth cameras and build tools to do so.

#[macro_use]
extern crate log;

pub mod classify;
pub mod commandline;
pub mod config;
pub mod product;
pub mod sdk;
pub mod store;
pub mod updater;
pub mod usb;
pub mod version;
pub mod watcher;
