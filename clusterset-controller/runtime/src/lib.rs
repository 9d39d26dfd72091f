#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use clusterset_controller_core as core;
pub use clusterset_controller_k8s_api as k8s;
pub use clusterset_controller_k8s_index as index;
pub use clusterset_controller_sync as sync;

mod args;
mod index_list;
mod lease;

pub use self::args::Args;
