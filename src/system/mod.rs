pub mod collector;
pub mod control;
pub mod delta;
pub mod history;
pub mod io;
pub mod platform;
pub mod process;
pub mod sampler;
pub mod snapshot;
