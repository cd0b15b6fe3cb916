pub mod plan;
pub mod remote;
pub mod serve;
pub mod sync;
