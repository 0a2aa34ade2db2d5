pub mod diff;
pub mod sampler;
pub mod series;
pub mod timing;
