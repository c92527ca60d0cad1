mod counters;
mod probe;
mod sampler;
mod window;

pub use counters::{CounterSource, SysinfoCounters};
pub use probe::PingProbe;
pub use sampler::SamplingLoop;
pub use window::RollingWindow;
