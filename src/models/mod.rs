mod sample;
mod speedtest;

pub use sample::*;
pub use speedtest::*;
