mod prediction;
mod reading;

pub use prediction::*;
pub use reading::*;
