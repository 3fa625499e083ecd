pub mod characterise;
pub mod polling;
pub mod rollup;

pub use characterise::characterise_window;
pub use polling::evaluate_polls;
pub use rollup::IntervalRollup;
