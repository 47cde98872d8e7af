pub mod light_tower;
pub mod line_sink;

pub use light_tower::LoggedSignals;
pub use line_sink::LineSink;
