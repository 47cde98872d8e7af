pub mod classifier;
pub mod driver;
mod driver_proptest;
pub mod error;
mod feed;
pub mod inspection;
pub mod measurement;
pub mod ramp;
pub mod register;
#[cfg(feature = "simulation")]
pub mod register_sim;
pub mod signaling;
pub mod sink;
pub mod tags;
pub mod timebase;

pub use classifier::{classify, QualityClassifier, QualityVerdict};
pub use driver::{ActuatorDriver, MotorState, WiringMode};
pub use error::{DriverError, InspectionError, ParseError, RegisterError, RegisterOp};
pub use inspection::{
    ConveyorStatus, InspectionConfig, InspectionLoop, InspectionStats, LoopState, RampPolicy,
};
pub use measurement::MeasurementRecord;
pub use ramp::{run_ramp, RampConfig, RampOutcome, RampReport, RampStep};
pub use register::RegisterIo;
#[cfg(feature = "simulation")]
pub use register_sim::{RegisterWrite, SimulatedRegisters};
pub use signaling::{LightColor, RecordingSignals, SignalingPort};
pub use sink::{InspectionSink, RecordingSink, TracingSink};
pub use timebase::TimeBase;
