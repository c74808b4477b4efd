pub mod prediction;
pub mod telemetry;
