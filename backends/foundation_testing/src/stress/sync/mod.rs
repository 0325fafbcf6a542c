//! Stress scenarios for the `foundation_sync` primitives.

pub mod barrier;
pub mod gate;
pub mod queue;

pub use barrier::run_barrier_stress;
pub use gate::run_gate_stress;
pub use queue::run_queue_stress;
