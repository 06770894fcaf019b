//! The sequencer: the deadline-driven row scheduler, the
//! loop/branch bookkeeping it shares across global and per-track scope, and
//! the realtime interface boundary it drives.

pub(crate) mod interface;
pub(crate) mod loop_state;
pub(crate) mod scheduler;

pub(crate) use interface::RealtimeInterface;
pub(crate) use scheduler::Sequencer;
