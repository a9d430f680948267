// Control: the PID law, loop-owned state, cycle pacing, and the scheduler that
// sequences one sense → model → control → actuate cycle per period.

pub mod controller;
pub mod pacing;
pub mod scheduler;
pub mod state;
