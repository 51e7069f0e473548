pub mod backup;
pub mod classrooms;
pub mod content;
pub mod core;
pub mod progress;
pub mod setup;
pub mod stats;
pub mod submissions;
