pub mod attendance;
pub mod backup;
pub mod checkin;
pub mod core;
pub mod events;
pub mod roster;
pub mod scan;
pub mod session;
