pub mod process_state;
pub mod rip_session;
