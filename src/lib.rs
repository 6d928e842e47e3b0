pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod services;
pub mod standard_error;
pub mod state;

pub use crate::config::Config;
pub use crate::error::{Error, Result};
pub use crate::models::disc_info::{Disc, DiscInfo};
pub use crate::models::mkv::RipEvent;
pub use crate::models::stream_info::StreamInfo;
pub use crate::models::title_info::TitleInfo;
pub use crate::services::disc_title::RuntimeLookup;
pub use crate::services::main_feature::{detect_main_feature, Selection};
pub use crate::services::makemkvcon::MakeMkv;
pub use crate::services::makemkvcon_parser::parse_disc_info;
pub use crate::services::process_manager::{ProcessManager, ProcessOutput};
pub use crate::services::title_filter::filter_titles;
pub use crate::standard_error::StandardError;
pub use crate::state::rip_session::{RipSession, SessionStatus};
