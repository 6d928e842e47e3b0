pub mod disc_title;
pub mod main_feature;
pub mod makemkvcon;
pub mod makemkvcon_parser;
pub mod open_process;
pub mod process_manager;
pub mod title_filter;
