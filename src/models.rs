pub mod disc_info;
pub mod mkv;
pub mod stream_info;
pub mod title_info;
