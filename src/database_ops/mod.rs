pub mod bing;
pub mod db;
pub mod local_media;
pub mod media_cache;
pub mod media_filter;
pub mod search;
pub mod top_games;
pub mod youtube;
