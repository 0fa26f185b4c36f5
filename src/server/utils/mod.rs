pub mod content_utils;
pub mod playlist_utils;
pub mod url_utils;
