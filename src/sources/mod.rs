pub mod author_feed;
pub mod feed;
