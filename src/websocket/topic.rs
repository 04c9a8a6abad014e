use crate::models::VideoId;
use std::fmt;

pub const COMMENTS_TOPIC: &str = "comments";

/// Named broadcast channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// `video:{id}`, live view counter
    VideoViews(VideoId),
    /// `ratings:{id}`, live average rating
    VideoRatings(VideoId),
    /// `comments`, shared by everyone
    Comments,
}

impl Topic {
    pub fn kind(&self) -> &'static str {
        match self {
            Topic::VideoViews(_) => "views",
            Topic::VideoRatings(_) => "ratings",
            Topic::Comments => "comments",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::VideoViews(id) => write!(f, "video:{id}"),
            Topic::VideoRatings(id) => write!(f, "ratings:{id}"),
            Topic::Comments => f.write_str(COMMENTS_TOPIC),
        }
    }
}
