use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Trending,
    Your,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Category::Trending => "TRENDING",
            Category::Your => "YOUR",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Video {
    pub id: String,
    pub title: String,
    pub description: String,
    pub url: String,
    pub category: Category,
}

impl Video {
    pub fn new(
        id: &str,
        title: &str,
        description: &str,
        url: &str,
        category: Category,
    ) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            url: url.to_string(),
            category,
        }
    }
}

const VIDEO_BASE_URL: &str = "https://cdn.reel-tui.dev/videos";

static BUILTIN: Lazy<Vec<Video>> = Lazy::new(|| {
    vec![
        Video::new(
            "wowfinalfinal1",
            "Skyline at dusk",
            "A slow pan across the city as the lights come on.",
            &format!("{VIDEO_BASE_URL}/wowfinalfinal1.mp4"),
            Category::Trending,
        ),
        Video::new(
            "wowfinalfinal2",
            "Harbour timelapse",
            "Six hours of ferries, tides and gulls in forty seconds.",
            &format!("{VIDEO_BASE_URL}/wowfinalfinal2.mp4"),
            Category::Trending,
        ),
        Video::new(
            "wowfinalfinal3",
            "Morning ride",
            "Handlebar footage from the river path before the crowds.",
            &format!("{VIDEO_BASE_URL}/wowfinalfinal3.mp4"),
            Category::Your,
        ),
        Video::new(
            "wowfinalfinal4",
            "Kitchen experiments",
            "Attempt number four at the perfect flatbread.",
            &format!("{VIDEO_BASE_URL}/wowfinalfinal4.mp4"),
            Category::Your,
        ),
    ]
});

/// Immutable list of browsable videos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    videos: Vec<Video>,
}

impl Catalog {
    pub fn new(videos: Vec<Video>) -> Self {
        Self { videos }
    }

    pub fn builtin() -> Self {
        Self::new(BUILTIN.clone())
    }

    pub fn videos(&self) -> &[Video] {
        &self.videos
    }

    pub fn get(&self, id: &str) -> Option<&Video> {
        self.videos.iter().find(|video| video.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Videos in `category`, in catalog order.
    pub fn by_category(&self, category: Category) -> Vec<&Video> {
        self.videos
            .iter()
            .filter(|video| video.category == category)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.videos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.videos.is_empty()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}
