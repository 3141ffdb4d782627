// src/feed.rs

//! Read-side helpers over a snapshot of the feed: tabs, search, filter chips
//! and share links. Nothing here touches the gateway.

use url::Url;
use uuid::Uuid;

use crate::{error::AppError, models::post::Post};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FeedTab {
    /// Everything the viewer can see.
    #[default]
    Trending,
    /// Only posts scoped to the viewer's department.
    Department,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FeedFilter {
    #[default]
    All,
    /// Most likes plus comments first.
    Hot,
    Recent,
    MyDepartment,
}

impl FeedFilter {
    pub fn label(&self) -> &'static str {
        match self {
            FeedFilter::All => "All",
            FeedFilter::Hot => "Hot",
            FeedFilter::Recent => "Recent",
            FeedFilter::MyDepartment => "My Dept",
        }
    }
}

/// What the feed screen currently asks for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedQuery {
    pub tab: FeedTab,
    pub filter: FeedFilter,
    pub search: String,
}

impl FeedQuery {
    /// Applies tab, search and filter to `posts`, which must already be
    /// newest first (as the post repository returns them).
    pub fn apply(&self, posts: &[Post], viewer_department: Uuid) -> Vec<Post> {
        let needle = self.search.trim().to_lowercase();
        let in_department =
            |p: &Post| !p.is_college_wide && p.department_id == Some(viewer_department);

        let mut out: Vec<Post> = posts
            .iter()
            .filter(|p| self.tab == FeedTab::Trending || in_department(p))
            .filter(|p| needle.is_empty() || p.content.to_lowercase().contains(&needle))
            .filter(|p| self.filter != FeedFilter::MyDepartment || in_department(p))
            .cloned()
            .collect();

        match self.filter {
            FeedFilter::Hot => out.sort_by(|a, b| {
                b.engagement()
                    .cmp(&a.engagement())
                    .then(b.created_at.cmp(&a.created_at))
            }),
            FeedFilter::Recent => out.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            FeedFilter::All | FeedFilter::MyDepartment => {}
        }
        out
    }
}

/// Everything the share sheet offers for one post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareLink {
    pub text: String,
    pub url: Url,
}

impl ShareLink {
    pub fn new(base: &Url, post: &Post) -> Result<Self, AppError> {
        let url = base
            .join(&format!("post/{}", post.id))
            .map_err(|e| AppError::Config(format!("invalid share url: {e}")))?;
        Ok(Self {
            text: format!("Check out this gossip on Lastbench: \"{}\"", post.content),
            url,
        })
    }

    pub fn clipboard_text(&self) -> String {
        format!("{}\n{}", self.text, self.url)
    }

    pub fn whatsapp_url(&self) -> Result<Url, AppError> {
        Url::parse_with_params("https://wa.me/", &[("text", self.clipboard_text())])
            .map_err(|e| AppError::Config(format!("invalid share url: {e}")))
    }
}
