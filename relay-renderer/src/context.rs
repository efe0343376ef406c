//! Comment context: serializable rendering payload built from a [`Contribution`].

use serde::{Deserialize, Serialize};

use relay_core::config::TrackerServer;
use relay_core::types::{Contribution, TrackerKey};

use crate::error::RenderError;

/// Author associations for which the author counts as new to the project.
const NEW_AUTHOR_ASSOCIATIONS: &[&str] = &["FIRST_TIMER", "FIRST_TIME_CONTRIBUTOR"];

/// Everything a comment template may reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentContext {
    pub user: String,
    pub user_url: String,
    pub repo: String,
    pub number: u64,
    pub title: String,
    pub html_url: String,
    pub is_draft: bool,
    pub is_merged: bool,
    pub is_first_time: bool,
    pub has_signed_cla: bool,
    /// `YYYY-MM-DD+HH:MM`, the form survey forms prefill.
    pub created_at: String,
    pub closed_at: Option<String>,
    pub tracker: Option<TrackerCtx>,
    pub survey_url: Option<String>,
    pub meta: MetaCtx,
}

/// The linked tracker record, when one exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerCtx {
    pub key: String,
    pub url: String,
    pub server_description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaCtx {
    pub relay_version: String,
}

impl CommentContext {
    /// Build a [`CommentContext`] from a [`Contribution`].
    pub fn from_contribution(contribution: &Contribution) -> Self {
        let is_first_time = contribution
            .author_association
            .as_deref()
            .map(|assoc| NEW_AUTHOR_ASSOCIATIONS.contains(&assoc))
            .unwrap_or(false);

        CommentContext {
            user: contribution.author.clone(),
            user_url: contribution.author_url.clone(),
            repo: contribution.id.repo.0.clone(),
            number: contribution.id.number,
            title: contribution.title.clone(),
            html_url: contribution.html_url.clone(),
            is_draft: contribution.draft,
            is_merged: contribution.is_merged(),
            is_first_time,
            has_signed_cla: false,
            created_at: contribution.created_at.format("%Y-%m-%d+%H:%M").to_string(),
            closed_at: contribution
                .closed_at
                .map(|at| at.format("%Y-%m-%d+%H:%M").to_string()),
            tracker: None,
            survey_url: None,
            meta: MetaCtx {
                relay_version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }

    pub fn with_cla(mut self, has_signed_cla: bool) -> Self {
        self.has_signed_cla = has_signed_cla;
        self
    }

    pub fn with_tracker(mut self, key: &TrackerKey, server: &TrackerServer) -> Self {
        self.tracker = Some(TrackerCtx {
            key: key.0.clone(),
            url: format!("{}/browse/{}", server.url.trim_end_matches('/'), key),
            server_description: server.description.clone(),
        });
        self
    }

    pub fn with_survey_url(mut self, survey_url: Option<&str>) -> Self {
        self.survey_url = survey_url.map(str::to_string);
        self
    }

    /// Convert to a [`tera::Context`] for rendering.
    pub fn to_tera_context(&self) -> Result<tera::Context, RenderError> {
        tera::Context::from_serialize(self).map_err(RenderError::from)
    }
}
