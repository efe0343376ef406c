//! # relay-renderer
//!
//! Tera-based renderer for the comments the bot leaves on contributions, and
//! the marker codec that lets the bot recognise those comments later.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use relay_renderer::{CommentContext, CommentData, CommentKind, CommentRenderer};
//! use relay_core::types::Contribution;
//!
//! fn welcome(contribution: &Contribution) -> Option<String> {
//!     let renderer = CommentRenderer::new().ok()?;
//!     let ctx = CommentContext::from_contribution(contribution);
//!     renderer.render(CommentKind::Welcome, &ctx, &CommentData::default()).ok()
//! }
//! ```

pub mod context;
pub mod engine;
pub mod error;
pub mod marker;

pub use context::CommentContext;
pub use engine::{CommentRenderer, TemplateEngine};
pub use error::RenderError;
pub use marker::{parse_data, parse_kind, CommentData, CommentKind};
