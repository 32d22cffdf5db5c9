//! Data models
//!
//! Database entities (Post, User, Session, Comment), the post status machine,
//! and the input types repositories accept.

mod comment;
mod pagination;
mod post;
mod session;
mod user;

pub use comment::{Comment, CreateCommentInput};
pub use pagination::{ListParams, PagedResult};
pub use post::{
    CreatePostInput, Desk, InvalidTransition, Post, PostFilter, PostStatus, Transition,
    UpdatePostInput,
};
pub use session::Session;
pub use user::{UpdateProfileInput, User};
