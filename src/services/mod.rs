//! Services layer - Business logic
//!
//! Services own the editorial rules. They check access, validate input,
//! coordinate repositories and the cache, and queue background jobs.

pub mod access;
pub mod comment;
pub mod jobs;
pub mod notifier;
pub mod password;
pub mod post;
pub mod signing;
pub mod slug;
pub mod user;

pub use access::{Access, Denied};
pub use comment::{CommentService, CommentServiceError};
pub use jobs::{Job, JobQueue, JobWorker};
pub use notifier::{create_notifier, DynNotifier, Mail, Notifier};
pub use password::{hash_password, verify_password};
pub use post::{PostForm, PostService, PostServiceError};
pub use signing::{BadSignature, Signer};
pub use slug::slugify;
pub use user::{
    ActivationOutcome, FeedbackInput, LoginInput, RegisterInput, SubscribeOutcome, UserService,
    UserServiceError,
};
