//! Background jobs
//!
//! Request handlers enqueue a [`Job`] and return at once; a single worker task
//! drains the channel, loads what it needs and hands a [`Mail`] to the
//! notifier. Failures are logged and dropped, never retried.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::db::repositories::{PostRepository, UserRepository};
use crate::models::{Post, User};
use crate::services::notifier::{DynNotifier, Mail};

/// Work done outside the request path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    /// Tell the author their post went back to drafts
    PostReturned { post_id: i64 },
    /// Tell the author their post is live
    PostPublished { post_id: i64 },
    /// Mail the activation link to a new user
    Activation { user_id: i64, link: String },
    /// Forward a feedback message to the site admin
    Feedback {
        name: String,
        email: String,
        message: String,
    },
}

impl Job {
    fn kind(&self) -> &'static str {
        match self {
            Job::PostReturned { .. } => "post_returned",
            Job::PostPublished { .. } => "post_published",
            Job::Activation { .. } => "activation",
            Job::Feedback { .. } => "feedback",
        }
    }
}

/// Sending half of the job channel; cheap to clone
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<Job>,
}

impl JobQueue {
    /// Create a queue and the receiver a [`JobWorker`] drains
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Job>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a job. Never blocks; a closed queue only logs.
    pub fn enqueue(&self, job: Job) {
        let kind = job.kind();
        if self.tx.send(job).is_err() {
            tracing::warn!(job = kind, "Job queue is closed, dropping job");
        } else {
            tracing::debug!(job = kind, "Job queued");
        }
    }
}

/// Turns jobs into mails
pub struct JobWorker {
    posts: Arc<dyn PostRepository>,
    users: Arc<dyn UserRepository>,
    notifier: DynNotifier,
    site_url: String,
    admin_email: String,
}

impl JobWorker {
    pub fn new(
        posts: Arc<dyn PostRepository>,
        users: Arc<dyn UserRepository>,
        notifier: DynNotifier,
        site_url: impl Into<String>,
        admin_email: impl Into<String>,
    ) -> Self {
        Self {
            posts,
            users,
            notifier,
            site_url: site_url.into(),
            admin_email: admin_email.into(),
        }
    }

    /// Drain `rx` on a tokio task until every [`JobQueue`] is dropped
    pub fn spawn(self, mut rx: mpsc::UnboundedReceiver<Job>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let kind = job.kind();
                if let Err(e) = self.run(job).await {
                    tracing::warn!(job = kind, error = %format!("{:#}", e), "Job failed");
                }
            }
            tracing::debug!("Job worker stopped");
        })
    }

    /// Run one job to completion
    pub async fn run(&self, job: Job) -> Result<()> {
        let mail = self.compose(job).await?;
        self.notifier.send(mail).await
    }

    async fn compose(&self, job: Job) -> Result<Mail> {
        match job {
            Job::PostReturned { post_id } => {
                let (post, author) = self.post_and_author(post_id).await?;
                Ok(Mail {
                    to: author.email,
                    subject: format!("Your post \"{}\" has been returned", post.title),
                    body: format!(
                        "Hello, {}!\n\n\
                         An editor has returned your post \"{}\" to your drafts.\n\
                         Please revise it and submit it for review again.\n",
                        author.username, post.title
                    ),
                    reply_to: None,
                })
            }
            Job::PostPublished { post_id } => {
                let (post, author) = self.post_and_author(post_id).await?;
                Ok(Mail {
                    to: author.email,
                    subject: format!("Your post \"{}\" has been published", post.title),
                    body: format!(
                        "Hello, {}!\n\nYour post \"{}\" is now live:\n{}/post/{}\n",
                        author.username,
                        post.title,
                        self.site_url.trim_end_matches('/'),
                        post.slug
                    ),
                    reply_to: None,
                })
            }
            Job::Activation { user_id, link } => {
                let user = self
                    .users
                    .get_by_id(user_id)
                    .await?
                    .with_context(|| format!("User {} not found", user_id))?;
                Ok(Mail {
                    to: user.email,
                    subject: "Activate your account".to_string(),
                    body: format!(
                        "Hello, {}!\n\nFollow this link to activate your account:\n{}\n",
                        user.username, link
                    ),
                    reply_to: None,
                })
            }
            Job::Feedback {
                name,
                email,
                message,
            } => Ok(Mail {
                to: self.admin_email.clone(),
                subject: format!("Feedback from {}", name),
                body: format!("From: {} <{}>\n\n{}\n", name, email, message),
                reply_to: Some(email),
            }),
        }
    }

    async fn post_and_author(&self, post_id: i64) -> Result<(Post, User)> {
        let post = self
            .posts
            .get_by_id(post_id)
            .await?
            .with_context(|| format!("Post {} not found", post_id))?;
        let author = self
            .users
            .get_by_id(post.author_id)
            .await?
            .with_context(|| format!("Author {} of post {} not found", post.author_id, post_id))?;
        Ok((post, author))
    }
}
