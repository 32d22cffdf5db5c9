//! HTTP tests: the permission matrix and the editorial workflow end to end

use axum::http::{header, StatusCode};
use axum_test::TestServer;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

use super::{build_router, AppState};
use crate::cache::Cache;
use crate::db::repositories::{
    SqlxCommentRepository, SqlxPostRepository, SqlxSessionRepository, SqlxUserRepository,
};
use crate::db::{create_test_pool, migrations};
use crate::models::Session;
use crate::services::access::fixtures::{role_user, ROLES};
use crate::services::{CommentService, Job, JobQueue, PostService, Signer, UserService};

const SECRET: &str = "test-secret";

struct TestApp {
    server: TestServer,
    /// Session token per role name
    tokens: HashMap<&'static str, String>,
    jobs: UnboundedReceiver<Job>,
}

impl TestApp {
    fn token(&self, role: &str) -> &str {
        &self.tokens[role]
    }

    async fn get(&self, role: Option<&str>, path: &str) -> axum_test::TestResponse {
        let request = self.server.get(path);
        match role {
            Some(role) => request.authorization_bearer(self.token(role)).await,
            None => request.await,
        }
    }

    async fn post(&self, role: Option<&str>, path: &str, body: Value) -> axum_test::TestResponse {
        let request = self.server.post(path).json(&body);
        match role {
            Some(role) => request.authorization_bearer(self.token(role)).await,
            None => request.await,
        }
    }

    /// Create a post as `author` and return its slug
    async fn add_post(&self, title: &str, is_draft: bool) -> String {
        let response = self
            .post(
                Some("author"),
                "/api/v1/add",
                json!({ "title": title, "article": "Body", "is_draft": is_draft }),
            )
            .await;
        assert_eq!(response.status_code(), StatusCode::CREATED);
        response.json::<Value>()["post"]["slug"]
            .as_str()
            .unwrap()
            .to_string()
    }

    async fn publish(&self, title: &str) -> String {
        let slug = self.add_post(title, false).await;
        let response = self
            .post(
                Some("staff"),
                &format!("/api/v1/unpublished/edit/{}", slug),
                json!({ "title": title, "article": "Body", "status": "is_published" }),
            )
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        slug
    }
}

async fn setup() -> TestApp {
    let pool = create_test_pool().await.expect("Failed to create test pool");
    migrations::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    let users = SqlxUserRepository::boxed(pool.clone());
    let sessions = SqlxSessionRepository::boxed(pool.clone());
    let posts = SqlxPostRepository::boxed(pool.clone());
    let comments = SqlxCommentRepository::boxed(pool.clone());

    let mut tokens = HashMap::new();
    for role in ROLES {
        let user = users.create(&role_user(role)).await.unwrap();
        let session = sessions.create(&Session::new(user.id, 7)).await.unwrap();
        tokens.insert(role, session.id);
    }

    let (queue, jobs) = JobQueue::new();
    let cache = Arc::new(Cache::memory());
    let state = AppState {
        post_service: Arc::new(PostService::new(
            posts.clone(),
            users.clone(),
            comments.clone(),
            cache,
            queue.clone(),
            5,
        )),
        comment_service: Arc::new(CommentService::new(comments, posts)),
        user_service: Arc::new(
            UserService::new(
                users,
                sessions,
                Signer::new(SECRET).unwrap(),
                queue,
                "http://blog.test",
                7,
            )
            .unwrap(),
        ),
    };

    let router = build_router(state, "http://localhost:3000").unwrap();
    TestApp {
        server: TestServer::new(router).unwrap(),
        tokens,
        jobs,
    }
}

/// Status for every role, in `ROLES` order
async fn statuses<F, Fut>(f: F) -> Vec<StatusCode>
where
    F: Fn(&'static str) -> Fut,
    Fut: std::future::Future<Output = StatusCode>,
{
    let mut out = Vec::new();
    for role in ROLES {
        out.push(f(role).await);
    }
    out
}

const OK: StatusCode = StatusCode::OK;
const FORBIDDEN: StatusCode = StatusCode::FORBIDDEN;
const NOT_FOUND: StatusCode = StatusCode::NOT_FOUND;

#[tokio::test]
async fn test_anonymous_gets_login_url() {
    let app = setup().await;
    let slug = app.add_post("Draft", true).await;

    for path in [
        "/api/v1/drafts".to_string(),
        "/api/v1/unpublished".to_string(),
        format!("/api/v1/post/draft/{}", slug),
        "/api/v1/user/profile".to_string(),
        "/api/v1/user/me".to_string(),
    ] {
        let response = app.get(None, &path).await;
        assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED, "{}", path);
        let body = response.json::<Value>();
        let next = path.trim_start_matches("/api/v1");
        assert_eq!(
            body["error"]["details"]["login_url"],
            format!("/user/login?next={}", next)
        );
    }
}

#[tokio::test]
async fn test_author_views_matrix() {
    let app = setup().await;
    let app = &app;

    let drafts = statuses(|role| async move { app.get(Some(role), "/api/v1/drafts").await.status_code() }).await;
    assert_eq!(drafts, vec![FORBIDDEN, OK, FORBIDDEN, OK, OK]);

    let profile = statuses(|role| async move {
        app.get(Some(role), "/api/v1/user/profile").await.status_code()
    })
    .await;
    assert_eq!(profile, vec![FORBIDDEN, OK, FORBIDDEN, OK, OK]);

    let add = statuses(|role| async move {
        app.post(
            Some(role),
            "/api/v1/add",
            json!({ "title": format!("By {}", role), "article": "Body" }),
        )
        .await
        .status_code()
    })
    .await;
    let created = StatusCode::CREATED;
    assert_eq!(add, vec![FORBIDDEN, created, FORBIDDEN, created, created]);
}

#[tokio::test]
async fn test_staff_views_matrix() {
    let app = setup().await;
    let app = &app;
    let slug = app.add_post("Submitted", false).await;
    let slug = slug.as_str();

    let list = statuses(|role| async move { app.get(Some(role), "/api/v1/unpublished").await.status_code() }).await;
    assert_eq!(list, vec![FORBIDDEN, FORBIDDEN, OK, OK, OK]);

    for prefix in ["/api/v1/unpublished", "/api/v1/unpublished/edit"] {
        let got = statuses(|role| async move {
            app.get(Some(role), &format!("{}/{}", prefix, slug))
                .await
                .status_code()
        })
        .await;
        assert_eq!(got, vec![FORBIDDEN, FORBIDDEN, OK, OK, OK], "{}", prefix);
    }
}

#[tokio::test]
async fn test_draft_owner_matrix() {
    let app = setup().await;
    let app = &app;
    let slug = app.add_post("Mine", true).await;
    let slug = slug.as_str();

    for prefix in ["/api/v1/post/draft", "/api/v1/drafts/edit"] {
        let got = statuses(|role| async move {
            app.get(Some(role), &format!("{}/{}", prefix, slug))
                .await
                .status_code()
        })
        .await;
        assert_eq!(got, vec![FORBIDDEN, OK, FORBIDDEN, FORBIDDEN, OK], "{}", prefix);
    }
}

#[tokio::test]
async fn test_staff_edit_keeps_unpublished() {
    let app = setup().await;
    let slug = app.add_post("Keep", false).await;

    let response = app
        .post(
            Some("staff"),
            &format!("/api/v1/unpublished/edit/{}", slug),
            json!({ "title": "Keep edited", "article": "Better", "status": "is_unpublished" }),
        )
        .await;
    assert_eq!(response.status_code(), OK);
    let body = response.json::<Value>();
    assert_eq!(body["redirect"], "/unpublished/keep-edited");

    let staff = app.get(Some("staff"), "/api/v1/unpublished/keep-edited").await;
    assert_eq!(staff.status_code(), OK);
    let author = app.get(Some("author"), "/api/v1/post/draft/keep-edited").await;
    assert_eq!(author.status_code(), NOT_FOUND);
    let public = app.get(None, "/api/v1/post/keep-edited").await;
    assert_eq!(public.status_code(), NOT_FOUND);
}

#[tokio::test]
async fn test_staff_returns_post_to_draft() {
    let mut app = setup().await;
    let slug = app.add_post("Return", false).await;

    let response = app
        .post(
            Some("authorstaff"),
            &format!("/api/v1/unpublished/edit/{}", slug),
            json!({ "title": "Return", "article": "Body", "status": "is_draft" }),
        )
        .await;
    assert_eq!(response.status_code(), OK);
    assert_eq!(response.json::<Value>()["redirect"], "/unpublished");
    assert!(matches!(app.jobs.try_recv(), Ok(Job::PostReturned { .. })));

    let staff = app.get(Some("staff"), &format!("/api/v1/unpublished/{}", slug)).await;
    assert_eq!(staff.status_code(), NOT_FOUND);
    let owner = app.get(Some("author"), &format!("/api/v1/post/draft/{}", slug)).await;
    assert_eq!(owner.status_code(), OK);
    let other = app.get(Some("staff"), &format!("/api/v1/post/draft/{}", slug)).await;
    assert_eq!(other.status_code(), FORBIDDEN);
}

#[tokio::test]
async fn test_staff_publishes_post() {
    let mut app = setup().await;
    let slug = app.publish("Publish").await;
    assert!(matches!(app.jobs.try_recv(), Ok(Job::PostPublished { .. })));

    let public = app.get(None, &format!("/api/v1/post/{}", slug)).await;
    assert_eq!(public.status_code(), OK);
    let staff = app.get(Some("staff"), &format!("/api/v1/unpublished/{}", slug)).await;
    assert_eq!(staff.status_code(), NOT_FOUND);
    let author = app.get(Some("author"), &format!("/api/v1/post/draft/{}", slug)).await;
    assert_eq!(author.status_code(), NOT_FOUND);

    // Staff editing a published post sees 404, a plain author 403
    let path = format!("/api/v1/unpublished/edit/{}", slug);
    let form = json!({ "title": "Publish", "article": "Body", "status": "is_draft" });
    assert_eq!(app.post(Some("staff"), &path, form.clone()).await.status_code(), NOT_FOUND);
    assert_eq!(app.post(Some("author"), &path, form).await.status_code(), FORBIDDEN);
}

#[tokio::test]
async fn test_unknown_status_value_rejected() {
    let app = setup().await;
    let slug = app.add_post("Odd", false).await;
    let response = app
        .post(
            Some("staff"),
            &format!("/api/v1/unpublished/edit/{}", slug),
            json!({ "title": "Odd", "article": "Body", "status": "published" }),
        )
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_set_editor() {
    let app = setup().await;
    let slug = app.add_post("Claim", false).await;
    let path = "/api/v1/unpublished/set_editor";

    let get = app.get(Some("staff"), path).await;
    assert_eq!(get.status_code(), StatusCode::METHOD_NOT_ALLOWED);

    let denied = app.post(Some("author"), path, json!({ "post_slug": slug })).await;
    assert_eq!(denied.status_code(), FORBIDDEN);

    let first = app.post(Some("staff"), path, json!({ "post_slug": slug })).await;
    let body = first.json::<Value>();
    assert_eq!(body["assigned"], true);
    assert_eq!(body["redirect"], "/unpublished/claim");

    let second = app.post(Some("authorstaff"), path, json!({ "post_slug": slug })).await;
    let body = second.json::<Value>();
    assert_eq!(body["assigned"], false);
    assert_eq!(body["redirect"], "/unpublished");

    let missing = app.post(Some("staff"), path, json!({ "post_slug": "nope" })).await;
    assert_eq!(missing.status_code(), NOT_FOUND);
}

#[tokio::test]
async fn test_duplicate_title_conflict() {
    let app = setup().await;
    app.add_post("Same", true).await;
    let response = app
        .post(Some("author"), "/api/v1/add", json!({ "title": "Same", "article": "Body" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CONFLICT);
    assert_eq!(response.json::<Value>()["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn test_delete_draft() {
    let app = setup().await;
    let slug = app.add_post("Bin", true).await;
    let path = format!("/api/v1/drafts/edit/{}", slug);

    let denied = app.server.delete(&path).authorization_bearer(app.token("staff")).await;
    assert_eq!(denied.status_code(), FORBIDDEN);

    let deleted = app.server.delete(&path).authorization_bearer(app.token("author")).await;
    assert_eq!(deleted.status_code(), OK);
    assert_eq!(app.get(Some("author"), &path).await.status_code(), NOT_FOUND);
}

#[tokio::test]
async fn test_pin_and_home() {
    let app = setup().await;
    let pinned = app.publish("Pinned").await;
    app.publish("Regular").await;

    let staff = app
        .post(Some("staff"), &format!("/api/v1/admin/pin/{}", pinned), json!({}))
        .await;
    assert_eq!(staff.status_code(), FORBIDDEN);
    let admin = app
        .post(Some("admin"), &format!("/api/v1/admin/pin/{}", pinned), json!({ "pinned": true }))
        .await;
    assert_eq!(admin.status_code(), OK);

    let home = app.get(None, "/api/v1").await.json::<Value>();
    assert_eq!(home["pinned"][0]["slug"], "pinned");
    assert_eq!(home["posts"]["total"], 1);
    assert_eq!(home["posts"]["items"][0]["slug"], "regular");
}

#[tokio::test]
async fn test_detail_counts_views_and_comments() {
    let app = setup().await;
    let slug = app.publish("Viewed").await;
    let comments = format!("/api/v1/post/{}/comments", slug);

    let anonymous = app.post(None, &comments, json!({ "content": "hi" })).await;
    assert_eq!(anonymous.status_code(), StatusCode::UNAUTHORIZED);
    let added = app.post(Some("user"), &comments, json!({ "content": "hi" })).await;
    assert_eq!(added.status_code(), StatusCode::CREATED);
    let comment_id = added.json::<Value>()["id"].as_i64().unwrap();

    app.get(None, &format!("/api/v1/post/{}", slug)).await;
    let detail = app.get(None, &format!("/api/v1/post/{}", slug)).await.json::<Value>();
    assert_eq!(detail["views"], 2);
    assert_eq!(detail["comments"].as_array().unwrap().len(), 1);

    let path = format!("/api/v1/admin/comments/{}/visibility", comment_id);
    let hide = json!({ "is_published": false });
    assert_eq!(app.post(Some("author"), &path, hide.clone()).await.status_code(), FORBIDDEN);
    assert_eq!(app.post(Some("staff"), &path, hide).await.status_code(), OK);
    let listed = app.get(None, &comments).await.json::<Value>();
    assert!(listed["comments"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_register_activate_login() {
    let mut app = setup().await;
    let response = app
        .post(
            None,
            "/api/v1/user/register",
            json!({
                "username": "newbie",
                "email": "newbie@example.com",
                "password1": "long-password",
                "password2": "long-password"
            }),
        )
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    assert!(matches!(app.jobs.try_recv(), Ok(Job::Activation { .. })));

    let login = json!({ "login": "newbie", "password": "long-password" });
    let inactive = app.post(None, "/api/v1/user/login", login.clone()).await;
    assert_eq!(inactive.status_code(), StatusCode::UNAUTHORIZED);

    let forged = app.get(None, "/api/v1/user/activate/newbie:forged").await;
    assert_eq!(forged.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(forged.json::<Value>()["error"]["code"], "BAD_SIGNATURE");

    let sign = Signer::new(SECRET).unwrap().sign("newbie");
    let path = format!("/api/v1/user/activate/{}", urlencoding::encode(&sign));
    let activated = app.get(None, &path).await;
    assert_eq!(activated.status_code(), OK);
    assert_eq!(activated.json::<Value>()["outcome"], "activated");
    assert!(activated.headers().get(header::SET_COOKIE).is_some());
    let again = app.get(None, &path).await.json::<Value>();
    assert_eq!(again["outcome"], "already_active");

    let logged_in = app.post(None, "/api/v1/user/login", login).await;
    assert_eq!(logged_in.status_code(), OK);
    let token = logged_in.json::<Value>()["token"].as_str().unwrap().to_string();

    let me = app.server.get("/api/v1/user/me").authorization_bearer(&token).await;
    assert_eq!(me.json::<Value>()["username"], "newbie");
    assert!(me.json::<Value>().get("password_hash").is_none());

    app.server.post("/api/v1/user/logout").authorization_bearer(&token).await;
    let after = app.server.get("/api/v1/user/me").authorization_bearer(&token).await;
    assert_eq!(after.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_banned_login() {
    let pool = create_test_pool().await.unwrap();
    migrations::run_migrations(&pool).await.unwrap();
    let users = SqlxUserRepository::boxed(pool.clone());
    let mut troll = role_user("user");
    troll.password_hash = crate::services::hash_password("long-password").unwrap();
    troll.is_banned = true;
    users.create(&troll).await.unwrap();

    let (queue, _jobs) = JobQueue::new();
    let posts = SqlxPostRepository::boxed(pool.clone());
    let comments = SqlxCommentRepository::boxed(pool.clone());
    let state = AppState {
        post_service: Arc::new(PostService::new(
            posts.clone(),
            users.clone(),
            comments.clone(),
            Arc::new(Cache::memory()),
            queue.clone(),
            5,
        )),
        comment_service: Arc::new(CommentService::new(comments, posts)),
        user_service: Arc::new(
            UserService::new(
                users,
                SqlxSessionRepository::boxed(pool),
                Signer::new(SECRET).unwrap(),
                queue,
                "http://blog.test",
                7,
            )
            .unwrap(),
        ),
    };
    let server = TestServer::new(build_router(state, "http://localhost:3000").unwrap()).unwrap();

    let response = server
        .post("/api/v1/user/login")
        .json(&json!({ "login": "user", "password": "long-password" }))
        .await;
    assert_eq!(response.status_code(), FORBIDDEN);
    assert_eq!(response.json::<Value>()["error"]["code"], "USER_BANNED");
}

#[tokio::test]
async fn test_subscriptions() {
    let app = setup().await;
    let path = "/api/v1/user/subscribe/author";

    let first = app.post(Some("user"), path, json!({})).await.json::<Value>();
    assert_eq!(first["outcome"], "subscribed");
    let second = app.post(Some("user"), path, json!({})).await.json::<Value>();
    assert_eq!(second["outcome"], "already_subscribed");

    let list = app.get(Some("user"), "/api/v1/user/subscriptions").await.json::<Value>();
    assert_eq!(list["subscriptions"], json!(["author"]));

    let not_author = app.post(Some("user"), "/api/v1/user/subscribe/staff", json!({})).await;
    assert_eq!(not_author.status_code(), NOT_FOUND);

    let path = "/api/v1/user/unsubscribe/author";
    let dropped = app.post(Some("user"), path, json!({})).await.json::<Value>();
    assert_eq!(dropped["outcome"], "unsubscribed");
    let again = app.post(Some("user"), path, json!({})).await.json::<Value>();
    assert_eq!(again["outcome"], "not_subscribed");

    let list = app.get(Some("user"), "/api/v1/user/subscriptions").await.json::<Value>();
    assert_eq!(list["subscriptions"], json!([]));
    assert_eq!(app.post(None, path, json!({})).await.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_author_page_and_search() {
    let app = setup().await;
    app.publish("Rust notes").await;
    app.add_post("Rust drafts", true).await;

    let author = app.get(None, "/api/v1/user/author/author").await.json::<Value>();
    assert_eq!(author["author"]["username"], "author");
    assert!(author["author"].get("email").is_none());
    assert_eq!(author["posts"]["total"], 1);

    let found = app.get(None, "/api/v1/search?q=rust").await.json::<Value>();
    assert_eq!(found["total"], 1);
    assert_eq!(found["items"][0]["slug"], "rust-notes");
}

#[tokio::test]
async fn test_feedback_queued() {
    let mut app = setup().await;
    let response = app
        .post(
            None,
            "/api/v1/feedback",
            json!({ "name": "Reader", "email": "reader@example.com", "message": "Hello" }),
        )
        .await;
    assert_eq!(response.status_code(), StatusCode::ACCEPTED);
    assert!(matches!(app.jobs.try_recv(), Ok(Job::Feedback { .. })));
}

#[tokio::test]
async fn test_session_cookie_is_accepted() {
    let app = setup().await;
    let response = app
        .server
        .get("/api/v1/user/me")
        .add_header(
            header::COOKIE,
            header::HeaderValue::from_str(&format!("session={}", app.token("staff"))).unwrap(),
        )
        .await;
    assert_eq!(response.json::<Value>()["username"], "staff");
}
