mod common;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use bytes::Bytes;
use common::{CopyTranscoder, test_config, test_pool};
use futures::{StreamExt, future::join_all, stream};
use object_store::memory::InMemory;
use reelhub::{
    app, build_state,
    handlers::identity::USER_ID_HEADER,
    models::video::{LoadingStatus, StorageKind},
    services::remote::{ObjectStoreRemote, RemoteError, RemoteStore},
    state::AppState,
};
use serde_json::{Value, json};
use std::{io, sync::Arc, time::Duration};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

const BOUNDARY: &str = "reelhub-test-boundary";
const CLIP: &[u8] = b"0123456789abcdefghij";

struct TestApp {
    router: Router,
    state: AppState,
    _dir: TempDir,
}

impl TestApp {
    async fn new() -> Self {
        Self::build(StorageKind::Local, None).await
    }

    /// Videos go to an in-memory object store.
    async fn with_remote() -> Self {
        let remote: Arc<dyn RemoteStore> =
            Arc::new(ObjectStoreRemote::new(Arc::new(InMemory::new()), "reelhub-test"));
        Self::build(StorageKind::Remote, Some(remote)).await
    }

    async fn build(storage: StorageKind, remote: Option<Arc<dyn RemoteStore>>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let pool = test_pool(&dir).await;
        let config = test_config(dir.path().join("media"), storage);
        let (state, _worker) = build_state(config, pool, Arc::new(CopyTranscoder::new()), remote);
        Self {
            router: app(state.clone()),
            state,
            _dir: dir,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, body.to_vec())
    }

    async fn json(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, _, body) = self.send(request).await;
        let value = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, value)
    }

    async fn upload(&self, user: Uuid, title: &str, tags: &str, content_type: &str) -> (StatusCode, Value) {
        self.json(upload_request(Some(user), title, tags, content_type))
            .await
    }

    /// Upload and wait for the background run to finish.
    async fn upload_ready(&self, user: Uuid, title: &str, tags: &str) -> Uuid {
        let (status, body) = self.upload(user, title, tags, "video/mp4").await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let id: Uuid = body["id"].as_str().unwrap().parse().unwrap();
        self.wait_for(id).await;
        id
    }

    async fn wait_for(&self, id: Uuid) -> LoadingStatus {
        for _ in 0..200 {
            let video = self.state.videos.fetch_video(id).await.unwrap();
            if video.loading_status.is_terminal() {
                return video.loading_status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("video {} never finished processing", id);
    }
}

/// Form fields and the `file` part headers, without the file bytes.
fn upload_preamble(title: &str, tags: &str, content_type: &str) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in [("title", title), ("tags", tags)] {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"clip\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body
}

fn upload_request(user: Option<Uuid>, title: &str, tags: &str, content_type: &str) -> Request<Body> {
    let mut body = upload_preamble(title, tags, content_type);
    body.extend_from_slice(CLIP);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    multipart_post(user, Body::from(body))
}

fn multipart_post(user: Option<Uuid>, body: Body) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/videos")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(user) = user {
        builder = builder.header(USER_ID_HEADER, user.to_string());
    }
    builder.body(body).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn as_user(method: Method, uri: &str, user: Uuid) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(USER_ID_HEADER, user.to_string())
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, user: Uuid, payload: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(USER_ID_HEADER, user.to_string())
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

#[tokio::test]
async fn healthz_and_readyz_report_ok() {
    let app = TestApp::new().await;
    std::fs::create_dir_all(app.state.stager.media_root()).unwrap();

    let (status, body) = app.json(get("/healthz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = app.json(get("/readyz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checks"]["sqlite"]["ok"], true);
    assert_eq!(body["checks"]["media"]["ok"], true);
}

#[tokio::test]
async fn upload_is_accepted_then_processed() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();

    let (status, body) = app.upload(user, "First clip", "cats, funny", "video/mp4").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["title"], "First clip");
    assert_eq!(body["loading_status"], "pending");
    assert_eq!(body["tags"], json!(["cats", "funny"]));
    assert!(body.get("path").is_none());

    let id: Uuid = body["id"].as_str().unwrap().parse().unwrap();
    assert_eq!(app.wait_for(id).await, LoadingStatus::Success);

    let (status, body) = app.json(get(&format!("/api/v1/videos/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["loading_status"], "success");
    assert_eq!(body["storage"], "local");
    assert_eq!(body["size"], CLIP.len());
    assert_eq!(body["views"], 1);

    let cats = app.state.videos.fetch_tag("cats").await.unwrap();
    assert_eq!(cats.views, 1);
}

#[tokio::test]
async fn upload_rejects_wrong_type_and_missing_identity() {
    let app = TestApp::new().await;

    let (status, body) = app
        .upload(Uuid::new_v4(), "doc", "", "application/pdf")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Incorrect file type");

    let (status, _) = app
        .json(upload_request(None, "clip", "", "video/mp4"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, listed) = app.json(get("/api/v1/videos")).await;
    assert_eq!(listed["total"], 0);
}

#[tokio::test]
async fn unknown_video_is_not_found() {
    let app = TestApp::new().await;
    let missing = Uuid::new_v4();

    let (status, _) = app.json(get(&format!("/api/v1/videos/{missing}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.json(get(&format!("/api/v1/videos/{missing}/play"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .json(as_user(Method::PATCH, &format!("/api/v1/videos/{missing}/like"), missing))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn likes_and_dislikes_accumulate() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let id = app.upload_ready(user, "votes", "").await;

    for _ in 0..2 {
        let (status, _) = app
            .json(as_user(Method::PATCH, &format!("/api/v1/videos/{id}/like"), user))
            .await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, body) = app
        .json(as_user(Method::PATCH, &format!("/api/v1/videos/{id}/dislike"), user))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["likes"], 2);
    assert_eq!(body["dislikes"], 1);

    let (status, _) = app
        .json(
            Request::builder()
                .method(Method::PATCH)
                .uri(format!("/api/v1/videos/{id}/like"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn only_owner_can_delete() {
    let app = TestApp::new().await;
    let owner = Uuid::new_v4();
    let id = app.upload_ready(owner, "mine", "").await;
    let stored = app
        .state
        .stager
        .resolve(&app.state.videos.fetch_video(id).await.unwrap().path.unwrap())
        .unwrap();
    assert!(stored.is_file());

    let (status, _) = app
        .json(as_user(Method::DELETE, &format!("/api/v1/videos/{id}"), Uuid::new_v4()))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .json(as_user(Method::DELETE, &format!("/api/v1/videos/{id}"), owner))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.json(get(&format!("/api/v1/videos/{id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    for _ in 0..100 {
        if !stored.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!stored.exists());
}

#[tokio::test]
async fn play_serves_whole_file_and_ranges() {
    let app = TestApp::new().await;
    let id = app.upload_ready(Uuid::new_v4(), "play", "").await;
    let uri = format!("/api/v1/videos/{id}/play");

    let (status, headers, body) = app.send(get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::ACCEPT_RANGES], "bytes");
    assert_eq!(headers[header::CONTENT_TYPE], "video/mp4");
    assert_eq!(body, CLIP);

    let ranged = Request::builder()
        .uri(&uri)
        .header(header::RANGE, "bytes=5-9")
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = app.send(ranged).await;
    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(headers[header::CONTENT_RANGE], "bytes 5-9/20");
    assert_eq!(body, b"56789");

    let beyond = Request::builder()
        .uri(&uri)
        .header(header::RANGE, "bytes=100-")
        .body(Body::empty())
        .unwrap();
    let (status, headers, _) = app.send(beyond).await;
    assert_eq!(status, StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(headers[header::CONTENT_RANGE], "bytes */20");
}

#[tokio::test]
async fn list_filters_by_tag_and_pages() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    app.upload_ready(user, "cat one", "cats").await;
    app.upload_ready(user, "dog one", "dogs").await;
    let newest = app.upload_ready(user, "cat two", "cats, kittens").await;

    let (status, body) = app.json(get("/api/v1/videos?tag=cats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["items"][0]["id"], newest.to_string());
    assert_eq!(body["items"][0]["title"], "cat two");

    let (_, body) = app.json(get("/api/v1/videos?page=2&size=2")).await;
    assert_eq!(body["total"], 3);
    assert_eq!(body["page"], 2);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["items"][0]["title"], "cat one");

    let (status, _) = app.json(get("/api/v1/videos?tag=birds")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn comments_and_replies() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let id = app.upload_ready(user, "talk", "").await;

    let (status, first) = app
        .json(post_json("/api/v1/comments", user, json!({ "video_id": id, "text": "nice" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["text"], "nice");
    assert!(first["reply_to"].is_null());

    let (status, reply) = app
        .json(post_json(
            "/api/v1/comments",
            user,
            json!({ "video_id": id, "text": "agreed", "reply_to": first["id"] }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(reply["reply_to"], first["id"]);

    let (status, _) = app
        .json(post_json("/api/v1/comments", user, json!({ "video_id": id, "text": "   " })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .json(post_json(
            "/api/v1/comments",
            user,
            json!({ "video_id": Uuid::new_v4(), "text": "hello?" }),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app.json(get(&format!("/api/v1/comments/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["items"][1]["text"], "agreed");
}

#[tokio::test]
async fn upload_cut_off_mid_file_leaves_one_failed_record() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();

    let mut prefix = upload_preamble("cut short", "cats", "video/mp4");
    prefix.extend_from_slice(&CLIP[..8]);
    // The connection drops a moment after the file part has started.
    let chunks = stream::iter([Ok::<_, io::Error>(Bytes::from(prefix))]).chain(stream::once(async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Err(io::Error::other("client disconnected"))
    }));
    let request = multipart_post(Some(user), Body::from_stream(chunks));

    let (status, body) = app.json(request).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["loading_status"], "fail");

    let (status, mine) = app.json(as_user(Method::GET, "/api/v1/my/videos", user)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine["total"], 1);
    assert_eq!(mine["items"][0]["id"], body["id"]);
    assert_eq!(mine["items"][0]["loading_status"], "fail");

    // Failed uploads never show up in the public listing.
    let (_, listed) = app.json(get("/api/v1/videos")).await;
    assert_eq!(listed["total"], 0);
}

#[tokio::test]
async fn concurrent_uploads_by_one_user_get_separate_records() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();

    let ((first_status, first), (second_status, second)) = tokio::join!(
        app.upload(user, "left", "", "video/mp4"),
        app.upload(user, "right", "", "video/mp4"),
    );
    assert_eq!(first_status, StatusCode::ACCEPTED);
    assert_eq!(second_status, StatusCode::ACCEPTED);
    assert_ne!(first["id"], second["id"]);

    let mut paths = Vec::new();
    for body in [&first, &second] {
        let id: Uuid = body["id"].as_str().unwrap().parse().unwrap();
        assert_eq!(app.wait_for(id).await, LoadingStatus::Success);
        let video = app.state.videos.fetch_video(id).await.unwrap();
        assert_eq!(video.user_id, user);
        paths.push(video.path.unwrap());
    }
    assert_ne!(paths[0], paths[1]);

    let (_, mine) = app.json(as_user(Method::GET, "/api/v1/my/videos", user)).await;
    assert_eq!(mine["total"], 2);
}

#[tokio::test]
async fn concurrent_likes_are_all_counted() {
    let app = TestApp::new().await;
    let id = app.upload_ready(Uuid::new_v4(), "popular", "").await;
    let uri = format!("/api/v1/videos/{id}/like");

    let responses = join_all(
        (0..20).map(|_| app.json(as_user(Method::PATCH, &uri, Uuid::new_v4()))),
    )
    .await;
    assert!(responses.iter().all(|(status, _)| *status == StatusCode::OK));

    let video = app.state.videos.fetch_video(id).await.unwrap();
    assert_eq!(video.likes, 20);
    assert_eq!(video.dislikes, 0);
}

#[tokio::test]
async fn remote_video_plays_back_and_is_deleted_from_the_store() {
    let app = TestApp::with_remote().await;
    let owner = Uuid::new_v4();
    let id = app.upload_ready(owner, "in the cloud", "").await;

    let video = app.state.videos.fetch_video(id).await.unwrap();
    assert_eq!(video.loading_status, LoadingStatus::Success);
    assert_eq!(video.storage, StorageKind::Remote);
    let key = video.path.unwrap();

    let (status, headers, body) = app.send(get(&format!("/api/v1/videos/{id}/play"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "video/mp4");
    assert_eq!(body, CLIP);

    let (status, _) = app
        .json(as_user(Method::DELETE, &format!("/api/v1/videos/{id}"), owner))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let remote = app.state.remote.clone().unwrap();
    let mut gone = false;
    for _ in 0..100 {
        if matches!(remote.read_chunks(&key).await, Err(RemoteError::NotFound(_))) {
            gone = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(gone, "remote object {} was not removed", key);
}

#[tokio::test]
async fn follow_and_unfollow_update_both_sides() {
    let app = TestApp::new().await;
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    let (status, body) = app
        .json(as_user(Method::POST, &format!("/api/v1/user/{bob}/follow"), alice))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user_id"], alice.to_string());
    assert_eq!(body["following_user_id"], bob.to_string());

    let (status, body) = app
        .json(as_user(Method::POST, &format!("/api/v1/user/{bob}/follow"), alice))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "You are already subscribed to the user");

    let (status, _) = app
        .json(as_user(Method::POST, &format!("/api/v1/user/{alice}/follow"), alice))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, followings) = app
        .json(as_user(Method::GET, "/api/v1/my/followings", alice))
        .await;
    assert_eq!(followings["total"], 1);
    assert_eq!(followings["items"][0]["following_user_id"], bob.to_string());

    let (_, followers) = app.json(as_user(Method::GET, "/api/v1/my/followers", bob)).await;
    assert_eq!(followers["total"], 1);
    assert_eq!(followers["items"][0]["user_id"], alice.to_string());

    let (status, _) = app
        .json(as_user(Method::DELETE, &format!("/api/v1/user/{bob}/unfollow"), alice))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, followings) = app
        .json(as_user(Method::GET, "/api/v1/my/followings", alice))
        .await;
    assert_eq!(followings["total"], 0);
    let (_, followers) = app.json(as_user(Method::GET, "/api/v1/my/followers", bob)).await;
    assert_eq!(followers["total"], 0);

    // Following again after unfollowing works.
    let (status, _) = app
        .json(as_user(Method::POST, &format!("/api/v1/user/{bob}/follow"), alice))
        .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn my_endpoints_require_identity_and_list_own_videos_newest_first() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let someone_else = Uuid::new_v4();
    app.upload_ready(user, "older", "").await;
    app.upload_ready(someone_else, "not mine", "").await;
    let newest = app.upload_ready(user, "newer", "").await;

    let (status, body) = app.json(as_user(Method::GET, "/api/v1/my/videos", user)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["items"][0]["id"], newest.to_string());
    assert_eq!(body["items"][1]["title"], "older");

    for uri in ["/api/v1/my/videos", "/api/v1/my/followings", "/api/v1/my/followers"] {
        let (status, _) = app.json(get(uri)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
