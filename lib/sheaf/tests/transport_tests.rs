//! Integration tests for `Client` over `HyperTransport` using wiremock.

use std::time::Duration;

use assert2::{check, let_assert};
use serde::{Deserialize, Serialize};
use sheaf::middleware::{REDIRECT_HISTORY_HEADER, REDIRECT_STATUS_HISTORY_HEADER};
use sheaf::{Client, Error, HttpClientExt, Method, Multipart, Options, RedirectOptions, Request};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, body_string, header, method, path, query_param},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct User {
    id: u64,
    name: String,
}

fn client_for(server: &MockServer) -> Client {
    Client::builder()
        .base_uri(format!("{}/", server.uri()))
        .build()
        .expect("client")
}

#[tokio::test]
async fn get_json() {
    let server = MockServer::start().await;
    let user = User {
        id: 1,
        name: "Alice".to_string(),
    };
    Mock::given(method("GET"))
        .and(path("/users/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&user))
        .mount(&server)
        .await;

    let response = client_for(&server).get("users/1").await.expect("response");

    check!(response.status() == 200);
    let_assert!(Ok(body) = response.json::<User>());
    check!(body == user);
}

#[tokio::test]
async fn post_json_option() {
    let server = MockServer::start().await;
    let input = User {
        id: 0,
        name: "Bob".to_string(),
    };
    Mock::given(method("POST"))
        .and(path("/users"))
        .and(header("Content-Type", "application/json"))
        .and(body_json(&input))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let options = Options::default().with_json(serde_json::to_value(&input).expect("json"));
    let response = client_for(&server)
        .request(Method::Post, "users", options)
        .await
        .expect("response");

    check!(response.status() == 201);
}

#[tokio::test]
async fn form_params_and_query() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .and(query_param("next", "/home"))
        .and(header("Content-Type", "application/x-www-form-urlencoded"))
        .and(body_string("user=alice&pass=s3cret"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let options = Options::default()
        .with_query([("next", "/home")])
        .with_form_params([("user", "alice"), ("pass", "s3cret")]);
    let response = client_for(&server)
        .request(Method::Post, "login", options)
        .await
        .expect("response");

    check!(response.status() == 204);
}

#[tokio::test]
async fn multipart_upload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/avatar"))
        .and(header("Content-Type", "multipart/form-data; boundary=sheaf-test"))
        .and(body_string(
            "--sheaf-test\r\n\
             Content-Disposition: form-data; name=\"user\"\r\n\r\n\
             alice\r\n\
             --sheaf-test\r\n\
             Content-Disposition: form-data; name=\"avatar\"; filename=\"me.png\"\r\n\
             Content-Type: image/png\r\n\r\n\
             PNG\r\n\
             --sheaf-test--\r\n",
        ))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let form = Multipart::with_boundary("sheaf-test")
        .text("user", "alice")
        .file("avatar", "me.png", "PNG");
    let response = client_for(&server)
        .request(Method::Post, "avatar", Options::default().with_multipart(form))
        .await
        .expect("response");

    check!(response.status() == 201);
}

#[tokio::test]
async fn sends_user_agent_and_default_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("User-Agent", "acme/2.0"))
        .and(header("X-Api-Key", "k"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::builder()
        .user_agent("acme/2.0")
        .header("X-Api-Key", "k")
        .build()
        .expect("client");
    let response = client.get(&server.uri()).await.expect("response");

    check!(response.status() == 200);
}

#[tokio::test]
async fn not_found_becomes_client_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such user"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let_assert!(Err(err) = client.get("missing").await);

    check!(err.is_client_error());
    check!(err.status() == Some(404));
    let message = err.to_string();
    check!(message.starts_with("Client error: `GET "));
    check!(message.ends_with("resulted in a `404 Not Found` response:\nno such user"));
    check!(err.request().map(|r| r.url().path().to_string()) == Some("/missing".to_string()));
}

#[tokio::test]
async fn server_error_kept_when_disabled() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let options = Options::default().with_http_errors(false);
    let response = client_for(&server)
        .request(Method::Get, "status", options)
        .await
        .expect("response");

    check!(response.status() == 503);
}

#[tokio::test]
async fn follows_redirects_and_tracks_them() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/middle"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/middle"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "/new"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(ResponseTemplate::new(200).set_body_string("moved"))
        .mount(&server)
        .await;

    let options = Options::default()
        .with_allow_redirects(RedirectOptions::default().track_redirects(true))
        .with_body("payload");
    let response = client_for(&server)
        .request(Method::Post, "old", options)
        .await
        .expect("response");

    check!(response.status() == 200);
    check!(response.text().ok().as_deref() == Some("moved"));
    check!(
        response.headers().get_all(REDIRECT_HISTORY_HEADER)
            == vec![
                format!("{}/middle", server.uri()),
                format!("{}/new", server.uri())
            ]
    );
    check!(response.headers().get_all(REDIRECT_STATUS_HISTORY_HEADER) == vec!["302", "301"]);
}

#[tokio::test]
async fn too_many_redirects() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/loop"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/loop"))
        .mount(&server)
        .await;

    let options = Options::default().with_allow_redirects(RedirectOptions::default().max(2));
    let_assert!(
        Err(Error::TooManyRedirects { count, max, .. }) = client_for(&server)
            .request(Method::Get, "loop", options)
            .await
    );
    check!(count == 3);
    check!(max == 2);
}

#[tokio::test]
async fn cookies_survive_redirects() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", "/home")
                .insert_header("Set-Cookie", "session=abc123; Path=/; HttpOnly"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/home"))
        .and(header("Cookie", "session=abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_string("welcome"))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::builder()
        .base_uri(format!("{}/", server.uri()))
        .cookies(true)
        .build()
        .expect("client");
    let response = client.get("login").await.expect("response");

    check!(response.text().ok().as_deref() == Some("welcome"));
    let_assert!(Some(jar) = client.cookie_jar());
    check!(jar.get("session").map(|c| c.value().to_string()) == Some("abc123".to_string()));
}

#[tokio::test]
async fn timeout_option() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let options = Options::default().with_timeout(Duration::from_millis(100));
    let_assert!(
        Err(err) = client_for(&server)
            .request(Method::Get, "slow", options)
            .await
    );
    check!(err.is_timeout());
    check!(err.request().map(|r| r.url().path().to_string()) == Some("/slow".to_string()));
}

#[tokio::test]
async fn connection_refused() {
    let client = Client::new();
    let url = url::Url::parse("http://127.0.0.1:1/").expect("url");

    let_assert!(Err(err) = client.send(Request::new(Method::Get, url), Options::default()).await);
    check!(err.is_connection());
    check!(err.request().is_some());
}

#[tokio::test]
async fn sink_receives_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("saved to disk"))
        .mount(&server)
        .await;

    let sink = std::env::temp_dir().join(format!("sheaf-sink-{}.txt", std::process::id()));
    let options = Options::default().with_sink(&sink);
    let response = client_for(&server)
        .request(Method::Get, "file", options)
        .await
        .expect("response");

    check!(response.status() == 200);
    let written = tokio::fs::read_to_string(&sink).await.expect("sink");
    check!(written == "saved to disk");
    tokio::fs::remove_file(&sink).await.expect("cleanup");
}

#[tokio::test]
async fn streamed_body_is_chunked() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/upload"))
        .and(header("Transfer-Encoding", "chunked"))
        .and(body_string("hello world"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let chunks = futures_util::stream::iter(vec![
        Ok::<_, std::io::Error>(bytes::Bytes::from("hello ")),
        Ok(bytes::Bytes::from("world")),
    ]);
    let options = Options::default()
        .with_body(sheaf::Body::from_stream(chunks, None))
        .with_expect(false);
    let response = client_for(&server)
        .request(Method::Put, "upload", options)
        .await
        .expect("response");

    check!(response.status() == 200);
}
