//! Story fixtures and mock server setup

use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// The four chapters served by the fixture story
pub const CHAPTERS: [(&str, &str); 4] = [
    ("chapter1", "1. Humpty Dumpty sat on a wall,"),
    ("chapter2", "2. Humpty Dumpty had a great fall;"),
    ("chapter3", "3. All the king's horses and all the king's men"),
    ("chapter4", "4. Couldn't put Humpty together again."),
];

/// Chapter ids of the fixture story
pub fn chapter_ids() -> Vec<&'static str> {
    CHAPTERS.iter().map(|(id, _)| *id).collect()
}

/// Serve the story document after `delay`
pub async fn mount_story(server: &MockServer, serial: Option<bool>, delay: Duration) {
    let mut body = serde_json::json!({
        "title": "My Story",
        "chapters": chapter_ids(),
    });
    if let Some(serial) = serial {
        body["serial"] = serde_json::Value::Bool(serial);
    }

    Mock::given(method("GET"))
        .and(path("/story"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body.to_string())
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

/// Serve a 404 with an error document for the story
pub async fn mount_missing_story(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/story"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(serde_json::json!({ "error": "story not found" })),
        )
        .mount(server)
        .await;
}

/// Serve every fixture chapter, each after its own delay (milliseconds)
pub async fn mount_chapters(server: &MockServer, delays_ms: [u64; 4]) {
    for ((id, text), delay) in CHAPTERS.iter().zip(delays_ms) {
        Mock::given(method("GET"))
            .and(path("/chapter"))
            .and(query_param("id", *id))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "id": id, "text": text }))
                    .set_delay(Duration::from_millis(delay)),
            )
            .mount(server)
            .await;
    }
}

/// Serve a 404 for one chapter, taking precedence over [`mount_chapters`]
pub async fn mount_missing_chapter(server: &MockServer, id: &str) {
    Mock::given(method("GET"))
        .and(path("/chapter"))
        .and(query_param("id", id))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(serde_json::json!({ "error": format!("{id} not found") })),
        )
        .with_priority(1)
        .mount(server)
        .await;
}

/// Ids of the chapters requested from the server, in arrival order
pub async fn requested_chapters(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == "/chapter")
        .filter_map(|r| {
            r.url
                .query_pairs()
                .find(|(k, _)| k == "id")
                .map(|(_, v)| v.into_owned())
        })
        .collect()
}
