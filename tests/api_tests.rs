use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};

use filmorate_api::db::MemoryStore;
use filmorate_api::routes::{create_router, AppState};

async fn create_test_server() -> TestServer {
    let state = AppState::new(Arc::new(MemoryStore::new()), None, 60)
        .await
        .unwrap();
    TestServer::new(create_router(state)).unwrap()
}

async fn create_user(server: &TestServer, login: &str) -> i64 {
    let response = server
        .post("/api/v1/users")
        .json(&json!({
            "email": format!("{}@example.com", login),
            "login": login,
            "birthday": "1990-01-01"
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json::<Value>()["id"].as_i64().unwrap()
}

async fn create_film(server: &TestServer, name: &str, year: i32, directors: &[i64]) -> i64 {
    let response = server
        .post("/api/v1/films")
        .json(&json!({
            "name": name,
            "description": "",
            "release_date": format!("{}-06-01", year),
            "duration": 100,
            "mpa": "PG-13",
            "genres": ["DRAMA"],
            "director_ids": directors
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json::<Value>()["id"].as_i64().unwrap()
}

fn ids(body: &Value) -> Vec<i64> {
    body.as_array()
        .unwrap()
        .iter()
        .map(|item| item["id"].as_i64().unwrap())
        .collect()
}

#[tokio::test]
async fn test_health_check() {
    let server = create_test_server().await;
    let response = server.get("/health").await;
    response.assert_status_ok();
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_friend_request_then_confirmation() {
    let server = create_test_server().await;
    let a = create_user(&server, "alice").await;
    let b = create_user(&server, "bob").await;

    let response = server.put(&format!("/api/v1/users/{}/friends/{}", a, b)).await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["confirmed"], false);

    let friends = server.get(&format!("/api/v1/users/{}/friends", a)).await;
    assert_eq!(ids(&friends.json()), vec![b]);
    let friends = server.get(&format!("/api/v1/users/{}/friends", b)).await;
    assert!(ids(&friends.json()).is_empty());

    let response = server.put(&format!("/api/v1/users/{}/friends/{}", b, a)).await;
    assert_eq!(response.json::<Value>()["confirmed"], true);

    let friends = server.get(&format!("/api/v1/users/{}/friends", b)).await;
    assert_eq!(ids(&friends.json()), vec![a]);

    let feed: Value = server.get(&format!("/api/v1/users/{}/feed", a)).await.json();
    assert_eq!(feed[0]["eventType"], "FRIEND");
    assert_eq!(feed[0]["operation"], "ADD");
    assert_eq!(feed[0]["entityId"], b);

    server
        .delete(&format!("/api/v1/users/{}/friends/{}", a, b))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    let friends = server.get(&format!("/api/v1/users/{}/friends", b)).await;
    assert!(ids(&friends.json()).is_empty());
}

#[tokio::test]
async fn test_friendship_errors() {
    let server = create_test_server().await;
    let a = create_user(&server, "alice").await;

    server
        .put(&format!("/api/v1/users/{}/friends/{}", a, a))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    server
        .put(&format!("/api/v1/users/{}/friends/999", a))
        .await
        .assert_status(StatusCode::NOT_FOUND);
    server
        .get("/api/v1/users/999/feed")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_popular_films() {
    let server = create_test_server().await;
    let users = [
        create_user(&server, "u1").await,
        create_user(&server, "u2").await,
        create_user(&server, "u3").await,
    ];
    let one = create_film(&server, "One", 2001, &[]).await;
    let two = create_film(&server, "Two", 2002, &[]).await;
    let three = create_film(&server, "Three", 2003, &[]).await;

    for user in &users {
        server
            .put(&format!("/api/v1/films/{}/like/{}", two, user))
            .await
            .assert_status_ok();
    }
    server
        .put(&format!("/api/v1/films/{}/like/{}?score=9", three, users[0]))
        .await
        .assert_status_ok();

    let popular: Value = server.get("/api/v1/films/popular?count=2").await.json();
    assert_eq!(ids(&popular), vec![two, three]);

    let popular: Value = server.get("/api/v1/films/popular?year=2001").await.json();
    assert_eq!(ids(&popular), vec![one]);

    server
        .get("/api/v1/films/popular?count=0")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    server
        .get("/api/v1/films/popular?genreId=99")
        .await
        .assert_status(StatusCode::NOT_FOUND);
    server
        .put(&format!("/api/v1/films/{}/like/{}?score=11", one, users[0]))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_director_films() {
    let server = create_test_server().await;
    let response = server
        .post("/api/v1/directors")
        .json(&json!({ "name": "Michael Mann" }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let director = response.json::<Value>()["id"].as_i64().unwrap();

    let later = create_film(&server, "Heat", 1995, &[director]).await;
    let earlier = create_film(&server, "Thief", 1981, &[director]).await;

    let films: Value = server
        .get(&format!("/api/v1/films/director/{}?sortBy=year", director))
        .await
        .json();
    assert_eq!(ids(&films), vec![earlier, later]);

    server
        .get(&format!("/api/v1/films/director/{}", director))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    server
        .get(&format!("/api/v1/films/director/{}?sortBy=rating", director))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    server
        .delete(&format!("/api/v1/directors/{}", director))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    server
        .get(&format!("/api/v1/films/director/{}?sortBy=year", director))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_recommendations_and_common_films() {
    let server = create_test_server().await;
    let a = create_user(&server, "a").await;
    let b = create_user(&server, "b").await;
    let c = create_user(&server, "c").await;
    let mut films = Vec::new();
    for i in 1..=4 {
        films.push(create_film(&server, &format!("Film {}", i), 2000 + i, &[]).await);
    }

    let likes: [(i64, &[usize]); 3] = [(a, &[0, 1, 2]), (b, &[1, 2, 3]), (c, &[1])];
    for (user, liked) in likes {
        for index in liked {
            server
                .put(&format!("/api/v1/films/{}/like/{}", films[*index], user))
                .await
                .assert_status_ok();
        }
    }

    let recommended: Value = server
        .get(&format!("/api/v1/users/{}/recommendations", a))
        .await
        .json();
    assert_eq!(ids(&recommended), vec![films[3]]);

    let common: Value = server
        .get(&format!("/api/v1/films/common?userId={}&friendId={}", a, b))
        .await
        .json();
    // films[1] has three likes, films[2] two
    assert_eq!(ids(&common), vec![films[1], films[2]]);
}

#[tokio::test]
async fn test_reviews() {
    let server = create_test_server().await;
    let author = create_user(&server, "author").await;
    let reader = create_user(&server, "reader").await;
    let film = create_film(&server, "Ran", 1985, &[]).await;

    let response = server
        .post("/api/v1/reviews")
        .json(&json!({
            "content": "Epic",
            "user_id": author,
            "film_id": film,
            "is_positive": true
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let review = response.json::<Value>()["id"].as_i64().unwrap();

    server
        .put(&format!("/api/v1/reviews/{}/like/{}", review, reader))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    server
        .put(&format!("/api/v1/reviews/{}/like/{}", review, author))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let fetched: Value = server.get(&format!("/api/v1/reviews/{}", review)).await.json();
    assert_eq!(fetched["useful"], 1);

    let listed: Value = server
        .get(&format!("/api/v1/reviews?filmId={}&count=5", film))
        .await
        .json();
    assert_eq!(ids(&listed), vec![review]);

    server
        .delete(&format!("/api/v1/reviews/{}", review))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    server
        .get(&format!("/api/v1/reviews/{}", review))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let feed: Value = server.get(&format!("/api/v1/users/{}/feed", author)).await.json();
    let operations: Vec<&str> = feed
        .as_array()
        .unwrap()
        .iter()
        .map(|event| event["operation"].as_str().unwrap())
        .collect();
    assert_eq!(operations, vec!["ADD", "REMOVE"]);
}
