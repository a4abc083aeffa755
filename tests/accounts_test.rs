//! Registration, login, approval and admin management over HTTP.

mod common;

use axum::http::{header, Method, Request, StatusCode};
use common::{TestApp, MAIN_ADMIN_EMAIL};
use serde_json::json;

#[tokio::test]
async fn health_check() {
    let app = TestApp::new();
    let res = app.get("/health", None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body, "ok");
}

#[tokio::test]
async fn registration_waits_for_approval() {
    let app = TestApp::new();

    let res = app.register("Asha", "Asha@Example.com", "9000000001").await;
    assert_eq!(res.status, StatusCode::OK);
    let user = res.json();
    assert_eq!(user["email"], "asha@example.com");
    assert_eq!(user["username"], "Asha");
    assert_eq!(user["approvalStatus"], "PENDING");
    assert_eq!(user["active"], false);
    assert!(user.get("passwordHash").is_none());

    let res = app
        .login("/api/auth/login", "asha@example.com", "user-pass")
        .await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(res.body, "User not approved or inactive");

    let res = app.login("/api/auth/login", "asha@example.com", "nope").await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body, "Invalid email or password");
}

#[tokio::test]
async fn duplicate_and_missing_fields_are_rejected() {
    let app = TestApp::new();
    assert_eq!(
        app.register("Asha", "asha@example.com", "9000000001").await.status,
        StatusCode::OK
    );

    let res = app.register("Other", "ASHA@example.com", "9000000002").await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body, "Email already exists");

    let res = app.register("Other", "other@example.com", "9000000001").await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body, "Mobile number already exists");

    let res = app
        .call(
            Method::POST,
            "/api/users/register",
            None,
            Some(json!({"name": "X", "email": "x@example.com", "mobileNumber": "1"})),
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body, "Password is required");
}

#[tokio::test]
async fn approved_user_logs_in_and_reads_own_profile() {
    let app = TestApp::new();
    let (id, token) = app
        .approved_user("Ravi", "ravi@example.com", "9000000003")
        .await;

    let res = app.get(&format!("/api/users/{}", id), Some(&token)).await;
    assert_eq!(res.status, StatusCode::OK);
    let user = res.json();
    assert_eq!(user["approvalStatus"], "APPROVED");
    assert_eq!(user["active"], true);
    assert!(user["expiryDate"].is_string());

    let (other, _) = app
        .approved_user("Meena", "meena@example.com", "9000000004")
        .await;
    let res = app.get(&format!("/api/users/{}", other), Some(&token)).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    let res = app.get("/api/users", Some(&token)).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(
        app.get("/api/users", None).await.status,
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn login_sets_cookie_that_authenticates() {
    let app = TestApp::new();
    let (id, _) = app
        .approved_user("Ravi", "ravi@example.com", "9000000003")
        .await;

    let res = app
        .login("/api/auth/login", "ravi@example.com", "user-pass")
        .await;
    let cookie = res.set_cookie.expect("login sets a cookie");
    assert!(cookie.starts_with("jwt="));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Strict"));

    let pair = cookie.split(';').next().unwrap().to_string();
    let req = Request::builder()
        .uri(format!("/api/users/{}", id))
        .header(header::COOKIE, pair)
        .body(axum::body::Body::empty())
        .unwrap();
    assert_eq!(app.send(req).await.status, StatusCode::OK);

    let res = app.call(Method::POST, "/api/auth/logout", None, None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.set_cookie.unwrap().contains("Max-Age=0"));
}

#[tokio::test]
async fn rejected_user_cannot_log_in() {
    let app = TestApp::new();
    let id = app
        .register("Kiran", "kiran@example.com", "9000000005")
        .await
        .json()["id"]
        .as_str()
        .unwrap()
        .to_string();
    let admin = app.main_admin_token().await;

    let res = app.get("/api/admin/users/pending", Some(&admin)).await;
    assert_eq!(res.json().as_array().unwrap().len(), 1);

    let req = Request::builder()
        .method(Method::POST)
        .uri(format!("/api/admin/users/{}/reject", id))
        .header(header::AUTHORIZATION, format!("Bearer {}", admin))
        .body(axum::body::Body::from("Incomplete documents"))
        .unwrap();
    let res = app.send(req).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body, "User rejected");

    let res = app.get(&format!("/api/users/{}", id), Some(&admin)).await;
    assert_eq!(res.json()["approvalStatus"], "REJECTED");
    assert_eq!(res.json()["rejectionReason"], "Incomplete documents");

    let res = app
        .login("/api/auth/login", "kiran@example.com", "user-pass")
        .await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert!(app
        .get("/api/admin/users/pending", Some(&admin))
        .await
        .json()
        .as_array()
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn only_admins_move_membership_dates() {
    let app = TestApp::new();
    let (id, token) = app
        .approved_user("Ravi", "ravi@example.com", "9000000003")
        .await;
    let before = app.get(&format!("/api/users/{}", id), Some(&token)).await.json();

    let res = app
        .call(
            Method::PUT,
            &format!("/api/users/{}", id),
            Some(&token),
            Some(json!({"name": "Ravi K", "dateOfJoiningOrRenewal": "2020-01-01", "bloodGroup": "O+"})),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
    let after = res.json();
    assert_eq!(after["name"], "Ravi K");
    assert_eq!(after["username"], "Ravi K");
    assert_eq!(after["bloodGroup"], "O+");
    assert_eq!(after["dateOfJoiningOrRenewal"], before["dateOfJoiningOrRenewal"]);

    let admin = app.main_admin_token().await;
    let res = app
        .call(
            Method::PUT,
            &format!("/api/users/{}", id),
            Some(&admin),
            Some(json!({"dateOfJoiningOrRenewal": "2024-01-01"})),
        )
        .await;
    let updated = res.json();
    assert_eq!(updated["dateOfJoiningOrRenewal"], "2024-01-01");
    assert_eq!(updated["expiryDate"], "2024-12-30");
}

#[tokio::test]
async fn profile_image_replaces_previous_upload() {
    let app = TestApp::new();
    let (id, token) = app
        .approved_user("Ravi", "ravi@example.com", "9000000003")
        .await;
    let uri = format!("/api/users/{}/image", id);

    let first = app
        .upload(&uri, &token, Some(("me.png", "image/png", &b"png-1"[..])), None)
        .await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.json()["message"], "Uploaded");
    let first_id = first.json()["publicId"].as_str().unwrap().to_string();

    let second = app
        .upload(&uri, &token, Some(("me.jpg", "image/jpeg", &b"jpg-2"[..])), None)
        .await;
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(*app.media.deleted.lock().unwrap(), vec![first_id]);

    let user = app.get(&format!("/api/users/{}", id), Some(&token)).await.json();
    assert_eq!(user["imageUrl"], second.json()["imageUrl"]);
}

#[tokio::test]
async fn deleted_user_token_stops_working() {
    let app = TestApp::new();
    let (id, token) = app
        .approved_user("Ravi", "ravi@example.com", "9000000003")
        .await;

    let res = app
        .call(Method::DELETE, &format!("/api/users/{}", id), Some(&token), None)
        .await;
    assert_eq!(res.status, StatusCode::NO_CONTENT);
    assert_eq!(
        app.get(&format!("/api/users/{}", id), Some(&token)).await.status,
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn rejected_user_token_stops_working() {
    let app = TestApp::new();
    let (id, token) = app
        .approved_user("Ravi", "ravi@example.com", "9000000003")
        .await;
    let uri = format!("/api/users/{}", id);
    assert_eq!(app.get(&uri, Some(&token)).await.status, StatusCode::OK);

    let admin = app.main_admin_token().await;
    let req = Request::builder()
        .method(Method::POST)
        .uri(format!("/api/admin/users/{}/reject", id))
        .header(header::AUTHORIZATION, format!("Bearer {}", admin))
        .body(axum::body::Body::from("Membership revoked"))
        .unwrap();
    assert_eq!(app.send(req).await.status, StatusCode::OK);

    assert_eq!(app.get(&uri, Some(&token)).await.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn lapsed_membership_token_stops_working() {
    let app = TestApp::new();
    let (id, token) = app
        .approved_user("Ravi", "ravi@example.com", "9000000003")
        .await;
    let uri = format!("/api/users/{}", id);
    let admin = app.main_admin_token().await;

    let res = app
        .call(
            Method::PUT,
            &uri,
            Some(&admin),
            Some(json!({"dateOfJoiningOrRenewal": "2020-01-01"})),
        )
        .await;
    assert_eq!(res.json()["expiryDate"], "2020-12-30");
    assert_eq!(app.get(&uri, Some(&token)).await.status, StatusCode::OK);

    let res = app
        .call(Method::POST, "/api/admin/lifecycle/sweep", Some(&admin), None)
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["expiredMemberships"], 1);

    assert_eq!(app.get(&uri, Some(&token)).await.status, StatusCode::UNAUTHORIZED);
    let res = app.get(&uri, Some(&admin)).await.json();
    assert_eq!(res["active"], false);
}

#[tokio::test]
async fn admin_management_rules() {
    let app = TestApp::new();
    let main = app.main_admin_token().await;
    let (helper_id, helper) = app.ordinary_admin("helper@example.com").await;

    let res = app
        .call(
            Method::POST,
            "/api/admin/create",
            Some(&main),
            Some(json!({"name": "Dup", "email": "HELPER@example.com", "password": "x"})),
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body, "Admin email already exists");

    let res = app
        .call(
            Method::POST,
            "/api/admin/create",
            Some(&helper),
            Some(json!({"name": "Nope", "email": "nope@example.com", "password": "x"})),
        )
        .await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    let admins = app.get("/api/admin", Some(&helper)).await.json();
    let admins = admins.as_array().unwrap();
    assert_eq!(admins.len(), 2);
    assert_eq!(admins[0]["email"], MAIN_ADMIN_EMAIL);
    assert_eq!(admins[0]["mainAdmin"], true);
    let main_id = admins[0]["id"].as_str().unwrap().to_string();

    let res = app
        .call(
            Method::PUT,
            &format!("/api/admin/{}", main_id),
            Some(&helper),
            Some(json!({"name": "Hijack"})),
        )
        .await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(res.body, "Admins can only edit their own profile");

    let res = app
        .call(
            Method::PUT,
            &format!("/api/admin/{}", helper_id),
            Some(&helper),
            Some(json!({"name": "Helper Two"})),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["name"], "Helper Two");

    let res = app
        .call(Method::DELETE, &format!("/api/admin/{}", main_id), Some(&main), None)
        .await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(res.body, "Cannot delete MAIN_ADMIN. Transfer main admin first.");
}

#[tokio::test]
async fn transferring_main_admin_changes_roles_immediately() {
    let app = TestApp::new();
    let main = app.main_admin_token().await;
    let (helper_id, helper) = app.ordinary_admin("helper@example.com").await;

    let res = app
        .call(
            Method::PUT,
            &format!("/api/admin/main-admin/{}", helper_id),
            Some(&main),
            None,
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["mainAdmin"], true);

    // The old token still says MAIN_ADMIN, but the role is re-read per request.
    let res = app
        .call(
            Method::POST,
            "/api/admin/create",
            Some(&main),
            Some(json!({"email": "late@example.com", "password": "x"})),
        )
        .await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    let res = app
        .call(
            Method::POST,
            "/api/admin/create",
            Some(&helper),
            Some(json!({"email": "late@example.com", "password": "x"})),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);

    let res = app
        .call(
            Method::PUT,
            "/api/admin/main-admin/does-not-exist",
            Some(&helper),
            None,
        )
        .await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn ordinary_admin_may_delete_only_themselves() {
    let app = TestApp::new();
    let (first_id, first) = app.ordinary_admin("first@example.com").await;
    let (second_id, _) = app.ordinary_admin("second@example.com").await;

    let res = app
        .call(Method::DELETE, &format!("/api/admin/{}", second_id), Some(&first), None)
        .await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    let res = app
        .call(Method::DELETE, &format!("/api/admin/{}", first_id), Some(&first), None)
        .await;
    assert_eq!(res.status, StatusCode::NO_CONTENT);

    let main = app.main_admin_token().await;
    let res = app
        .call(Method::DELETE, &format!("/api/admin/{}", second_id), Some(&main), None)
        .await;
    assert_eq!(res.status, StatusCode::NO_CONTENT);
}
