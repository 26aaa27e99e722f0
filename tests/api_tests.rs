use hospital_portal::{
    AppConfig, AppState, MemoryRepository, MemorySessionStore, create_router,
    repository::RepositoryState, seed, session::SessionState,
};
use reqwest::{StatusCode, header};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Debug)]
pub struct TestApp {
    pub address: String,
}

async fn spawn_app() -> TestApp {
    let config = AppConfig::default();
    let repo = Arc::new(MemoryRepository::new());
    seed::seed_doctors(repo.as_ref())
        .await
        .expect("Failed to seed doctors in tests");

    let state = AppState {
        repo: repo as RepositoryState,
        sessions: Arc::new(MemorySessionStore::new(config.session_ttl)) as SessionState,
        config,
    };
    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp { address }
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

/// Raw `Set-Cookie` values of a response.
fn set_cookies(response: &reqwest::Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .map(str::to_string)
        .collect()
}

fn find_cookie<'a>(cookies: &'a [String], name: &str) -> &'a str {
    cookies
        .iter()
        .find(|cookie| cookie.starts_with(&format!("{name}=")))
        .unwrap_or_else(|| panic!("missing Set-Cookie for {name}"))
}

/// Folds `Set-Cookie` values into a `Cookie` request header, as a browser would.
fn cookie_header(cookies: &[String]) -> String {
    cookies
        .iter()
        .filter_map(|cookie| cookie.split(';').next())
        .collect::<Vec<_>>()
        .join("; ")
}

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app().await;

    let response = client()
        .get(format!("{}/health", app.address))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(response.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let app = spawn_app().await;

    let response = client()
        .get(format!("{}/api-docs/openapi.json", app.address))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let doc: serde_json::Value = response.json().await.unwrap();
    assert!(doc["paths"]["/login"].is_object());
    assert!(doc["paths"]["/admin/usuarios/{id}/eliminar"].is_object());
}

#[tokio::test]
async fn test_find_doctors_filters_by_name_and_specialty() {
    let app = spawn_app().await;

    let response = client()
        .get(format!("{}/find-doctors?nombre=ana&especialidad=Dermatolog%C3%ADa", app.address))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let page: serde_json::Value = response.json().await.unwrap();
    let doctors = page["doctores"].as_array().unwrap();
    assert_eq!(doctors.len(), 1);
    assert_eq!(doctors[0]["nombreCompleto"], "Dra. Ana García");
    assert_eq!(page["especialidades"].as_array().unwrap().len(), 5);
    assert!(page["sesion"].is_null());
}

/// Register, sign in as a `usuario`, bounce off the admin area, book and cancel,
/// then sign out and confirm the identity is gone.
#[tokio::test]
async fn test_usuario_session_lifecycle() {
    let app = spawn_app().await;
    let client = client();

    // 1. Register
    let response = client
        .post(format!("{}/registro", app.address))
        .json(&json!({
            "nombre": "Ana",
            "apellido": "López",
            "email": "ana.lopez@example.com",
            "password": "secreta123"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["usuario"]["rol"], "usuario");
    assert!(body["usuario"].get("password_hash").is_none());

    // 2. Login
    let response = client
        .post(format!("{}/login", app.address))
        .json(&json!({ "email": "ana.lopez@example.com", "password": "secreta123" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let issued = set_cookies(&response);
    for name in ["usuario_id", "usuario_nombre", "usuario_rol"] {
        let cookie = find_cookie(&issued, name);
        assert!(cookie.contains("HttpOnly"), "{cookie}");
        assert!(cookie.contains("Path=/"), "{cookie}");
        assert!(cookie.contains("Max-Age=3600"), "{cookie}");
    }
    assert!(find_cookie(&issued, "sessionId").contains("HttpOnly"));
    assert!(find_cookie(&issued, "usuario_rol").starts_with("usuario_rol=usuario;"));

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["mensaje"], "Inicio de sesión exitoso");
    assert_eq!(body["usuario"]["rol"], "usuario");
    assert_eq!(body["usuario"]["nombre"], "Ana");
    let cookies = cookie_header(&issued);

    // 3. Admin area is closed to a usuario
    let response = client
        .get(format!("{}/admin/manage-users", app.address))
        .header(header::COOKIE, &cookies)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/");

    let response = client
        .post(format!("{}/admin/doctores", app.address))
        .header(header::COOKIE, &cookies)
        .json(&json!({
            "nombreCompleto": "Dr. Falso",
            "especialidad": "Nada",
            "consultorio": "0",
            "email": "falso@hospital.com"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Acceso denegado");

    // 4. Book and cancel
    let response = client
        .post(format!("{}/citas", app.address))
        .header(header::COOKIE, &cookies)
        .json(&json!({
            "doctor": "Dr. Juan Pérez",
            "fecha": "2030-01-15",
            "hora": "09:30",
            "motivo": "Revisión"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["cita"]["estado"], "Pendiente");
    let cita_id = body["cita"]["id"].as_str().unwrap().to_string();

    let response = client
        .get(format!("{}/dashboard", app.address))
        .header(header::COOKIE, &cookies)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let page: serde_json::Value = response.json().await.unwrap();
    assert_eq!(page["citasPendientes"].as_array().unwrap().len(), 1);

    let response = client
        .delete(format!("{}/citas/{}", app.address, cita_id))
        .header(header::COOKIE, &cookies)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // 5. Logout clears every session cookie
    let response = client
        .get(format!("{}/logout", app.address))
        .header(header::COOKIE, &cookies)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/");
    let cleared = set_cookies(&response);
    for name in ["usuario_id", "usuario_nombre", "usuario_rol", "sessionId"] {
        assert!(find_cookie(&cleared, name).contains("Max-Age=0"));
    }

    // 6. Without cookies the next request is unauthenticated
    let response = client
        .get(format!("{}/me", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "No autorizado");

    // The destroyed server session no longer resolves either.
    let session_only = cookie_header(&[find_cookie(&issued, "sessionId").to_string()]);
    let response = client
        .get(format!("{}/me", app.address))
        .header(header::COOKIE, session_only)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_manages_users_but_not_itself() {
    let app = spawn_app().await;
    let client = client();

    for (name, email) in [("Marta", "marta@example.com"), ("Luis", "luis@example.com")] {
        let response = client
            .post(format!("{}/registro", app.address))
            .json(&json!({ "nombre": name, "apellido": "Ruiz", "email": email, "password": "clave" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = client
        .get(format!("{}/setup-admin/marta@example.com", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = client
        .post(format!("{}/login", app.address))
        .json(&json!({ "email": "marta@example.com", "password": "clave" }))
        .send()
        .await
        .unwrap();
    let cookies = cookie_header(&set_cookies(&response));
    let admin: serde_json::Value = response.json().await.unwrap();
    assert_eq!(admin["usuario"]["rol"], "admin");
    let admin_id = admin["usuario"]["id"].as_str().unwrap().to_string();

    let response = client
        .get(format!("{}/admin/manage-users", app.address))
        .header(header::COOKIE, &cookies)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let page: serde_json::Value = response.json().await.unwrap();
    let users = page["usuarios"].as_array().unwrap();
    let luis_id = users
        .iter()
        .find(|user| user["email"] == "luis@example.com")
        .and_then(|user| user["id"].as_str())
        .unwrap()
        .to_string();

    let response = client
        .post(format!("{}/admin/usuarios/{}/remover-admin", app.address, admin_id))
        .header(header::COOKIE, &cookies)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "No puedes cambiar tu propio rol");

    let response = client
        .post(format!("{}/admin/usuarios/{}/promover-admin", app.address, luis_id))
        .header(header::COOKIE, &cookies)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["usuario"]["rol"], "admin");

    let response = client
        .get(format!("{}/setup-admin/luis@example.com", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
