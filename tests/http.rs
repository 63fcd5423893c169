#![cfg(feature = "web")]

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use orgchart::app::{AppState, build_router};
use orgchart::config::AppConfig;
use orgchart::loader::from_workbook;
use rust_xlsxwriter::Workbook;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const PASSWORD: &str = "segredo-rh";
const BOUNDARY: &str = "orgchart-test-boundary";

const ORG_CSV: &str = "Id Contratado,ID Gestor,Nome Completo,Cargo,Grade,Valor do Salário,Diretoria\n\
1,,Ana,CEO,G1,1000,Presidência\n\
2,1,Bruno,VP,G1,1500,Tecnologia\n\
3,2,Carla,Engenheira,G1,2000,Tecnologia\n";

const GRADES_CSV: &str = "Grade,Inicial,Valor Máximo\nG1,1000,2000\n";

fn bundled_org() -> Vec<u8> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (c, h) in ["Id Contratado", "ID Gestor", "Nome Completo", "Diretoria"].iter().enumerate() {
        sheet.write_string(0, c as u16, *h).unwrap();
    }
    let rows = [
        ("10", "", "Diretora Geral", "Presidência"),
        ("11", "10", "Vendedor Norte", "Comercial"),
        ("12", "10", "Vendedor Sul", "Comercial"),
    ];
    for (r, (id, parent, name, directorate)) in rows.iter().enumerate() {
        let row = (r + 1) as u32;
        sheet.write_string(row, 0, *id).unwrap();
        if !parent.is_empty() {
            sheet.write_string(row, 1, *parent).unwrap();
        }
        sheet.write_string(row, 2, *name).unwrap();
        sheet.write_string(row, 3, *directorate).unwrap();
    }
    workbook.save_to_buffer().unwrap()
}

fn bundled_grades() -> Vec<u8> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(0, 0, "Grade").unwrap();
    sheet.write_string(0, 1, "Inicial").unwrap();
    sheet.write_string(0, 2, "Valor Máximo").unwrap();
    sheet.write_string(1, 0, "G1").unwrap();
    sheet.write_number(1, 1, 1000).unwrap();
    sheet.write_number(1, 2, 2000).unwrap();
    workbook.save_to_buffer().unwrap()
}

async fn setup() -> (Router, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let bundled = dir.path().join("bundled");
    std::fs::create_dir_all(&bundled).unwrap();
    std::fs::write(bundled.join("organograma-dados.xlsx"), bundled_org()).unwrap();
    std::fs::write(bundled.join("grades-info.xlsx"), bundled_grades()).unwrap();

    let vars: HashMap<&str, String> = HashMap::from([
        ("ADMIN_PASSWORD", PASSWORD.to_string()),
        ("DATA_DIR", dir.path().join("db").display().to_string()),
        ("BUNDLED_DATA_DIR", bundled.display().to_string()),
        ("MAX_UPLOAD_BYTES", "4000".to_string()),
    ]);
    let config = AppConfig::from_lookup(|key| vars.get(key).cloned()).unwrap();
    let state = Arc::new(AppState::new(config).await.unwrap());
    (build_router(state), dir)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn get(app: &Router, uri: &str, cookie: Option<&str>) -> axum::response::Response {
    let mut request = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        request = request.header(header::COOKIE, cookie);
    }
    app.clone()
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn login(app: &Router, password: &str) -> axum::response::Response {
    let request = Request::builder()
        .method("POST")
        .uri("/api/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "password": password }).to_string()))
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

async fn session_cookie(app: &Router) -> String {
    let response = login(app, PASSWORD).await;
    assert_eq!(response.status(), StatusCode::OK);
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

fn multipart(files: &[(&str, &str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (field, file_name, bytes) in files {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                BOUNDARY, field, file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

async fn upload(app: &Router, cookie: Option<&str>, files: &[(&str, &str, &[u8])]) -> axum::response::Response {
    let mut request = Request::builder()
        .method("POST")
        .uri("/api/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        );
    if let Some(cookie) = cookie {
        request = request.header(header::COOKIE, cookie);
    }
    app.clone()
        .oneshot(request.body(Body::from(multipart(files))).unwrap())
        .await
        .unwrap()
}

#[tokio::test]
async fn health_reports_version() {
    let (app, _dir) = setup().await;
    let response = get(&app, "/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["ok"], json!(true));
}

#[tokio::test]
async fn dashboard_requires_login() {
    let (app, _dir) = setup().await;

    let response = get(&app, "/admin/dashboard", None).await;
    assert!(response.status().is_redirection());
    assert_eq!(response.headers()[header::LOCATION], "/admin/login");

    let wrong = login(&app, "errada").await;
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(wrong).await["message"], json!("Senha inválida"));

    let cookie = session_cookie(&app).await;
    assert!(cookie.starts_with("auth_token="));
    let response = get(&app, "/admin/dashboard", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = get(&app, "/api/logout", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = get(&app, "/admin/dashboard", Some(&cookie)).await;
    assert!(response.status().is_redirection());
}

#[tokio::test]
async fn chart_uses_bundled_defaults_and_flags_ambiguous_directorates() {
    let (app, _dir) = setup().await;

    let urls = body_json(get(&app, "/api/data-urls", None).await).await;
    assert_eq!(urls, json!({ "orgDataUrl": null, "gradesDataUrl": null }));

    let chart = body_json(get(&app, "/api/chart", None).await).await;
    assert_eq!(chart["activeFilter"], json!("Geral"));
    assert_eq!(chart["nodes"].as_array().unwrap().len(), 3);
    assert_eq!(chart["directorates"], json!(["Geral", "Comercial", "Presidência"]));
    assert_eq!(chart["warning"], Value::Null);
    assert_eq!(chart["mapping"]["id"], json!("Id Contratado"));

    let filtered = body_json(get(&app, "/api/chart?directorate=Comercial", None).await).await;
    assert_eq!(filtered["activeFilter"], json!("Comercial"));
    assert!(filtered["nodes"].as_array().unwrap().is_empty());
    assert!(filtered["warning"].as_str().unwrap().contains("Comercial"));
}

#[tokio::test]
async fn upload_is_rejected_without_session_or_files() {
    let (app, _dir) = setup().await;
    let files: [(&str, &str, &[u8]); 2] = [
        ("organogramData", "org.csv", ORG_CSV.as_bytes()),
        ("gradesData", "grades.csv", GRADES_CSV.as_bytes()),
    ];

    let response = upload(&app, None, &files).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["message"], json!("Não autorizado"));

    let cookie = session_cookie(&app).await;
    let response = upload(&app, Some(&cookie), &files[..1]).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["message"], json!("Arquivos ausentes"));

    let big = vec![b'x'; 5000];
    let response = upload(
        &app,
        Some(&cookie),
        &[("organogramData", "org.csv", big.as_slice()), files[1]],
    )
    .await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let response = upload(
        &app,
        Some(&cookie),
        &[("organogramData", "org.xlsx", &b"not a workbook"[..]), files[1]],
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn invalid_upload_keeps_current_data() {
    let (app, _dir) = setup().await;
    let cookie = session_cookie(&app).await;

    let two_roots = "Id Contratado,ID Gestor,Nome Completo\n1,,Ana\n2,,Bruno\n3,9,Carla\n";
    let response = upload(
        &app,
        Some(&cookie),
        &[
            ("organogramData", "org.csv", two_roots.as_bytes()),
            ("gradesData", "grades.csv", GRADES_CSV.as_bytes()),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = body_json(response).await;
    assert_eq!(body["success"], json!(false));
    let errors: Vec<&str> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e.as_str().unwrap())
        .collect();
    assert!(errors.iter().any(|e| e.contains("Linha 4")));
    assert!(errors.iter().any(|e| e.contains("2 funcionários raiz")));

    let urls = body_json(get(&app, "/api/data-urls", None).await).await;
    assert_eq!(urls["orgDataUrl"], Value::Null);
}

#[tokio::test]
async fn upload_replaces_chart_data() {
    let (app, _dir) = setup().await;
    let cookie = session_cookie(&app).await;

    let response = upload(
        &app,
        Some(&cookie),
        &[
            ("organogramData", "org.csv", ORG_CSV.as_bytes()),
            ("gradesData", "grades.csv", GRADES_CSV.as_bytes()),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["orgUrl"], json!("/data/org?version=1"));
    assert_eq!(body["gradesVersion"], json!(1));

    let urls = body_json(get(&app, "/api/data-urls", None).await).await;
    assert_eq!(urls["gradesDataUrl"], json!("/data/grades?version=1"));

    let raw = get(&app, "/data/org?version=1", None).await;
    assert_eq!(raw.status(), StatusCode::OK);
    let bytes = to_bytes(raw.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], ORG_CSV.as_bytes());
    assert_eq!(get(&app, "/data/org?version=7", None).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(get(&app, "/data/salaries", None).await.status(), StatusCode::NOT_FOUND);

    let chart = body_json(get(&app, "/api/chart?directorate=Tecnologia", None).await).await;
    let nodes = chart["nodes"].as_array().unwrap();
    assert_eq!(nodes.len(), 2);
    assert_eq!(nodes[0]["Nome Completo"], json!("Bruno"));
    assert_eq!(nodes[0]["ID Gestor"], Value::Null);
    assert_eq!(nodes[1]["Percentual na Faixa"], json!(120.0));

    let card = body_json(get(&app, "/api/employees/3", None).await).await;
    let values: Vec<&str> = card
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["value"].as_str().unwrap())
        .collect();
    assert_eq!(values, vec!["Carla", "Engenheira", "G1", "R$ 2.000,00", "120.0%"]);
    assert_eq!(get(&app, "/api/employees/99", None).await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn export_downloads_current_view() {
    let (app, _dir) = setup().await;

    let response = get(&app, "/api/export?format=csv&directorate=Geral", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .contains("organograma-geral.csv")
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let csv = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(csv.starts_with("Id Contratado,ID Gestor,Nome Completo,Diretoria"));
    assert_eq!(csv.lines().count(), 4);

    let response = get(&app, "/api/export", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let sheet = from_workbook(&bytes).unwrap();
    assert_eq!(sheet.rows.len(), 3);

    let response = get(&app, "/api/export?format=pdf", None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
