use serde_json::{json, Value};
use tweb::http::{Body, Codes};
use tweb::token::TokenIssuer;
use tweb::{Method, Request, Response, Router, ServerError};

fn body(response: &Response) -> Value {
    serde_json::from_str(&response.body).unwrap()
}

fn sample_router() -> Router {
    let mut router = Router::new();
    router.get("/", |_req| async { Ok(Response::text("home")) });
    router.post("/echo", |req: Request| async move {
        let data: Value = req
            .body
            .json()
            .ok_or_else(|| ServerError::BadRequest("json required".into()))?;
        Response::success("ok", &data)
    });
    router
        .register_module("user", "/user")
        .route(Method::GET, &["/list", "^/users"], &["/v1", "/v2"], |_req| async {
            Response::success("list", &json!([1, 2]))
        })
        .get("/:id", |req: Request| async move {
            let id = req.get_param("id").unwrap_or_default().to_owned();
            Response::success("detail", &json!({ "id": id, "q": req.get_query("q") }))
        });
    router
        .register_module("admin", "/admin")
        .post("/reset", |_req| async { Ok(Response::no_content()) });
    router
}

#[test]
fn loading_handlers_lists_modules_then_public() {
    let router = sample_router();
    let urls = |name, public| -> Vec<String> {
        router
            .loading_handlers(name, public)
            .into_iter()
            .map(|(url, method)| format!("{} {}", method.as_str(), url))
            .collect()
    };

    assert_eq!(
        urls(Some("user"), false),
        vec![
            "GET /user/v1/list",
            "GET /user/v2/list",
            "GET /users",
            "GET /user/:id",
        ]
    );
    assert_eq!(urls(Some("admin"), true), vec!["POST /admin/reset", "GET /", "POST /echo"]);
    assert_eq!(urls(None, false).len(), 5);
    assert!(urls(Some("missing"), false).is_empty());
}

#[tokio::test]
async fn dispatches_exact_and_dynamic_paths() {
    let router = sample_router();

    let home = router.handle(Request::new(Method::GET, "/")).await.unwrap();
    assert_eq!(home.body, "home");

    let list = router.handle(Request::new(Method::GET, "/user/v2/list/")).await.unwrap();
    assert_eq!(body(&list)["data"], json!([1, 2]));

    let special = router.handle(Request::new(Method::GET, "/users")).await.unwrap();
    assert_eq!(body(&special)["msg"], json!("list"));

    let detail = router.handle(Request::new(Method::GET, "/user/42?q=x")).await.unwrap();
    assert_eq!(body(&detail)["data"], json!({ "id": "42", "q": "x" }));
}

#[tokio::test]
async fn unknown_paths_and_methods() {
    let router = sample_router();

    let missing = router.handle(Request::new(Method::GET, "/nope")).await;
    assert!(matches!(missing, Err(ServerError::NotFound)));

    let wrong = router.handle(Request::new(Method::DELETE, "/echo")).await.unwrap();
    assert_eq!(wrong.status, 405);
    assert_eq!(wrong.headers["Allow"], "POST");
}

#[tokio::test]
async fn head_falls_back_to_get_without_body() {
    let router = sample_router();
    let response = router.handle(Request::new(Method::HEAD, "/users")).await.unwrap();
    assert_eq!(response.status, 200);
    assert!(response.body.is_empty());
    assert_eq!(response.headers["Content-Type"], "application/json");
}

#[tokio::test]
async fn handler_errors_propagate() {
    let router = sample_router();

    let bad = router
        .handle(Request::new(Method::POST, "/echo").with_body(Body::form("a=1")))
        .await;
    assert!(matches!(bad, Err(ServerError::BadRequest(_))));

    let ok = router
        .handle(Request::new(Method::POST, "/echo").with_body(Body::json_bytes(r#"{"a": 1}"#)))
        .await
        .unwrap();
    assert_eq!(body(&ok), json!({ "code": Codes::SUCCESS, "msg": "ok", "data": { "a": 1 } }));
}

#[tokio::test]
async fn plugins_reach_handlers() {
    let mut router = Router::new();
    router.plugin(TokenIssuer::new("secret"));
    router.get("/me", |req: Request| async move {
        let issuer = req
            .plugins
            .get::<TokenIssuer>()
            .ok_or_else(|| ServerError::InternalError("no issuer".into()))?;
        let status = issuer.get_token(req.token(issuer.header_name()).unwrap_or_default());
        if !status.state {
            return Response::failure(Codes::INVALID_TOKEN, status.msg, &Value::Null);
        }
        Response::success(status.msg, &status.data)
    });

    let anonymous = router.handle(Request::new(Method::GET, "/me")).await.unwrap();
    assert_eq!(body(&anonymous)["code"], json!(Codes::INVALID_TOKEN));
    assert_eq!(body(&anonymous)["msg"], json!("Login timed out, please log in again"));

    let mut claims = serde_json::Map::new();
    claims.insert("uid".into(), json!(9));
    let token = TokenIssuer::new("secret").create_token(60, claims).unwrap();
    let signed_in = router
        .handle(Request::new(Method::GET, "/me").with_header("X-Token", &token))
        .await
        .unwrap();
    assert_eq!(body(&signed_in)["data"]["uid"], json!(9));
}

#[tokio::test]
async fn cors_headers_follow_the_config() {
    let config: tweb::config::Config = "[setting]\ncors = True\n".parse().unwrap();
    let mut router = sample_router();
    if let Some(origin) = config.cors_origin() {
        router.cors(&origin);
    }

    let home = router.handle(Request::new(Method::GET, "/")).await.unwrap();
    assert_eq!(home.headers["Access-Control-Allow-Origin"], "*");
    assert!(home.headers["Access-Control-Allow-Headers"].contains("X-Token"));

    let preflight = router.handle(Request::new(Method::OPTIONS, "/echo")).await.unwrap();
    assert_eq!(preflight.status, 204);
    assert_eq!(preflight.headers["Access-Control-Allow-Methods"], "GET,POST,PUT,DELETE,OPTIONS");

    let plain = sample_router().handle(Request::new(Method::GET, "/")).await.unwrap();
    assert!(!plain.headers.contains_key("Access-Control-Allow-Origin"));
    let refused = sample_router().handle(Request::new(Method::OPTIONS, "/echo")).await.unwrap();
    assert_eq!(refused.status, 405);
}
