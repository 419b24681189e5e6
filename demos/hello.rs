//! Dispatches a few requests through the route registry.
//!
//! There is no socket loop here; a front end hands decoded requests to
//! `Router::handle` and writes the returned `Response` back.

use serde::Deserialize;
use tweb::http::{Body, Codes};
use tweb::security::{check_passwd, hex_passwd};
use tweb::token::TokenIssuer;
use tweb::{Method, Request, Response, Router, ServerError};

#[derive(Deserialize)]
struct Login {
    username: String,
    password: String,
}

/// The one account this demo knows, with its password stored as a salted digest.
struct Account {
    username: String,
    password: String,
}

#[tokio::main]
async fn main() {
    tweb::logging::init_with_level("debug").expect("logging already initialised");

    let mut router = Router::new();
    router.plugin(TokenIssuer::new("change-me"));
    router.plugin(Account {
        username: "tester".into(),
        password: hex_passwd("secret"),
    });

    router.route(Method::GET, &["/", "/index", "/hello"], &[], |_req| async {
        Ok(Response::text("hello"))
    });

    router.post("/login", |req: Request| async move {
        let login: Login = req
            .body
            .json()
            .ok_or_else(|| ServerError::BadRequest("expected a JSON body".into()))?;
        let account = req
            .plugins
            .get::<Account>()
            .ok_or_else(|| ServerError::InternalError("account store missing".into()))?;
        if login.username != account.username || !check_passwd(&account.password, &login.password) {
            return Response::failure(Codes::FAILED, "wrong username or password", &tweb::Value::Null);
        }
        let issuer = req
            .plugins
            .get::<TokenIssuer>()
            .ok_or_else(|| ServerError::InternalError("token issuer missing".into()))?;
        let mut claims = tweb::serde_json::Map::new();
        claims.insert("username".into(), login.username.into());
        let token = issuer.create_token(3600, claims)?;
        Response::success("ok", &tweb::json!({ "token": token }))
    });

    router.get("/me", |req: Request| async move {
        let issuer = req
            .plugins
            .get::<TokenIssuer>()
            .ok_or_else(|| ServerError::InternalError("token issuer missing".into()))?;
        let status = issuer.get_token(req.token(issuer.header_name()).unwrap_or_default());
        if !status.state {
            return Response::failure(Codes::INVALID_TOKEN, status.msg, &tweb::Value::Null);
        }
        Response::success(status.msg, &status.data)
    });

    let hello = router.handle(Request::new(Method::GET, "/hello")).await;
    println!("GET /hello -> {:?}", hello.map(|r| r.body));

    let login = Request::new(Method::POST, "/login")
        .with_body(Body::json_bytes(r#"{"username": "tester", "password": "secret"}"#));
    let login = router.handle(login).await.expect("login failed");
    println!("POST /login -> {}", login.body);

    let body: tweb::Value = serde_json::from_str(&login.body).expect("login body is JSON");
    let token = body["data"]["token"].as_str().unwrap_or_default();
    let me = Request::new(Method::GET, "/me").with_header("X-Token", token);
    println!("GET /me -> {:?}", router.handle(me).await.map(|r| r.body));

    match router.handle(Request::new(Method::GET, "/missing")).await {
        Ok(response) => println!("GET /missing -> {}", response.status),
        Err(err) => println!("GET /missing -> {}", Response::error(err).status),
    }
}
